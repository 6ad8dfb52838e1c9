use gpui::Window;
use objc2::rc::Retained;
use objc2_app_kit::{NSView, NSWindow, NSWindowLevel};
use objc2_foundation::MainThreadMarker;
use raw_window_handle::{HasWindowHandle, RawWindowHandle};

// kCGFloatingWindowLevel
const FLOATING_WINDOW_LEVEL: NSWindowLevel = 3;

/// Keeps the note above regular application windows.
pub(super) fn float_above_other_windows(window: &Window) {
    if MainThreadMarker::new().is_none() {
        crate::debug_log!("[window] floating level must be set on the main thread");
        return;
    }
    let Ok(handle) = HasWindowHandle::window_handle(window) else {
        return;
    };
    let RawWindowHandle::AppKit(appkit) = handle.as_raw() else {
        return;
    };

    // SAFETY: raw-window-handle guarantees `ns_view` points at the live
    // content view of this window for as long as the handle is borrowed.
    let ns_window: Option<Retained<NSWindow>> =
        unsafe { appkit.ns_view.cast::<NSView>().as_ref().window() };
    let Some(ns_window) = ns_window else {
        crate::debug_log!("[window] content view has no NSWindow yet");
        return;
    };
    ns_window.setLevel(FLOATING_WINDOW_LEVEL);
}
