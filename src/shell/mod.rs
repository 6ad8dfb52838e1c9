#[cfg(target_os = "macos")]
mod floating;
mod note_window;

use crate::debounce::{Scheduler, TimerId};
use crate::i18n::I18n;
use crate::manager::{Alert, NoteSurface, NotesManager};
use crate::note::{Note, NoteId, now_millis};
use crate::remote::{RemoteCall, RemoteOutcome, RemoteStore};
use crate::window_state::{NoteFrame, NoteFrameStore};
use anyhow::Result;
use gpui::*;
use gpui_component::Root;
use note_window::NoteWindow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const NOTE_BACKGROUND: u32 = 0xFFF6A8;
const NOTE_MIN_WIDTH: f32 = 140.;
const NOTE_MIN_HEIGHT: f32 = 100.;
const ALERT_HOST_WIDTH: f32 = 420.;
const ALERT_HOST_HEIGHT: f32 = 180.;

/// gpui timer tasks keyed by the ids handed to debouncers.
///
/// `schedule` only records the request; [`NotesShell::start_requested_timers`]
/// spawns the tasks once the manager call that asked for them returns.
#[derive(Default)]
struct GpuiTimers {
    next_id: u64,
    requested: Vec<(TimerId, Duration)>,
    running: HashMap<TimerId, Task<()>>,
}

impl Scheduler for GpuiTimers {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        self.next_id = self.next_id.wrapping_add(1);
        let timer = TimerId(self.next_id);
        self.requested.push((timer, delay));
        timer
    }

    fn cancel(&mut self, timer: TimerId) {
        self.requested.retain(|(requested, _)| *requested != timer);
        // Dropping the task cancels it.
        self.running.remove(&timer);
    }
}

struct ShellSurface<'a, 'cx> {
    shell: WeakEntity<NotesShell>,
    cx: &'a mut Context<'cx, NotesShell>,
    frames: Option<&'a NoteFrameStore>,
    i18n: I18n,
    windows_opened: &'a mut usize,
    alerts: &'a mut Vec<Alert>,
}

impl NoteSurface for ShellSurface<'_, '_> {
    type Handle = AnyWindowHandle;

    fn open_window(&mut self, note: &Note) -> Result<AnyWindowHandle> {
        let frame = self
            .frames
            .and_then(|frames| frames.load(&note.id))
            .unwrap_or_else(|| NoteFrame::cascaded(*self.windows_opened));
        *self.windows_opened += 1;

        let window_options = WindowOptions {
            titlebar: Some(TitlebarOptions {
                title: None,
                appears_transparent: true,
                traffic_light_position: Some(point(px(8.), px(8.))),
            }),
            window_bounds: Some(WindowBounds::Windowed(Bounds {
                origin: point(px(frame.x), px(frame.y)),
                size: size(px(frame.width), px(frame.height)),
            })),
            window_decorations: Some(WindowDecorations::Client),
            window_min_size: Some(size(px(NOTE_MIN_WIDTH), px(NOTE_MIN_HEIGHT))),
            is_resizable: true,
            ..WindowOptions::default()
        };

        let shell = self.shell.clone();
        let note_id = note.id.clone();
        let content = note.content.clone();
        let placeholder = self.i18n.note_input_placeholder;
        let handle = self.cx.open_window(window_options, move |window, cx| {
            let shell_for_close = shell.clone();
            let id_for_close = note_id.clone();
            window.on_window_should_close(cx, move |window, cx| {
                let _ = shell_for_close.update(cx, |shell, cx| {
                    shell.window_closing(&id_for_close, window, cx);
                });
                true
            });
            #[cfg(target_os = "macos")]
            floating::float_above_other_windows(window);

            let view = cx.new(|cx| NoteWindow::new(shell, note_id, content, placeholder, window, cx));
            cx.new(|cx| Root::new(view, window, cx))
        })?;
        crate::debug_log!("[window] opened window for {}", note.id);
        Ok(handle.into())
    }

    fn close_window(&mut self, id: &NoteId, handle: AnyWindowHandle) {
        if let Some(frames) = self.frames {
            frames.forget(id);
        }
        if handle
            .update(&mut *self.cx, |_, window, _| window.remove_window())
            .is_err()
        {
            crate::debug_log!("[window] window for {} was already gone", id);
        }
    }

    fn show_alert(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }
}

/// Application-wide owner of the notes manager, bridging it to gpui.
pub struct NotesShell {
    manager: NotesManager<AnyWindowHandle>,
    store: Arc<dyn RemoteStore>,
    timers: GpuiTimers,
    frames: Option<NoteFrameStore>,
    i18n: I18n,
    windows_opened: usize,
    pending_alerts: Vec<Alert>,
    _quit_subscription: Subscription,
}

impl NotesShell {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        frames: Option<NoteFrameStore>,
        debounce_interval: Duration,
        i18n: I18n,
        cx: &mut Context<Self>,
    ) -> Self {
        let quit_subscription = cx.on_app_quit(|this, cx| {
            let calls = this.manager.flush_all(&mut this.timers);
            let store = this.store.clone();
            let executor = cx.background_executor().clone();
            async move {
                let saves = calls
                    .into_iter()
                    .map(|call| {
                        let store = store.clone();
                        executor.spawn(async move { call.execute(store.as_ref()) })
                    })
                    .collect::<Vec<_>>();
                for save in saves {
                    if let RemoteOutcome::Saved {
                        id,
                        result: Err(err),
                        ..
                    } = save.await
                    {
                        crate::debug_log!("[shell] save of {} at quit failed | {:#}", id, err);
                    }
                }
            }
        });

        Self {
            manager: NotesManager::new(debounce_interval),
            store,
            timers: GpuiTimers::default(),
            frames,
            i18n,
            windows_opened: 0,
            pending_alerts: Vec::new(),
            _quit_subscription: quit_subscription,
        }
    }

    pub fn launch(&mut self, cx: &mut Context<Self>) {
        let call = self.manager.launch();
        self.run_calls(vec![call], cx);
    }

    pub fn new_note(&mut self, cx: &mut Context<Self>) {
        let call = self.with_surface(cx, |manager, surface, _| {
            manager.create_note(now_millis(), surface)
        });
        self.settle(vec![call], cx);
    }

    pub fn delete_note(&mut self, id: &NoteId, cx: &mut Context<Self>) {
        let calls = self.manager.delete_note(id).into_iter().collect();
        self.settle(calls, cx);
    }

    pub(crate) fn record_edit(&mut self, id: &NoteId, content: String, cx: &mut Context<Self>) {
        if self
            .manager
            .record_edit(id, content, now_millis(), &mut self.timers)
        {
            self.start_requested_timers(cx);
        }
    }

    pub(crate) fn remember_frame(&self, id: &NoteId, frame: NoteFrame) {
        if let Some(frames) = self.frames.as_ref() {
            frames.remember(id, frame);
        }
    }

    /// The note's window is going away: keep its frame and flush its edits.
    pub(crate) fn window_closing(&mut self, id: &NoteId, window: &Window, cx: &mut Context<Self>) {
        self.remember_frame(id, frame_of(window));
        let calls = self
            .manager
            .close_window(id, &mut self.timers)
            .into_iter()
            .collect();
        self.settle(calls, cx);
    }

    fn timer_elapsed(&mut self, timer: TimerId, cx: &mut Context<Self>) {
        if let Some(task) = self.timers.running.remove(&timer) {
            task.detach();
        }
        let calls = self.manager.timer_elapsed(timer).into_iter().collect();
        self.settle(calls, cx);
    }

    fn apply_outcome(&mut self, outcome: RemoteOutcome, cx: &mut Context<Self>) {
        let calls = self.with_surface(cx, |manager, surface, timers| {
            manager.handle_outcome(outcome, surface, timers)
        });
        self.settle(calls, cx);
    }

    fn with_surface<R>(
        &mut self,
        cx: &mut Context<Self>,
        f: impl FnOnce(
            &mut NotesManager<AnyWindowHandle>,
            &mut ShellSurface<'_, '_>,
            &mut GpuiTimers,
        ) -> R,
    ) -> R {
        let shell = cx.entity().downgrade();
        let mut surface = ShellSurface {
            shell,
            cx,
            frames: self.frames.as_ref(),
            i18n: self.i18n,
            windows_opened: &mut self.windows_opened,
            alerts: &mut self.pending_alerts,
        };
        f(&mut self.manager, &mut surface, &mut self.timers)
    }

    fn settle(&mut self, calls: Vec<RemoteCall>, cx: &mut Context<Self>) {
        self.start_requested_timers(cx);
        self.present_alerts(cx);
        self.run_calls(calls, cx);
    }

    fn start_requested_timers(&mut self, cx: &mut Context<Self>) {
        for (timer, delay) in std::mem::take(&mut self.timers.requested) {
            let task = cx.spawn(async move |shell, cx| {
                cx.background_executor().timer(delay).await;
                let _ = shell.update(cx, |shell, cx| shell.timer_elapsed(timer, cx));
            });
            self.timers.running.insert(timer, task);
        }
    }

    fn run_calls(&mut self, calls: Vec<RemoteCall>, cx: &mut Context<Self>) {
        for call in calls {
            let label = call.label();
            crate::debug_log!("[shell] issuing {} call", label);
            let store = self.store.clone();
            cx.spawn(async move |shell, cx| {
                let outcome = cx
                    .background_executor()
                    .spawn(async move { call.execute(store.as_ref()) })
                    .await;
                crate::debug_log!("[shell] {} call finished", label);
                let _ = shell.update(cx, |shell, cx| shell.apply_outcome(outcome, cx));
            })
            .detach();
        }
    }

    /// Prompts on the focused note window, else the first one open, else on a
    /// window opened just for the alert.
    fn present_alerts(&mut self, cx: &mut Context<Self>) {
        for alert in std::mem::take(&mut self.pending_alerts) {
            let title = self.i18n.alert_title(alert.kind);
            let ok = self.i18n.alert_ok_button;
            let (target, hosted) = match alert_target(cx.active_window(), &self.manager) {
                AlertTarget::NoteWindow(handle) => (handle, false),
                AlertTarget::HostWindow => match open_alert_host(title, cx) {
                    Ok(handle) => (handle, true),
                    Err(err) => {
                        crate::debug_log!(
                            "[shell] failed to open alert window | {:#} | {}",
                            err,
                            alert.message
                        );
                        continue;
                    }
                },
            };

            let answer = target.update(cx, |_, window, cx| {
                window.prompt(
                    PromptLevel::Critical,
                    title,
                    Some(alert.message.as_str()),
                    &[ok],
                    cx,
                )
            });
            let Ok(answer) = answer else {
                crate::debug_log!("[shell] failed to show alert: {}", alert.message);
                continue;
            };
            if hosted {
                cx.spawn(async move |_, cx| {
                    let _ = answer.await;
                    let _ = target.update(cx, |_, window, _| window.remove_window());
                })
                .detach();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlertTarget<H> {
    NoteWindow(H),
    /// No note window is open.
    HostWindow,
}

fn alert_target<H: Clone + PartialEq>(
    active: Option<H>,
    manager: &NotesManager<H>,
) -> AlertTarget<H> {
    active
        .filter(|handle| manager.note_for_window(handle).is_some())
        .or_else(|| manager.open_windows().next().map(|(_, handle)| handle.clone()))
        .map_or(AlertTarget::HostWindow, AlertTarget::NoteWindow)
}

struct AlertHost;

impl Render for AlertHost {
    fn render(&mut self, _: &mut Window, _: &mut Context<Self>) -> impl IntoElement {
        div().size_full().bg(rgb(NOTE_BACKGROUND))
    }
}

fn open_alert_host(title: &'static str, cx: &mut App) -> Result<AnyWindowHandle> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some(title.into()),
            appears_transparent: true,
            traffic_light_position: None,
        }),
        window_bounds: Some(WindowBounds::centered(
            size(px(ALERT_HOST_WIDTH), px(ALERT_HOST_HEIGHT)),
            cx,
        )),
        window_decorations: Some(WindowDecorations::Client),
        is_resizable: false,
        ..WindowOptions::default()
    };
    let handle = cx.open_window(window_options, |window, cx| {
        let view = cx.new(|_| AlertHost);
        cx.new(|cx| Root::new(view, window, cx))
    })?;
    Ok(handle.into())
}

pub(crate) fn frame_of(window: &Window) -> NoteFrame {
    let bounds = window.bounds();
    NoteFrame {
        x: f32::from(bounds.origin.x),
        y: f32::from(bounds.origin.y),
        width: f32::from(bounds.size.width),
        height: f32::from(bounds.size.height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::prelude::v1::test;
    use crate::debounce::virtual_clock::VirtualClock;
    use crate::manager::AlertKind;
    use crate::remote::memory::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct HeadlessSurface {
        next_handle: u32,
        alerts: Vec<Alert>,
    }

    impl NoteSurface for HeadlessSurface {
        type Handle = u32;

        fn open_window(&mut self, _: &Note) -> Result<u32> {
            self.next_handle += 1;
            Ok(self.next_handle)
        }

        fn close_window(&mut self, _: &NoteId, _: u32) {}

        fn show_alert(&mut self, alert: Alert) {
            self.alerts.push(alert);
        }
    }

    fn manager() -> NotesManager<u32> {
        NotesManager::new(Duration::from_millis(500))
    }

    #[test]
    fn timers_are_requested_until_started() {
        let mut timers = GpuiTimers::default();
        let first = timers.schedule(Duration::from_millis(500));
        let second = timers.schedule(Duration::from_millis(500));
        assert_ne!(first, second);
        assert_eq!(timers.requested.len(), 2);

        timers.cancel(first);
        assert_eq!(timers.requested, vec![(second, Duration::from_millis(500))]);
    }

    #[test]
    fn failed_launch_fetch_is_prompted_on_a_host_window() {
        let mut manager = manager();
        let mut surface = HeadlessSurface::default();
        let mut clock = VirtualClock::new();
        let store = MemoryStore::default();
        store.fail_query.store(true, Ordering::SeqCst);

        let outcome = manager.launch().execute(&store);
        manager.handle_outcome(outcome, &mut surface, &mut clock);

        assert_eq!(surface.alerts.len(), 1);
        assert_eq!(surface.alerts[0].kind, AlertKind::FetchFailed);
        assert_eq!(manager.open_window_count(), 0);
        assert_eq!(alert_target(None, &manager), AlertTarget::HostWindow);
    }

    #[test]
    fn alerts_prefer_the_focused_note_window() {
        let mut manager = manager();
        let mut surface = HeadlessSurface::default();
        let now = Utc.timestamp_millis_opt(1_000).unwrap();
        manager.create_note(now, &mut surface);
        manager.create_note(now, &mut surface);
        let first_open = manager.open_windows().next().map(|(_, handle)| *handle).unwrap();

        assert_eq!(alert_target(Some(2), &manager), AlertTarget::NoteWindow(2));
        assert_eq!(alert_target(Some(1), &manager), AlertTarget::NoteWindow(1));
        // A focused window that is not a note, such as an open alert window.
        assert_eq!(alert_target(Some(99), &manager), AlertTarget::NoteWindow(first_open));
        assert_eq!(alert_target(None, &manager), AlertTarget::NoteWindow(first_open));
    }
}
