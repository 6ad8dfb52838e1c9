use super::{NOTE_BACKGROUND, NotesShell, frame_of};
use crate::note::NoteId;
use crate::window_state::NoteFrame;
use crate::{CloseNote, DeleteNote};
use gpui::*;
use gpui_component::StyledExt;
use gpui_component::input::{Input, InputEvent, InputState};

const NOTE_TEXT_COLOR: u32 = 0x3A3524;
const DRAG_STRIP_HEIGHT: f32 = 24.;

/// One sticky note: a bare multi-line input on a pale-yellow window.
pub(super) struct NoteWindow {
    shell: WeakEntity<NotesShell>,
    note_id: NoteId,
    input_state: Entity<InputState>,
    needs_focus: bool,
    last_frame: Option<NoteFrame>,
    _input_subscription: Subscription,
}

impl NoteWindow {
    pub(super) fn new(
        shell: WeakEntity<NotesShell>,
        note_id: NoteId,
        content: String,
        placeholder: &'static str,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) -> Self {
        let input_state = cx.new(|cx| {
            InputState::new(window, cx)
                .multi_line(true)
                .placeholder(placeholder)
        });
        input_state.update(cx, |input, cx| {
            input.set_value(content, window, cx);
        });

        let input_subscription = cx.subscribe(&input_state, |this, input, event: &InputEvent, cx| {
            if !matches!(event, InputEvent::Change) {
                return;
            }
            let content = input.read(cx).value().to_string();
            let id = this.note_id.clone();
            let _ = this.shell.update(cx, |shell, cx| {
                shell.record_edit(&id, content, cx);
            });
        });

        Self {
            shell,
            note_id,
            input_state,
            needs_focus: true,
            last_frame: None,
            _input_subscription: input_subscription,
        }
    }

    fn close_note(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        let id = self.note_id.clone();
        let _ = self.shell.update(cx, |shell, cx| {
            shell.window_closing(&id, window, cx);
        });
        window.remove_window();
    }

    fn delete_note(&mut self, cx: &mut Context<Self>) {
        let id = self.note_id.clone();
        let _ = self.shell.update(cx, |shell, cx| shell.delete_note(&id, cx));
    }

    fn track_frame(&mut self, window: &Window, cx: &mut Context<Self>) {
        if window.is_fullscreen() {
            return;
        }
        let frame = frame_of(window);
        if self.last_frame == Some(frame) {
            return;
        }
        let first = self.last_frame.is_none();
        self.last_frame = Some(frame);
        if first {
            return;
        }
        let _ = self
            .shell
            .update(cx, |shell, _| shell.remember_frame(&self.note_id, frame));
    }
}

impl Render for NoteWindow {
    fn render(&mut self, window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        if self.needs_focus {
            self.needs_focus = false;
            self.input_state
                .update(cx, |input, cx| input.focus(window, cx));
        }
        self.track_frame(window, cx);

        div()
            .id("note-window")
            .size_full()
            .v_flex()
            .bg(rgb(NOTE_BACKGROUND))
            .text_color(rgb(NOTE_TEXT_COLOR))
            .on_action(cx.listener(|this, _: &CloseNote, window, cx| {
                this.close_note(window, cx);
            }))
            .on_action(cx.listener(|this, _: &DeleteNote, _, cx| {
                this.delete_note(cx);
            }))
            .child(
                div()
                    .id("note-drag-strip")
                    .w_full()
                    .h(px(DRAG_STRIP_HEIGHT))
                    .flex_shrink_0()
                    .window_control_area(WindowControlArea::Drag),
            )
            .child(
                div()
                    .flex_1()
                    .min_h(px(0.))
                    .px_2()
                    .pb_2()
                    .child(Input::new(&self.input_state).appearance(false).h_full()),
            )
    }
}
