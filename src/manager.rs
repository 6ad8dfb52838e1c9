use crate::debounce::{EditDebouncer, Scheduler, TimerId};
use crate::note::{Note, NoteId};
use crate::record::{decode, encode};
use crate::remote::{RemoteCall, RemoteOutcome, SaveReason};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    FetchFailed,
    CreateFailed,
    UpdateFailed,
    DeleteFailed,
}

/// A user-visible failure report. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

/// The window toolkit as seen by the manager.
///
/// Called only from the UI loop, synchronously, from inside manager
/// operations.
pub trait NoteSurface {
    type Handle: Clone + PartialEq;

    /// Shows a new window for `note`.
    fn open_window(&mut self, note: &Note) -> Result<Self::Handle>;
    /// Closes a window the manager has already forgotten.
    fn close_window(&mut self, id: &NoteId, handle: Self::Handle);
    fn show_alert(&mut self, alert: Alert);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Idle,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotePhase {
    /// Unknown, or known but without a window.
    Absent,
    Visible,
    /// Visible with an edit waiting for the debouncer.
    Editing,
    /// A remote delete is in flight.
    Deleting,
}

struct OpenWindow<H> {
    handle: H,
    debouncer: EditDebouncer,
}

/// Owns the note collection and the window registry.
///
/// Operations that need the remote store return the [`RemoteCall`] to issue;
/// the caller runs it and feeds the [`RemoteOutcome`] back through
/// [`NotesManager::handle_outcome`].
pub struct NotesManager<H> {
    notes: Vec<Note>,
    windows: BTreeMap<NoteId, OpenWindow<H>>,
    /// In-flight deletes; the flag records a save held back meanwhile.
    deleting: BTreeMap<NoteId, bool>,
    saves_in_flight: BTreeMap<NoteId, usize>,
    launch_state: LaunchState,
    debounce_interval: Duration,
}

impl<H: Clone + PartialEq> NotesManager<H> {
    pub fn new(debounce_interval: Duration) -> Self {
        Self {
            notes: Vec::new(),
            windows: BTreeMap::new(),
            deleting: BTreeMap::new(),
            saves_in_flight: BTreeMap::new(),
            launch_state: LaunchState::Idle,
            debounce_interval,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    pub fn window(&self, id: &NoteId) -> Option<&H> {
        self.windows.get(id).map(|window| &window.handle)
    }

    pub fn note_for_window(&self, handle: &H) -> Option<&NoteId> {
        self.windows
            .iter()
            .find(|(_, window)| &window.handle == handle)
            .map(|(id, _)| id)
    }

    pub fn open_windows(&self) -> impl Iterator<Item = (&NoteId, &H)> {
        self.windows.iter().map(|(id, window)| (id, &window.handle))
    }

    pub fn open_window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn launch_state(&self) -> LaunchState {
        self.launch_state
    }

    pub fn phase(&self, id: &NoteId) -> NotePhase {
        if self.note(id).is_none() {
            return NotePhase::Absent;
        }
        if self.deleting.contains_key(id) {
            return NotePhase::Deleting;
        }
        match self.windows.get(id) {
            Some(window) if window.debouncer.is_pending() => NotePhase::Editing,
            Some(_) => NotePhase::Visible,
            None => NotePhase::Absent,
        }
    }

    pub fn launch(&mut self) -> RemoteCall {
        crate::debug_log!("[manager] fetching notes");
        self.launch_state = LaunchState::Loading;
        RemoteCall::QueryAll
    }

    /// Appends an empty note and shows it before the remote save completes.
    pub fn create_note<S>(&mut self, now: DateTime<Utc>, surface: &mut S) -> RemoteCall
    where
        S: NoteSurface<Handle = H>,
    {
        let note = Note::new(NoteId::generate(), now);
        crate::debug_log!("[manager] created note {}", note.id);
        self.notes.push(note.clone());
        self.open_window_for(&note, surface);
        self.save_call(&note, SaveReason::Create)
    }

    /// Replaces the stored note by identity and saves it. Local state is kept
    /// whatever the save outcome.
    pub fn update_note(&mut self, note: Note) -> Option<RemoteCall> {
        let Some(slot) = self.notes.iter_mut().find(|existing| existing.id == note.id) else {
            crate::debug_log!("[manager] ignoring update for unknown note {}", note.id);
            return None;
        };
        *slot = note.clone();

        if let Some(held) = self.deleting.get_mut(&note.id) {
            crate::debug_log!("[manager] holding save of {} until delete settles", note.id);
            *held = true;
            return None;
        }
        Some(self.save_call(&note, SaveReason::Update))
    }

    /// Applies a keystroke-level change from the note's window and re-arms its debouncer.
    pub fn record_edit(
        &mut self,
        id: &NoteId,
        content: String,
        at: DateTime<Utc>,
        scheduler: &mut dyn Scheduler,
    ) -> bool {
        let Some(note) = self.notes.iter_mut().find(|note| &note.id == id) else {
            return false;
        };
        if note.content == content {
            return false;
        }
        note.set_content(content, at);
        if let Some(window) = self.windows.get_mut(id) {
            window.debouncer.on_edit(scheduler);
        }
        true
    }

    pub fn timer_elapsed(&mut self, timer: TimerId) -> Option<RemoteCall> {
        let id = self
            .windows
            .iter_mut()
            .find_map(|(id, window)| window.debouncer.fire(timer).then(|| id.clone()))?;
        self.persist_current(&id)
    }

    /// Starts a remote delete. The note stays until the store confirms.
    pub fn delete_note(&mut self, id: &NoteId) -> Option<RemoteCall> {
        if self.note(id).is_none() {
            crate::debug_log!("[manager] ignoring delete for unknown note {}", id);
            return None;
        }
        if self.deleting.contains_key(id) {
            crate::debug_log!("[manager] delete already in flight for {}", id);
            return None;
        }
        if self.saves_in_flight.get(id).copied().unwrap_or(0) > 0 {
            crate::debug_log!(
                "[manager] deleting {} while a save is in flight; completion order is up to the store",
                id
            );
        }
        self.deleting.insert(id.clone(), false);
        Some(RemoteCall::Delete { id: id.clone() })
    }

    /// The user closed the note's window: flush, then forget the window.
    pub fn close_window(&mut self, id: &NoteId, scheduler: &mut dyn Scheduler) -> Option<RemoteCall> {
        let (_, call) = self.take_window(id, scheduler)?;
        crate::debug_log!("[manager] window closed for {}", id);
        call
    }

    pub fn flush_all(&mut self, scheduler: &mut dyn Scheduler) -> Vec<RemoteCall> {
        let flushed = self
            .windows
            .iter_mut()
            .filter_map(|(id, window)| window.debouncer.flush(&mut *scheduler).then(|| id.clone()))
            .collect::<Vec<_>>();
        crate::debug_log!("[manager] flushing {} pending edits", flushed.len());
        flushed
            .iter()
            .filter_map(|id| self.persist_current(id))
            .collect()
    }

    pub fn handle_outcome<S>(
        &mut self,
        outcome: RemoteOutcome,
        surface: &mut S,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<RemoteCall>
    where
        S: NoteSurface<Handle = H>,
    {
        match outcome {
            RemoteOutcome::Fetched(Ok(records)) => {
                let notes = records.iter().filter_map(decode).collect::<Vec<_>>();
                self.apply_fetched(notes, records.len(), surface, scheduler)
            }
            RemoteOutcome::Fetched(Err(err)) => {
                crate::debug_log!("[manager] fetch failed | {:#}", err);
                self.launch_state = LaunchState::Failed;
                surface.show_alert(Alert {
                    kind: AlertKind::FetchFailed,
                    message: format!("{err:#}"),
                });
                Vec::new()
            }
            RemoteOutcome::Saved { id, reason, result } => {
                self.finish_save(&id);
                if let Err(err) = result {
                    crate::debug_log!("[manager] save of {} failed | {:#}", id, err);
                    let kind = match reason {
                        SaveReason::Create => AlertKind::CreateFailed,
                        SaveReason::Update => AlertKind::UpdateFailed,
                    };
                    surface.show_alert(Alert {
                        kind,
                        message: format!("{err:#}"),
                    });
                }
                Vec::new()
            }
            RemoteOutcome::Deleted { id, result: Ok(()) } => {
                self.deleting.remove(&id);
                self.notes.retain(|note| note.id != id);
                if let Some(mut window) = self.windows.remove(&id) {
                    window.debouncer.cancel(scheduler);
                    surface.close_window(&id, window.handle);
                }
                crate::debug_log!("[manager] deleted {}", id);
                Vec::new()
            }
            RemoteOutcome::Deleted {
                id,
                result: Err(err),
            } => {
                crate::debug_log!("[manager] delete of {} failed | {:#}", id, err);
                let held = self.deleting.remove(&id).unwrap_or(false);
                surface.show_alert(Alert {
                    kind: AlertKind::DeleteFailed,
                    message: format!("{err:#}"),
                });
                if held {
                    return self.persist_current(&id).into_iter().collect();
                }
                Vec::new()
            }
        }
    }

    fn apply_fetched<S>(
        &mut self,
        mut fetched: Vec<Note>,
        total: usize,
        surface: &mut S,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<RemoteCall>
    where
        S: NoteSurface<Handle = H>,
    {
        if fetched.len() < total {
            crate::debug_log!(
                "[manager] dropped {} undecodable records",
                total - fetched.len()
            );
        }
        let mut seen = HashSet::new();
        fetched.retain(|note| seen.insert(note.id.clone()));
        fetched.sort_by(|l, r| {
            l.last_modified
                .cmp(&r.last_modified)
                .then_with(|| l.id.cmp(&r.id))
        });

        let mut calls = Vec::new();
        let stale = self
            .windows
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect::<Vec<_>>();
        for id in stale {
            if let Some((handle, call)) = self.take_window(&id, scheduler) {
                calls.extend(call);
                surface.close_window(&id, handle);
            }
        }

        self.notes = fetched;
        self.launch_state = LaunchState::Loaded;
        crate::debug_log!("[manager] loaded {} notes", self.notes.len());

        for note in self.notes.clone() {
            self.open_window_for(&note, surface);
        }
        calls
    }

    /// Removes the registry entry, flushing its debouncer first.
    fn take_window(
        &mut self,
        id: &NoteId,
        scheduler: &mut dyn Scheduler,
    ) -> Option<(H, Option<RemoteCall>)> {
        let mut window = self.windows.remove(id)?;
        let call = if window.debouncer.flush(scheduler) {
            self.persist_current(id)
        } else {
            None
        };
        Some((window.handle, call))
    }

    fn open_window_for<S>(&mut self, note: &Note, surface: &mut S)
    where
        S: NoteSurface<Handle = H>,
    {
        if self.windows.contains_key(&note.id) {
            return;
        }
        match surface.open_window(note) {
            Ok(handle) => {
                self.windows.insert(
                    note.id.clone(),
                    OpenWindow {
                        handle,
                        debouncer: EditDebouncer::new(self.debounce_interval),
                    },
                );
            }
            Err(err) => {
                crate::debug_log!("[manager] failed to open window for {} | {:#}", note.id, err);
            }
        }
    }

    fn persist_current(&mut self, id: &NoteId) -> Option<RemoteCall> {
        let note = self.note(id)?.clone();
        self.update_note(note)
    }

    fn save_call(&mut self, note: &Note, reason: SaveReason) -> RemoteCall {
        *self.saves_in_flight.entry(note.id.clone()).or_insert(0) += 1;
        RemoteCall::Save {
            record: encode(note),
            reason,
        }
    }

    fn finish_save(&mut self, id: &NoteId) {
        if let Some(count) = self.saves_in_flight.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.saves_in_flight.remove(id);
            }
        }
    }
}
