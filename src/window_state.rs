use crate::note::NoteId;
use anyhow::{Context, Result};

const NOTE_FRAMES_TREE: &str = "note_frames";
const DEFAULT_NOTE_SIZE: f32 = 240.;
const CASCADE_ORIGIN: (f32, f32) = (80., 80.);
const CASCADE_STEP: f32 = 24.;
const CASCADE_SLOTS: usize = 10;

/// Window origin and size in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteFrame {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NoteFrame {
    /// Frame for the `index`-th window opened without a remembered frame.
    pub fn cascaded(index: usize) -> Self {
        let offset = (index % CASCADE_SLOTS) as f32 * CASCADE_STEP;
        Self {
            x: CASCADE_ORIGIN.0 + offset,
            y: CASCADE_ORIGIN.1 + offset,
            width: DEFAULT_NOTE_SIZE,
            height: DEFAULT_NOTE_SIZE,
        }
    }

    fn to_bytes(self) -> [u8; 16] {
        let mut bytes = [0; 16];
        for (chunk, value) in bytes
            .chunks_exact_mut(4)
            .zip([self.x, self.y, self.width, self.height])
        {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 16 {
            return None;
        }
        let mut values = bytes
            .chunks_exact(4)
            .map(|chunk| chunk.try_into().ok().map(f32::from_be_bytes));
        let frame = Self {
            x: values.next()??,
            y: values.next()??,
            width: values.next()??,
            height: values.next()??,
        };
        let finite = [frame.x, frame.y, frame.width, frame.height]
            .iter()
            .all(|value| value.is_finite());
        if !finite || frame.width <= 0.0 || frame.height <= 0.0 {
            return None;
        }
        Some(frame)
    }
}

/// Remembered per-note window frames.
#[derive(Clone)]
pub struct NoteFrameStore {
    tree: sled::Tree,
}

impl NoteFrameStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        let tree = db
            .open_tree(NOTE_FRAMES_TREE)
            .with_context(|| format!("failed to open sled tree '{NOTE_FRAMES_TREE}'"))?;
        Ok(Self { tree })
    }

    pub fn load(&self, id: &NoteId) -> Option<NoteFrame> {
        let bytes = self.tree.get(id.as_str()).ok().flatten()?;
        NoteFrame::from_bytes(&bytes)
    }

    pub fn remember(&self, id: &NoteId, frame: NoteFrame) {
        if self.load(id) == Some(frame) {
            return;
        }
        if self.tree.insert(id.as_str(), &frame.to_bytes()[..]).is_err() {
            crate::debug_log!("[window] save frame failed for {}", id);
        }
    }

    pub fn forget(&self, id: &NoteId) {
        if self.tree.remove(id.as_str()).is_err() {
            crate::debug_log!("[window] forget frame failed for {}", id);
        }
    }
}
