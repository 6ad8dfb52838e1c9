use chrono::{DateTime, Utc};
use std::fmt;

/// Opaque identity shared by a note, its remote record and its window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(String);

impl NoteId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    pub last_modified: DateTime<Utc>,
}

impl Note {
    pub fn new(id: NoteId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            content: String::new(),
            last_modified: truncate_to_millis(now),
        }
    }

    /// Replaces the content and bumps the timestamp.
    pub fn set_content(&mut self, content: String, now: DateTime<Utc>) {
        self.content = content;
        self.last_modified = truncate_to_millis(now);
    }
}

/// Remote timestamps carry milliseconds; keep local ones at the same precision.
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

pub fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_ids_are_unique() {
        let a = NoteId::generate();
        let b = NoteId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn set_content_bumps_timestamp_at_millisecond_precision() {
        let created = Utc.timestamp_millis_opt(1_000).unwrap();
        let mut note = Note::new(NoteId::from("n1"), created);
        assert!(note.content.is_empty());

        let edited = Utc.timestamp_opt(5, 123_456_789).unwrap();
        note.set_content("milk".into(), edited);

        assert_eq!(note.content, "milk");
        assert_eq!(note.last_modified.timestamp_millis(), 5_123);
        assert_eq!(note.last_modified.timestamp_subsec_nanos(), 123_000_000);
    }
}
