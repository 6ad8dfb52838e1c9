use crate::note::{Note, NoteId};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const NOTE_RECORD_TYPE: &str = "StickyNote";
pub const CONTENT_FIELD: &str = "content";
pub const LAST_MODIFIED_FIELD: &str = "lastModified";

/// A record as the private database stores it, in CloudKit's JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub record_name: String,
    pub record_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

/// A field value in CloudKit's `{ "type", "value" }` shape.
///
/// Types the notes never use are kept as [`FieldValue::Unsupported`] so one
/// unfamiliar field does not cost the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawField", into = "RawField")]
pub enum FieldValue {
    String(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Int64(i64),
    Double(f64),
    Unsupported { kind: String, value: Value },
}

#[derive(Serialize, Deserialize)]
struct RawField {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    kind: String,
    #[serde(default)]
    value: Value,
}

impl From<RawField> for FieldValue {
    fn from(raw: RawField) -> Self {
        let known = match raw.kind.as_str() {
            "STRING" => raw.value.as_str().map(|text| FieldValue::String(text.to_owned())),
            "TIMESTAMP" => raw.value.as_i64().map(FieldValue::Timestamp),
            "INT64" => raw.value.as_i64().map(FieldValue::Int64),
            "DOUBLE" => raw.value.as_f64().map(FieldValue::Double),
            _ => None,
        };
        known.unwrap_or(FieldValue::Unsupported {
            kind: raw.kind,
            value: raw.value,
        })
    }
}

impl From<FieldValue> for RawField {
    fn from(field: FieldValue) -> Self {
        let (kind, value) = match field {
            FieldValue::String(text) => ("STRING".to_owned(), Value::from(text)),
            FieldValue::Timestamp(millis) => ("TIMESTAMP".to_owned(), Value::from(millis)),
            FieldValue::Int64(number) => ("INT64".to_owned(), Value::from(number)),
            FieldValue::Double(number) => ("DOUBLE".to_owned(), Value::from(number)),
            FieldValue::Unsupported { kind, value } => (kind, value),
        };
        Self { kind, value }
    }
}

impl RemoteRecord {
    pub fn new(record_name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            record_name: record_name.into(),
            record_type: record_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }
}

/// Returns `None` when the record is not a well-formed sticky note.
pub fn decode(record: &RemoteRecord) -> Option<Note> {
    if record.record_type != NOTE_RECORD_TYPE || record.record_name.is_empty() {
        return None;
    }

    let content = match record.fields.get(CONTENT_FIELD)? {
        FieldValue::String(content) => content.clone(),
        _ => return None,
    };
    let last_modified = match record.fields.get(LAST_MODIFIED_FIELD)? {
        FieldValue::Timestamp(millis) => DateTime::from_timestamp_millis(*millis)?,
        _ => return None,
    };

    Some(Note {
        id: NoteId::from(record.record_name.as_str()),
        content,
        last_modified,
    })
}

pub fn encode(note: &Note) -> RemoteRecord {
    RemoteRecord::new(note.id.as_str(), NOTE_RECORD_TYPE)
        .with_field(CONTENT_FIELD, FieldValue::String(note.content.clone()))
        .with_field(
            LAST_MODIFIED_FIELD,
            FieldValue::Timestamp(note.last_modified.timestamp_millis()),
        )
}
