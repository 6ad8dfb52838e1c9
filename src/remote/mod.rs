pub mod cloudkit;
pub mod local;

use crate::note::NoteId;
use crate::record::RemoteRecord;
use anyhow::Result;

/// Per-user private record database.
///
/// Calls block; the shell runs them on the background executor and hands the
/// outcome back to the UI loop.
pub trait RemoteStore: Send + Sync {
    fn query_all(&self) -> Result<Vec<RemoteRecord>>;
    /// Create-or-overwrite of the whole record.
    fn save(&self, record: RemoteRecord) -> Result<()>;
    fn delete(&self, id: &NoteId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    Create,
    Update,
}

/// A remote operation the manager wants issued.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    QueryAll,
    Save {
        record: RemoteRecord,
        reason: SaveReason,
    },
    Delete {
        id: NoteId,
    },
}

#[derive(Debug)]
pub enum RemoteOutcome {
    Fetched(Result<Vec<RemoteRecord>>),
    Saved {
        id: NoteId,
        reason: SaveReason,
        result: Result<()>,
    },
    Deleted {
        id: NoteId,
        result: Result<()>,
    },
}

impl RemoteCall {
    pub fn execute(self, store: &dyn RemoteStore) -> RemoteOutcome {
        match self {
            Self::QueryAll => RemoteOutcome::Fetched(store.query_all()),
            Self::Save { record, reason } => {
                let id = NoteId::from(record.record_name.as_str());
                RemoteOutcome::Saved {
                    id,
                    reason,
                    result: store.save(record),
                }
            }
            Self::Delete { id } => {
                let result = store.delete(&id);
                RemoteOutcome::Deleted { id, result }
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::QueryAll => "query",
            Self::Save {
                reason: SaveReason::Create,
                ..
            } => "create",
            Self::Save {
                reason: SaveReason::Update,
                ..
            } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::RemoteStore;
    use crate::note::NoteId;
    use crate::record::RemoteRecord;
    use anyhow::{Result, bail};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory store with switchable failures.
    #[derive(Default)]
    pub struct MemoryStore {
        pub records: Mutex<BTreeMap<String, RemoteRecord>>,
        pub fail_query: AtomicBool,
        pub fail_save: AtomicBool,
        pub fail_delete: AtomicBool,
    }

    impl MemoryStore {
        pub fn with_records(records: impl IntoIterator<Item = RemoteRecord>) -> Self {
            let store = Self::default();
            {
                let mut map = store.records.lock().unwrap();
                for record in records {
                    map.insert(record.record_name.clone(), record);
                }
            }
            store
        }

        pub fn get(&self, name: &str) -> Option<RemoteRecord> {
            self.records.lock().unwrap().get(name).cloned()
        }

        pub fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        pub fn set_failing(&self, flag: &AtomicBool, failing: bool) {
            flag.store(failing, Ordering::SeqCst);
        }
    }

    impl RemoteStore for MemoryStore {
        fn query_all(&self) -> Result<Vec<RemoteRecord>> {
            if self.fail_query.load(Ordering::SeqCst) {
                bail!("network connection lost");
            }
            Ok(self.records.lock().unwrap().values().cloned().collect())
        }

        fn save(&self, record: RemoteRecord) -> Result<()> {
            if self.fail_save.load(Ordering::SeqCst) {
                bail!("quota exceeded");
            }
            self.records
                .lock()
                .unwrap()
                .insert(record.record_name.clone(), record);
            Ok(())
        }

        fn delete(&self, id: &NoteId) -> Result<()> {
            if self.fail_delete.load(Ordering::SeqCst) {
                bail!("service unavailable");
            }
            self.records.lock().unwrap().remove(id.as_str());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::note::Note;
    use crate::record::encode;
    use chrono::{TimeZone, Utc};

    #[test]
    fn execute_routes_to_store() {
        let store = MemoryStore::default();
        let note = Note::new(NoteId::from("n1"), Utc.timestamp_millis_opt(10).unwrap());

        let outcome = RemoteCall::Save {
            record: encode(&note),
            reason: SaveReason::Create,
        }
        .execute(&store);
        assert!(matches!(
            outcome,
            RemoteOutcome::Saved { ref id, reason: SaveReason::Create, result: Ok(()) } if id.as_str() == "n1"
        ));
        assert_eq!(store.len(), 1);

        match RemoteCall::QueryAll.execute(&store) {
            RemoteOutcome::Fetched(Ok(records)) => assert_eq!(records.len(), 1),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let outcome = RemoteCall::Delete { id: note.id.clone() }.execute(&store);
        assert!(matches!(outcome, RemoteOutcome::Deleted { result: Ok(()), .. }));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn execute_reports_failures() {
        let store = MemoryStore::default();
        store.set_failing(&store.fail_query, true);
        match RemoteCall::QueryAll.execute(&store) {
            RemoteOutcome::Fetched(Err(err)) => {
                assert!(err.to_string().contains("network"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
