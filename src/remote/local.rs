use super::RemoteStore;
use crate::note::NoteId;
use crate::record::RemoteRecord;
use anyhow::{Context, Result};

const RECORDS_TREE: &str = "records";

/// Private database kept on this machine, for running without cloud credentials.
pub struct LocalRecordStore {
    tree: sled::Tree,
}

impl LocalRecordStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        let tree = db
            .open_tree(RECORDS_TREE)
            .with_context(|| format!("failed to open tree {RECORDS_TREE}"))?;
        Ok(Self { tree })
    }
}

impl RemoteStore for LocalRecordStore {
    fn query_all(&self) -> Result<Vec<RemoteRecord>> {
        let mut records = Vec::new();
        for entry in self.tree.iter() {
            let (key, value) = entry.context("failed to read local records")?;
            match serde_json::from_slice::<RemoteRecord>(&value) {
                Ok(record) => records.push(record),
                Err(err) => {
                    crate::debug_log!(
                        "[store] skipping unreadable record {} | {}",
                        String::from_utf8_lossy(&key),
                        err
                    );
                }
            }
        }
        Ok(records)
    }

    fn save(&self, record: RemoteRecord) -> Result<()> {
        let value = serde_json::to_vec(&record).context("failed to serialize record")?;
        self.tree
            .insert(record.record_name.as_bytes(), value)
            .with_context(|| format!("failed to save record {}", record.record_name))?;
        self.tree.flush().context("failed to flush local records")?;
        Ok(())
    }

    fn delete(&self, id: &NoteId) -> Result<()> {
        self.tree
            .remove(id.as_str().as_bytes())
            .with_context(|| format!("failed to delete record {id}"))?;
        self.tree.flush().context("failed to flush local records")?;
        Ok(())
    }
}
