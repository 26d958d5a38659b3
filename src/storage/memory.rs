use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::engine::{RecordStore, StorageResult};
use super::table::RecordTable;
use crate::models::Record;

/// Process-local backend. Clones share the same table.
///
/// Every write holds the table's write lock, which is what makes `upsert`
/// atomic against concurrent writers.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    table: Arc<RwLock<RecordTable>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn ensure_schema(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn upsert(&self, record: &Record) -> StorageResult<u64> {
        let mut table = self.table.write().await;
        Ok(table.upsert(record.clone()))
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Record>> {
        let table = self.table.read().await;
        Ok(table.get(id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Record>> {
        let table = self.table.read().await;
        Ok(table.first_by_name(name).cloned())
    }

    async fn row_count(&self) -> StorageResult<usize> {
        let table = self.table.read().await;
        Ok(table.row_count())
    }
}
