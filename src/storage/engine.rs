use async_trait::async_trait;

use crate::core::StorageError;
use crate::models::Record;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage engine trait - allows pluggable storage backends
///
/// Backends must apply `upsert` atomically: concurrent upserts of the same
/// identifier leave exactly one row, holding one of the written payloads.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the records table if it does not exist yet
    async fn ensure_schema(&self) -> StorageResult<()>;

    /// Insert a row, or overwrite the row holding the same identifier.
    ///
    /// Returns the number of rows affected.
    async fn upsert(&self, record: &Record) -> StorageResult<u64>;

    /// Look a row up by primary key
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Record>>;

    /// First row (by identifier order) carrying the given name
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Record>>;

    /// Get table row count
    async fn row_count(&self) -> StorageResult<usize>;
}
