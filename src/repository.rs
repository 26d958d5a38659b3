use async_trait::async_trait;

use crate::core::{Result, ServiceError};
use crate::models::Record;
use crate::storage::Datastore;

#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Record>;
    async fn get_by_name(&self, name: &str) -> Result<Record>;
    /// Insert-or-update keyed by identifier; returns the rows affected.
    async fn save(&self, record: &Record) -> Result<u64>;
}

/// Repository over a [`Datastore`]. Holds no locks of its own.
#[derive(Clone)]
pub struct DatastoreRecordRepository {
    datastore: Datastore,
}

impl DatastoreRecordRepository {
    pub fn new(datastore: Datastore) -> Self {
        Self { datastore }
    }
}

#[async_trait]
impl RecordRepository for DatastoreRecordRepository {
    async fn get_by_id(&self, id: &str) -> Result<Record> {
        if id.is_empty() {
            return Err(ServiceError::unspecified_id());
        }

        self.datastore
            .reader()
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("record with id '{id}'")))
    }

    async fn get_by_name(&self, name: &str) -> Result<Record> {
        self.datastore
            .reader()
            .find_by_name(name)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("record named '{name}'")))
    }

    async fn save(&self, record: &Record) -> Result<u64> {
        Ok(self.datastore.writer().upsert(record).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryRecordStore, RecordStore};
    use std::sync::Arc;

    fn repository() -> (DatastoreRecordRepository, InMemoryRecordStore) {
        let store = InMemoryRecordStore::new();
        let datastore = Datastore::new(Arc::new(store.clone()));
        (DatastoreRecordRepository::new(datastore), store)
    }

    #[tokio::test]
    async fn lookups_report_not_found() {
        let (repo, _) = repository();

        assert!(matches!(
            repo.get_by_id("missing").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            repo.get_by_name("missing").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            repo.get_by_id("").await,
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn save_then_lookup_by_id_and_name() {
        let (repo, store) = repository();
        let record = Record::new("TestingMate").with_id("123456");

        assert_eq!(repo.save(&record).await.unwrap(), 1);
        assert_eq!(repo.save(&record).await.unwrap(), 1);

        assert_eq!(repo.get_by_id("123456").await.unwrap(), record);
        assert_eq!(repo.get_by_name("TestingMate").await.unwrap().id, "123456");
        assert_eq!(store.row_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reads_go_through_the_replica() {
        let primary = InMemoryRecordStore::new();
        let replica = InMemoryRecordStore::new();
        let datastore = Datastore::new(Arc::new(primary.clone()))
            .with_read_replica(Arc::new(replica.clone()));
        let repo = DatastoreRecordRepository::new(datastore);

        repo.save(&Record::new("Alpha").with_id("r-1")).await.unwrap();
        assert!(primary.find_by_id("r-1").await.unwrap().is_some());
        assert!(matches!(
            repo.get_by_id("r-1").await,
            Err(ServiceError::NotFound(_))
        ));

        replica.upsert(&Record::new("Alpha").with_id("r-1")).await.unwrap();
        assert!(repo.get_by_id("r-1").await.is_ok());
    }
}
