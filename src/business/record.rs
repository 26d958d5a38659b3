use std::sync::Arc;

use tracing::{debug, instrument};

use crate::context::RequestContext;
use crate::core::{Result, ServiceError};
use crate::events::{EventBus, RECORD_SAVE_EVENT};
use crate::identity::ownership_from_context;
use crate::ids::{IdGenerator, UuidGenerator};
use crate::models::Record;
use crate::repository::RecordRepository;

/// Write path: validate, stamp identity, assign an identifier, publish.
#[derive(Clone)]
pub struct RecordWriter {
    event_bus: Arc<EventBus>,
    ids: Arc<dyn IdGenerator>,
}

impl RecordWriter {
    pub fn new(event_bus: Arc<EventBus>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { event_bus, ids }
    }

    /// Accepts a record for saving.
    ///
    /// The returned record carries its identifier and ownership but is not
    /// yet committed; it becomes readable once the save handler has run.
    #[instrument(skip(self, ctx))]
    pub async fn store(&self, ctx: &RequestContext, name: &str) -> Result<Record> {
        let record = Record::new(name)
            .with_ownership(ownership_from_context(ctx))
            .with_id(self.ids.generate());
        if !record.has_id() {
            return Err(ServiceError::MissingIdentifier);
        }

        let envelope_id = self
            .event_bus
            .publish(ctx, RECORD_SAVE_EVENT, &record)
            .await?;
        debug!(record_id = %record.id, %envelope_id, "record accepted");

        Ok(record)
    }
}

/// Read path: validate the identifier, then look it up.
#[derive(Clone)]
pub struct RecordReader {
    repository: Arc<dyn RecordRepository>,
}

impl RecordReader {
    pub fn new(repository: Arc<dyn RecordRepository>) -> Self {
        Self { repository }
    }

    #[instrument(skip(self, _ctx))]
    pub async fn get(&self, _ctx: &RequestContext, id: &str) -> Result<Record> {
        if id.is_empty() {
            return Err(ServiceError::unspecified_id());
        }
        self.repository.get_by_id(id).await
    }
}

/// Both record paths behind one handle.
#[derive(Clone)]
pub struct RecordBusiness {
    writer: RecordWriter,
    reader: RecordReader,
}

impl RecordBusiness {
    pub fn builder() -> RecordBusinessBuilder {
        RecordBusinessBuilder::default()
    }

    pub async fn store(&self, ctx: &RequestContext, name: &str) -> Result<Record> {
        self.writer.store(ctx, name).await
    }

    pub async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Record> {
        self.reader.get(ctx, id).await
    }

    pub fn writer(&self) -> &RecordWriter {
        &self.writer
    }

    pub fn reader(&self) -> &RecordReader {
        &self.reader
    }
}

/// Collects collaborators; `build` fails fast when a required one is missing.
#[derive(Default)]
pub struct RecordBusinessBuilder {
    event_bus: Option<Arc<EventBus>>,
    repository: Option<Arc<dyn RecordRepository>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl RecordBusinessBuilder {
    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn RecordRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Defaults to random UUIDs.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<RecordBusiness> {
        let event_bus = self.event_bus.ok_or_else(|| {
            ServiceError::Initialization("event bus was not supplied".to_string())
        })?;
        let repository = self.repository.ok_or_else(|| {
            ServiceError::Initialization("record repository was not supplied".to_string())
        })?;
        let ids = self.ids.unwrap_or_else(|| Arc::new(UuidGenerator));

        Ok(RecordBusiness {
            writer: RecordWriter::new(event_bus, ids),
            reader: RecordReader::new(repository),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBusConfig, RecordSave};
    use crate::repository::DatastoreRecordRepository;
    use crate::storage::{Datastore, InMemoryRecordStore};

    fn repository() -> Arc<dyn RecordRepository> {
        let store = InMemoryRecordStore::new();
        Arc::new(DatastoreRecordRepository::new(Datastore::new(Arc::new(store))))
    }

    #[test]
    fn builder_requires_event_bus_and_repository() {
        let missing_everything = RecordBusiness::builder().build();
        assert!(matches!(
            missing_everything,
            Err(ServiceError::Initialization(_))
        ));

        let missing_bus = RecordBusiness::builder().repository(repository()).build();
        assert!(matches!(missing_bus, Err(ServiceError::Initialization(_))));
    }

    #[tokio::test]
    async fn empty_generated_id_is_refused_before_publish() {
        struct Blank;
        impl IdGenerator for Blank {
            fn generate(&self) -> String {
                String::new()
            }
        }

        let repository = repository();
        let bus = EventBus::builder(EventBusConfig::inline())
            .register(RecordSave::new(Arc::clone(&repository)))
            .build()
            .unwrap();
        let bus = Arc::new(bus);
        let business = RecordBusiness::builder()
            .event_bus(Arc::clone(&bus))
            .repository(repository)
            .id_generator(Arc::new(Blank))
            .build()
            .unwrap();

        let err = business
            .store(&RequestContext::background(), "Alpha")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingIdentifier));
        assert_eq!(bus.stats().published, 0);
    }
}
