// ============================================================================
// Record Service Library
// ============================================================================
//
// Multi-tenant records with an event-driven write path: `store` stamps the
// caller's ownership, assigns an identifier and publishes `record.save`; the
// save handler commits it with an idempotent upsert. Reads go straight to the
// repository.

pub mod business;
pub mod config;
pub mod context;
pub mod core;
pub mod events;
pub mod identity;
pub mod ids;
pub mod models;
pub mod repository;
pub mod storage;
pub mod web;

pub use business::{RecordBusiness, RecordBusinessBuilder, RecordReader, RecordWriter};
pub use context::{Collaborators, RequestContext};
pub use crate::core::{Result, ServiceError, StorageError};
pub use events::{EventBus, EventBusConfig, RECORD_SAVE_EVENT, RecordSave};
pub use identity::{Claims, OwnershipTuple, ownership_from_context};
pub use models::Record;
pub use repository::{DatastoreRecordRepository, RecordRepository};
pub use storage::{Datastore, InMemoryRecordStore, PgRecordStore, RecordStore};
pub use web::{AppState, build_router};
