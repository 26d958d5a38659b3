pub mod datastore;
pub mod engine;
pub mod memory;
pub mod postgres;
pub mod table;

pub use datastore::Datastore;
pub use engine::{RecordStore, StorageResult};
pub use memory::InMemoryRecordStore;
pub use postgres::PgRecordStore;
pub use table::RecordTable;
