pub mod error;

pub use error::{Result, ServiceError, StorageError};
