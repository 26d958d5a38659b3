use std::sync::Arc;

use super::engine::RecordStore;

/// Read and write handles onto the record storage.
///
/// Lookups go through the reader, which is a replica when one is configured
/// and the primary otherwise. Handles are shared by every concurrent caller.
#[derive(Clone)]
pub struct Datastore {
    writer: Arc<dyn RecordStore>,
    reader: Arc<dyn RecordStore>,
}

impl Datastore {
    pub fn new(primary: Arc<dyn RecordStore>) -> Self {
        Self {
            reader: Arc::clone(&primary),
            writer: primary,
        }
    }

    pub fn with_read_replica(mut self, replica: Arc<dyn RecordStore>) -> Self {
        self.reader = replica;
        self
    }

    pub fn writer(&self) -> &Arc<dyn RecordStore> {
        &self.writer
    }

    pub fn reader(&self) -> &Arc<dyn RecordStore> {
        &self.reader
    }
}
