use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::envelope::EventContext;
use super::handler::EventHandler;
use crate::core::{Result, ServiceError};
use crate::models::Record;
use crate::repository::RecordRepository;

/// Event name shared by the write path and the save handler.
pub const RECORD_SAVE_EVENT: &str = "record.save";

/// Commits accepted records with an idempotent upsert keyed by identifier.
pub struct RecordSave {
    repository: Arc<dyn RecordRepository>,
}

impl RecordSave {
    pub fn new(repository: Arc<dyn RecordRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl EventHandler for RecordSave {
    type Payload = Record;

    fn name(&self) -> &'static str {
        RECORD_SAVE_EVENT
    }

    async fn validate(&self, _ctx: &EventContext, record: &Record) -> Result<()> {
        if !record.has_id() {
            return Err(ServiceError::MissingIdentifier);
        }
        Ok(())
    }

    #[instrument(
        skip_all,
        fields(event = RECORD_SAVE_EVENT, record_id = %record.id, attempt = ctx.attempt())
    )]
    async fn execute(&self, ctx: &EventContext, record: Record) -> Result<()> {
        if !record.has_id() {
            return Err(ServiceError::MissingIdentifier);
        }

        info!(name = %record.name, "handling event");
        match self.repository.save(&record).await {
            Ok(rows_affected) => {
                info!(rows_affected, "successfully saved record");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "could not save record");
                Err(err)
            }
        }
    }
}
