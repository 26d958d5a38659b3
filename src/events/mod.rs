//! In-process event bus and its handlers.

pub mod bus;
pub mod envelope;
pub mod handler;
pub mod record_save;
pub mod retry;

pub use bus::{BusStats, DeadLetter, DeliveryMode, EventBus, EventBusBuilder, EventBusConfig};
pub use envelope::{EventContext, EventEnvelope};
pub use handler::EventHandler;
pub use record_save::{RECORD_SAVE_EVENT, RecordSave};
pub use retry::RetryPolicy;
