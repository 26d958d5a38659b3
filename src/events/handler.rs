use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::envelope::EventContext;
use crate::core::{Result, ServiceError};

/// A handler registered on the bus under [`EventHandler::name`].
///
/// The bus decodes each envelope into `Payload` once, then calls `validate`
/// followed by `execute`. Deliveries are at-least-once, so `execute` must be
/// safe to apply repeatedly with the same payload.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    type Payload: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Shape of the payload this handler accepts.
    fn payload_type(&self) -> &'static str {
        std::any::type_name::<Self::Payload>()
    }

    async fn validate(&self, ctx: &EventContext, payload: &Self::Payload) -> Result<()>;

    async fn execute(&self, ctx: &EventContext, payload: Self::Payload) -> Result<()>;
}

#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    fn payload_type(&self) -> &'static str;

    async fn handle(&self, ctx: &EventContext, payload: &serde_json::Value) -> Result<()>;
}

pub(crate) struct Registered<H>(pub H);

#[async_trait]
impl<H: EventHandler> ErasedHandler for Registered<H> {
    fn payload_type(&self) -> &'static str {
        self.0.payload_type()
    }

    async fn handle(&self, ctx: &EventContext, payload: &serde_json::Value) -> Result<()> {
        let payload: H::Payload = serde_json::from_value(payload.clone()).map_err(|err| {
            ServiceError::InvalidPayload(format!(
                "payload is not of type {}: {err}",
                self.0.payload_type()
            ))
        })?;

        self.0.validate(ctx, &payload).await?;
        self.0.execute(ctx, payload).await
    }
}
