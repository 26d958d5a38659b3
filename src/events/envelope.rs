use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::identity::Claims;

/// The (name, payload) unit handed from a publisher to the bus.
///
/// Redelivery reuses the same envelope, so every attempt sees the payload
/// exactly as it was published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub name: String,
    pub payload: serde_json::Value,
    /// Claims of the publishing caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Claims>,
    /// Delivery attempts made so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
            claims: None,
            attempt: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_claims(mut self, claims: Option<Claims>) -> Self {
        self.claims = claims;
        self
    }
}

/// What a handler sees about the delivery it is processing.
#[derive(Debug, Clone)]
pub struct EventContext {
    envelope_id: Uuid,
    event: String,
    attempt: u32,
    request: RequestContext,
}

impl EventContext {
    pub fn new(envelope: &EventEnvelope, request: RequestContext) -> Self {
        Self {
            envelope_id: envelope.id,
            event: envelope.name.clone(),
            attempt: envelope.attempt,
            request,
        }
    }

    pub fn envelope_id(&self) -> Uuid {
        self.envelope_id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Publisher identity and collaborator handles, detached from the
    /// publisher's cancellation.
    pub fn request(&self) -> &RequestContext {
        &self.request
    }
}
