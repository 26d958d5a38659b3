use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::OwnershipTuple;

/// A persisted record.
///
/// The value returned by the write path is an acknowledgment that the record
/// was accepted for saving; it becomes readable once the save handler commits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Record {
    /// Builds an unsaved record with no identifier and no owner.
    ///
    /// Timestamps are truncated to microseconds, the precision PostgreSQL
    /// stores, so a saved record reads back unchanged.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: String::new(),
            tenant_id: None,
            partition_id: None,
            access_id: None,
            name: name.into(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_ownership(mut self, ownership: OwnershipTuple) -> Self {
        self.tenant_id = ownership.tenant_id;
        self.partition_id = ownership.partition_id;
        self.access_id = ownership.access_id;
        self
    }

    pub fn ownership(&self) -> OwnershipTuple {
        OwnershipTuple {
            tenant_id: self.tenant_id.clone(),
            partition_id: self.partition_id.clone(),
            access_id: self.access_id.clone(),
        }
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }
}
