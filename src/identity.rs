//! Caller identity carried by an authenticated request.

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;

/// Verified claims of the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub", default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn partition(mut self, partition_id: impl Into<String>) -> Self {
        self.partition_id = Some(partition_id.into());
        self
    }

    pub fn access(mut self, access_id: impl Into<String>) -> Self {
        self.access_id = Some(access_id.into());
        self
    }
}

/// Tenant / partition / access-principal scope stamped on a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTuple {
    pub tenant_id: Option<String>,
    pub partition_id: Option<String>,
    pub access_id: Option<String>,
}

impl OwnershipTuple {
    pub fn is_empty(&self) -> bool {
        self.tenant_id.is_none() && self.partition_id.is_none() && self.access_id.is_none()
    }
}

impl From<&Claims> for OwnershipTuple {
    fn from(claims: &Claims) -> Self {
        Self {
            tenant_id: non_empty(claims.tenant_id.as_deref()),
            partition_id: non_empty(claims.partition_id.as_deref()),
            access_id: non_empty(claims.access_id.as_deref()),
        }
    }
}

/// Reads the ownership tuple off the context.
///
/// An anonymous context yields an empty tuple; this never fails.
pub fn ownership_from_context(ctx: &RequestContext) -> OwnershipTuple {
    ctx.claims().map(OwnershipTuple::from).unwrap_or_default()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}
