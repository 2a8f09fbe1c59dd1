//! Authorization gate consumed by the engine.
//!
//! Identity and role come from an external collaborator; this module holds
//! the types the engine needs at its call sites plus the opaque override
//! credential check. Session issuance, password hashing and token
//! verification live outside the crate.

use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Approver recorded on carts approved through the normal path.
pub const SYSTEM_APPROVER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Admin,
}

/// Caller identity supplied by the external authorization gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Rejects callers without the admin-equivalent role.
pub fn require_admin(identity: &Identity) -> Result<(), ServiceError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(format!(
            "caller '{}' lacks the admin role",
            identity.id
        )))
    }
}

/// Credential presented for an override approval, distinct from the
/// caller's normal session.
#[derive(Debug, Clone, Deserialize)]
pub struct OverrideCredential {
    pub username: String,
    pub secret: String,
}

/// Opaque override credential check supplied by the authorization gate.
#[async_trait]
pub trait OverrideAuthorizer: Send + Sync {
    async fn verify_override(&self, username: &str, secret: &str) -> bool;
}

/// Secret-table authorizer for the binary and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticOverrideAuthorizer {
    secrets: HashMap<String, String>,
}

impl StaticOverrideAuthorizer {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            secrets: pairs.into_iter().collect(),
        }
    }
}

#[async_trait]
impl OverrideAuthorizer for StaticOverrideAuthorizer {
    async fn verify_override(&self, username: &str, secret: &str) -> bool {
        self.secrets
            .get(username)
            .map(|expected| expected == secret)
            .unwrap_or(false)
    }
}
