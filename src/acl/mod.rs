//! ACL decision engine: per-document visibility plus permanent and
//! time-bounded grants, scoped by tenant.
//!
//! Both backends implement [`Store`] with identical semantics:
//!
//! - a document without a visibility entry is public;
//! - a `(tenant, doc, user)` triple holds at most one of a permanent or an
//!   expiring grant; writing one removes the other;
//! - an expiring grant allows access while `valid_to > now`;
//! - containers emptied by revocation are garbage-collected.
//!
//! Error handling is the caller's policy: the engine reports backend
//! failures, and the (out-of-scope) HTTP boundary fails closed on them.

mod memory;
mod redis;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{MemoryStats, MemoryStore};
pub use redis::RedisStore;

/// Per-document access policy. Absence of an entry means public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Restricted,
}

impl Visibility {
    /// Stable string form used by persistent backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Restricted => "restricted",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "restricted" => Ok(Visibility::Restricted),
            other => Err(AclError::InvalidVisibility(other.to_string())),
        }
    }
}

/// Errors reported by the ACL engine.
#[derive(Debug, Error)]
pub enum AclError {
    /// A visibility string did not parse.
    #[error("invalid visibility: {0:?}")]
    InvalidVisibility(String),

    /// A required identifier was empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A grant window had `valid_to` before `valid_from`.
    #[error("valid_to must be >= valid_from")]
    InvalidValidity,

    /// The persistent backend failed.
    #[error("acl backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The ACL store contract shared by the in-memory and Redis backends.
#[async_trait]
pub trait Store: Send + Sync {
    /// Set a document's visibility. Setting [`Visibility::Public`] erases
    /// any stored entry, since public is the default.
    async fn set_visibility(
        &self,
        tenant_id: &str,
        doc_id: &str,
        visibility: Visibility,
    ) -> Result<(), AclError>;

    /// Grant `user_id` access to `doc_id`.
    ///
    /// With `valid_to = None` the grant is permanent; otherwise it expires
    /// at `valid_to`. Either form replaces the other for the same triple.
    async fn grant(
        &self,
        tenant_id: &str,
        doc_id: &str,
        user_id: &str,
        valid_from: SystemTime,
        valid_to: Option<SystemTime>,
    ) -> Result<(), AclError>;

    /// Remove both grant forms for the triple.
    async fn revoke(&self, tenant_id: &str, doc_id: &str, user_id: &str) -> Result<(), AclError>;

    /// Remove every grant the user holds in the tenant.
    async fn revoke_all_user(&self, tenant_id: &str, user_id: &str) -> Result<(), AclError>;

    /// Filter `doc_ids` down to those the user may access at `now`,
    /// preserving input order and skipping empty ids.
    async fn check_batch(
        &self,
        tenant_id: &str,
        user_id: &str,
        doc_ids: &[String],
        now: SystemTime,
    ) -> Result<Vec<String>, AclError>;

    /// Documents the user holds explicit grants to at `now` (permanent
    /// plus unexpired). Unordered, unique. Public docs are not enumerated.
    async fn list_grants(
        &self,
        tenant_id: &str,
        user_id: &str,
        now: SystemTime,
    ) -> Result<Vec<String>, AclError>;
}

pub(crate) fn validate_grant_args(
    tenant_id: &str,
    doc_id: &str,
    user_id: &str,
    valid_from: SystemTime,
    valid_to: Option<SystemTime>,
) -> Result<(), AclError> {
    if tenant_id.is_empty() || doc_id.is_empty() || user_id.is_empty() {
        return Err(AclError::MissingField("tenant_id/doc_id/user_id"));
    }
    if let Some(valid_to) = valid_to {
        if valid_to < valid_from {
            return Err(AclError::InvalidValidity);
        }
    }
    Ok(())
}

/// Seconds since the Unix epoch; times before the epoch clamp to zero.
pub(crate) fn epoch_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
