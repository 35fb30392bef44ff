//! Ports to the external auth/profile and tenant backends.
//!
//! The client never talks to a concrete backend: `SessionStore` holds an
//! `Arc<dyn AuthBackend>` and `TenantStore` an `Arc<dyn TenantBackend>`.
//! Every implementation speaks the canonical `Principal`/`Tenant` shapes;
//! wire formats stay inside `crate::adapters`.

pub mod events;
pub mod hosted;
mod http;
pub mod in_memory;
pub mod rest;

use async_trait::async_trait;
use thiserror::Error;

use wholesale_auth::{Credentials, Identity, Principal, SessionToken};
use wholesale_core::{PrincipalId, TenantId};
use wholesale_tenants::{Tenant, TenantDraft, TenantPatch};

pub use events::{SessionEvent, SessionEventBus, SessionEvents};
pub use hosted::HostedBackend;
pub use in_memory::InMemoryBackend;
pub use rest::RestBackend;

/// Failure reported by a backend call.
///
/// `Unavailable` is a transport/server failure; every other variant is the
/// backend deliberately rejecting the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("credentials rejected")]
    Rejected,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("password rejected: {0}")]
    WeakPassword(String),

    #[error("not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("malformed backend response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn decode(msg: impl core::fmt::Display) -> Self {
        Self::Decode(msg.to_string())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Which tenants a listing should return.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// Every tenant on the backend account (elevated roles, login picker).
    All,
    /// Only the given tenant.
    Owned(TenantId),
}

impl TenantScope {
    /// Scope a principal is allowed to see.
    pub fn for_principal(principal: &Principal) -> Self {
        if principal.role.is_elevated() {
            TenantScope::All
        } else {
            TenantScope::Owned(principal.tenant_id)
        }
    }

    pub fn includes(&self, tenant_id: TenantId) -> bool {
        match self {
            TenantScope::All => true,
            TenantScope::Owned(id) => *id == tenant_id,
        }
    }
}

/// Authentication and profile storage.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Check an email/password pair and open a session.
    ///
    /// Fails with `BackendError::Rejected` when the pair is wrong.
    async fn verify_credentials(&self, credentials: &Credentials) -> Result<SessionToken, BackendError>;

    /// Identity behind a previously issued token, or `None` if the token is
    /// unknown, expired, or revoked.
    async fn get_session(&self, token: &SessionToken) -> Result<Option<Identity>, BackendError>;

    /// Revoke a session token. Revoking an unknown token is not an error.
    async fn invalidate_session(&self, token: &SessionToken) -> Result<(), BackendError>;

    /// Tenant-scoped profiles owned by an identity, in backend order.
    ///
    /// `token` is the session the lookup is made under; during login it is
    /// not yet the bound session.
    async fn profiles(
        &self,
        token: &SessionToken,
        identity: PrincipalId,
    ) -> Result<Vec<Principal>, BackendError>;

    /// Create a backend account.
    ///
    /// `Conflict` when the email is taken, `WeakPassword` when the password
    /// policy rejects it.
    async fn create_account(&self, credentials: &Credentials) -> Result<Identity, BackendError>;

    /// Store a profile row. `Conflict` if one exists for the same identity and tenant.
    async fn create_profile(&self, profile: &Principal) -> Result<(), BackendError>;

    /// Subscribe to session events pushed by the backend.
    fn subscribe(&self) -> SessionEvents;

    /// Authorize later profile and tenant calls with `token`, or with no
    /// session at all. Called only when the client commits or drops a
    /// session; issuing or checking a token never binds it.
    fn bind_session(&self, _token: Option<&SessionToken>) {}
}

/// Tenant row storage.
#[async_trait]
pub trait TenantBackend: Send + Sync {
    /// Tenants within `scope`, in backend order.
    async fn list_tenants(&self, scope: &TenantScope) -> Result<Vec<Tenant>, BackendError>;

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, BackendError>;

    /// Insert a tenant. The backend assigns the id and default branding.
    async fn insert_tenant(&self, draft: &TenantDraft) -> Result<Tenant, BackendError>;

    /// Patch a tenant. `NotFound` if it does not exist.
    async fn patch_tenant(&self, id: TenantId, patch: &TenantPatch) -> Result<Tenant, BackendError>;
}
