//! Errors surfaced to the UI by the session and tenant stores.

use thiserror::Error;

use wholesale_core::DomainError;
use wholesale_infra::BackendError;

/// Shown when the onboarding flow fails for any reason other than a form rule.
pub const ONBOARDING_FAILED_MESSAGE: &str = "Failed to create tenant. Please try again.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account has profiles in several tenants; a tenant must be chosen")]
    TenantRequired,

    #[error("no profile for this account")]
    ProfileNotFound,

    #[error("email already registered")]
    EmailTaken,

    #[error("password rejected: {0}")]
    WeakPassword(String),

    #[error("tenant not found")]
    TenantNotFound,

    #[error("tenant is not visible to the current session")]
    UnknownTenant,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("session changed while the request was in flight")]
    SessionChanged,
}

impl ClientError {
    /// Text for the UI. Credential and profile failures read the same so a
    /// caller cannot tell which factor was wrong.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::InvalidCredentials | ClientError::ProfileNotFound => {
                "Invalid email or password".to_string()
            }
            ClientError::TenantRequired => "Please select a tenant".to_string(),
            ClientError::EmailTaken => "An account with this email already exists".to_string(),
            ClientError::WeakPassword(reason) => format!("Password rejected: {reason}"),
            ClientError::TenantNotFound => "Tenant not found".to_string(),
            ClientError::UnknownTenant => "You do not have access to this tenant".to_string(),
            ClientError::BackendUnavailable(_) => {
                "Service unavailable. Please try again.".to_string()
            }
            ClientError::Validation(DomainError::Validation { message, .. }) => message.clone(),
            ClientError::Validation(other) => other.to_string(),
            ClientError::SessionChanged => "Your session changed. Please try again.".to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClientError::BackendUnavailable(_))
    }
}

/// Default mapping. Call sites override it where a backend answer means
/// something more specific (e.g. `NotFound` on a patch).
impl From<BackendError> for ClientError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(msg) => ClientError::BackendUnavailable(msg),
            BackendError::Decode(msg) => ClientError::BackendUnavailable(msg),
            BackendError::Rejected => ClientError::InvalidCredentials,
            BackendError::Conflict(_) => ClientError::EmailTaken,
            BackendError::WeakPassword(msg) => ClientError::WeakPassword(msg),
            BackendError::NotFound => ClientError::TenantNotFound,
            BackendError::Validation(msg) => {
                ClientError::Validation(DomainError::validation("request", msg))
            }
        }
    }
}
