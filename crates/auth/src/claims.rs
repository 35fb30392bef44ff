use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wholesale_core::PrincipalId;

/// Opaque session credential issued by the auth backend.
///
/// The client never inspects it; it is persisted under `session_token` and
/// handed back to the backend for verification and invalidation.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Tokens end up in logs via `?` formatting; only show a prefix.
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "SessionToken({prefix}…)")
    }
}

/// Claims a backend associates with an issued session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Identity the token was issued to.
    pub sub: PrincipalId,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    pub fn issue(sub: PrincipalId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub,
            issued_at: now,
            expires_at: now + ttl,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate session claims against `now`.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_claims_are_valid() {
        let now = Utc::now();
        let claims = SessionClaims::issue(PrincipalId::new(), now, Duration::hours(1));
        assert_eq!(validate_claims(&claims, now + Duration::minutes(5)), Ok(()));
    }

    #[test]
    fn expiry_is_exclusive() {
        let now = Utc::now();
        let claims = SessionClaims::issue(PrincipalId::new(), now, Duration::hours(1));
        assert_eq!(
            validate_claims(&claims, claims.expires_at),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn future_issue_is_rejected() {
        let now = Utc::now();
        let claims = SessionClaims::issue(PrincipalId::new(), now + Duration::minutes(1), Duration::hours(1));
        assert_eq!(validate_claims(&claims, now), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn zero_ttl_is_an_invalid_window() {
        let now = Utc::now();
        let claims = SessionClaims::issue(PrincipalId::new(), now, Duration::zero());
        assert_eq!(validate_claims(&claims, now), Err(TokenValidationError::InvalidTimeWindow));
    }

    #[test]
    fn debug_hides_most_of_the_token() {
        let token = SessionToken::new("abcdefghijklmnop");
        assert_eq!(format!("{token:?}"), "SessionToken(abcdef…)");
    }
}
