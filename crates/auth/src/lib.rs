//! `wholesale-auth` — identity types shared by the session service and the
//! backend adapters.
//!
//! Decoupled from HTTP and storage: nothing here performs IO.

pub mod claims;
pub mod credentials;
pub mod principal;
pub mod roles;

pub use claims::{SessionClaims, SessionToken, TokenValidationError, validate_claims};
pub use credentials::{Credentials, Email};
pub use principal::{Identity, Principal};
pub use roles::Role;
