//! `wholesale-core` — shared domain building blocks.
//!
//! Identifiers and the domain error model used by every other crate. No IO,
//! no async.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{PrincipalId, TenantId};
pub use value_object::ValueObject;
