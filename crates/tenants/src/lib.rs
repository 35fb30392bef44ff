//! Tenant domain module.
//!
//! A tenant is one wholesale business on the shared backend. This crate holds
//! its shape, creation/patch inputs and their validation rules
//! (no IO, no HTTP, no storage).

pub mod tenant;

pub use tenant::{
    BrandColor, DEFAULT_PRIMARY_COLOR, MIN_TENANT_NAME_LEN, Tenant, TenantDraft, TenantPatch,
    default_logo,
};
