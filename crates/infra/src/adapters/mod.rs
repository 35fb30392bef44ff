//! Wire-format adapters, one module per backend variant.
//!
//! Each module owns its row/DTO structs and the functions converting them to
//! and from the canonical `Principal`/`Tenant` shapes. Nothing outside this
//! module knows a backend's field names.

pub mod hosted;
pub mod rest;

use core::str::FromStr;

use wholesale_auth::Role;
use wholesale_core::{PrincipalId, TenantId};
use wholesale_tenants::BrandColor;

use crate::backend::BackendError;

pub(crate) fn parse_principal_id(raw: &str) -> Result<PrincipalId, BackendError> {
    PrincipalId::from_str(raw).map_err(BackendError::decode)
}

pub(crate) fn parse_tenant_id(raw: &str) -> Result<TenantId, BackendError> {
    TenantId::from_str(raw).map_err(BackendError::decode)
}

pub(crate) fn parse_role(raw: &str) -> Result<Role, BackendError> {
    Role::from_str(raw).map_err(BackendError::decode)
}

/// Colors are cosmetic: an unparseable one is dropped, not fatal.
pub(crate) fn parse_color(raw: Option<&str>, tenant: &str) -> Option<BrandColor> {
    let raw = raw?;
    match BrandColor::parse(raw) {
        Ok(color) => Some(color),
        Err(err) => {
            tracing::warn!(tenant, error = %err, "ignoring malformed tenant color");
            None
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}
