//! Generic REST backend rows (Django REST framework conventions).

use serde::{Deserialize, Serialize};

use wholesale_auth::{Identity, Principal};
use wholesale_tenants::{Tenant, TenantDraft, TenantPatch};

use super::{default_true, parse_color, parse_principal_id, parse_role, parse_tenant_id};
use crate::backend::BackendError;

#[derive(Debug, Serialize)]
pub struct RestCredentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RestLoginResponse {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestIdentity {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: String,
    pub tenant: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestTenant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Body for tenant create (POST) and patch (PATCH).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestTenantWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

pub fn identity_from_wire(row: RestIdentity) -> Result<Identity, BackendError> {
    Ok(Identity {
        id: parse_principal_id(&row.id)?,
        email: row.email,
    })
}

pub fn principal_from_wire(row: RestUser) -> Result<Principal, BackendError> {
    let full_name = format!("{} {}", row.first_name.trim(), row.last_name.trim());
    let name = match full_name.trim() {
        "" => row.email.split('@').next().unwrap_or_default().to_string(),
        name => name.to_string(),
    };
    Ok(Principal {
        id: parse_principal_id(&row.id)?,
        role: parse_role(&row.role)?,
        tenant_id: parse_tenant_id(&row.tenant)?,
        email: row.email,
        name,
        avatar: row.avatar.filter(|a| !a.is_empty()),
    })
}

pub fn principal_to_wire(principal: &Principal) -> RestUser {
    let (first_name, last_name) = match principal.name.trim().split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (principal.name.trim().to_string(), String::new()),
    };
    RestUser {
        id: principal.id.to_string(),
        email: principal.email.clone(),
        first_name,
        last_name,
        role: principal.role.as_str().to_string(),
        tenant: principal.tenant_id.to_string(),
        avatar: principal.avatar.clone(),
    }
}

pub fn tenant_from_wire(row: RestTenant) -> Result<Tenant, BackendError> {
    Ok(Tenant {
        id: parse_tenant_id(&row.id)?,
        primary_color: parse_color(row.primary_color.as_deref(), &row.name),
        name: row.name,
        logo: row.logo.filter(|l| !l.is_empty()),
        active: row.is_active,
    })
}

pub fn draft_to_wire(draft: &TenantDraft) -> RestTenantWrite {
    RestTenantWrite {
        name: Some(draft.name.clone()),
        logo: draft.logo.clone(),
        primary_color: draft.primary_color.as_ref().map(|c| c.to_string()),
        is_active: None,
    }
}

pub fn patch_to_wire(patch: &TenantPatch) -> RestTenantWrite {
    RestTenantWrite {
        name: patch.name.clone(),
        logo: patch.logo.clone(),
        primary_color: patch.primary_color.as_ref().map(|c| c.to_string()),
        is_active: patch.active,
    }
}
