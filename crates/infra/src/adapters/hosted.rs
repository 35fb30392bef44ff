//! Hosted backend-as-a-service rows (token auth endpoint + PostgREST tables).

use serde::{Deserialize, Serialize};

use wholesale_auth::{Identity, Principal};
use wholesale_tenants::{Tenant, TenantDraft, TenantPatch};

use super::{default_true, parse_color, parse_principal_id, parse_role, parse_tenant_id};
use crate::backend::BackendError;

#[derive(Debug, Serialize)]
pub struct HostedCredentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedAuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HostedTokenResponse {
    pub access_token: String,
    pub user: HostedAuthUser,
}

/// Signup answers with either the bare user or `{ "user": ... }` depending
/// on whether email confirmation is enabled.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum HostedSignupResponse {
    Wrapped { user: HostedAuthUser },
    Bare(HostedAuthUser),
}

impl HostedSignupResponse {
    pub fn into_user(self) -> HostedAuthUser {
        match self {
            HostedSignupResponse::Wrapped { user } | HostedSignupResponse::Bare(user) => user,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HostedErrorBody {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl HostedErrorBody {
    pub fn text(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "request rejected".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedProfileRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub tenant_id: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedTenantRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub brand_color: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedTenantWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

pub fn identity_from_wire(user: HostedAuthUser) -> Result<Identity, BackendError> {
    Ok(Identity {
        id: parse_principal_id(&user.id)?,
        email: user.email.unwrap_or_default(),
    })
}

pub fn principal_from_wire(row: HostedProfileRow) -> Result<Principal, BackendError> {
    Ok(Principal {
        id: parse_principal_id(&row.id)?,
        role: parse_role(&row.role)?,
        tenant_id: parse_tenant_id(&row.tenant_id)?,
        email: row.email,
        name: row.full_name.trim().to_string(),
        avatar: row.avatar_url.filter(|a| !a.is_empty()),
    })
}

pub fn principal_to_wire(principal: &Principal) -> HostedProfileRow {
    HostedProfileRow {
        id: principal.id.to_string(),
        email: principal.email.clone(),
        full_name: principal.name.clone(),
        role: principal.role.as_str().to_string(),
        tenant_id: principal.tenant_id.to_string(),
        avatar_url: principal.avatar.clone(),
    }
}

pub fn tenant_from_wire(row: HostedTenantRow) -> Result<Tenant, BackendError> {
    Ok(Tenant {
        id: parse_tenant_id(&row.id)?,
        primary_color: parse_color(row.brand_color.as_deref(), &row.name),
        name: row.name,
        logo: row.logo_url.filter(|l| !l.is_empty()),
        active: row.is_active,
    })
}

/// The hosted database has no column defaults for branding, so the draft
/// is sent with the generated logo and default color already applied.
pub fn draft_to_wire(draft: &TenantDraft) -> HostedTenantWrite {
    let branded = draft.clone().into_tenant(wholesale_core::TenantId::from_u128(0));
    HostedTenantWrite {
        name: Some(branded.name),
        logo_url: branded.logo,
        brand_color: branded.primary_color.map(String::from),
        is_active: Some(true),
    }
}

pub fn patch_to_wire(patch: &TenantPatch) -> HostedTenantWrite {
    HostedTenantWrite {
        name: patch.name.clone(),
        logo_url: patch.logo.clone(),
        brand_color: patch.primary_color.as_ref().map(|c| c.to_string()),
        is_active: patch.active,
    }
}
