//! The authenticated user as the rest of the client sees it.

use serde::{Deserialize, Serialize};

use wholesale_core::{Entity, PrincipalId, TenantId};

use crate::Role;

/// Identity confirmed by the auth backend for a session token.
///
/// This is *who* holds the token, before any tenant-scoped profile is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: PrincipalId,
    pub email: String,
}

/// A tenant-scoped user profile.
///
/// One backend account may own profiles in several tenants; a session
/// always runs as exactly one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Principal {
    /// Profile for a fresh signup: always the tenant owner.
    pub fn owner(id: PrincipalId, email: &str, name: &str, tenant_id: TenantId) -> Self {
        let email = email.trim().to_lowercase();
        Self {
            avatar: Some(default_avatar(&email)),
            id,
            email,
            name: name.trim().to_string(),
            role: Role::Admin,
            tenant_id,
        }
    }

    pub fn belongs_to(&self, tenant_id: TenantId) -> bool {
        self.tenant_id == tenant_id
    }
}

impl Entity for Principal {
    type Id = PrincipalId;

    fn id(&self) -> PrincipalId {
        self.id
    }
}

/// Generated avatar for principals without an uploaded one.
pub fn default_avatar(email: &str) -> String {
    let seed = email.split('@').next().unwrap_or(email);
    format!("https://api.dicebear.com/7.x/avataaars/svg?seed={seed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_profile_is_admin_with_generated_avatar() {
        let tenant = TenantId::new();
        let p = Principal::owner(PrincipalId::new(), "  Jane@Acme.test ", " Jane ", tenant);

        assert_eq!(p.role, Role::Admin);
        assert_eq!(p.email, "jane@acme.test");
        assert_eq!(p.name, "Jane");
        assert!(p.belongs_to(tenant));
        assert_eq!(
            p.avatar.as_deref(),
            Some("https://api.dicebear.com/7.x/avataaars/svg?seed=jane")
        );
    }

    #[test]
    fn avatar_is_optional_on_the_wire() {
        let json = serde_json::json!({
            "id": PrincipalId::from_u128(7),
            "email": "staff@example.com",
            "name": "Staff",
            "role": "staff",
            "tenant_id": TenantId::from_u128(1),
        });
        let p: Principal = serde_json::from_value(json).unwrap();
        assert_eq!(p.avatar, None);
        assert_eq!(p.role, Role::Staff);
    }
}
