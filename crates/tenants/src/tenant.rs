use serde::{Deserialize, Serialize};

use wholesale_core::{DomainError, DomainResult, Entity, TenantId, ValueObject};

/// Shortest accepted tenant name, in characters.
pub const MIN_TENANT_NAME_LEN: usize = 2;

/// Brand color given to tenants created without one.
pub const DEFAULT_PRIMARY_COLOR: &str = "#3b82f6";

/// A `#rrggbb` brand color, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BrandColor(String);

impl ValueObject for BrandColor {}

impl BrandColor {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        let hex = raw.strip_prefix('#').unwrap_or("");
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::validation(
                "primary_color",
                format!("'{raw}' is not a #rrggbb color"),
            ));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BrandColor {
    fn default() -> Self {
        Self(DEFAULT_PRIMARY_COLOR.to_string())
    }
}

impl TryFrom<String> for BrandColor {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BrandColor> for String {
    fn from(value: BrandColor) -> Self {
        value.0
    }
}

impl core::fmt::Display for BrandColor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wholesale business on the shared backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<BrandColor>,
    pub active: bool,
}

impl Tenant {
    /// Merge a patch, field by field. Absent patch fields keep their value.
    pub fn apply(&mut self, patch: &TenantPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(logo) = &patch.logo {
            self.logo = Some(logo.clone());
        }
        if let Some(color) = &patch.primary_color {
            self.primary_color = Some(color.clone());
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
    }

    /// Copy of `self` with `patch` applied.
    pub fn patched(&self, patch: &TenantPatch) -> Self {
        let mut next = self.clone();
        next.apply(patch);
        next
    }

    /// Fill in generated branding where the backend returned none.
    pub fn with_default_branding(mut self) -> Self {
        if self.logo.is_none() {
            self.logo = Some(default_logo(&self.name));
        }
        if self.primary_color.is_none() {
            self.primary_color = Some(BrandColor::default());
        }
        self
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> TenantId {
        self.id
    }
}

/// Input for creating a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDraft {
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub primary_color: Option<BrandColor>,
}

impl TenantDraft {
    pub fn new(name: &str) -> DomainResult<Self> {
        Ok(Self {
            name: validate_name(name)?,
            logo: None,
            primary_color: None,
        })
    }

    pub fn with_logo(mut self, logo: impl Into<String>) -> Self {
        self.logo = Some(logo.into());
        self
    }

    pub fn with_primary_color(mut self, color: BrandColor) -> Self {
        self.primary_color = Some(color);
        self
    }

    /// Re-check the rules on a draft that may have been built field by field.
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name).map(|_| ())
    }

    /// The tenant a backend creates from this draft under `id`, with
    /// generated logo and default color filled in. New tenants start active.
    pub fn into_tenant(self, id: TenantId) -> Tenant {
        Tenant {
            id,
            name: self.name,
            logo: self.logo,
            primary_color: self.primary_color,
            active: true,
        }
        .with_default_branding()
    }
}

/// Partial update of a tenant. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<BrandColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl TenantPatch {
    pub fn rename(name: &str) -> DomainResult<Self> {
        Ok(Self {
            name: Some(validate_name(name)?),
            ..Self::default()
        })
    }

    pub fn validate(&self) -> DomainResult<()> {
        match &self.name {
            Some(name) => validate_name(name).map(|_| ()),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn validate_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.chars().count() < MIN_TENANT_NAME_LEN {
        return Err(DomainError::validation(
            "name",
            format!("Tenant name must be at least {MIN_TENANT_NAME_LEN} characters"),
        ));
    }
    Ok(name.to_string())
}

/// Generated initials logo for tenants created without one.
pub fn default_logo(name: &str) -> String {
    let seed: String = name.trim().chars().take(2).collect();
    format!("https://api.dicebear.com/7.x/initials/svg?seed={seed}")
}
