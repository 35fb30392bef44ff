//! Sign-in and tenant-onboarding form rules.
//!
//! Forms collect every field error at once so the UI can mark each input.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use wholesale_auth::{Credentials, Email};
use wholesale_core::{DomainError, TenantId};
use wholesale_tenants::{BrandColor, TenantDraft};

use crate::error::ClientError;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Field errors from one form submission, in field order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} invalid field(s)", .0.len())]
pub struct FormErrors(pub Vec<DomainError>);

impl FormErrors {
    /// Message for a field, if that field failed.
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.0.iter().find_map(|err| match err {
            DomainError::Validation { field: f, message } if *f == field => Some(message.as_str()),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stores report one error at a time: the first failing field.
impl From<FormErrors> for ClientError {
    fn from(errors: FormErrors) -> Self {
        let first = errors
            .0
            .into_iter()
            .next()
            .unwrap_or_else(|| DomainError::validation("form", "Form is invalid"));
        ClientError::Validation(first)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub tenant: Option<TenantId>,
}

/// A login form that passed validation.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub credentials: Credentials,
    pub tenant: Option<TenantId>,
}

impl LoginForm {
    /// `tenants_offered` is whether the sign-in screen lists tenants; if it
    /// does, one must be picked.
    pub fn validate(&self, tenants_offered: bool) -> Result<LoginRequest, FormErrors> {
        let mut errors = Vec::new();
        let email = collect(&mut errors, Email::parse(&self.email));
        collect(&mut errors, check_password(&self.password));
        if tenants_offered && self.tenant.is_none() {
            errors.push(DomainError::validation("tenant", "Please select a tenant"));
        }

        match email {
            Some(email) if errors.is_empty() => Ok(LoginRequest {
                credentials: credentials(&email, &self.password).map_err(|e| FormErrors(vec![e]))?,
                tenant: self.tenant,
            }),
            _ => Err(FormErrors(errors)),
        }
    }
}

/// The "create tenant" tab: a new tenant plus its first (owner) account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTenantForm {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub primary_color: Option<String>,
}

/// A create-tenant form that passed validation.
#[derive(Debug, Clone)]
pub struct OnboardingRequest {
    pub draft: TenantDraft,
    pub credentials: Credentials,
    pub owner_name: String,
}

impl CreateTenantForm {
    pub fn validate(&self) -> Result<OnboardingRequest, FormErrors> {
        let mut errors = Vec::new();
        let draft = collect(&mut errors, TenantDraft::new(&self.name));
        let email = collect(&mut errors, Email::parse(&self.email));
        collect(&mut errors, check_password(&self.password));
        let color = match self.primary_color.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => collect(&mut errors, BrandColor::parse(raw)),
        };

        let (Some(draft), Some(email)) = (draft, email) else {
            return Err(FormErrors(errors));
        };
        if !errors.is_empty() {
            return Err(FormErrors(errors));
        }

        let owner_name = match self.owner_name.trim() {
            "" => email.local_part().to_string(),
            name => name.to_string(),
        };
        Ok(OnboardingRequest {
            draft: match color {
                Some(color) => draft.with_primary_color(color),
                None => draft,
            },
            credentials: credentials(&email, &self.password).map_err(|e| FormErrors(vec![e]))?,
            owner_name,
        })
    }
}

fn check_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

fn credentials(email: &Email, password: &str) -> Result<Credentials, DomainError> {
    Credentials::new(email.as_str(), password)
}

fn collect<T>(errors: &mut Vec<DomainError>, result: Result<T, DomainError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err);
            None
        }
    }
}
