//! Login input: an email/password pair.

use serde::{Deserialize, Serialize};

use wholesale_core::{DomainError, DomainResult, ValueObject};

/// A syntactically plausible, normalized (trimmed, lowercased) email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl ValueObject for Email {}

impl Email {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let normalized = raw.trim().to_lowercase();
        let Some((local, domain)) = normalized.split_once('@') else {
            return Err(DomainError::validation("email", "Invalid email address"));
        };
        let domain_ok = domain
            .split('.')
            .filter(|label| !label.is_empty())
            .count()
            >= 2
            && !domain.starts_with('.')
            && !domain.ends_with('.');
        if local.is_empty() || !domain_ok || normalized.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("email", "Invalid email address"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part before the `@`.
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Email/password pair handed to the auth backend.
///
/// Only non-emptiness is enforced here; password policy belongs to the
/// backend and stricter form rules to the UI layer.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> DomainResult<Self> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(DomainError::validation("email", "email is required"));
        }
        if password.is_empty() {
            return Err(DomainError::validation("password", "password is required"));
        }
        Ok(Self {
            email,
            password: password.to_string(),
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn credentials_require_both_fields() {
        assert_eq!(
            Credentials::new("  ", "secret").unwrap_err().field(),
            Some("email")
        );
        assert_eq!(
            Credentials::new("a@b.co", "").unwrap_err().field(),
            Some("password")
        );
    }

    #[test]
    fn credentials_normalize_email_but_not_password() {
        let c = Credentials::new(" Admin@Example.com ", " Pass ").unwrap();
        assert_eq!(c.email(), "admin@example.com");
        assert_eq!(c.password(), " Pass ");
    }

    #[test]
    fn debug_redacts_password() {
        let c = Credentials::new("a@b.co", "hunter22").unwrap();
        assert!(!format!("{c:?}").contains("hunter22"));
    }

    #[test]
    fn email_rules() {
        assert!(Email::parse("admin@example.com").is_ok());
        assert_eq!(Email::parse("Admin@Example.COM").unwrap().as_str(), "admin@example.com");
        assert_eq!(Email::parse("buyer@fruit.co.uk").unwrap().local_part(), "buyer");
        for bad in ["", "admin", "@example.com", "admin@", "admin@example", "a b@example.com", "a@.com"] {
            assert!(Email::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    proptest! {
        #[test]
        fn parsed_emails_are_lowercase_and_trimmed(
            local in "[A-Za-z0-9._]{1,12}",
            domain in "[A-Za-z]{1,10}",
            tld in "[A-Za-z]{2,4}",
        ) {
            let raw = format!("  {local}@{domain}.{tld} ");
            let email = Email::parse(&raw).unwrap();
            prop_assert_eq!(email.as_str(), raw.trim().to_lowercase());
        }
    }
}
