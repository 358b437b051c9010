//! Value objects: validated, immutable, compared by value.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// A normalized (trimmed, lowercased) e-mail address.
///
/// Only the shape is checked: one `@`, a non-empty local part, and a domain
/// containing a dot. Deliverability is not our business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let email = raw.trim().to_lowercase();
        if email.is_empty() {
            return Err(DomainError::validation("email is required"));
        }
        if email.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("email cannot contain whitespace"));
        }

        let mut parts = email.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => return Err(DomainError::validation("email must contain exactly one '@'")),
        };
        if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(DomainError::validation(format!("'{email}' is not a valid email")));
        }

        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl ValueObject for Email {}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim `value` and reject it when nothing is left.
pub fn require_non_blank(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Like [`require_non_blank`], for optional patch fields.
pub fn optional_non_blank(field: &str, value: Option<&String>) -> DomainResult<Option<String>> {
    value.map(|v| require_non_blank(field, v)).transpose()
}
