//! Validation shared by every entity kind.

use std::collections::HashSet;

use crate::entity::EntityKind;
use crate::error::ValidationError;
use crate::secret::Secret;

/// A logical key must contain something other than whitespace.
pub fn validate_key(kind: EntityKind, key: &str) -> Result<(), ValidationError> {
    if key.trim().is_empty() {
        return Err(ValidationError::BlankKey { kind });
    }
    Ok(())
}

/// Name lists (scopes, claims, grant types) may not contain blank entries or
/// case-insensitive duplicates.
pub fn validate_names(
    kind: EntityKind,
    key: &str,
    field: &'static str,
    names: &[String],
) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::BlankEntry {
                kind,
                key: key.to_string(),
                field,
            });
        }
        if !seen.insert(normalized) {
            return Err(ValidationError::DuplicateEntry {
                kind,
                key: key.to_string(),
                field,
                value: name.clone(),
            });
        }
    }
    Ok(())
}

/// URI-like lists only need non-blank entries; duplicates are harmless.
pub fn validate_non_blank(
    kind: EntityKind,
    key: &str,
    field: &'static str,
    values: &[String],
) -> Result<(), ValidationError> {
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(ValidationError::BlankEntry {
            kind,
            key: key.to_string(),
            field,
        });
    }
    Ok(())
}

pub fn validate_secrets(
    kind: EntityKind,
    key: &str,
    secrets: &[Secret],
) -> Result<(), ValidationError> {
    for secret in secrets {
        if secret.value.trim().is_empty() {
            return Err(ValidationError::BlankEntry {
                kind,
                key: key.to_string(),
                field: "secrets",
            });
        }
        if secret.secret_type.trim().is_empty() {
            return Err(ValidationError::Invalid {
                kind,
                key: key.to_string(),
                reason: "secret type must not be blank".into(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn blank_key_rejected() {
        assert_eq!(
            validate_key(EntityKind::Client, "  "),
            Err(ValidationError::BlankKey { kind: EntityKind::Client })
        );
        assert!(validate_key(EntityKind::Client, "c1").is_ok());
    }

    #[test]
    fn names_reject_blank_and_duplicates() {
        let kind = EntityKind::ApiResource;
        assert!(validate_names(kind, "api", "scopes", &names(&["read", "write"])).is_ok());
        assert!(matches!(
            validate_names(kind, "api", "scopes", &names(&["read", " "])),
            Err(ValidationError::BlankEntry { field: "scopes", .. })
        ));
        assert!(matches!(
            validate_names(kind, "api", "scopes", &names(&["read", "READ"])),
            Err(ValidationError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn non_blank_allows_duplicates() {
        let uris = names(&["https://a", "https://a"]);
        assert!(validate_non_blank(EntityKind::Client, "c1", "redirect_uris", &uris).is_ok());
    }

    #[test]
    fn secrets_need_value_and_type() {
        let kind = EntityKind::Client;
        assert!(validate_secrets(kind, "c1", &[Secret::shared("s3cret")]).is_ok());
        assert!(validate_secrets(kind, "c1", &[Secret::shared("")]).is_err());
        let mut untyped = Secret::shared("x");
        untyped.secret_type = String::new();
        assert!(validate_secrets(kind, "c1", &[untyped]).is_err());
    }
}
