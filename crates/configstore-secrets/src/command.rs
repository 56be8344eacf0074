//! The write-side contract and secret validation.

use async_trait::async_trait;
use configstore_readdb::{NodeType, Secret, SecretData};
use serde::{Deserialize, Serialize};

use crate::error::{SecretsError, SecretsResult};
use crate::resolver::MAX_SEGMENT_LEN;

/// A secret as submitted for creation. Identity and owner are assigned by
/// the command handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSecret {
    pub name: String,
    #[serde(flatten)]
    pub data: SecretData,
}

impl NewSecret {
    pub fn new(name: impl Into<String>, data: SecretData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Validates and persists secret mutations.
///
/// Committed changes reach the read model asynchronously; a query issued
/// right after a successful command may not observe it.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Creates a secret owned by the referenced node.
    ///
    /// # Errors
    ///
    /// `Validation` or `AlreadyExists` for a rejected payload, `NotFound` or
    /// `InvalidReference` when the owner cannot be resolved.
    async fn create_secret(
        &self,
        owner_type: NodeType,
        owner_ref: &str,
        secret: NewSecret,
    ) -> SecretsResult<Secret>;

    /// Deletes the named secret of the referenced node.
    ///
    /// # Errors
    ///
    /// `NotFound` when the owner or the secret does not exist.
    async fn delete_secret(
        &self,
        owner_type: NodeType,
        owner_ref: &str,
        name: &str,
    ) -> SecretsResult<()>;
}

/// Checks a secret or node name.
///
/// Names start with an ASCII letter, continue with letters, digits, `-` or
/// `_`, and are at most 255 bytes long.
pub fn validate_name(name: &str) -> SecretsResult<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(SecretsError::validation("name must not be empty"));
    };
    if name.len() > MAX_SEGMENT_LEN {
        return Err(SecretsError::validation(format!(
            "name exceeds {MAX_SEGMENT_LEN} bytes"
        )));
    }
    if !first.is_ascii_alphabetic() {
        return Err(SecretsError::validation(format!(
            "name {name:?} must start with a letter"
        )));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_')) {
        return Err(SecretsError::validation(format!(
            "name {name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

/// Checks a secret payload.
pub fn validate_data(data: &SecretData) -> SecretsResult<()> {
    match data {
        SecretData::Internal { data } => {
            if data.is_empty() {
                return Err(SecretsError::validation(
                    "internal secret must contain at least one entry",
                ));
            }
            if data.keys().any(String::is_empty) {
                return Err(SecretsError::validation("secret keys must not be empty"));
            }
        }
        SecretData::External {
            secret_provider_id,
            path,
        } => {
            if secret_provider_id.trim().is_empty() {
                return Err(SecretsError::validation(
                    "external secret requires a secret_provider_id",
                ));
            }
            if path.trim().is_empty() {
                return Err(SecretsError::validation("external secret requires a path"));
            }
        }
    }
    Ok(())
}

/// Validates a submitted secret as a whole.
pub fn validate_new_secret(secret: &NewSecret) -> SecretsResult<()> {
    validate_name(&secret.name)?;
    validate_data(&secret.data)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn accepts_well_formed_names() {
        for name in ["a", "db-password", "API_KEY", "x1-y2_z3"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_names() {
        let too_long = format!("a{}", "b".repeat(MAX_SEGMENT_LEN));
        for name in ["", "1password", "-x", "has space", "dot.name", "ümlaut", too_long.as_str()] {
            let err = validate_name(name).unwrap_err();
            assert!(matches!(err, SecretsError::Validation(_)), "{name:?}");
        }
    }

    #[test]
    fn internal_payload_needs_entries() {
        let empty = SecretData::Internal {
            data: BTreeMap::new(),
        };
        assert!(validate_data(&empty).is_err());
        assert!(validate_data(&SecretData::internal([("k", "v")])).is_ok());
        assert!(validate_data(&SecretData::internal([("", "v")])).is_err());
    }

    #[test]
    fn external_payload_needs_provider_and_path() {
        let external = |provider: &str, path: &str| SecretData::External {
            secret_provider_id: provider.to_owned(),
            path: path.to_owned(),
        };
        assert!(validate_data(&external("vault", "kv/app")).is_ok());
        assert!(validate_data(&external("", "kv/app")).is_err());
        assert!(validate_data(&external("vault", " ")).is_err());
    }

    #[test]
    fn new_secret_wire_format() {
        let json = serde_json::json!({
            "name": "stripe",
            "type": "external",
            "secret_provider_id": "vault-1",
            "path": "kv/stripe",
        });
        let secret: NewSecret = serde_json::from_value(json).unwrap();
        assert_eq!(secret.name, "stripe");
        assert!(validate_new_secret(&secret).is_ok());
    }
}
