use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind};
use crate::error::ValidationError;
use crate::secret::Secret;
use crate::validation::{validate_key, validate_names, validate_non_blank, validate_secrets};

/// An OAuth/OpenID client registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Client {
    pub client_id: String,
    pub client_name: Option<String>,
    pub enabled: bool,
    pub require_client_secret: bool,
    pub client_secrets: Vec<Secret>,
    pub allowed_grant_types: Vec<String>,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub allowed_cors_origins: Vec<String>,
    pub allow_offline_access: bool,
    /// Seconds.
    pub access_token_lifetime: u32,
    /// Seconds.
    pub identity_token_lifetime: u32,
    pub properties: BTreeMap<String, String>,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_name: None,
            enabled: true,
            require_client_secret: true,
            client_secrets: Vec::new(),
            allowed_grant_types: Vec::new(),
            redirect_uris: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
            allowed_scopes: Vec::new(),
            allowed_cors_origins: Vec::new(),
            allow_offline_access: false,
            access_token_lifetime: 3600,
            identity_token_lifetime: 300,
            properties: BTreeMap::new(),
        }
    }
}

impl Client {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    /// Whether `origin` is one of this client's CORS origins.
    ///
    /// Origins compare case-insensitively and ignore a trailing slash.
    pub fn allows_origin(&self, origin: &str) -> bool {
        let wanted = normalize_origin(origin);
        self.allowed_cors_origins
            .iter()
            .any(|allowed| normalize_origin(allowed) == wanted)
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_lowercase()
}

impl Entity for Client {
    const KIND: EntityKind = EntityKind::Client;

    fn key(&self) -> &str {
        &self.client_id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let key = self.client_id.as_str();
        validate_key(Self::KIND, key)?;
        validate_names(Self::KIND, key, "allowed_grant_types", &self.allowed_grant_types)?;
        validate_names(Self::KIND, key, "allowed_scopes", &self.allowed_scopes)?;
        validate_non_blank(Self::KIND, key, "redirect_uris", &self.redirect_uris)?;
        validate_non_blank(
            Self::KIND,
            key,
            "post_logout_redirect_uris",
            &self.post_logout_redirect_uris,
        )?;
        validate_non_blank(Self::KIND, key, "allowed_cors_origins", &self.allowed_cors_origins)?;
        validate_secrets(Self::KIND, key, &self.client_secrets)?;
        if self.access_token_lifetime == 0 {
            return Err(ValidationError::Invalid {
                kind: Self::KIND,
                key: key.to_string(),
                reason: "access token lifetime must be positive".into(),
            });
        }
        Ok(())
    }
}
