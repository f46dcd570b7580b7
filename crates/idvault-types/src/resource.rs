use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind};
use crate::error::ValidationError;
use crate::secret::Secret;
use crate::validation::{validate_key, validate_names, validate_secrets};

/// A protected API and the scopes it accepts.
///
/// The `scopes` list drives the scope index: every (name, scope) pair gets
/// an index row so resources can be found by scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiResource {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub scopes: Vec<String>,
    pub user_claims: Vec<String>,
    pub api_secrets: Vec<Secret>,
    pub allowed_access_token_signing_algorithms: Vec<String>,
    pub properties: BTreeMap<String, String>,
}

impl Default for ApiResource {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: None,
            description: None,
            enabled: true,
            scopes: Vec::new(),
            user_claims: Vec::new(),
            api_secrets: Vec::new(),
            allowed_access_token_signing_algorithms: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

impl ApiResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

impl Entity for ApiResource {
    const KIND: EntityKind = EntityKind::ApiResource;

    fn key(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(Self::KIND, &self.name)?;
        validate_names(Self::KIND, &self.name, "scopes", &self.scopes)?;
        validate_names(Self::KIND, &self.name, "user_claims", &self.user_claims)?;
        validate_secrets(Self::KIND, &self.name, &self.api_secrets)
    }
}

/// A scope an API can request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiScope {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub required: bool,
    pub emphasize: bool,
    pub show_in_discovery_document: bool,
    pub user_claims: Vec<String>,
    pub properties: BTreeMap<String, String>,
}

impl Default for ApiScope {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: None,
            description: None,
            enabled: true,
            required: false,
            emphasize: false,
            show_in_discovery_document: true,
            user_claims: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

impl ApiScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Entity for ApiScope {
    const KIND: EntityKind = EntityKind::ApiScope;

    fn key(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(Self::KIND, &self.name)?;
        validate_names(Self::KIND, &self.name, "user_claims", &self.user_claims)
    }
}

/// A set of identity claims (e.g. `openid`, `profile`) requestable as a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdentityResource {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub required: bool,
    pub emphasize: bool,
    pub show_in_discovery_document: bool,
    pub user_claims: Vec<String>,
    pub properties: BTreeMap<String, String>,
}

impl Default for IdentityResource {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: None,
            description: None,
            enabled: true,
            required: false,
            emphasize: false,
            show_in_discovery_document: true,
            user_claims: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

impl IdentityResource {
    pub fn new<I, S>(name: impl Into<String>, user_claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            user_claims: user_claims.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

impl Entity for IdentityResource {
    const KIND: EntityKind = EntityKind::IdentityResource;

    fn key(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(Self::KIND, &self.name)?;
        if self.user_claims.is_empty() {
            return Err(ValidationError::Invalid {
                kind: Self::KIND,
                key: self.name.clone(),
                reason: "identity resource must expose at least one claim".into(),
            });
        }
        validate_names(Self::KIND, &self.name, "user_claims", &self.user_claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_resource_scopes_validated() {
        let api = ApiResource::new("orders").with_scopes(["orders.read", "orders.write"]);
        assert!(api.validate().is_ok());

        let api = ApiResource::new("orders").with_scopes(["orders.read", ""]);
        assert!(api.validate().is_err());
    }

    #[test]
    fn identity_resource_requires_claims() {
        assert!(IdentityResource::new("openid", ["sub"]).validate().is_ok());
        assert!(IdentityResource::new("empty", Vec::<String>::new())
            .validate()
            .is_err());
    }

    #[test]
    fn api_scope_key_is_name() {
        let scope = ApiScope::new("orders.read");
        assert_eq!(scope.key(), "orders.read");
        assert!(scope.show_in_discovery_document);
    }

    #[test]
    fn camel_case_json() {
        let api: ApiResource =
            serde_json::from_str(r#"{"name":"orders","displayName":"Orders","scopes":["a"]}"#)
                .unwrap();
        assert_eq!(api.display_name.as_deref(), Some("Orders"));
        assert_eq!(api.scopes, vec!["a".to_string()]);
        assert!(api.enabled);
    }
}
