use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind};
use crate::error::ValidationError;
use crate::validation::validate_key;

/// A persisted grant (authorization code, refresh token, consent, ...).
///
/// Grants are the only records with an expiration. Storage never expires
/// them by itself; the cleanup loop removes them once `expiration` has passed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedGrant {
    pub key: String,
    #[serde(rename = "type")]
    pub grant_type: String,
    /// May be empty for grants issued without a user.
    #[serde(default)]
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub creation_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_time: Option<DateTime<Utc>>,
    /// Opaque serialized grant body.
    #[serde(default)]
    pub data: String,
}

impl PersistedGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| exp < now)
    }
}

impl Entity for PersistedGrant {
    const KIND: EntityKind = EntityKind::PersistedGrant;

    fn key(&self) -> &str {
        &self.key
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(Self::KIND, &self.key)?;
        let invalid = |reason: &str| ValidationError::Invalid {
            kind: Self::KIND,
            key: self.key.clone(),
            reason: reason.to_string(),
        };
        if self.grant_type.trim().is_empty() {
            return Err(invalid("grant type must not be blank"));
        }
        if self.client_id.trim().is_empty() {
            return Err(invalid("client id must not be blank"));
        }
        if self.expiration.is_some_and(|exp| exp < self.creation_time) {
            return Err(invalid("expiration precedes creation time"));
        }
        Ok(())
    }
}

/// Equality predicate over grants, anchored on the subject.
///
/// The subject is always applied, including an empty one, which selects
/// grants issued without a user. Optional predicates that are `None` or
/// blank are not applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GrantFilter {
    pub subject_id: String,
    pub client_id: Option<String>,
    #[serde(rename = "type")]
    pub grant_type: Option<String>,
    pub session_id: Option<String>,
}

impl GrantFilter {
    pub fn subject(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            ..Default::default()
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = Some(grant_type.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// The optional predicates that will actually be applied.
    pub fn client(&self) -> Option<&str> {
        non_blank(&self.client_id)
    }

    pub fn grant_type(&self) -> Option<&str> {
        non_blank(&self.grant_type)
    }

    pub fn session(&self) -> Option<&str> {
        non_blank(&self.session_id)
    }

    /// In-process evaluation of the same predicate.
    pub fn matches(&self, grant: &PersistedGrant) -> bool {
        fn eq(want: Option<&str>, have: Option<&str>) -> bool {
            want.map_or(true, |w| have == Some(w))
        }
        grant.subject_id == self.subject_id
            && eq(self.client(), Some(&grant.client_id))
            && eq(self.grant_type(), Some(&grant.grant_type))
            && eq(self.session(), grant.session_id.as_deref())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant() -> PersistedGrant {
        PersistedGrant {
            key: "k1".into(),
            grant_type: "refresh_token".into(),
            subject_id: "alice".into(),
            session_id: Some("s1".into()),
            client_id: "c1".into(),
            description: None,
            creation_time: Utc::now(),
            expiration: None,
            consumed_time: None,
            data: "{}".into(),
        }
    }

    #[test]
    fn blank_predicates_are_ignored() {
        let filter = GrantFilter::subject("alice").with_client("  ").with_type("");
        assert_eq!(filter.client(), None);
        assert_eq!(filter.grant_type(), None);
        assert!(filter.matches(&grant()));
    }

    #[test]
    fn filter_matches_all_predicates() {
        let g = grant();
        assert!(GrantFilter::subject("alice")
            .with_client("c1")
            .with_type("refresh_token")
            .with_session("s1")
            .matches(&g));
        assert!(!GrantFilter::subject("alice").with_session("s2").matches(&g));
        assert!(!GrantFilter::subject("bob").matches(&g));
    }

    #[test]
    fn empty_subject_selects_userless_grants() {
        let mut g = grant();
        g.subject_id = String::new();
        assert!(GrantFilter::default().matches(&g));
        assert!(!GrantFilter::subject("alice").matches(&g));
        assert!(!GrantFilter::default().matches(&grant()));
    }

    #[test]
    fn expiry_is_strict() {
        let now = Utc::now();
        let mut g = grant();
        assert!(!g.is_expired(now));
        g.expiration = Some(now);
        assert!(!g.is_expired(now));
        g.expiration = Some(now - Duration::seconds(1));
        assert!(g.is_expired(now));
    }

    #[test]
    fn validation() {
        assert!(grant().validate().is_ok());
        let mut g = grant();
        g.client_id = String::new();
        assert!(g.validate().is_err());
        let mut g = grant();
        g.expiration = Some(g.creation_time - Duration::seconds(5));
        assert!(g.validate().is_err());
    }
}
