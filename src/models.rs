use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod auth;
pub mod user;

pub use auth::{AuthError, AuthEvent, AuthEventKind, ProviderError};
pub use user::AuthUser;

/// Session handed out by the identity provider
///
/// Superseded wholesale on every refresh; never patched field by field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix timestamp (seconds) reported by the provider alongside the token
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: ProviderUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Expiry of the access token
    ///
    /// The embedded `exp` claim wins over the provider supplied `expires_at`
    /// because the token is what other HTTP clients will actually present.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        crate::utils::jwt::token_expiry(&self.access_token).or_else(|| {
            self.expires_at
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        })
    }

    /// Check if the session is past its expiry
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|exp| exp <= Utc::now())
    }

    /// Same credentials with a fresh identity payload
    #[must_use]
    pub fn with_user(mut self, user: ProviderUser) -> Self {
        self.user = user;
        self
    }
}

/// Identity payload attached to a provider session
///
/// Deserialization is lenient: anything the provider adds is ignored and
/// anything it omits falls back to a default.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ProviderUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
}

impl ProviderUser {
    /// String value from `user_metadata`, ignoring blanks
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Profile fields submitted with a sign-up
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SignUpProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Extra metadata stored verbatim alongside the named fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignUpProfile {
    /// Flatten into the metadata object sent to the provider
    #[must_use]
    pub fn to_metadata(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Result of a sign-up call
#[derive(Debug, Clone, Default)]
pub struct SignUpOutcome {
    pub user: Option<ProviderUser>,
    /// Present only when the provider did not ask for verification first
    pub session: Option<Session>,
}

impl SignUpOutcome {
    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        self.session.is_none()
    }
}

/// Changes submitted through `update_profile`
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Merged into `user_metadata` by the provider
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl ProfileUpdate {
    /// Set a metadata field
    #[must_use]
    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none() && self.phone.is_none() && self.data.is_empty()
    }
}

/// Host visibility as reported by whatever embeds the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_user_lenient_deserialization() {
        let user: ProviderUser = serde_json::from_value(json!({
            "id": "user-1",
            "email": "ana@example.com",
            "aud": "authenticated",
            "user_metadata": { "first_name": "Ana" }
        }))
        .unwrap();

        assert_eq!(user.id, "user-1");
        assert_eq!(user.metadata_str("first_name"), Some("Ana"));
        assert!(user.full_name.is_none());
        assert!(user.app_metadata.is_empty());
    }

    #[test]
    fn test_metadata_str_ignores_blank_and_non_string_values() {
        let user = ProviderUser {
            user_metadata: json!({ "name": "   ", "age": 42 })
                .as_object()
                .cloned()
                .unwrap(),
            ..Default::default()
        };

        assert_eq!(user.metadata_str("name"), None);
        assert_eq!(user.metadata_str("age"), None);
        assert_eq!(user.metadata_str("missing"), None);
    }

    #[test]
    fn test_session_expiry_falls_back_to_provider_timestamp() {
        let session = Session {
            access_token: "not-a-jwt".to_string(),
            refresh_token: None,
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            expires_at: Some(1_700_000_000),
            user: ProviderUser::default(),
        };

        assert_eq!(
            session.expires_at().map(|d| d.timestamp()),
            Some(1_700_000_000)
        );
        assert!(session.is_expired());
    }

    #[test]
    fn test_sign_up_profile_flattens_extra_fields() {
        let mut profile = SignUpProfile {
            first_name: Some("Ana".to_string()),
            ..Default::default()
        };
        profile
            .extra
            .insert("referral_code".to_string(), json!("REF123"));

        let metadata = profile.to_metadata();
        assert_eq!(metadata.get("first_name"), Some(&json!("Ana")));
        assert_eq!(metadata.get("referral_code"), Some(&json!("REF123")));
        assert!(!metadata.contains_key("last_name"));
    }

    #[test]
    fn test_sign_up_outcome_confirmation() {
        let outcome = SignUpOutcome::default();
        assert!(outcome.requires_confirmation());
    }

    #[test]
    fn test_profile_update_builder() {
        let update = ProfileUpdate::default().with_data("first_name", "Ana");
        assert!(!update.is_empty());
        assert_eq!(update.data.get("first_name"), Some(&json!("Ana")));
        assert!(ProfileUpdate::default().is_empty());
    }
}
