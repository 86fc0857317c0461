//! Fluent builders for creating customizable test objects
//!
//! This module provides builder patterns for creating test objects with custom
//! configurations while maintaining sensible defaults.

use super::constants::{TEST_EMAIL, TEST_REFRESH_TOKEN, TEST_USER_ID};
use super::fixtures::TestFixtures;
use crate::models::{ProviderUser, Session};
use chrono::{Duration, Utc};
use serde_json::Value;

/// Builder for provider identity payloads
pub struct TestUserBuilder {
    user: ProviderUser,
}

impl TestUserBuilder {
    /// Bare user with only an id
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            user: ProviderUser {
                id: id.to_string(),
                ..ProviderUser::default()
            },
        }
    }

    #[must_use]
    pub fn email(mut self, email: &str) -> Self {
        self.user.email = Some(email.to_string());
        self
    }

    /// Add a `user_metadata` entry
    #[must_use]
    pub fn metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.user.user_metadata.insert(key.to_string(), value.into());
        self
    }

    /// Mark the email as confirmed
    #[must_use]
    pub fn confirmed(mut self) -> Self {
        let now = Utc::now();
        self.user.created_at = Some(now - Duration::days(1));
        self.user.email_confirmed_at = Some(now);
        self
    }

    #[must_use]
    pub fn build(self) -> ProviderUser {
        self.user
    }
}

/// Builder for provider sessions
pub struct TestSessionBuilder {
    user: ProviderUser,
    expires_in: Duration,
    token_id: String,
}

impl Default for TestSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSessionBuilder {
    /// One-hour session for the default test user
    #[must_use]
    pub fn new() -> Self {
        Self {
            user: TestUserBuilder::new(TEST_USER_ID).email(TEST_EMAIL).build(),
            expires_in: Duration::hours(1),
            token_id: "fixture".to_string(),
        }
    }

    #[must_use]
    pub fn user(mut self, user: ProviderUser) -> Self {
        self.user = user;
        self
    }

    /// Lifetime of the access token, negative for an expired one
    #[must_use]
    pub fn expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = expires_in;
        self
    }

    /// Distinguish tokens minted within the same second
    #[must_use]
    pub fn token_id(mut self, token_id: &str) -> Self {
        self.token_id = token_id.to_string();
        self
    }

    #[must_use]
    pub fn build(self) -> Session {
        let expires_at = Utc::now() + self.expires_in;
        Session {
            access_token: TestFixtures::access_token_with_id(self.expires_in, &self.token_id),
            refresh_token: Some(TEST_REFRESH_TOKEN.to_string()),
            token_type: "bearer".to_string(),
            expires_in: Some(self.expires_in.num_seconds()),
            expires_at: Some(expires_at.timestamp()),
            user: self.user,
        }
    }
}
