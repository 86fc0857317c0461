//! Test fixtures providing pre-built test objects
//!
//! This module provides commonly used sessions, tokens and managers so tests
//! do not have to rebuild them by hand.

use super::builders::{TestSessionBuilder, TestUserBuilder};
use super::constants::TEST_USER_ID;
use super::mock::MockIdentityProvider;
use crate::models::Session;
use crate::session::token_store::MemoryTokenStore;
use crate::session::SessionManager;
use crate::settings::SessionSettings;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Unsigned JWT whose `exp` claim lies `expires_in` from now
    #[must_use]
    pub fn access_token_expiring_in(expires_in: Duration) -> String {
        Self::access_token_with_id(expires_in, "fixture")
    }

    /// Like `access_token_expiring_in`, with a distinguishing `jti` claim
    #[must_use]
    pub fn access_token_with_id(expires_in: Duration, token_id: &str) -> String {
        let now = Utc::now();
        let header = json!({ "alg": "none", "typ": "JWT" });
        let payload = json!({
            "sub": TEST_USER_ID,
            "iat": now.timestamp(),
            "exp": (now + expires_in).timestamp(),
            "jti": token_id,
            "role": "authenticated",
        });

        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    /// Session valid for an hour for the given user
    #[must_use]
    pub fn session(user_id: &str, email: &str) -> Session {
        TestSessionBuilder::new()
            .user(TestUserBuilder::new(user_id).email(email).confirmed().build())
            .build()
    }

    /// Session whose access token is already past its expiry
    #[must_use]
    pub fn expired_session() -> Session {
        TestSessionBuilder::new()
            .expires_in(Duration::minutes(-5))
            .build()
    }

    /// Manager wired to a mock provider and an in-memory token store
    #[must_use]
    pub fn manager() -> (
        SessionManager,
        Arc<MockIdentityProvider>,
        Arc<MemoryTokenStore>,
    ) {
        Self::manager_with_settings(SessionSettings::default())
    }

    /// Like `manager`, with custom session settings
    #[must_use]
    pub fn manager_with_settings(
        settings: SessionSettings,
    ) -> (
        SessionManager,
        Arc<MockIdentityProvider>,
        Arc<MemoryTokenStore>,
    ) {
        let provider = Arc::new(MockIdentityProvider::new());
        let tokens = Arc::new(MemoryTokenStore::new());
        let manager = SessionManager::new(provider.clone(), tokens.clone(), settings);
        (manager, provider, tokens)
    }
}
