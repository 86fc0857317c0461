//! Testing utilities for sessionward
//!
//! Compiled for unit tests and behind the `testing` feature for the
//! integration tests under `tests/`.
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built sessions, tokens and managers
//! - [`builders`] - Fluent builders for users and sessions
//! - [`assertions`] - Assertion helpers for session state
//! - [`mock`] - Programmable in-memory identity provider
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sessionward::testing::{MockIdentityProvider, TestFixtures};
//!
//! async fn example() {
//!     let (manager, provider, tokens) = TestFixtures::manager();
//!     manager.initialize().await;
//!     manager.login("ana@example.com", "secret").await.unwrap();
//!     assert_eq!(provider.calls().sign_in, 1);
//!     assert!(tokens.token().is_some());
//! }
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod mock;

pub use assertions::*;
pub use builders::{TestSessionBuilder, TestUserBuilder};
pub use fixtures::TestFixtures;
pub use mock::{MockCalls, MockIdentityProvider};

/// Common test constants
pub mod constants {
    /// Default test user id
    pub const TEST_USER_ID: &str = "user-1";

    /// Default test email address
    pub const TEST_EMAIL: &str = "ana@example.com";

    /// Default test password
    pub const TEST_PASSWORD: &str = "correct-horse-battery";

    /// Refresh token carried by fixture sessions
    pub const TEST_REFRESH_TOKEN: &str = "test_refresh_token";
}

/// Yield to the runtime until `condition` holds, giving spawned tasks a
/// chance to run; returns the final value of `condition`
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
