//! Identity provider seam
//!
//! The session manager only talks to an authentication backend through the
//! `IdentityProvider` trait. `GoTrueProvider` speaks the GoTrue REST API;
//! tests plug in the mock from the `testing` module.

pub mod gotrue;

pub use gotrue::GoTrueProvider;

use crate::models::{AuthEvent, ProfileUpdate, ProviderError, ProviderUser, Session, SignUpOutcome};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// External authentication backend
///
/// Implementations own the credential exchange and any provider-side
/// session persistence. Events pushed through `subscribe` may originate
/// from this client or from another one sharing the same account.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, if the provider holds one
    ///
    /// # Errors
    /// Returns an error if the provider cannot be reached or its stored
    /// session cannot be read
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Exchange an identifier and secret for a session
    ///
    /// # Errors
    /// Returns `ProviderError::Api` for rejected credentials
    async fn sign_in_with_password(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Session, ProviderError>;

    /// Create an account; the outcome carries a session only when no
    /// verification step is required
    ///
    /// # Errors
    /// Returns `ProviderError::Api` when the provider refuses the sign-up
    async fn sign_up(
        &self,
        identifier: &str,
        secret: &str,
        metadata: Map<String, Value>,
    ) -> Result<SignUpOutcome, ProviderError>;

    /// End the provider session
    ///
    /// # Errors
    /// Returns an error if the provider could not be told; local provider
    /// state is cleared regardless
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Fetch the user behind the current session, `None` without one
    ///
    /// # Errors
    /// Returns an error if the provider cannot be reached or rejects the
    /// current credentials
    async fn get_user(&self) -> Result<Option<ProviderUser>, ProviderError>;

    /// Submit profile changes for the current user
    ///
    /// # Errors
    /// Returns `ProviderError::SessionMissing` without a session
    async fn update_user(&self, update: &ProfileUpdate) -> Result<ProviderUser, ProviderError>;

    /// Exchange the refresh token for a new session
    ///
    /// # Errors
    /// Returns `ProviderError::SessionMissing` without a refresh token
    async fn refresh_session(&self) -> Result<Session, ProviderError>;

    /// Stream of auth events
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Get the provider name for logging and identification
    fn name(&self) -> &'static str;
}
