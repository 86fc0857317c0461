//! Common authentication data types
//!
//! This module provides the event and error types shared by the identity
//! provider seam and the session manager.

use super::Session;
use std::fmt;

/// Kind of event pushed by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    InitialSession,
    PasswordRecovery,
    /// Anything the provider added after this client was written
    Other(String),
}

impl AuthEventKind {
    /// Parse the provider's wire name; unknown names are preserved verbatim
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name {
            "SIGNED_IN" => Self::SignedIn,
            "SIGNED_OUT" => Self::SignedOut,
            "TOKEN_REFRESHED" => Self::TokenRefreshed,
            "USER_UPDATED" => Self::UserUpdated,
            "INITIAL_SESSION" => Self::InitialSession,
            "PASSWORD_RECOVERY" => Self::PasswordRecovery,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_wire(&self) -> &str {
        match self {
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::InitialSession => "INITIAL_SESSION",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Event pushed by the identity provider, possibly from another client
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    #[must_use]
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self::new(AuthEventKind::SignedIn, Some(session))
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::new(AuthEventKind::SignedOut, None)
    }
}

/// Errors reported by an identity provider implementation
#[derive(Debug)]
pub enum ProviderError {
    /// Transport failure talking to the provider
    Http(reqwest::Error),
    /// The provider answered with an error status
    Api { status: u16, message: String },
    /// The provider holds no session for this client
    SessionMissing,
    /// The provider answered with something we could not interpret
    InvalidResponse(String),
    /// The provider client was built with unusable settings
    Config(String),
}

impl ProviderError {
    /// Whether the provider explicitly reported the session as gone
    ///
    /// Only these errors are allowed to clear local state from a background
    /// path; everything else is treated as transient.
    #[must_use]
    pub fn is_session_gone(&self) -> bool {
        match self {
            Self::SessionMissing => true,
            Self::Api { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(err) => write!(f, "Identity provider unreachable: {err}"),
            Self::Api { status, message } => {
                write!(f, "Identity provider error ({status}): {message}")
            }
            Self::SessionMissing => write!(f, "No active session"),
            Self::InvalidResponse(msg) => write!(f, "Invalid provider response: {msg}"),
            Self::Config(msg) => write!(f, "Invalid provider configuration: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

/// Error returned by the public session operations
#[derive(Debug)]
pub enum AuthError {
    /// The identity provider rejected or failed the call
    Provider(ProviderError),
    /// The operation requires a signed-in user
    NotAuthenticated,
}

impl AuthError {
    /// Message suitable for showing next to a form
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(ProviderError::Api { message, .. }) => message.clone(),
            Self::Provider(ProviderError::Http(_)) => {
                "Unable to reach the authentication service".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(err) => write!(f, "{err}"),
            Self::NotAuthenticated => write!(f, "No user is signed in"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Provider(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}
