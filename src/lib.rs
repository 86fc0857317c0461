#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the sessionward library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod models;
pub mod provider;
pub mod session;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use models::{AuthError, AuthEvent, AuthEventKind, AuthUser, ProviderError, Session, Visibility};
pub use provider::{GoTrueProvider, IdentityProvider};
pub use session::{FileTokenStore, MemoryTokenStore, SessionManager, SessionState, TokenStore};
pub use settings::SessionwardSettings;
