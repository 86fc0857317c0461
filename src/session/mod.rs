//! Session Lifecycle Module
//!
//! This module keeps the client's notion of "who is logged in" consistent
//! with the identity provider over the whole process lifetime.
//!
//! # Modules
//!
//! - [`manager`] - Bootstrap, public operations and the adoption funnel
//! - [`store`] - Observable session state
//! - [`refresh`] - Proactive access-token refresh timer
//! - [`reconciler`] - Folding provider events into local state
//! - [`visibility`] - Re-validation when the host becomes visible
//! - [`navigation`] - Redirect requests made before a router exists
//! - [`token_store`] - Persistence of the access token for other clients

pub mod manager;
pub mod navigation;
pub(crate) mod reconciler;
pub mod refresh;
pub mod store;
pub(crate) mod task;
pub mod token_store;
pub mod visibility;

// Re-export commonly used items for convenience
pub use manager::SessionManager;
pub use navigation::{NavigationDeferrer, Navigator};
pub use refresh::{RefreshScheduler, RefreshState};
pub use store::{SessionState, SessionStore, Subscription};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use visibility::VisibilityRevalidator;
