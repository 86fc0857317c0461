//! Deferred navigation
//!
//! The session manager may want to redirect (for example after logout)
//! before any router exists. Requests made without a navigator are held in
//! a single pending slot and delivered once one is registered.

use crate::utils::logging::LoggingHelper;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Function that performs a navigation to the given path
pub type Navigator = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct NavigationState {
    navigator: Option<Navigator>,
    pending: Option<String>,
}

/// Buffers redirect intents until a navigator is available
#[derive(Default)]
pub struct NavigationDeferrer {
    state: Mutex<NavigationState>,
}

impl NavigationDeferrer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NavigationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the navigator and deliver any pending request to it
    pub fn register_navigator<F>(&self, navigator: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let navigator: Navigator = Arc::new(navigator);
        let pending = {
            let mut state = self.lock();
            state.navigator = Some(Arc::clone(&navigator));
            state.pending.take()
        };

        if let Some(path) = pending {
            log::debug!("Delivering deferred navigation to {path}");
            navigator(&path);
        }
    }

    /// Forget the navigator, e.g. when the router is torn down
    pub fn clear_navigator(&self) {
        self.lock().navigator = None;
    }

    /// Navigate now if possible, otherwise hold the request
    ///
    /// A newer request replaces an older pending one.
    pub fn request_navigation(&self, path: &str) {
        let mut state = self.lock();
        if let Some(navigator) = state.navigator.clone() {
            drop(state);
            navigator(path);
            return;
        }

        state.pending = Some(path.to_string());
        drop(state);
        LoggingHelper::log_navigation_deferred(path);
    }

    #[must_use]
    pub fn pending(&self) -> Option<String> {
        self.lock().pending.clone()
    }

    #[must_use]
    pub fn has_navigator(&self) -> bool {
        self.lock().navigator.is_some()
    }
}
