// Centralized logging utilities for session lifecycle messages
use crate::models::{AuthEventKind, AuthUser, ProviderError};
use log::{debug, info, warn};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log the outcome of the startup session check
    pub fn log_bootstrap_result(user: Option<&AuthUser>) {
        match user {
            Some(user) => info!("🔐 Restored session for {} ({})", user.name, user.id),
            None => info!("🔓 No existing session found at startup"),
        }
    }

    /// Log a bootstrap failure that degrades to logged out
    pub fn log_bootstrap_failure(err: &ProviderError) {
        warn!("Session bootstrap failed, continuing as logged out: {err}");
    }

    /// Log adoption of a provider session
    pub fn log_session_adopted(user: &AuthUser, source: &str) {
        info!(
            "✅ Session adopted from {source} for {} ({})",
            user.name, user.id
        );
    }

    /// Log that local session state was cleared
    pub fn log_session_cleared(source: &str) {
        info!("🧹 Session cleared ({source})");
    }

    /// Log a provider event that carries no state change
    pub fn log_informational_event(kind: &AuthEventKind) {
        debug!("Auth event {kind} received, no state change");
    }

    /// Log an event kind this client does not understand
    pub fn log_unknown_event(kind: &AuthEventKind) {
        info!("Ignoring unrecognized auth event {kind}");
    }

    /// Log a background failure that must not change state
    pub fn log_background_failure(task: &str, err: &ProviderError) {
        warn!("Background {task} failed, keeping current session: {err}");
    }

    /// Log a refresh scheduler transition
    pub fn log_refresh_transition(armed: bool, interval_secs: u64, buffer_secs: u64) {
        if armed {
            info!(
                "⏱️  Token refresh armed (check every {interval_secs}s, refresh {buffer_secs}s before expiry)"
            );
        } else {
            info!("⏹️  Token refresh disarmed");
        }
    }

    /// Log a refresh tick decision
    pub fn log_refresh_check(remaining_secs: Option<i64>, due: bool) {
        match remaining_secs {
            Some(secs) => debug!("Token expires in {secs}s, refresh due: {due}"),
            None => debug!("Token expiry unreadable, skipping refresh"),
        }
    }

    /// Log a navigation request that has no router yet
    pub fn log_navigation_deferred(path: &str) {
        warn!("No navigator registered yet, deferring navigation to {path}");
    }

    /// Log a local token persistence failure
    pub fn log_token_store_failure(action: &str, err: &anyhow::Error) {
        warn!("Failed to {action} stored access token: {err:#}");
    }
}
