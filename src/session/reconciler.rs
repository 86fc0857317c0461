//! Provider event reconciliation
//!
//! Sign-ins, sign-outs and profile changes can happen outside this client,
//! in another tab or device on the same account. The reconciler folds the
//! provider's event stream into local state through the same adoption
//! funnel the public operations use.

use super::manager::ManagerInner;
use crate::models::{AuthEvent, AuthEventKind};
use crate::utils::logging::LoggingHelper;
use std::sync::Weak;
use tokio::sync::broadcast::{self, error::RecvError};

/// Consume provider events until the stream closes or the manager is gone
pub(crate) async fn run(manager: Weak<ManagerInner>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("Missed {skipped} auth events, resynchronising with provider");
                let Some(inner) = manager.upgrade() else {
                    break;
                };
                // Transient failures are logged by refresh_user itself
                let _ = inner.refresh_user().await;
                continue;
            }
            Err(RecvError::Closed) => {
                log::debug!("Auth event stream closed, reconciler stopping");
                break;
            }
        };

        let Some(inner) = manager.upgrade() else {
            break;
        };
        apply_event(&inner, event);
    }
}

/// Apply a single provider event to local state
pub(crate) fn apply_event(inner: &ManagerInner, event: AuthEvent) {
    log::debug!("Auth event received: {}", event.kind);
    match event.kind {
        AuthEventKind::SignedIn => match event.session {
            Some(session) => inner.adopt(Some(session), "signed-in event"),
            None => log::warn!("Signed-in event without a session, ignoring"),
        },
        AuthEventKind::SignedOut => inner.adopt(None, "signed-out event"),
        AuthEventKind::UserUpdated => match event.session {
            Some(session) => inner.merge_user_update(&session.user, "user-updated event"),
            None => log::info!("User-updated event without identity payload, ignoring"),
        },
        // The refresh path adopts its own result; storage is left alone here
        AuthEventKind::TokenRefreshed
        | AuthEventKind::InitialSession
        | AuthEventKind::PasswordRecovery => LoggingHelper::log_informational_event(&event.kind),
        AuthEventKind::Other(_) => LoggingHelper::log_unknown_event(&event.kind),
    }
}
