//! Revalidation when the host becomes visible again
//!
//! A backgrounded client may hold a session that expired or was revoked
//! elsewhere. The host reports visibility changes; while a session is
//! active, every Hidden to Visible transition triggers a re-check.

use super::task::TaskSlot;
use crate::models::Visibility;
use std::future::Future;
use tokio::sync::watch;

/// Last reported visibility plus a count of Hidden to Visible transitions
///
/// The count survives coalescing in the watch channel: a listener that
/// only sees the final `Visible` still notices the wake-up in between.
#[derive(Debug, Clone, Copy)]
struct HostView {
    visibility: Visibility,
    wakeups: u64,
}

/// Watches host visibility and fires a callback on wake-up
pub struct VisibilityRevalidator {
    tx: watch::Sender<HostView>,
    listener: TaskSlot,
}

impl Default for VisibilityRevalidator {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityRevalidator {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(HostView {
            visibility: Visibility::Visible,
            wakeups: 0,
        });
        Self {
            tx,
            listener: TaskSlot::default(),
        }
    }

    /// Report the host's current visibility
    pub fn set_visibility(&self, visibility: Visibility) {
        let mut previous = visibility;
        self.tx.send_modify(|view| {
            previous = view.visibility;
            if previous == Visibility::Hidden && visibility == Visibility::Visible {
                view.wakeups += 1;
            }
            view.visibility = visibility;
        });
        if previous != visibility {
            log::debug!("Visibility changed: {previous:?} -> {visibility:?}");
        }
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.tx.borrow().visibility
    }

    /// Start listening; no-op while a listener is already running
    ///
    /// `on_visible` runs once for any wake-ups reported since it last ran,
    /// counting from the moment of arming. Returning `false` from it stops
    /// the listener.
    pub fn arm<F, Fut>(&self, on_visible: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let mut seen = rx.borrow_and_update().wakeups;
        self.listener.spawn_if_idle(move || async move {
            let mut on_visible = on_visible;
            while rx.changed().await.is_ok() {
                let wakeups = rx.borrow_and_update().wakeups;
                if wakeups == seen {
                    continue;
                }
                seen = wakeups;
                log::debug!("Host visible again, revalidating session");
                if !on_visible().await {
                    break;
                }
            }
        })
    }

    /// Stop listening
    pub fn disarm(&self) -> bool {
        self.listener.cancel()
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.listener.is_active()
    }
}
