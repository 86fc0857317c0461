//! Single-occupancy background task slot

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Holds at most one spawned task; replacing it cancels the old one first
#[derive(Default)]
pub(crate) struct TaskSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
    started: AtomicUsize,
}

impl TaskSlot {
    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the task unless a live one already occupies the slot
    ///
    /// Returns `true` when a new task was started. Outside a Tokio runtime
    /// nothing is spawned.
    pub(crate) fn spawn_if_idle<F, Fut>(&self, make: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        if let Some(stale) = slot.take() {
            stale.abort();
        }

        let Ok(runtime) = Handle::try_current() else {
            log::warn!("No async runtime available, background task not started");
            return false;
        };

        *slot = Some(runtime.spawn(make()));
        self.started.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Cancel the task if one is present; returns whether one was
    pub(crate) fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_spawn_is_noop_while_running() {
        let slot = TaskSlot::default();

        assert!(slot.spawn_if_idle(|| std::future::pending::<()>()));
        assert!(!slot.spawn_if_idle(|| std::future::pending::<()>()));
        assert_eq!(slot.started(), 1);
        assert!(slot.is_active());
    }

    #[tokio::test]
    async fn test_cancel_then_respawn() {
        let slot = TaskSlot::default();
        slot.spawn_if_idle(|| std::future::pending::<()>());

        assert!(slot.cancel());
        assert!(!slot.is_active());
        assert!(!slot.cancel());

        assert!(slot.spawn_if_idle(|| std::future::pending::<()>()));
        assert_eq!(slot.started(), 2);
    }

    #[tokio::test]
    async fn test_finished_task_is_replaced() {
        let slot = TaskSlot::default();
        slot.spawn_if_idle(|| async {});
        for _ in 0..10 {
            if !slot.is_active() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(!slot.is_active());
        assert!(slot.spawn_if_idle(|| std::future::pending::<()>()));
        assert_eq!(slot.started(), 2);
    }

    #[test]
    fn test_no_runtime_does_not_spawn() {
        let slot = TaskSlot::default();
        assert!(!slot.spawn_if_idle(|| async {}));
        assert_eq!(slot.started(), 0);
    }
}
