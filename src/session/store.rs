//! Observable session state
//!
//! `SessionStore` is the single source of truth for "is a user logged in".
//! Consumers read snapshots and subscribe to changes; only the session
//! manager mutates it.

use crate::models::AuthUser;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

/// Snapshot of the authentication state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<AuthUser>,
    pub loading: bool,
    pub initialized: bool,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

#[derive(Default)]
struct Guarded {
    state: SessionState,
    in_flight: usize,
    version: u64,
}

struct StoreInner {
    guarded: Mutex<Guarded>,
    // Version of the last snapshot handed to listeners; stale ones are skipped
    notified: Mutex<u64>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    watch_tx: watch::Sender<SessionState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide session state with change notification
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(StoreInner {
                guarded: Mutex::new(Guarded::default()),
                notified: Mutex::new(0),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener_id: AtomicU64::new(0),
                watch_tx,
            }),
        }
    }

    /// Current state snapshot
    #[must_use]
    pub fn state(&self) -> SessionState {
        lock(&self.inner.guarded).state.clone()
    }

    /// Register a listener called after every state change
    ///
    /// The listener stays registered until the returned `Subscription` is
    /// dropped or explicitly unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).insert(id, Arc::new(listener));
        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
            active: true,
        }
    }

    /// Receiver that always holds the latest state
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.watch_tx.subscribe()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    /// Apply a mutation and notify listeners with the resulting snapshot
    pub(crate) fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut SessionState),
    {
        self.update_guarded(|guarded| mutate(&mut guarded.state));
    }

    /// Mark an operation as in flight until the guard is dropped
    pub(crate) fn begin_loading(&self) -> LoadingGuard {
        self.update_guarded(|guarded| {
            guarded.in_flight += 1;
            guarded.state.loading = true;
        });
        LoadingGuard {
            store: self.clone(),
            marks_initialized: false,
        }
    }

    /// Like `begin_loading`, but also flips `initialized` when released
    pub(crate) fn begin_bootstrap(&self) -> LoadingGuard {
        let mut guard = self.begin_loading();
        guard.marks_initialized = true;
        guard
    }

    fn update_guarded<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Guarded),
    {
        let (snapshot, version) = {
            let mut guarded = lock(&self.inner.guarded);
            let before = guarded.state.clone();
            mutate(&mut guarded);
            if guarded.state == before {
                return;
            }
            guarded.version += 1;
            self.inner.watch_tx.send_replace(guarded.state.clone());
            (guarded.state.clone(), guarded.version)
        };

        let mut notified = lock(&self.inner.notified);
        if *notified > version {
            return;
        }
        *notified = version;

        let listeners: Vec<Listener> = lock(&self.inner.listeners).values().cloned().collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

/// Keeps `loading` raised for the lifetime of an operation
pub(crate) struct LoadingGuard {
    store: SessionStore,
    marks_initialized: bool,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let marks_initialized = self.marks_initialized;
        self.store.update_guarded(|guarded| {
            guarded.in_flight = guarded.in_flight.saturating_sub(1);
            guarded.state.loading = guarded.in_flight > 0;
            if marks_initialized {
                guarded.state.initialized = true;
            }
        });
    }
}

/// Handle returned by `SessionStore::subscribe`
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Remove the listener now
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the listener registered for the lifetime of the store
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(store) = self.store.upgrade() {
            lock(&store.listeners).remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
