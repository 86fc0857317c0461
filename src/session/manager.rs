//! Session Manager - Client-side Session Lifecycle
//!
//! This module provides the `SessionManager`, the only writer of the
//! `SessionStore`. It owns the identity provider seam, the persisted access
//! token and the background tasks that keep both in sync with the provider.
//!
//! ## Organization
//!
//! 1. **Structure** - Shared internals and construction
//! 2. **Bootstrap** - One-time startup check
//! 3. **Public Operations** - login, register, logout, refresh, profile update
//! 4. **Adoption** - The single funnel every state change goes through
//! 5. **Background Work** - Refresh timer, visibility listener, reconciler
//! 6. **Accessors** - Read-only views for consumers
//! 7. **Tests**

use super::navigation::NavigationDeferrer;
use super::reconciler;
use super::refresh::RefreshScheduler;
use super::store::{SessionState, SessionStore, Subscription};
use super::task::TaskSlot;
use super::token_store::TokenStore;
use super::visibility::VisibilityRevalidator;
use crate::models::user::merge_identity;
use crate::models::{
    AuthError, AuthUser, ProfileUpdate, ProviderUser, Session, SignUpOutcome, SignUpProfile,
    Visibility,
};
use crate::provider::IdentityProvider;
use crate::settings::SessionSettings;
use crate::utils::jwt;
use crate::utils::logging::LoggingHelper;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

// =============================================================================
// 1. Structure
// =============================================================================

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client-side authentication lifecycle
///
/// Cloning is cheap and every clone drives the same session. Background
/// tasks only hold weak references, so they stop once the last clone is
/// dropped.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    me: Weak<ManagerInner>,
    provider: Arc<dyn IdentityProvider>,
    token_store: Arc<dyn TokenStore>,
    settings: SessionSettings,
    store: SessionStore,
    navigation: NavigationDeferrer,
    refresh: RefreshScheduler,
    visibility: VisibilityRevalidator,
    current: Mutex<Option<Session>>,
    // Serializes adoptions so the last one to complete wins
    adopt_lock: Mutex<()>,
    bootstrapped: AtomicBool,
    // Once set, adoptions still update state but start no background work
    shut_down: AtomicBool,
    reconciler: TaskSlot,
}

impl SessionManager {
    /// Create a manager; nothing happens until `initialize` is awaited
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        token_store: Arc<dyn TokenStore>,
        settings: SessionSettings,
    ) -> Self {
        let refresh = RefreshScheduler::new(
            settings.refresh_check_interval(),
            settings.refresh_buffer(),
        );
        let inner = Arc::new_cyclic(|me| ManagerInner {
            me: me.clone(),
            provider,
            token_store,
            settings,
            store: SessionStore::new(),
            navigation: NavigationDeferrer::new(),
            refresh,
            visibility: VisibilityRevalidator::new(),
            current: Mutex::new(None),
            adopt_lock: Mutex::new(()),
            bootstrapped: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            reconciler: TaskSlot::default(),
        });
        Self { inner }
    }

    // =========================================================================
    // 2. Bootstrap
    // =========================================================================

    /// Resolve the startup session and start listening for provider events
    ///
    /// Runs once per manager; later calls log a warning and return the
    /// current state. Provider failures degrade to logged out and are never
    /// returned. `initialized` is true once this settles, whatever the outcome.
    pub async fn initialize(&self) -> SessionState {
        let inner = &self.inner;
        if inner.bootstrapped.swap(true, Ordering::SeqCst) {
            log::warn!("Session manager already initialized, ignoring repeated bootstrap");
            return self.state();
        }

        // Subscribe before asking for the session so no event slips between
        inner.start_reconciler();

        let bootstrap = inner.store.begin_bootstrap();
        log::debug!("Checking {} for an existing session", inner.provider.name());
        match inner.provider.get_session().await {
            Ok(session) => inner.adopt(session, "bootstrap"),
            Err(err) => {
                LoggingHelper::log_bootstrap_failure(&err);
                inner.adopt(None, "bootstrap failure");
            }
        }
        drop(bootstrap);

        let state = self.state();
        LoggingHelper::log_bootstrap_result(state.user.as_ref());
        state
    }

    // =========================================================================
    // 3. Public Operations
    // =========================================================================

    /// Sign in with an identifier (email or phone) and secret
    ///
    /// Navigation after a successful login is left to the caller.
    ///
    /// # Errors
    /// Returns the provider error; the stored token is cleared in that case
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<AuthUser, AuthError> {
        let inner = &self.inner;
        let _loading = inner.store.begin_loading();

        match inner.provider.sign_in_with_password(identifier, secret).await {
            Ok(session) => {
                let user = AuthUser::from_provider(&session.user);
                inner.adopt(Some(session), "login");
                Ok(user)
            }
            Err(err) => {
                log::warn!("Login failed: {err}");
                inner.adopt(None, "login failure");
                Err(err.into())
            }
        }
    }

    /// Create an account with profile metadata
    ///
    /// A session is established only when the provider hands one back; when
    /// verification is required the outcome says so and nothing changes.
    ///
    /// # Errors
    /// Returns the provider error when the sign-up is refused
    pub async fn register(
        &self,
        identifier: &str,
        secret: &str,
        profile: &SignUpProfile,
    ) -> Result<SignUpOutcome, AuthError> {
        let inner = &self.inner;
        let _loading = inner.store.begin_loading();

        let outcome = inner
            .provider
            .sign_up(identifier, secret, profile.to_metadata())
            .await
            .map_err(|err| {
                log::warn!("Registration failed: {err}");
                err
            })?;

        match &outcome.session {
            Some(session) => inner.adopt(Some(session.clone()), "registration"),
            None => log::info!("📧 Registration pending confirmation, no session established"),
        }
        Ok(outcome)
    }

    /// Sign out and redirect to the login path
    ///
    /// Local state is cleared and the navigation requested even when the
    /// provider call fails.
    ///
    /// # Errors
    /// Returns the provider's sign-out error after local state was cleared
    pub async fn logout(&self) -> Result<(), AuthError> {
        let inner = &self.inner;
        let loading = inner.store.begin_loading();

        let result = inner.provider.sign_out().await;
        if let Err(err) = &result {
            log::warn!("Provider sign-out failed, clearing local session anyway: {err}");
        }

        inner.adopt(None, "logout");
        drop(loading);
        inner.navigation.request_navigation(&inner.settings.login_path);

        result.map_err(AuthError::from)
    }

    /// Re-validate the session against the provider
    ///
    /// # Errors
    /// Returns transient provider errors; the current session is kept then
    pub async fn refresh_user(&self) -> Result<Option<AuthUser>, AuthError> {
        self.inner.refresh_user().await
    }

    /// Submit profile changes and re-adopt the session with the result
    ///
    /// # Errors
    /// Returns `AuthError::NotAuthenticated` without a session, otherwise
    /// the provider error
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<AuthUser, AuthError> {
        let inner = &self.inner;
        if inner.session().is_none() {
            return Err(AuthError::NotAuthenticated);
        }

        let _loading = inner.store.begin_loading();
        let updated = inner.provider.update_user(update).await?;

        // A logout may have completed while the update was in flight
        let session = inner.session().ok_or(AuthError::NotAuthenticated)?;
        let user = AuthUser::from_provider(&updated);
        inner.adopt(Some(session.with_user(updated)), "profile update");
        Ok(user)
    }

    /// Stop every background task; safe to call more than once
    ///
    /// Final for this manager: operations that complete afterwards still
    /// update the state but never restart the timer or listeners.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        // Adoptions arm under this lock, so none can slip in after the disarm
        let _adopting = lock(&inner.adopt_lock);
        inner.shut_down.store(true, Ordering::SeqCst);
        let reconciler = inner.reconciler.cancel();
        let refresh = inner.refresh.disarm();
        let visibility = inner.visibility.disarm();
        if reconciler || refresh || visibility {
            log::info!("🛑 Session manager shut down");
        }
    }

    // =========================================================================
    // 6. Accessors
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.store.state()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// See `SessionStore::subscribe`
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(listener)
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.store.watch()
    }

    pub fn register_navigator<F>(&self, navigator: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.navigation.register_navigator(navigator);
    }

    pub fn request_navigation(&self, path: &str) {
        self.inner.navigation.request_navigation(path);
    }

    /// Report host visibility; a return to Visible re-validates the session
    pub fn set_visibility(&self, visibility: Visibility) {
        self.inner.visibility.set_visibility(visibility);
    }

    /// Currently adopted session
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.session()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner.session().map(|session| session.access_token)
    }

    #[must_use]
    pub fn is_refresh_armed(&self) -> bool {
        self.inner.refresh.state() == super::refresh::RefreshState::Armed
    }

    /// Number of refresh timers created over the manager's lifetime
    #[must_use]
    pub fn refresh_timers_started(&self) -> usize {
        self.inner.refresh.timers_started()
    }

    #[must_use]
    pub fn is_revalidation_armed(&self) -> bool {
        self.inner.visibility.is_armed()
    }
}

impl ManagerInner {
    pub(crate) fn session(&self) -> Option<Session> {
        lock(&self.current).clone()
    }

    pub(crate) async fn refresh_user(&self) -> Result<Option<AuthUser>, AuthError> {
        let _loading = self.store.begin_loading();

        let outcome = match self.provider.get_user().await {
            Ok(Some(user)) => self
                .provider
                .get_session()
                .await
                .map(|session| session.map(|session| session.with_user(user))),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(Some(session)) => {
                let user = AuthUser::from_provider(&session.user);
                self.adopt(Some(session), "user refresh");
                Ok(Some(user))
            }
            Ok(None) => {
                self.adopt(None, "user refresh");
                Ok(None)
            }
            Err(err) if err.is_session_gone() => {
                self.adopt(None, "user refresh");
                Ok(None)
            }
            Err(err) => {
                LoggingHelper::log_background_failure("user refresh", &err);
                Err(err.into())
            }
        }
    }

    // =========================================================================
    // 4. Adoption
    // =========================================================================

    /// Fold a provider session, or its absence, into local state
    pub(crate) fn adopt(&self, session: Option<Session>, source: &str) {
        let _adopting = lock(&self.adopt_lock);
        self.adopt_locked(session, source);
    }

    /// Merge a partial identity payload into the current session's user
    pub(crate) fn merge_user_update(&self, incoming: &ProviderUser, source: &str) {
        let _adopting = lock(&self.adopt_lock);
        let Some(current) = self.session() else {
            log::info!("Ignoring {source}: no user is signed in");
            return;
        };

        let merged = merge_identity(&current.user, incoming);
        self.adopt_locked(Some(current.with_user(merged)), source);
    }

    fn adopt_locked(&self, session: Option<Session>, source: &str) {
        match session {
            Some(session) => {
                let user = AuthUser::from_provider(&session.user);
                match self.token_store.save(&session.access_token) {
                    Ok(()) => log::debug!("Stored access token {}", jwt::redact(&session.access_token)),
                    Err(err) => LoggingHelper::log_token_store_failure("save", &err),
                }
                *lock(&self.current) = Some(session);
                self.store.update(|state| state.user = Some(user.clone()));
                LoggingHelper::log_session_adopted(&user, source);
                self.arm_background();
            }
            None => {
                if let Err(err) = self.token_store.clear() {
                    LoggingHelper::log_token_store_failure("clear", &err);
                }
                let previous = lock(&self.current).take();
                self.store.update(|state| state.user = None);
                self.disarm_background();
                if previous.is_some() {
                    LoggingHelper::log_session_cleared(source);
                }
            }
        }
    }

    // =========================================================================
    // 5. Background Work
    // =========================================================================

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn start_reconciler(&self) {
        if self.is_shut_down() {
            return;
        }
        let events = self.provider.subscribe();
        let me = self.me.clone();
        self.reconciler
            .spawn_if_idle(move || reconciler::run(me, events));
    }

    fn arm_background(&self) {
        if self.is_shut_down() {
            log::debug!("Session manager shut down, background work stays stopped");
            return;
        }
        let me = self.me.clone();
        self.refresh.arm(move || {
            let me = me.clone();
            async move {
                let Some(inner) = me.upgrade() else {
                    return false;
                };
                inner.refresh_tick().await;
                true
            }
        });

        let me = self.me.clone();
        self.visibility.arm(move || {
            let me = me.clone();
            async move {
                let Some(inner) = me.upgrade() else {
                    return false;
                };
                // Failures are already logged by refresh_user
                let _ = inner.refresh_user().await;
                true
            }
        });
    }

    fn disarm_background(&self) {
        self.refresh.disarm();
        self.visibility.disarm();
    }

    /// One refresh check; failures never clear the session
    async fn refresh_tick(&self) {
        let Some(token) = self.session().map(|session| session.access_token) else {
            return;
        };
        if !self.refresh.is_due(&token, Utc::now()) {
            return;
        }

        log::info!("🔄 Access token close to expiry, refreshing");
        match self.provider.refresh_session().await {
            Ok(session) => self.adopt(Some(session), "token refresh"),
            Err(err) => LoggingHelper::log_background_failure("token refresh", &err),
        }
    }
}

// =============================================================================
// 7. Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthEvent, ProviderError};
    use crate::session::token_store::MemoryTokenStore;
    use crate::testing::{wait_until, MockIdentityProvider, TestFixtures, TestUserBuilder};
    use std::time::Duration;

    fn setup() -> (SessionManager, Arc<MockIdentityProvider>, Arc<MemoryTokenStore>) {
        let provider = Arc::new(MockIdentityProvider::new());
        let tokens = Arc::new(MemoryTokenStore::new());
        let manager = SessionManager::new(
            provider.clone(),
            tokens.clone(),
            SessionSettings::default(),
        );
        (manager, provider, tokens)
    }

    #[tokio::test]
    async fn test_bootstrap_without_session() {
        let (manager, provider, tokens) = setup();

        let state = manager.initialize().await;

        assert_eq!(
            state,
            SessionState {
                user: None,
                loading: false,
                initialized: true,
            }
        );
        assert_eq!(provider.calls().get_session, 1);
        assert!(tokens.token().is_none());
        assert!(!manager.is_refresh_armed());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_degrades_to_logged_out() {
        let (manager, provider, tokens) = setup();
        tokens.save("stale-token").unwrap();
        provider.fail_get_session(ProviderError::InvalidResponse("boom".to_string()));

        let state = manager.initialize().await;

        assert!(state.user.is_none());
        assert!(state.initialized);
        assert!(!state.loading);
        assert!(tokens.token().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_adopts_existing_session() {
        let (manager, provider, tokens) = setup();
        let session = TestFixtures::session("user-1", "ana@example.com");
        provider.set_session(Some(session.clone()));

        let state = manager.initialize().await;

        assert_eq!(state.user.map(|u| u.id).as_deref(), Some("user-1"));
        assert_eq!(tokens.token(), Some(session.access_token));
        assert!(manager.is_refresh_armed());
        assert!(manager.is_revalidation_armed());
    }

    #[tokio::test]
    async fn test_second_initialize_is_ignored() {
        let (manager, provider, _) = setup();

        manager.initialize().await;
        manager.initialize().await;

        assert_eq!(provider.calls().get_session, 1);
        assert!(manager.state().initialized);
    }

    #[tokio::test]
    async fn test_login_success_and_failure() {
        let (manager, provider, tokens) = setup();
        manager.initialize().await;

        let user = manager.login("ana@example.com", "secret").await.unwrap();
        assert_eq!(user.email.as_deref(), Some("ana@example.com"));
        assert!(manager.is_authenticated());
        assert!(tokens.token().is_some());

        provider.fail_sign_in(ProviderError::Api {
            status: 400,
            message: "Invalid login credentials".to_string(),
        });
        let err = manager.login("ana@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid login credentials");
        assert!(tokens.token().is_none());
        assert!(!manager.is_authenticated());
        assert!(!manager.state().loading);
    }

    #[tokio::test]
    async fn test_register_with_and_without_confirmation() {
        let (manager, provider, _) = setup();
        manager.initialize().await;
        let profile = SignUpProfile {
            first_name: Some("Ana".to_string()),
            last_name: Some("Souza".to_string()),
            ..Default::default()
        };

        provider.require_confirmation(true);
        let outcome = manager
            .register("ana@example.com", "secret", &profile)
            .await
            .unwrap();
        assert!(outcome.requires_confirmation());
        assert!(!manager.is_authenticated());

        provider.require_confirmation(false);
        let outcome = manager
            .register("ana@example.com", "secret", &profile)
            .await
            .unwrap();
        assert!(!outcome.requires_confirmation());
        assert_eq!(
            manager.state().user.map(|u| u.name).as_deref(),
            Some("Ana Souza")
        );
        assert_eq!(
            provider.last_sign_up_metadata().get("first_name"),
            Some(&serde_json::json!("Ana"))
        );
    }

    #[tokio::test]
    async fn test_register_failure_leaves_state_untouched() {
        let (manager, provider, tokens) = setup();
        manager.initialize().await;
        let before = manager.state();

        provider.fail_sign_up(ProviderError::Api {
            status: 422,
            message: "User already registered".to_string(),
        });
        let err = manager
            .register("ana@example.com", "secret", &SignUpProfile::default())
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "User already registered");
        assert_eq!(manager.state(), before);
        assert!(!manager.state().loading);
        assert!(tokens.token().is_none());
        assert!(!manager.is_refresh_armed());
    }

    #[tokio::test]
    async fn test_logout_clears_state_when_provider_fails() {
        let (manager, provider, tokens) = setup();
        manager.initialize().await;
        manager.login("ana@example.com", "secret").await.unwrap();

        let navigations = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&navigations);
        manager.register_navigator(move |path| sink.lock().unwrap().push(path.to_string()));

        provider.fail_sign_out(ProviderError::InvalidResponse("offline".to_string()));
        assert!(manager.logout().await.is_err());

        assert!(manager.state().user.is_none());
        assert!(tokens.token().is_none());
        assert!(!manager.is_refresh_armed());
        assert!(!manager.is_revalidation_armed());
        assert_eq!(*navigations.lock().unwrap(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_logout_before_navigator_is_deferred() {
        let (manager, _, _) = setup();
        manager.initialize().await;
        manager.logout().await.unwrap();

        let navigations = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&navigations);
        manager.register_navigator(move |path| sink.lock().unwrap().push(path.to_string()));
        assert_eq!(*navigations.lock().unwrap(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_adopting_same_session_twice_keeps_one_timer() {
        let (manager, _, _) = setup();
        let session = TestFixtures::session("user-1", "ana@example.com");

        manager.inner.adopt(Some(session.clone()), "test");
        let first = manager.state().user;
        manager.inner.adopt(Some(session), "test");

        assert_eq!(manager.state().user, first);
        assert_eq!(manager.refresh_timers_started(), 1);
    }

    #[tokio::test]
    async fn test_refresh_user_outcomes() {
        let (manager, provider, tokens) = setup();
        manager.initialize().await;
        manager.login("ana@example.com", "secret").await.unwrap();

        provider.set_user(Some(
            TestUserBuilder::new("user-1")
                .email("ana@example.com")
                .metadata("full_name", "Ana Souza")
                .build(),
        ));
        let user = manager.refresh_user().await.unwrap();
        assert_eq!(user.map(|u| u.name).as_deref(), Some("Ana Souza"));

        provider.fail_get_user(ProviderError::InvalidResponse("timeout".to_string()));
        assert!(manager.refresh_user().await.is_err());
        assert!(manager.is_authenticated());

        provider.fail_get_user(ProviderError::Api {
            status: 401,
            message: "JWT expired".to_string(),
        });
        assert!(manager.refresh_user().await.unwrap().is_none());
        assert!(!manager.is_authenticated());
        assert!(tokens.token().is_none());
    }

    #[tokio::test]
    async fn test_update_profile_requires_session() {
        let (manager, provider, _) = setup();
        manager.initialize().await;

        let update = ProfileUpdate::default().with_data("full_name", "Ana Souza");
        assert!(matches!(
            manager.update_profile(&update).await,
            Err(AuthError::NotAuthenticated)
        ));
        assert_eq!(provider.calls().update_user, 0);

        manager.login("ana@example.com", "secret").await.unwrap();
        let user = manager.update_profile(&update).await.unwrap();
        assert_eq!(user.name, "Ana Souza");
        assert_eq!(
            manager.state().user.map(|u| u.name).as_deref(),
            Some("Ana Souza")
        );
    }

    #[tokio::test]
    async fn test_update_profile_failure_keeps_current_user() {
        let (manager, provider, tokens) = setup();
        manager.initialize().await;
        manager.login("ana@example.com", "secret").await.unwrap();
        let before = manager.state();
        let token_before = tokens.token();

        provider.fail_update_user(ProviderError::Api {
            status: 422,
            message: "Email address is invalid".to_string(),
        });
        let update = ProfileUpdate::default().with_data("full_name", "Ana Souza");
        let err = manager.update_profile(&update).await.unwrap_err();

        assert!(matches!(err, AuthError::Provider(ProviderError::Api { status: 422, .. })));
        assert_eq!(manager.state(), before);
        assert!(!manager.state().loading);
        assert_eq!(tokens.token(), token_before);
        assert!(manager.is_refresh_armed());
    }

    #[tokio::test]
    async fn test_update_profile_loses_to_logout_in_flight() {
        let (manager, provider, tokens) = setup();
        manager.initialize().await;
        manager.login("ana@example.com", "secret").await.unwrap();

        let gate = provider.delay_update_user();
        let pending = tokio::spawn({
            let manager = manager.clone();
            async move {
                let update = ProfileUpdate::default().with_data("full_name", "Ana Souza");
                manager.update_profile(&update).await
            }
        });
        assert!(wait_until(|| provider.calls().update_user == 1).await);

        manager.logout().await.unwrap();
        gate.notify_one();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
        assert!(manager.state().user.is_none());
        assert!(!manager.state().loading);
        assert!(tokens.token().is_none());
        assert!(!manager.is_refresh_armed());
    }

    #[tokio::test]
    async fn test_loading_released_after_operations() {
        let (manager, _, _) = setup();
        manager.initialize().await;
        manager.login("ana@example.com", "secret").await.unwrap();
        let _ = manager.refresh_user().await;
        manager.logout().await.unwrap();

        let state = manager.state();
        assert!(!state.loading);
        assert!(state.initialized);
        assert_eq!(state.is_authenticated(), state.user.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_refreshes_token_close_to_expiry() {
        let (manager, provider, tokens) = setup();
        let mut session = TestFixtures::session("user-1", "ana@example.com");
        session.access_token = TestFixtures::access_token_expiring_in(chrono::Duration::minutes(4));
        let expiring = session.access_token.clone();
        provider.set_session(Some(session.clone()));
        manager.inner.adopt(Some(session), "test");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.calls().refresh_session, 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(wait_until(|| provider.calls().refresh_session == 1).await);
        assert!(wait_until(|| tokens.token().is_some_and(|t| t != expiring)).await);
        assert!(manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_refresh_failure_keeps_session() {
        let (manager, provider, _) = setup();
        let mut session = TestFixtures::session("user-1", "ana@example.com");
        session.access_token = TestFixtures::access_token_expiring_in(chrono::Duration::minutes(2));
        manager.inner.adopt(Some(session), "test");
        provider.fail_refresh(ProviderError::InvalidResponse("offline".to_string()));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(wait_until(|| provider.calls().refresh_session == 1).await);
        assert!(manager.is_authenticated());
        assert!(manager.is_refresh_armed());
    }

    #[tokio::test]
    async fn test_huge_check_interval_keeps_refresh_armed() {
        let settings = SessionSettings {
            refresh_check_interval_secs: u64::MAX,
            ..SessionSettings::default()
        };
        let (manager, _, _) = TestFixtures::manager_with_settings(settings);
        manager.initialize().await;
        manager.login("ana@example.com", "secret").await.unwrap();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(manager.is_refresh_armed());
    }

    #[tokio::test]
    async fn test_shutdown_is_final() {
        let (manager, provider, _) = setup();
        manager.initialize().await;
        manager.shutdown();

        manager.login("ana@example.com", "secret").await.unwrap();
        assert!(manager.is_authenticated());
        assert!(!manager.is_refresh_armed());
        assert!(!manager.is_revalidation_armed());

        // The reconciler stays down too
        provider.emit(AuthEvent::signed_out());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(manager.is_authenticated());

        manager.set_visibility(Visibility::Hidden);
        manager.set_visibility(Visibility::Visible);
        let _ = manager.refresh_user().await;
        assert!(!manager.is_refresh_armed());
        assert_eq!(manager.refresh_timers_started(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (manager, _, _) = setup();
        manager.initialize().await;
        manager.login("ana@example.com", "secret").await.unwrap();

        manager.shutdown();
        manager.shutdown();

        assert!(!manager.is_refresh_armed());
        assert!(!manager.is_revalidation_armed());
        assert!(manager.is_authenticated());
    }
}
