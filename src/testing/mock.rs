//! Mock identity provider for testing
//!
//! The mock answers immediately from in-memory state. Failures are armed one
//! call at a time and events are only broadcast when a test calls `emit`, so
//! tests stay deterministic.

use super::builders::{TestSessionBuilder, TestUserBuilder};
use super::constants::TEST_USER_ID;
use crate::models::{
    AuthEvent, ProfileUpdate, ProviderError, ProviderUser, Session, SignUpOutcome,
};
use crate::provider::IdentityProvider;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, Notify};

/// Number of calls made to each provider operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub get_session: usize,
    pub sign_in: usize,
    pub sign_up: usize,
    pub sign_out: usize,
    pub get_user: usize,
    pub update_user: usize,
    pub refresh_session: usize,
}

#[derive(Default)]
struct MockState {
    session: Option<Session>,
    user_override: Option<ProviderUser>,
    require_confirmation: bool,
    last_sign_up_metadata: Map<String, Value>,
    calls: MockCalls,
    fail_get_session: Option<ProviderError>,
    fail_sign_in: Option<ProviderError>,
    fail_sign_up: Option<ProviderError>,
    fail_sign_out: Option<ProviderError>,
    fail_get_user: Option<ProviderError>,
    fail_update_user: Option<ProviderError>,
    fail_refresh: Option<ProviderError>,
    update_user_gate: Option<Arc<Notify>>,
}

/// In-memory `IdentityProvider` with programmable responses
pub struct MockIdentityProvider {
    state: Mutex<MockState>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityProvider {
    fn apply_update(
        state: &mut MockState,
        update: &ProfileUpdate,
    ) -> Result<ProviderUser, ProviderError> {
        if let Some(err) = state.fail_update_user.take() {
            return Err(err);
        }

        let session = state.session.as_mut().ok_or(ProviderError::SessionMissing)?;
        let user = &mut session.user;
        if let Some(email) = &update.email {
            user.email = Some(email.clone());
        }
        if let Some(phone) = &update.phone {
            user.phone = Some(phone.clone());
        }
        for (key, value) in &update.data {
            user.user_metadata.insert(key.clone(), value.clone());
        }
        Ok(user.clone())
    }

    /// Capacity of the event channel; emitting more without a reader lags it
    pub const EVENT_CAPACITY: usize = 16;

    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(Self::EVENT_CAPACITY);
        Self {
            state: Mutex::new(MockState::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcast an event to every subscriber
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    /// Replace the provider-side session
    pub fn set_session(&self, session: Option<Session>) {
        self.lock().session = session;
    }

    /// Answer `get_user` with this identity instead of the session's user
    pub fn set_user(&self, user: Option<ProviderUser>) {
        self.lock().user_override = user;
    }

    /// Whether sign-ups come back without a session
    pub fn require_confirmation(&self, required: bool) {
        self.lock().require_confirmation = required;
    }

    #[must_use]
    pub fn calls(&self) -> MockCalls {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn last_sign_up_metadata(&self) -> Map<String, Value> {
        self.lock().last_sign_up_metadata.clone()
    }

    /// Fail the next `get_session` call
    pub fn fail_get_session(&self, err: ProviderError) {
        self.lock().fail_get_session = Some(err);
    }

    /// Fail the next `sign_in_with_password` call
    pub fn fail_sign_in(&self, err: ProviderError) {
        self.lock().fail_sign_in = Some(err);
    }

    /// Fail the next `sign_up` call
    pub fn fail_sign_up(&self, err: ProviderError) {
        self.lock().fail_sign_up = Some(err);
    }

    /// Fail the next `sign_out` call; the mock session is cleared anyway
    pub fn fail_sign_out(&self, err: ProviderError) {
        self.lock().fail_sign_out = Some(err);
    }

    /// Fail the next `get_user` call
    pub fn fail_get_user(&self, err: ProviderError) {
        self.lock().fail_get_user = Some(err);
    }

    /// Fail the next `update_user` call
    pub fn fail_update_user(&self, err: ProviderError) {
        self.lock().fail_update_user = Some(err);
    }

    /// Hold the next `update_user` reply until the returned gate is notified
    ///
    /// The update itself is applied when the call arrives; only the answer
    /// is delayed, like a response still on the wire.
    #[must_use]
    pub fn delay_update_user(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().update_user_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Fail the next `refresh_session` call
    pub fn fail_refresh(&self, err: ProviderError) {
        self.lock().fail_refresh = Some(err);
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        let mut state = self.lock();
        state.calls.get_session += 1;
        if let Some(err) = state.fail_get_session.take() {
            return Err(err);
        }
        Ok(state.session.clone())
    }

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        _secret: &str,
    ) -> Result<Session, ProviderError> {
        let mut state = self.lock();
        state.calls.sign_in += 1;
        if let Some(err) = state.fail_sign_in.take() {
            return Err(err);
        }

        let session = TestSessionBuilder::new()
            .user(
                TestUserBuilder::new(TEST_USER_ID)
                    .email(identifier)
                    .confirmed()
                    .build(),
            )
            .token_id(&format!("sign-in-{}", state.calls.sign_in))
            .build();
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(
        &self,
        identifier: &str,
        _secret: &str,
        metadata: Map<String, Value>,
    ) -> Result<SignUpOutcome, ProviderError> {
        let mut state = self.lock();
        state.calls.sign_up += 1;
        if let Some(err) = state.fail_sign_up.take() {
            return Err(err);
        }
        state.last_sign_up_metadata = metadata.clone();

        let mut user = TestUserBuilder::new(TEST_USER_ID).email(identifier).build();
        user.user_metadata = metadata;

        if state.require_confirmation {
            return Ok(SignUpOutcome {
                user: Some(user),
                session: None,
            });
        }

        let session = TestSessionBuilder::new()
            .user(user.clone())
            .token_id(&format!("sign-up-{}", state.calls.sign_up))
            .build();
        state.session = Some(session.clone());
        Ok(SignUpOutcome {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.calls.sign_out += 1;
        state.session = None;
        state.user_override = None;
        match state.fail_sign_out.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn get_user(&self) -> Result<Option<ProviderUser>, ProviderError> {
        let mut state = self.lock();
        state.calls.get_user += 1;
        if let Some(err) = state.fail_get_user.take() {
            return Err(err);
        }
        Ok(state
            .user_override
            .clone()
            .or_else(|| state.session.as_ref().map(|session| session.user.clone())))
    }

    async fn update_user(&self, update: &ProfileUpdate) -> Result<ProviderUser, ProviderError> {
        let (result, gate) = {
            let mut state = self.lock();
            state.calls.update_user += 1;
            let gate = state.update_user_gate.take();
            (Self::apply_update(&mut state, update), gate)
        };

        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let mut state = self.lock();
        state.calls.refresh_session += 1;
        if let Some(err) = state.fail_refresh.take() {
            return Err(err);
        }

        let current = state.session.clone().ok_or(ProviderError::SessionMissing)?;
        let refreshed = TestSessionBuilder::new()
            .user(current.user)
            .token_id(&format!("refresh-{}", state.calls.refresh_session))
            .build();
        state.session = Some(refreshed.clone());
        Ok(refreshed)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
