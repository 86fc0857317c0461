//! Assertion helpers for session state
//!
//! These helpers make lifecycle tests read as statements about the state a
//! consumer would observe.

use crate::session::token_store::TokenStore;
use crate::session::SessionState;

/// Assert that no user is signed in
///
/// # Panics
///
/// Panics if the state carries a user.
pub fn assert_logged_out(state: &SessionState) {
    assert!(
        state.user.is_none(),
        "Expected no user, found {:?}",
        state.user.as_ref().map(|user| &user.id)
    );
    assert!(!state.is_authenticated());
}

/// Assert that the given user is signed in
///
/// # Panics
///
/// Panics if no user or a different user is signed in.
pub fn assert_signed_in_as(state: &SessionState, user_id: &str) {
    match &state.user {
        Some(user) => assert_eq!(user.id, user_id, "Signed in as the wrong user"),
        None => panic!("Expected {user_id} to be signed in, found no user"),
    }
    assert!(state.is_authenticated());
}

/// Assert that bootstrap finished and nothing is in flight
///
/// # Panics
///
/// Panics if the state is still loading or was never initialized.
pub fn assert_settled(state: &SessionState) {
    assert!(state.initialized, "Session was never initialized");
    assert!(!state.loading, "An operation is still in flight");
}

/// Assert that the token store is empty
///
/// # Panics
///
/// Panics if a token is stored or the store cannot be read.
pub fn assert_no_stored_token(store: &dyn TokenStore) {
    let token = store.load().expect("token store should be readable");
    assert!(token.is_none(), "Expected no stored token");
}
