use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};
use crate::filter::Scope;
use crate::gateway::ReportGateway;
use crate::models::{Role, User};

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated(User),
}

impl AuthState {
    pub fn user(&self) -> Result<&User> {
        match self {
            AuthState::Authenticated(user) => Ok(user),
            _ => Err(ReportError::Unauthenticated),
        }
    }
}

/// Messages from the auth collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignInStarted,
    /// Fresh sign-in or a restored session.
    SignedIn(User),
    SignInFailed(String),
    ProfileRefreshed(User),
    SignedOut,
}

pub fn transition(state: &AuthState, event: AuthEvent) -> AuthState {
    match (state, event) {
        (_, AuthEvent::SignedOut) => AuthState::Unauthenticated,
        (_, AuthEvent::SignedIn(user)) => AuthState::Authenticated(user),
        (AuthState::Unauthenticated, AuthEvent::SignInStarted) => AuthState::Authenticating,
        (AuthState::Authenticating, AuthEvent::SignInFailed(reason)) => {
            debug!(%reason, "sign-in failed");
            AuthState::Unauthenticated
        }
        (AuthState::Authenticated(current), AuthEvent::ProfileRefreshed(user))
            if current.id == user.id =>
        {
            AuthState::Authenticated(user)
        }
        (state, event) => {
            warn!(?event, "ignoring auth event in current state");
            state.clone()
        }
    }
}

/// Applies auth events in arrival order and publishes the resolved state.
/// Returns when the event channel closes.
pub async fn run_auth_driver(
    mut events: mpsc::Receiver<AuthEvent>,
    state: watch::Sender<AuthState>,
) {
    while let Some(event) = events.recv().await {
        let next = transition(&state.borrow(), event);
        if let AuthState::Authenticated(user) = &next {
            info!(user_id = %user.id, role = %user.role, "session resolved");
        }
        state.send_replace(next);
    }
}

pub fn auth_channel() -> (
    mpsc::Sender<AuthEvent>,
    mpsc::Receiver<AuthEvent>,
    watch::Sender<AuthState>,
    watch::Receiver<AuthState>,
) {
    let (event_tx, event_rx) = mpsc::channel(16);
    let (state_tx, state_rx) = watch::channel(AuthState::Unauthenticated);
    (event_tx, event_rx, state_tx, state_rx)
}

/// Scope for `user`. Members without a cached kendra fall back to their
/// stored profile; if that has none either, the scope is `Unbound`.
pub async fn resolve_scope<G>(gateway: &G, user: &User) -> Result<Scope>
where
    G: ReportGateway + ?Sized,
{
    match (user.role, user.kendra_id) {
        (Role::Admin, _) => Ok(Scope::Admin),
        (Role::Member, Some(kendra_id)) => Ok(Scope::Member { kendra_id }),
        (Role::Member, None) => {
            let profile = gateway.query_profile(user.id).await?;
            match profile.and_then(|p| p.kendra_id) {
                Some(kendra_id) => Ok(Scope::Member { kendra_id }),
                None => {
                    debug!(user_id = %user.id, "member has no kendra binding");
                    Ok(Scope::Unbound)
                }
            }
        }
    }
}
