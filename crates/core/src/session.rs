//! Session state and route gating.
//!
//! [`SessionContext`] is constructed once at startup and passed by reference to whatever
//! needs the current user. It listens to the provider's session-changed stream and moves
//! from [`SessionState::Unknown`] to `Authenticated` or `Unauthenticated` on the first event
//! it receives; after that the state only changes on login, register, logout or expiry.
//!
//! [`gate`] decides what a route shows for a given state:
//!
//! | state             | public route | protected route   |
//! |-------------------|--------------|-------------------|
//! | `Unknown`         | render       | loading           |
//! | `Unauthenticated` | render       | redirect to login |
//! | `Authenticated`   | render       | render            |
//!
//! Authenticated users are not redirected away from login or register.

use crate::auth::{AuthError, AuthProvider, AuthResult, AuthUser, Credentials};
use crate::cancel::CallScope;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No provider event received yet.
    Unknown,
    Authenticated(AuthUser),
    Unauthenticated,
}

impl SessionState {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Reads a provider event. A user whose token has already expired counts as signed out.
    fn from_event(user: Option<AuthUser>, now: DateTime<Utc>) -> Self {
        match user {
            Some(user) if !user.is_expired(now) => SessionState::Authenticated(user),
            _ => SessionState::Unauthenticated,
        }
    }
}

/// Navigable views of the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    PatientList,
    AddPatient,
    EditPatient(String),
    PatientDetail(String),
    CustomFields,
    NotFound(String),
}

impl Route {
    /// Resolves a view path such as `/edit/abc123`. Unknown paths become
    /// [`Route::NotFound`].
    pub fn parse(path: &str) -> Route {
        let trimmed = path.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        match segments.as_slice() {
            [] => Route::PatientList,
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            ["add"] => Route::AddPatient,
            ["edit", id] => Route::EditPatient((*id).to_string()),
            ["details", id] => Route::PatientDetail((*id).to_string()),
            ["custom-fields"] => Route::CustomFields,
            _ => Route::NotFound(path.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".into(),
            Route::Register => "/register".into(),
            Route::PatientList => "/".into(),
            Route::AddPatient => "/add".into(),
            Route::EditPatient(id) => format!("/edit/{id}"),
            Route::PatientDetail(id) => format!("/details/{id}"),
            Route::CustomFields => "/custom-fields".into(),
            Route::NotFound(path) => path.clone(),
        }
    }

    /// Only login and register are reachable without a session.
    pub fn is_public(&self) -> bool {
        matches!(self, Route::Login | Route::Register)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Session not yet known; show a loading indicator.
    Loading,
    Render,
    RedirectToLogin,
}

pub fn gate(route: &Route, state: &SessionState) -> GateDecision {
    if route.is_public() {
        return GateDecision::Render;
    }
    match state {
        SessionState::Unknown => GateDecision::Loading,
        SessionState::Authenticated(_) => GateDecision::Render,
        SessionState::Unauthenticated => GateDecision::RedirectToLogin,
    }
}

/// Resolves a bearer token to a session state, for surfaces that authenticate per request.
pub async fn resolve_bearer(provider: &dyn AuthProvider, token: Option<&str>) -> SessionState {
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        return SessionState::Unauthenticated;
    };
    match provider.verify_token(token).await {
        Ok(user) if !user.is_expired(Utc::now()) => SessionState::Authenticated(user),
        Ok(_) => SessionState::Unauthenticated,
        Err(e) => {
            tracing::debug!("bearer token rejected: {}", e);
            SessionState::Unauthenticated
        }
    }
}

/// Process-wide session derived from an [`AuthProvider`].
pub struct SessionContext {
    provider: Arc<dyn AuthProvider>,
    state: Arc<watch::Sender<SessionState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("provider", &self.provider.provider_name())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl SessionContext {
    /// Starts listening to `provider`. Must be called inside a Tokio runtime.
    pub fn start(provider: Arc<dyn AuthProvider>) -> Self {
        let (tx, _rx) = watch::channel(SessionState::Unknown);
        let state = Arc::new(tx);
        let mut events = provider.subscribe();
        let listener_state = state.clone();

        let listener = tokio::spawn(async move {
            loop {
                let next =
                    SessionState::from_event(events.borrow_and_update().clone(), Utc::now());
                listener_state.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    if *current == SessionState::Unknown {
                        tracing::info!("session resolved: authenticated={}", next.user().is_some());
                    }
                    *current = next;
                    true
                });
                if events.changed().await.is_err() {
                    break;
                }
            }
        });

        Self {
            provider,
            state,
            listener: Mutex::new(Some(listener)),
        }
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().user().cloned()
    }

    /// Waits for the first provider event and returns the resolved state.
    pub async fn ready(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        let resolved = rx
            .wait_for(|s| *s != SessionState::Unknown)
            .await
            .map(|s| s.clone());
        resolved.unwrap_or_else(|_| self.state())
    }

    pub fn gate(&self, route: &Route) -> GateDecision {
        gate(route, &self.state.borrow())
    }

    fn set(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    pub async fn login(&self, credentials: &Credentials) -> AuthResult<AuthUser> {
        self.ready().await;
        let user = self.provider.sign_in(credentials).await?;
        tracing::info!("signed in {}", user.uid);
        self.set(SessionState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Creates an account and signs it in. `confirm_password` must equal the password.
    pub async fn register(
        &self,
        credentials: &Credentials,
        confirm_password: &str,
    ) -> AuthResult<AuthUser> {
        credentials.check_confirmation(confirm_password)?;
        self.ready().await;
        let user = self.provider.sign_up(credentials).await?;
        tracing::info!("registered {}", user.uid);
        self.set(SessionState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Signs out the current user. Succeeds when nobody is signed in.
    pub async fn logout(&self) -> AuthResult<()> {
        if let SessionState::Authenticated(user) = self.ready().await {
            self.provider.sign_out(&user).await?;
            tracing::info!("signed out {}", user.uid);
        }
        self.set(SessionState::Unauthenticated);
        Ok(())
    }

    /// Invalidates the session if its token has expired. Returns true if it did.
    pub fn check_expiry(&self, now: DateTime<Utc>) -> bool {
        let expired = matches!(&*self.state.borrow(), SessionState::Authenticated(u) if u.is_expired(now));
        if expired {
            tracing::warn!("session expired");
            self.set(SessionState::Unauthenticated);
        }
        expired
    }

    /// A store call scope acting on behalf of the current user.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] if nobody is signed in
    /// - [`AuthError::SessionExpired`] if the session has expired; the session is ended
    pub fn call_scope(&self) -> AuthResult<CallScope> {
        if self.check_expiry(Utc::now()) {
            return Err(AuthError::SessionExpired);
        }
        match &*self.state.borrow() {
            SessionState::Authenticated(user) => Ok(CallScope::for_user(user)),
            _ => Err(AuthError::NotAuthenticated),
        }
    }

    /// Stops listening to the provider. The current state is kept.
    pub fn shutdown(&self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
