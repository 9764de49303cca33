//! Email/password authentication.
//!
//! [`AuthProvider`] abstracts the identity service. Besides the request/response calls it
//! exposes a session-changed stream through [`AuthProvider::subscribe`]; the
//! [`crate::session::SessionContext`] derives the process-wide session state from it.
//!
//! Providers:
//! - [`LocalAuthProvider`]: users kept in memory or in a local `users.json`
//! - [`FirebaseAuthProvider`]: the hosted identity service over its REST API

use crate::constants::MIN_PASSWORD_LEN;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prm_types::EmailAddress;
use tokio::sync::watch;

pub mod firebase;
pub mod local;

pub use firebase::FirebaseAuthProvider;
pub use local::LocalAuthProvider;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email already in use")]
    EmailInUse,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("session expired")]
    SessionExpired,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("invalid session token")]
    InvalidToken,
    #[error("auth provider error: {0}")]
    Provider(String),
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Message safe to show on the login and register pages.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password.".into(),
            AuthError::EmailInUse => "An account with this email already exists.".into(),
            AuthError::WeakPassword => {
                format!("Password must be at least {MIN_PASSWORD_LEN} characters.")
            }
            AuthError::PasswordMismatch => "Passwords do not match.".into(),
            AuthError::InvalidEmail(_) => "Please enter a valid email address.".into(),
            AuthError::SessionExpired => "Your session has expired. Please log in again.".into(),
            AuthError::NotAuthenticated => "Please log in to continue.".into(),
            AuthError::InvalidToken => "Your session is invalid. Please log in again.".into(),
            AuthError::Unavailable(_) => {
                "The authentication service is unavailable. Please try again.".into()
            }
            AuthError::Provider(_) | AuthError::Io(_) | AuthError::Serialization(_) => {
                "Authentication failed. Please try again.".into()
            }
        }
    }

    /// True when the caller should be sent back to the login page.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AuthError::SessionExpired | AuthError::NotAuthenticated | AuthError::InvalidToken
        )
    }
}

/// An authenticated identity as reported by the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: EmailAddress,
    id_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthUser {
    pub fn new(
        uid: impl Into<String>,
        email: EmailAddress,
        id_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.into(),
            email,
            id_token: id_token.into(),
            expires_at,
        }
    }

    /// Bearer credential for this session.
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for AuthUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthUser")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("id_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Email and password as entered on the login or register form.
#[derive(Clone)]
pub struct Credentials {
    email: EmailAddress,
    password: String,
}

impl Credentials {
    /// Validates the email syntactically. The password is checked by the provider.
    pub fn new(email: &str, password: impl Into<String>) -> AuthResult<Self> {
        let email =
            EmailAddress::parse(email).map_err(|e| AuthError::InvalidEmail(e.to_string()))?;
        Ok(Self {
            email,
            password: password.into(),
        })
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Enforces the minimum password length required at sign-up.
    pub fn check_new_password(&self) -> AuthResult<()> {
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        Ok(())
    }

    /// Checks the register form's confirmation field against the password.
    pub fn check_confirmation(&self, confirm_password: &str) -> AuthResult<()> {
        if self.password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Identity service used by the session layer and the REST middleware.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Short name used in logs.
    fn provider_name(&self) -> &'static str;

    /// Creates an account and signs it in.
    async fn sign_up(&self, credentials: &Credentials) -> AuthResult<AuthUser>;

    async fn sign_in(&self, credentials: &Credentials) -> AuthResult<AuthUser>;

    /// Ends the session of `user`.
    async fn sign_out(&self, user: &AuthUser) -> AuthResult<()>;

    /// Resolves a bearer token to the user it was issued to.
    async fn verify_token(&self, id_token: &str) -> AuthResult<AuthUser>;

    /// Session-changed stream of this process. The current value is the provider's
    /// restored session; every sign-in, sign-up and sign-out publishes a new value.
    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;
}

/// Publisher half of a provider's session-changed stream.
#[derive(Debug)]
pub(crate) struct SessionChannel {
    tx: watch::Sender<Option<AuthUser>>,
}

impl SessionChannel {
    pub(crate) fn new(initial: Option<AuthUser>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub(crate) fn publish(&self, user: Option<AuthUser>) {
        self.tx.send_replace(user);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_credentials_reject_bad_email() {
        let err = Credentials::new("not-an-email", "secret1").expect_err("should fail");
        assert!(matches!(err, AuthError::InvalidEmail(_)));
        assert_eq!(err.user_message(), "Please enter a valid email address.");
    }

    #[test]
    fn test_new_password_minimum_length() {
        let short = Credentials::new("a@example.com", "12345").expect("email should parse");
        assert!(matches!(short.check_new_password(), Err(AuthError::WeakPassword)));
        let ok = Credentials::new("a@example.com", "123456").expect("email should parse");
        assert!(ok.check_new_password().is_ok());
    }

    #[test]
    fn test_confirmation_must_match() {
        let creds = Credentials::new("a@example.com", "secret1").expect("email should parse");
        assert!(creds.check_confirmation("secret1").is_ok());
        let err = creds.check_confirmation("secret2").expect_err("should fail");
        assert_eq!(err.user_message(), "Passwords do not match.");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let email = EmailAddress::parse("a@example.com").expect("email should parse");
        let user = AuthUser::new("u1", email, "super-secret-token", Utc::now());
        let creds = Credentials::new("a@example.com", "hunter22").expect("email should parse");

        assert!(!format!("{user:?}").contains("super-secret-token"));
        assert!(!format!("{creds:?}").contains("hunter22"));
    }

    #[test]
    fn test_user_expiry() {
        let email = EmailAddress::parse("a@example.com").expect("email should parse");
        let now = Utc::now();
        let user = AuthUser::new("u1", email, "t", now + Duration::seconds(60));
        assert!(!user.is_expired(now));
        assert!(user.is_expired(now + Duration::seconds(60)));
    }

    #[test]
    fn test_requires_login() {
        assert!(AuthError::SessionExpired.requires_login());
        assert!(!AuthError::InvalidCredentials.requires_login());
    }
}
