//! Local email/password provider.
//!
//! Accounts are kept in memory and, when a users file is configured, persisted to it as JSON
//! after every sign-up. Passwords are stored as argon2id PHC strings. Session tokens are
//! random, opaque and held in memory only, so restarting the process signs everybody out.
//! Expired sessions are purged whenever a new one is opened.

use super::{AuthError, AuthProvider, AuthResult, AuthUser, Credentials, SessionChannel};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use prm_types::EmailAddress;
use prm_uuid::DocumentId;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 32;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    uid: String,
    email: EmailAddress,
    password_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct LocalSession {
    uid: String,
    email: EmailAddress,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LocalAuthProvider {
    users_file: Option<PathBuf>,
    users: RwLock<HashMap<String, UserRecord>>,
    sessions: RwLock<HashMap<String, LocalSession>>,
    session_ttl: Duration,
    channel: SessionChannel,
}

impl LocalAuthProvider {
    /// A provider whose accounts live only as long as the process.
    pub fn in_memory(session_ttl: Duration) -> Self {
        Self {
            users_file: None,
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
            channel: SessionChannel::new(None),
        }
    }

    /// Opens a provider backed by `users_file`, loading existing accounts.
    ///
    /// A missing file is treated as an empty account list.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(users_file: impl Into<PathBuf>, session_ttl: Duration) -> AuthResult<Self> {
        let users_file = users_file.into();
        let records: Vec<UserRecord> = match std::fs::read(&users_file) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            "loaded {} local account(s) from {}",
            records.len(),
            users_file.display()
        );

        let users = records
            .into_iter()
            .map(|r| (r.email.as_str().to_string(), r))
            .collect();
        Ok(Self {
            users_file: Some(users_file),
            users: RwLock::new(users),
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
            channel: SessionChannel::new(None),
        })
    }

    pub fn users_file(&self) -> Option<&Path> {
        self.users_file.as_deref()
    }

    async fn persist(&self, users: &HashMap<String, UserRecord>) -> AuthResult<()> {
        let Some(path) = &self.users_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut records: Vec<&UserRecord> = users.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.uid.cmp(&b.uid)));
        let bytes = serde_json::to_vec_pretty(&records)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn open_session(&self, uid: &str, email: &EmailAddress) -> AuthUser {
        let token = random_hex(TOKEN_LEN);
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        if sessions.len() < before {
            tracing::debug!("purged {} expired session(s)", before - sessions.len());
        }
        sessions.insert(
            token.clone(),
            LocalSession {
                uid: uid.to_string(),
                email: email.clone(),
                expires_at,
            },
        );
        drop(sessions);

        let user = AuthUser::new(uid, email.clone(), token, expires_at);
        self.channel.publish(Some(user.clone()));
        user
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_password(password: &str) -> AuthResult<String> {
    let mut bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    let salt = SaltString::encode_b64(&bytes)
        .map_err(|e| AuthError::Provider(format!("failed to encode salt: {e}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Provider(format!("failed to hash password: {e}")))
}

/// Checks `password` against a stored PHC string. An unparseable hash never matches.
fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is not a valid PHC string: {}", e);
            false
        }
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    fn provider_name(&self) -> &'static str {
        "local"
    }

    async fn sign_up(&self, credentials: &Credentials) -> AuthResult<AuthUser> {
        credentials.check_new_password()?;

        let email = credentials.email().clone();
        let record = {
            let mut users = self.users.write().await;
            if users.contains_key(email.as_str()) {
                return Err(AuthError::EmailInUse);
            }
            let record = UserRecord {
                uid: DocumentId::generate().into_inner(),
                email: email.clone(),
                password_hash: hash_password(credentials.password())?,
                created_at: Utc::now(),
            };
            users.insert(email.as_str().to_string(), record.clone());
            if let Err(e) = self.persist(&users).await {
                users.remove(email.as_str());
                return Err(e);
            }
            record
        };

        tracing::info!("registered local account {}", record.uid);
        Ok(self.open_session(&record.uid, &record.email).await)
    }

    async fn sign_in(&self, credentials: &Credentials) -> AuthResult<AuthUser> {
        let record = self
            .users
            .read()
            .await
            .get(credentials.email().as_str())
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(credentials.password(), &record.password_hash) {
            tracing::warn!("failed sign-in for local account {}", record.uid);
            return Err(AuthError::InvalidCredentials);
        }

        Ok(self.open_session(&record.uid, &record.email).await)
    }

    async fn sign_out(&self, user: &AuthUser) -> AuthResult<()> {
        self.sessions.write().await.remove(user.id_token());
        self.channel.publish(None);
        Ok(())
    }

    async fn verify_token(&self, id_token: &str) -> AuthResult<AuthUser> {
        let session = self
            .sessions
            .read()
            .await
            .get(id_token)
            .cloned()
            .ok_or(AuthError::InvalidToken)?;

        if Utc::now() >= session.expires_at {
            self.sessions.write().await.remove(id_token);
            return Err(AuthError::SessionExpired);
        }

        Ok(AuthUser::new(
            session.uid,
            session.email,
            id_token,
            session.expires_at,
        ))
    }

    fn subscribe(&self) -> tokio::sync::watch::Receiver<Option<AuthUser>> {
        self.channel.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials::new(email, password).expect("credentials should parse")
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let provider = LocalAuthProvider::in_memory(Duration::hours(1));

        let registered = provider
            .sign_up(&creds("Jane@Example.com", "secret1"))
            .await
            .expect("sign_up should succeed");
        let signed_in = provider
            .sign_in(&creds("jane@example.com", "secret1"))
            .await
            .expect("sign_in should succeed");

        assert_eq!(registered.uid, signed_in.uid);
        assert_ne!(registered.id_token(), signed_in.id_token());
        assert_eq!(signed_in.email.as_str(), "jane@example.com");
    }

    #[tokio::test]
    async fn test_sign_up_rejects_duplicate_and_weak_password() {
        let provider = LocalAuthProvider::in_memory(Duration::hours(1));
        provider
            .sign_up(&creds("a@example.com", "secret1"))
            .await
            .expect("sign_up should succeed");

        let dup = provider.sign_up(&creds("a@example.com", "secret2")).await;
        assert!(matches!(dup, Err(AuthError::EmailInUse)));

        let weak = provider.sign_up(&creds("b@example.com", "123")).await;
        assert!(matches!(weak, Err(AuthError::WeakPassword)));
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let provider = LocalAuthProvider::in_memory(Duration::hours(1));
        provider
            .sign_up(&creds("a@example.com", "secret1"))
            .await
            .expect("sign_up should succeed");

        let wrong = provider.sign_in(&creds("a@example.com", "secret2")).await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
        let unknown = provider.sign_in(&creds("z@example.com", "secret1")).await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_verify_token_and_sign_out() {
        let provider = LocalAuthProvider::in_memory(Duration::hours(1));
        let user = provider
            .sign_up(&creds("a@example.com", "secret1"))
            .await
            .expect("sign_up should succeed");

        let verified = provider
            .verify_token(user.id_token())
            .await
            .expect("verify_token should succeed");
        assert_eq!(verified.uid, user.uid);

        provider.sign_out(&user).await.expect("sign_out should succeed");
        let after = provider.verify_token(user.id_token()).await;
        assert!(matches!(after, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let provider = LocalAuthProvider::in_memory(Duration::seconds(0));
        let user = provider
            .sign_up(&creds("a@example.com", "secret1"))
            .await
            .expect("sign_up should succeed");

        let result = provider.verify_token(user.id_token()).await;
        assert!(matches!(result, Err(AuthError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_opening_a_session_purges_expired_ones() {
        let provider = LocalAuthProvider::in_memory(Duration::seconds(0));
        provider
            .sign_up(&creds("a@example.com", "secret1"))
            .await
            .expect("sign_up should succeed");
        for _ in 0..3 {
            provider
                .sign_in(&creds("a@example.com", "secret1"))
                .await
                .expect("sign_in should succeed");
        }

        // only the session opened last survives; the earlier ones were never verified
        assert_eq!(provider.sessions.read().await.len(), 1);
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("secret1").expect("hash should succeed");
        assert!(hash.starts_with("$argon2id$"));
        assert_ne!(hash, hash_password("secret1").expect("hash should succeed"));
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "deadbeef"));
    }

    #[tokio::test]
    async fn test_subscribe_sees_sign_in_and_sign_out() {
        let provider = LocalAuthProvider::in_memory(Duration::hours(1));
        let rx = provider.subscribe();
        assert!(rx.borrow().is_none());

        let user = provider
            .sign_up(&creds("a@example.com", "secret1"))
            .await
            .expect("sign_up should succeed");
        assert_eq!(rx.borrow().as_ref().map(|u| u.uid.clone()), Some(user.uid.clone()));

        provider.sign_out(&user).await.expect("sign_out should succeed");
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_accounts_persist_across_instances() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let users_file = temp_dir.path().join("users.json");

        let first = LocalAuthProvider::open(&users_file, Duration::hours(1))
            .expect("open should succeed");
        first
            .sign_up(&creds("a@example.com", "secret1"))
            .await
            .expect("sign_up should succeed");

        let contents = std::fs::read_to_string(&users_file).expect("users file should exist");
        assert!(!contents.contains("secret1"), "password must not be stored in clear");
        assert!(contents.contains("$argon2id$"), "password should be an argon2id hash");

        let second = LocalAuthProvider::open(&users_file, Duration::hours(1))
            .expect("reopen should succeed");
        second
            .sign_in(&creds("a@example.com", "secret1"))
            .await
            .expect("sign_in should succeed after reopen");
    }
}
