//! Hosted identity provider (Firebase Auth REST API).
//!
//! Uses the Identity Toolkit endpoints `accounts:signUp`, `accounts:signInWithPassword` and
//! `accounts:lookup`. The ID token returned on sign-in is what the hosted document store
//! expects as its bearer credential.

use super::{AuthError, AuthProvider, AuthResult, AuthUser, Credentials, SessionChannel};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use prm_types::EmailAddress;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug)]
pub struct FirebaseAuthProvider {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Lifetime assumed for tokens verified through `accounts:lookup`, which does not report
    /// an expiry. The provider itself rejects expired tokens on lookup.
    session_ttl: Duration,
    channel: SessionChannel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
    email: String,
    local_id: String,
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
}

impl FirebaseAuthProvider {
    pub fn new(api_key: impl Into<String>, session_ttl: Duration) -> AuthResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AuthError::Provider("API key cannot be empty".into()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            api_key,
            base_url: DEFAULT_IDENTITY_BASE_URL.to_string(),
            session_ttl,
            channel: SessionChannel::new(None),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{}", self.base_url.trim_end_matches('/'), method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> AuthResult<T> {
        let response = self
            .http_client
            .post(self.endpoint(method))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AuthError::Provider(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(AuthError::Unavailable(status.to_string()));
        }
        let code = error_code(&body).unwrap_or_else(|| status.to_string());
        tracing::warn!("identity provider rejected {}: {}", method, code);
        Err(map_error_code(&code))
    }

    fn into_user(&self, token: TokenResponse) -> AuthResult<AuthUser> {
        let email = EmailAddress::parse(&token.email)
            .map_err(|e| AuthError::Provider(format!("provider returned invalid email: {e}")))?;
        let ttl = token
            .expires_in
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Duration::seconds)
            .unwrap_or(self.session_ttl);
        Ok(AuthUser::new(
            token.local_id,
            email,
            token.id_token,
            Utc::now() + ttl,
        ))
    }
}

/// Extracts the provider's error code, e.g. `EMAIL_EXISTS` or
/// `WEAK_PASSWORD : Password should be at least 6 characters`.
fn error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// Maps a provider error code to an [`AuthError`].
pub(crate) fn map_error_code(code: &str) -> AuthError {
    let head = code.split(':').next().unwrap_or(code).trim();
    match head {
        "EMAIL_EXISTS" => AuthError::EmailInUse,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
            AuthError::InvalidCredentials
        }
        "WEAK_PASSWORD" => AuthError::WeakPassword,
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail(head.to_string()),
        "TOKEN_EXPIRED" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => AuthError::SessionExpired,
        "INVALID_ID_TOKEN" | "USER_NOT_FOUND" => AuthError::InvalidToken,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::Unavailable(head.to_string()),
        other => AuthError::Provider(other.to_string()),
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuthProvider {
    fn provider_name(&self) -> &'static str {
        "firebase"
    }

    async fn sign_up(&self, credentials: &Credentials) -> AuthResult<AuthUser> {
        credentials.check_new_password()?;
        let token: TokenResponse = self
            .call(
                "signUp",
                json!({
                    "email": credentials.email().as_str(),
                    "password": credentials.password(),
                    "returnSecureToken": true,
                }),
            )
            .await?;
        let user = self.into_user(token)?;
        tracing::info!("registered account {}", user.uid);
        self.channel.publish(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in(&self, credentials: &Credentials) -> AuthResult<AuthUser> {
        let token: TokenResponse = self
            .call(
                "signInWithPassword",
                json!({
                    "email": credentials.email().as_str(),
                    "password": credentials.password(),
                    "returnSecureToken": true,
                }),
            )
            .await?;
        let user = self.into_user(token)?;
        self.channel.publish(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self, _user: &AuthUser) -> AuthResult<()> {
        // ID tokens cannot be revoked individually; the session simply ends here.
        self.channel.publish(None);
        Ok(())
    }

    async fn verify_token(&self, id_token: &str) -> AuthResult<AuthUser> {
        let lookup: LookupResponse = self.call("lookup", json!({ "idToken": id_token })).await?;
        let found = lookup
            .users
            .into_iter()
            .next()
            .ok_or(AuthError::InvalidToken)?;
        let email = found
            .email
            .as_deref()
            .map(EmailAddress::parse)
            .transpose()
            .map_err(|e| AuthError::Provider(format!("provider returned invalid email: {e}")))?
            .ok_or_else(|| AuthError::Provider("account has no email".into()))?;
        Ok(AuthUser::new(
            found.local_id,
            email,
            id_token,
            Utc::now() + self.session_ttl,
        ))
    }

    fn subscribe(&self) -> tokio::sync::watch::Receiver<Option<AuthUser>> {
        self.channel.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_error_code() {
        assert!(matches!(map_error_code("EMAIL_EXISTS"), AuthError::EmailInUse));
        assert!(matches!(
            map_error_code("INVALID_LOGIN_CREDENTIALS"),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            map_error_code("WEAK_PASSWORD : Password should be at least 6 characters"),
            AuthError::WeakPassword
        ));
        assert!(matches!(map_error_code("TOKEN_EXPIRED"), AuthError::SessionExpired));
        assert!(matches!(map_error_code("INVALID_ID_TOKEN"), AuthError::InvalidToken));
        assert!(matches!(map_error_code("SOMETHING_NEW"), AuthError::Provider(_)));
    }

    #[test]
    fn test_error_code_from_body() {
        let body = r#"{"error": {"code": 400, "message": "EMAIL_NOT_FOUND", "errors": []}}"#;
        assert_eq!(error_code(body).as_deref(), Some("EMAIL_NOT_FOUND"));
        assert_eq!(error_code("<html>"), None);
    }

    #[test]
    fn test_into_user_uses_expires_in() {
        let provider = FirebaseAuthProvider::new("key", Duration::hours(1))
            .expect("provider should build");
        let before = Utc::now();
        let user = provider
            .into_user(TokenResponse {
                id_token: "tok".into(),
                email: "a@example.com".into(),
                local_id: "uid1".into(),
                expires_in: Some("120".into()),
            })
            .expect("into_user should succeed");

        assert_eq!(user.uid, "uid1");
        assert_eq!(user.id_token(), "tok");
        assert!(user.expires_at <= before + Duration::seconds(121));
        assert!(user.expires_at >= before + Duration::seconds(119));
    }

    #[test]
    fn test_endpoint_and_empty_key() {
        let provider = FirebaseAuthProvider::new("key", Duration::hours(1))
            .expect("provider should build")
            .with_base_url("http://localhost:9099/identitytoolkit.googleapis.com/v1/");
        assert_eq!(
            provider.endpoint("signUp"),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/accounts:signUp"
        );
        assert!(FirebaseAuthProvider::new(" ", Duration::hours(1)).is_err());
    }
}
