//! Roles, credential checks, sessions and the signup form.
//!
//! Identity is never ambient: handlers that need it resolve a [`Session`] from
//! the `Authorization: Bearer <token>` header through [`SessionStore`].
//! Credential verification sits behind the [`Authenticator`] trait so the
//! backing store can be swapped without touching the handlers.
//!
//! Passwords and tokens must never reach the logs.

use std::collections::HashMap;
use std::fmt;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tourist,
    Authority,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Tourist => "tourist",
            Role::Authority => "authority",
        }
    }
}

/// Verifies a role/user/password combination.
pub trait Authenticator: Send + Sync {
    fn verify(&self, role: Role, user_id: &str, password: &str) -> bool;
}

/// A user id and password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user_id: &str, password: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One configured account per role.
#[derive(Debug, Clone)]
pub struct CredentialTable {
    accounts: HashMap<Role, Credentials>,
}

impl CredentialTable {
    pub fn new(tourist: Credentials, authority: Credentials) -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(Role::Tourist, tourist);
        accounts.insert(Role::Authority, authority);
        Self { accounts }
    }
}

impl Authenticator for CredentialTable {
    fn verify(&self, role: Role, user_id: &str, password: &str) -> bool {
        self.accounts
            .get(&role)
            .is_some_and(|c| c.user_id == user_id && c.password == password)
    }
}

/// Request body for POST /auth/login.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub role: Role,
    pub user_id: String,
    pub password: String,
}

/// An authenticated session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
}

/// Default lifetime of a session.
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 8 * 60;

/// In-process session registry.
///
/// Sessions expire `ttl` after they were issued. Expired sessions are
/// rejected by [`SessionStore::authorize`] and swept on every login.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(Duration::minutes(DEFAULT_SESSION_TTL_MINUTES))
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.issued_at >= self.ttl
    }

    /// Check credentials and open a new session.
    pub async fn login(
        &self,
        authenticator: &dyn Authenticator,
        request: &LoginRequest,
    ) -> Result<Session> {
        if !authenticator.verify(request.role, &request.user_id, &request.password) {
            return Err(Error::InvalidCredentials);
        }

        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            role: request.role,
            issued_at: now,
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !self.is_expired(s, now));
        sessions.insert(session.token.clone(), session.clone());

        Ok(session)
    }

    /// Drop a session. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    /// Resolve the bearer token and require `role`.
    pub async fn authorize(&self, headers: &HeaderMap, role: Role) -> Result<Session> {
        let token = bearer_token(headers).ok_or(Error::Unauthorized)?;

        let session = self
            .sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(Error::Unauthorized)?;

        if self.is_expired(&session, Utc::now()) {
            self.sessions.write().await.remove(token);
            return Err(Error::Unauthorized);
        }

        if session.role != role {
            return Err(Error::Forbidden {
                required: role.as_str(),
            });
        }

        Ok(session)
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Request body for POST /auth/signup.
#[derive(Clone, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub passport: String,
    #[serde(default)]
    pub gov_id: String,
    #[serde(default)]
    pub emergency_contact_name: String,
    #[serde(default)]
    pub emergency_contact_phone: String,
}

impl SignupForm {
    /// Fail on the first invalid field, in form order.
    pub fn validate(&self) -> Result<()> {
        let required: [(&'static str, &str); 11] = [
            ("name", self.name.as_str()),
            ("email", self.email.as_str()),
            ("phone", self.phone.as_str()),
            ("password", self.password.as_str()),
            ("confirm_password", self.confirm_password.as_str()),
            ("address", self.address.as_str()),
            ("nationality", self.nationality.as_str()),
            ("passport", self.passport.as_str()),
            ("gov_id", self.gov_id.as_str()),
            ("emergency_contact_name", self.emergency_contact_name.as_str()),
            ("emergency_contact_phone", self.emergency_contact_phone.as_str()),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::validation(field, "is required"));
            }
        }

        if !self.email.contains('@') {
            return Err(Error::validation("email", "must be an email address"));
        }

        if self.password != self.confirm_password {
            return Err(Error::validation(
                "confirm_password",
                "does not match password",
            ));
        }

        Ok(())
    }

    /// Everything except the password, ready to record.
    pub fn into_registration(self, now: DateTime<Utc>) -> Registration {
        Registration {
            name: self.name,
            email: self.email,
            phone: self.phone,
            address: self.address,
            nationality: self.nationality,
            passport: self.passport,
            gov_id: self.gov_id,
            emergency_contact_name: self.emergency_contact_name,
            emergency_contact_phone: self.emergency_contact_phone,
            submitted_at: now,
        }
    }
}

/// A pending, unactivated registration.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub nationality: String,
    pub passport: String,
    pub gov_id: String,
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn table() -> CredentialTable {
        CredentialTable::new(
            Credentials::new("tourist123", "pass123"),
            Credentials::new("admin001", "admin123"),
        )
    }

    fn login(role: Role, user_id: &str, password: &str) -> LoginRequest {
        LoginRequest {
            role,
            user_id: user_id.to_string(),
            password: password.to_string(),
        }
    }

    fn form() -> SignupForm {
        SignupForm {
            name: "Priya Patel".into(),
            email: "priya@example.com".into(),
            phone: "+91-99XXXXXX03".into(),
            password: "secret".into(),
            confirm_password: "secret".into(),
            address: "Ziro Valley".into(),
            nationality: "Indian".into(),
            passport: "MXXXXXXX2".into(),
            gov_id: "GOV-1".into(),
            emergency_contact_name: "Amit Patel".into(),
            emergency_contact_phone: "+91-99XXXXXX04".into(),
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_credentials_are_per_role() {
        let t = table();
        assert!(t.verify(Role::Authority, "admin001", "admin123"));
        assert!(!t.verify(Role::Tourist, "admin001", "admin123"));
        assert!(!t.verify(Role::Authority, "admin001", "wrong"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("admin001", "admin123"));
        assert!(!rendered.contains("admin123"));
    }

    #[tokio::test]
    async fn test_login_then_authorize() {
        let store = SessionStore::new();
        let session = store
            .login(&table(), &login(Role::Authority, "admin001", "admin123"))
            .await
            .unwrap();

        let resolved = store
            .authorize(&bearer(&session.token), Role::Authority)
            .await
            .unwrap();
        assert_eq!(resolved.user_id, "admin001");
    }

    #[tokio::test]
    async fn test_wrong_role_is_forbidden() {
        let store = SessionStore::new();
        let session = store
            .login(&table(), &login(Role::Tourist, "tourist123", "pass123"))
            .await
            .unwrap();

        let err = store
            .authorize(&bearer(&session.token), Role::Authority)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden { required: "authority" }));
    }

    #[tokio::test]
    async fn test_invalid_credentials() {
        let store = SessionStore::new();
        let err = store
            .login(&table(), &login(Role::Tourist, "tourist123", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_missing_and_unknown_tokens() {
        let store = SessionStore::new();
        assert!(matches!(
            store.authorize(&HeaderMap::new(), Role::Tourist).await,
            Err(Error::Unauthorized)
        ));
        assert!(matches!(
            store.authorize(&bearer("not-a-session"), Role::Tourist).await,
            Err(Error::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates() {
        let store = SessionStore::new();
        let session = store
            .login(&table(), &login(Role::Tourist, "tourist123", "pass123"))
            .await
            .unwrap();
        store.logout(&session.token).await;
        assert!(
            store
                .authorize(&bearer(&session.token), Role::Tourist)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let store = SessionStore::with_ttl(Duration::zero());
        let session = store
            .login(&table(), &login(Role::Authority, "admin001", "admin123"))
            .await
            .unwrap();

        assert!(matches!(
            store.authorize(&bearer(&session.token), Role::Authority).await,
            Err(Error::Unauthorized)
        ));
        assert!(store.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_login_sweeps_expired_sessions() {
        let store = SessionStore::with_ttl(Duration::zero());
        for _ in 0..3 {
            store
                .login(&table(), &login(Role::Tourist, "tourist123", "pass123"))
                .await
                .unwrap();
        }
        assert_eq!(store.sessions.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_live_session_survives_sweep() {
        let store = SessionStore::new();
        let first = store
            .login(&table(), &login(Role::Tourist, "tourist123", "pass123"))
            .await
            .unwrap();
        store
            .login(&table(), &login(Role::Authority, "admin001", "admin123"))
            .await
            .unwrap();

        assert_eq!(store.sessions.read().await.len(), 2);
        assert!(
            store
                .authorize(&bearer(&first.token), Role::Tourist)
                .await
                .is_ok()
        );
    }

    #[test]
    fn test_signup_valid() {
        assert!(form().validate().is_ok());
    }

    #[test]
    fn test_signup_missing_field() {
        let mut f = form();
        f.passport = " ".into();
        assert!(matches!(
            f.validate(),
            Err(Error::Validation {
                field: "passport",
                ..
            })
        ));
    }

    #[test]
    fn test_signup_reports_first_missing_field() {
        let mut f = form();
        f.nationality.clear();
        f.email.clear();
        assert!(matches!(
            f.validate(),
            Err(Error::Validation { field: "email", .. })
        ));
    }

    #[test]
    fn test_signup_password_mismatch() {
        let mut f = form();
        f.confirm_password = "other".into();
        assert!(matches!(
            f.validate(),
            Err(Error::Validation {
                field: "confirm_password",
                ..
            })
        ));
    }

    #[test]
    fn test_signup_bad_email() {
        let mut f = form();
        f.email = "priya.example.com".into();
        assert!(matches!(
            f.validate(),
            Err(Error::Validation { field: "email", .. })
        ));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&bearer("abc")), Some("abc"));
        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&basic), None);
    }
}
