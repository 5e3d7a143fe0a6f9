//! Authentication: sessions, sign-in, sign-out

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::backend::CLIENT_INFO;
use crate::error::Error;
use crate::fetch::Fetch;
use crate::models::Viewer;

/// Keys with this prefix in local storage hold auth tokens and are purged on
/// sign-out.
pub const TOKEN_KEY_PREFIX: &str = "sb-";

/// Callback invoked on every session change
pub type AuthCallback = Box<dyn Fn(Option<&Session>) + Send + Sync>;

/// Session data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The access token
    pub access_token: String,

    /// The refresh token
    pub refresh_token: String,

    /// The expiry time in seconds
    #[serde(default)]
    pub expires_in: i64,

    /// The authenticated user
    pub user: AuthUser,
}

/// The authenticated user record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    /// The user ID
    pub id: String,

    /// The user's email address
    pub email: Option<String>,

    /// Provider-supplied metadata (federated avatar, display name, ...)
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

impl AuthUser {
    /// Distill the viewer identity the store works with.
    ///
    /// Federated providers put the avatar under `avatar_url` or `picture`.
    pub fn viewer(&self) -> Viewer {
        let avatar_url = self
            .user_metadata
            .get("avatar_url")
            .or_else(|| self.user_metadata.get("picture"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Viewer {
            id: self.id.clone(),
            email: self.email.clone(),
            avatar_url,
        }
    }
}

/// Client for authentication operations
pub struct AuthClient {
    /// The base URL for the project
    url: String,

    /// The anonymous API key
    key: String,

    /// HTTP client used for requests
    client: Client,

    /// The current session, shared with the backend entry point
    session: Arc<Mutex<Option<Session>>>,

    /// Session-change listeners
    listeners: Arc<Mutex<Vec<AuthCallback>>>,
}

impl AuthClient {
    pub(crate) fn new(
        url: &str,
        key: &str,
        client: Client,
        session: Arc<Mutex<Option<Session>>>,
        listeners: Arc<Mutex<Vec<AuthCallback>>>,
    ) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            client,
            session,
            listeners,
        }
    }

    fn get_auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    fn store_session(&self, session: Option<Session>) {
        {
            let mut current = self.session.lock().unwrap();
            *current = session.clone();
        }
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            listener(session.as_ref());
        }
    }

    /// Register a callback for session changes (sign-in, sign-out)
    pub fn on_auth_change<F>(&self, callback: F)
    where
        F: Fn(Option<&Session>) + Send + Sync + 'static,
    {
        self.listeners.lock().unwrap().push(Box::new(callback));
    }

    /// Sign up a new user with email and password
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session, Error> {
        let url = self.get_auth_url("/signup");

        let mut body = HashMap::new();
        body.insert("email".to_string(), email.to_string());
        body.insert("password".to_string(), password.to_string());

        let session = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&body)?
            .execute::<Session>()
            .await?;

        self.store_session(Some(session.clone()));
        Ok(session)
    }

    /// Sign in a user with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, Error> {
        let url = self.get_auth_url("/token?grant_type=password");

        let mut body = HashMap::new();
        body.insert("email".to_string(), email.to_string());
        body.insert("password".to_string(), password.to_string());

        let session = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&body)?
            .execute::<Session>()
            .await?;

        self.store_session(Some(session.clone()));
        Ok(session)
    }

    /// Build the redirect URL for federated (OAuth) sign-in.
    ///
    /// The embedding shell opens this URL; the provider redirects back with a
    /// session the shell hands to [`AuthClient::set_session`].
    pub fn oauth_sign_in_url(&self, provider: &str, redirect_to: &str) -> Result<String, Error> {
        let mut url = Url::parse(&self.get_auth_url("/authorize"))?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(url.to_string())
    }

    /// Sign out the current session, if any.
    ///
    /// Idempotent: signing out while signed out is a no-op.
    pub async fn sign_out(&self) -> Result<(), Error> {
        let token = {
            let current = self.session.lock().unwrap();
            match current.as_ref() {
                Some(session) => session.access_token.clone(),
                None => return Ok(()),
            }
        };

        let url = self.get_auth_url("/logout");
        Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .bearer_auth(&token)
            .execute_raw()
            .await?;

        self.store_session(None);
        Ok(())
    }

    /// Get the current session
    pub fn session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    /// Get the currently authenticated user
    pub fn current_user(&self) -> Option<AuthUser> {
        self.session.lock().unwrap().as_ref().map(|s| s.user.clone())
    }

    /// Adopt a session obtained out of band (federated redirect, restored
    /// tokens) and notify listeners
    pub fn set_session(&self, session: Option<Session>) {
        self.store_session(session);
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::Backend;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_body() -> serde_json::Value {
        json!({
            "access_token": "test_access_token",
            "refresh_token": "test_refresh_token",
            "expires_in": 3600,
            "user": {
                "id": "user-1",
                "email": "alex@example.com",
                "user_metadata": { "avatar_url": "https://cdn.example/alex.png" }
            }
        })
    }

    #[tokio::test]
    async fn sign_in_stores_session_and_notifies() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
            .mount(&mock_server)
            .await;

        let backend = Backend::new(&mock_server.uri(), "fake-key");
        let auth = backend.auth();

        let changes = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&changes);
        auth.on_auth_change(move |session| {
            if session.is_some() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let session = auth.sign_in_with_password("alex@example.com", "hunter2").await.unwrap();
        assert_eq!(session.user.id, "user-1");
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        let viewer = session.user.viewer();
        assert_eq!(viewer.avatar_url.as_deref(), Some("https://cdn.example/alex.png"));
        assert!(auth.session().is_some());
    }

    #[tokio::test]
    async fn sign_out_clears_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let backend = Backend::new(&mock_server.uri(), "fake-key");
        let auth = backend.auth();
        auth.sign_in_with_password("alex@example.com", "hunter2").await.unwrap();

        auth.sign_out().await.unwrap();
        assert!(auth.session().is_none());

        // Second sign-out is a no-op
        auth.sign_out().await.unwrap();
    }

    #[tokio::test]
    async fn oauth_url_carries_provider_and_redirect() {
        let backend = Backend::new("https://proj.example", "fake-key");
        let url = backend
            .auth()
            .oauth_sign_in_url("google", "https://bento.example/callback")
            .unwrap();
        assert!(url.starts_with("https://proj.example/auth/v1/authorize?"));
        assert!(url.contains("provider=google"));
        assert!(url.contains("redirect_to=https%3A%2F%2Fbento.example%2Fcallback"));
    }
}
