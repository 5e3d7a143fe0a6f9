//! Client for the external persistence/auth/storage service
//!
//! The service exposes row CRUD per named collection with equality/ordering/
//! limit filters, session-based auth, and object storage. Everything here is
//! transport; the domain rules live in the store and analytics modules.

mod auth;
mod rows;
mod storage;

use reqwest::Client;
use std::sync::{Arc, Mutex};

use crate::config::ClientOptions;

pub use auth::{AuthCallback, AuthClient, AuthUser, Session, TOKEN_KEY_PREFIX};
pub use rows::{DeleteQuery, InsertQuery, RowsClient, SelectQuery, UpdateQuery};
pub use storage::{validate_image, StorageClient, UploadOptions};

/// Identifies this client to the service
pub(crate) const CLIENT_INFO: &str = "bentolink/0.1.0";

/// The entry point for talking to the backend service
pub struct Backend {
    /// The base URL for the project
    url: String,
    /// The anonymous API key
    key: String,
    /// HTTP client used for requests
    http_client: Client,
    /// Client options
    options: ClientOptions,
    /// The current session
    session: Arc<Mutex<Option<Session>>>,
    /// Session-change listeners
    auth_listeners: Arc<Mutex<Vec<AuthCallback>>>,
}

impl Backend {
    /// Create a new backend client
    pub fn new(url: &str, key: &str) -> Self {
        Self::new_with_options(url, key, ClientOptions::default())
    }

    /// Create a new backend client with custom options
    pub fn new_with_options(url: &str, key: &str, options: ClientOptions) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().unwrap_or_else(|_| Client::new());

        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            session: Arc::new(Mutex::new(None)),
            auth_listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The options this client was built with
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Row operations on a named collection
    pub fn rows(&self, table: &str) -> RowsClient {
        RowsClient::new(
            &self.url,
            &self.key,
            table,
            self.http_client.clone(),
            self.access_token(),
        )
    }

    /// Auth operations and session state
    pub fn auth(&self) -> AuthClient {
        AuthClient::new(
            &self.url,
            &self.key,
            self.http_client.clone(),
            Arc::clone(&self.session),
            Arc::clone(&self.auth_listeners),
        )
    }

    /// Object storage operations
    pub fn storage(&self) -> StorageClient {
        StorageClient::new(
            &self.url,
            &self.key,
            self.http_client.clone(),
            self.access_token(),
        )
    }

    /// The shared HTTP client, for collaborators that make their own calls
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// The current session's access token, if signed in
    pub(crate) fn access_token(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.access_token.clone())
    }
}
