//! Injected capabilities: local key-value storage, page context, geolocation
//!
//! Each ambient input the browser original read implicitly is a narrow trait
//! here, so the store and the analytics beacon stay deterministic under test.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use url::Url;

use crate::error::Error;
use crate::fetch::Fetch;

/// Client-local persistent key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    /// All stored keys; used to purge auth tokens by prefix on sign-out
    fn keys(&self) -> Vec<String>;
}

/// In-memory store for tests and ephemeral embeddings
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.inner.lock().unwrap().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.inner.lock().unwrap().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }
}

/// JSON-file-backed store; the crate's durable local storage
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open a store at `path`, loading any existing contents
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let cache = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::general(format!("failed to read {:?}: {}", path, e))),
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    fn persist(&self, snapshot: &HashMap<String, String>) {
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to serialize local store: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, raw) {
            warn!("failed to write local store {:?}: {}", self.path, e);
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut cache = self.cache.lock().unwrap();
        cache.insert(key.to_string(), value.to_string());
        self.persist(&cache);
    }

    fn remove(&self, key: &str) {
        let mut cache = self.cache.lock().unwrap();
        cache.remove(key);
        self.persist(&cache);
    }

    fn keys(&self) -> Vec<String> {
        self.cache.lock().unwrap().keys().cloned().collect()
    }
}

/// The navigation context of the page currently being viewed
pub trait PageContext: Send + Sync {
    /// Path component of the current URL
    fn page_path(&self) -> String;
    /// Host of the current URL
    fn host(&self) -> Option<String>;
    /// The document referrer, if any
    fn referrer(&self) -> Option<String>;
    /// A query parameter of the current URL
    fn query_param(&self, name: &str) -> Option<String>;
    /// Whether this navigation is a page reload
    fn is_reload(&self) -> bool;
    /// The user-agent string of the viewing client
    fn user_agent(&self) -> String;
}

/// Concrete per-navigation snapshot an embedding shell fills in
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    /// Full current URL, including any query string
    pub url: String,
    pub referrer: Option<String>,
    pub reload: bool,
    pub user_agent: String,
}

impl PageSnapshot {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_referrer(mut self, referrer: &str) -> Self {
        self.referrer = Some(referrer.to_string());
        self
    }

    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    fn parsed(&self) -> Option<Url> {
        Url::parse(&self.url).ok()
    }
}

impl PageContext for PageSnapshot {
    fn page_path(&self) -> String {
        self.parsed()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "/".to_string())
    }

    fn host(&self) -> Option<String> {
        self.parsed().and_then(|u| u.host_str().map(|h| h.to_string()))
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.clone()
    }

    fn query_param(&self, name: &str) -> Option<String> {
        let url = self.parsed()?;
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    fn is_reload(&self) -> bool {
        self.reload
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }
}

/// Best-effort reverse geolocation of the caller's address
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn country(&self) -> Result<String, Error>;
}

/// Free IP-geolocation lookup over ipapi.co
pub struct IpApiGeolocator {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    country_name: Option<String>,
}

impl IpApiGeolocator {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: "https://ipapi.co/json/".to_string(),
        }
    }

    /// Point the lookup at a different endpoint (tests)
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[async_trait]
impl Geolocator for IpApiGeolocator {
    async fn country(&self) -> Result<String, Error> {
        let response = Fetch::get(&self.client, &self.endpoint)
            .execute::<GeoResponse>()
            .await?;
        response
            .country_name
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::general("geolocation response carried no country"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k"), None);
        store.set("k", "v");
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k");
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");

        let store = FileStore::open(&path).unwrap();
        store.set("bento_visitor_id", "abc-123");
        store.set("sb-access-token", "tok");
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("bento_visitor_id").as_deref(), Some("abc-123"));
        let mut keys = reopened.keys();
        keys.sort();
        assert_eq!(keys, vec!["bento_visitor_id", "sb-access-token"]);
    }

    #[test]
    fn snapshot_query_params_and_path() {
        let page = PageSnapshot::new("https://bento.example/alexdev?source=qr&x=1");
        assert_eq!(page.page_path(), "/alexdev");
        assert_eq!(page.host().as_deref(), Some("bento.example"));
        assert_eq!(page.query_param("source").as_deref(), Some("qr"));
        assert_eq!(page.query_param("utm_source"), None);
    }

    #[test]
    fn unparsable_url_degrades() {
        let page = PageSnapshot::new("not a url");
        assert_eq!(page.page_path(), "/");
        assert_eq!(page.host(), None);
        assert_eq!(page.query_param("source"), None);
    }
}
