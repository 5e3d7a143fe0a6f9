//! Client data layer for a grid-based link-in-bio profile service.
//!
//! The crate talks to a hosted Postgres-over-REST backend and wraps it in the
//! pieces a profile editor and public profile page need:
//!
//! - [`backend::Backend`]: the HTTP client for auth, rows, and storage
//! - [`store::ProfileStore`]: optimistic profile and widget editing with
//!   debounced reorder persistence
//! - [`analytics::AnalyticsBeacon`]: fire-and-forget visit/click tracking
//! - [`analytics::StatsReader`]: dashboard aggregation over rollups and raw
//!   event rows
//! - [`icons::resolve_icon`]: display icon derivation for widgets
//!
//! ```no_run
//! use std::sync::Arc;
//! use bentolink::{Backend, ProfileStore};
//! use bentolink::ports::MemoryStore;
//!
//! # async fn run() -> Result<(), bentolink::Error> {
//! let backend = Arc::new(Backend::new("https://example.supabase.co", "anon-key"));
//! let store = ProfileStore::new(Arc::clone(&backend), Arc::new(MemoryStore::new()));
//! store.load_profile("alexdev").await?;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod backend;
pub mod config;
pub mod error;
pub mod fetch;
pub mod icons;
pub mod models;
pub mod ports;
pub mod store;
pub mod ua;

pub use analytics::{AnalyticsBeacon, ProfileStats, StatsReader, TrackRequest};
pub use backend::Backend;
pub use config::ClientOptions;
pub use error::Error;
pub use store::ProfileStore;
