//! Client-side analytics beacon
//!
//! Fire-and-forget: a tracking call never fails the caller. Events are
//! de-duplicated locally, enriched with user-agent and best-effort
//! geolocation data, and appended to the event log.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analytics::EVENTS_TABLE;
use crate::backend::Backend;
use crate::error::Error;
use crate::models::{AnalyticsEvent, EventKind, WidgetKind};
use crate::ports::{Geolocator, KeyValueStore, PageContext};
use crate::ua;

/// Local-storage key holding the stable pseudo-anonymous visitor id
const VISITOR_ID_KEY: &str = "bento_visitor_id";

/// Prefix of the per-event de-duplication timestamp keys
const TRACK_KEY_PREFIX: &str = "bento_track";

/// Referrer sentinel for QR-code-originated visits
const QR_REFERRER: &str = "QR Scan";

/// One tracking call
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub profile_id: String,
    pub event: EventKind,
    pub widget_id: Option<i64>,
    pub widget_kind: Option<WidgetKind>,
    pub target_url: Option<String>,
    /// The authenticated viewer's id, if signed in; owners viewing their own
    /// page are never counted
    pub viewer_id: Option<String>,
}

impl TrackRequest {
    /// A page-view event
    pub fn visit(profile_id: &str) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            event: EventKind::Visit,
            widget_id: None,
            widget_kind: None,
            target_url: None,
            viewer_id: None,
        }
    }

    /// A widget-click event
    pub fn click(profile_id: &str, widget_id: i64, widget_kind: WidgetKind, target_url: &str) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            event: EventKind::Click,
            widget_id: Some(widget_id),
            widget_kind: Some(widget_kind),
            target_url: Some(target_url.to_string()),
            viewer_id: None,
        }
    }

    pub fn with_viewer(mut self, viewer_id: &str) -> Self {
        self.viewer_id = Some(viewer_id.to_string());
        self
    }
}

/// Emits analytics events for the viewed page
pub struct AnalyticsBeacon {
    backend: Arc<Backend>,
    kv: Arc<dyn KeyValueStore>,
    page: Arc<dyn PageContext>,
    geo: Arc<dyn Geolocator>,
}

impl AnalyticsBeacon {
    pub fn new(
        backend: Arc<Backend>,
        kv: Arc<dyn KeyValueStore>,
        page: Arc<dyn PageContext>,
        geo: Arc<dyn Geolocator>,
    ) -> Self {
        Self {
            backend,
            kv,
            page,
            geo,
        }
    }

    /// Record an event. Never fails the caller: every error is caught and
    /// logged.
    pub async fn track(&self, request: TrackRequest) {
        if let Err(e) = self.try_track(request).await {
            warn!("analytics tracking failed: {}", e);
        }
    }

    /// Returns whether an event row was actually appended
    pub(crate) async fn try_track(&self, request: TrackRequest) -> Result<bool, Error> {
        if request.profile_id.is_empty() {
            return Ok(false);
        }
        if request.viewer_id.as_deref() == Some(request.profile_id.as_str()) {
            return Ok(false);
        }
        if self.page.is_reload() {
            return Ok(false);
        }
        // Internal navigation is not a new visit
        if request.event == EventKind::Visit && self.referrer_is_same_host() {
            return Ok(false);
        }

        let dedup_key = format!(
            "{}_{}_{}_{}",
            TRACK_KEY_PREFIX,
            request.profile_id,
            request.event.as_str(),
            request
                .widget_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "v".to_string()),
        );
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = self.backend.options().dedup_window.as_millis() as i64;
        if let Some(last) = self.kv.get(&dedup_key).and_then(|v| v.parse::<i64>().ok()) {
            if now_ms - last < window_ms {
                return Ok(false);
            }
        }

        let visitor_id = self.visitor_id();

        let country = match self.geo.country().await {
            Ok(country) => country,
            Err(e) => {
                debug!("geolocation lookup failed: {}", e);
                "Unknown".to_string()
            }
        };

        let info = ua::parse(&self.page.user_agent());

        let source = self
            .page
            .query_param("source")
            .or_else(|| self.page.query_param("utm_source"));
        let referrer = if source.as_deref() == Some("qr") {
            QR_REFERRER.to_string()
        } else {
            self.page
                .referrer()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "direct".to_string())
        };

        let event = AnalyticsEvent {
            profile_id: request.profile_id,
            event_type: request.event,
            visitor_id,
            widget_id: request.widget_id,
            widget_type: request.widget_kind.map(|k| k.as_str().to_string()),
            target_url: request.target_url,
            browser: info.browser,
            os: info.os,
            device: info.device,
            referrer,
            country,
            page_path: self.page.page_path(),
            created_at: None,
        };

        self.backend.rows(EVENTS_TABLE).insert(&event).send().await?;

        // Only a successful append counts against the window
        self.kv.set(&dedup_key, &now_ms.to_string());
        Ok(true)
    }

    fn referrer_is_same_host(&self) -> bool {
        let referrer_host = self
            .page
            .referrer()
            .and_then(|r| url::Url::parse(&r).ok())
            .and_then(|u| u.host_str().map(|h| h.to_string()));
        match (referrer_host, self.page.host()) {
            (Some(referrer), Some(current)) => referrer == current,
            _ => false,
        }
    }

    /// The stable per-device visitor id, generated on first use
    fn visitor_id(&self) -> String {
        if let Some(id) = self.kv.get(VISITOR_ID_KEY) {
            return id;
        }
        let id = Uuid::new_v4().to_string();
        self.kv.set(VISITOR_ID_KEY, &id);
        id
    }
}
