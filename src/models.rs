//! Domain types: profiles, widgets, analytics rows

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user profile row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Server-assigned identity, shared with the auth user id
    pub id: String,

    /// The unique public handle
    pub username: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// When the handle was last changed; gates the cooldown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_updated_at: Option<DateTime<Utc>>,
}

/// Widget identity: transient until the create round-trip completes,
/// server-assigned afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetId {
    /// Client-generated id for a widget whose create call has not resolved
    Pending(i64),
    /// Server-assigned row id
    Persisted(i64),
}

impl WidgetId {
    /// Whether this id refers to a stored row
    pub fn is_persisted(&self) -> bool {
        matches!(self, WidgetId::Persisted(_))
    }

    /// The server-assigned id, if the widget has one
    pub fn persisted(&self) -> Option<i64> {
        match self {
            WidgetId::Persisted(id) => Some(*id),
            WidgetId::Pending(_) => None,
        }
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidgetId::Pending(id) => write!(f, "pending:{}", id),
            WidgetId::Persisted(id) => write!(f, "{}", id),
        }
    }
}

/// What a widget renders as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    Social,
    Text,
    Image,
    Embed,
    /// The trailing "add new" affordance; never persisted
    Placeholder,
}

impl WidgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Social => "social",
            WidgetKind::Text => "text",
            WidgetKind::Image => "image",
            WidgetKind::Embed => "embed",
            WidgetKind::Placeholder => "placeholder",
        }
    }
}

/// One positioned content cell on a profile page
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub id: WidgetId,
    pub kind: WidgetKind,
    pub title: Option<String>,
    pub content: Option<String>,
    /// Grid footprint, e.g. "1x1", "2x1", "2x2"
    pub size: String,
    /// Zero-based order index within the profile
    pub position: i32,
    /// Derived display icon; recomputed, never authoritative
    pub icon: Option<String>,
}

impl Widget {
    /// The synthetic trailing cell the UI renders as the "add" affordance
    pub fn placeholder() -> Self {
        Self {
            id: WidgetId::Pending(0),
            kind: WidgetKind::Placeholder,
            title: None,
            content: None,
            size: "1x1".to_string(),
            position: 0,
            icon: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == WidgetKind::Placeholder
    }
}

/// A stored widget row, as the persistence layer returns it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetRow {
    pub id: i64,
    pub profile_id: String,
    #[serde(rename = "type")]
    pub kind: WidgetKind,
    pub title: Option<String>,
    pub content: Option<String>,
    pub size: String,
    pub position: i32,
}

impl From<WidgetRow> for Widget {
    fn from(row: WidgetRow) -> Self {
        Widget {
            id: WidgetId::Persisted(row.id),
            kind: row.kind,
            title: row.title,
            content: row.content,
            size: row.size,
            position: row.position,
            icon: None,
        }
    }
}

/// Insert payload for a new widget row
#[derive(Debug, Clone, Serialize)]
pub struct NewWidgetRow {
    pub profile_id: String,
    #[serde(rename = "type")]
    pub kind: WidgetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub size: String,
    pub position: i32,
}

/// Caller input for adding a widget; position and id are assigned by the store
#[derive(Debug, Clone)]
pub struct NewWidget {
    pub kind: WidgetKind,
    pub title: Option<String>,
    pub content: Option<String>,
    pub size: String,
}

/// Partial widget update; supplied fields win on merge
#[derive(Debug, Clone, Default, Serialize)]
pub struct WidgetPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl WidgetPatch {
    /// Shallow-merge this patch into a local widget record
    pub fn apply_to(&self, widget: &mut Widget) {
        if let Some(title) = &self.title {
            widget.title = Some(title.clone());
        }
        if let Some(content) = &self.content {
            widget.content = Some(content.clone());
        }
        if let Some(size) = &self.size {
            widget.size = size.clone();
        }
    }

    /// Merge a later patch over this one; later fields win
    pub fn merge(&mut self, later: &WidgetPatch) {
        if later.title.is_some() {
            self.title = later.title.clone();
        }
        if later.content.is_some() {
            self.content = later.content.clone();
        }
        if later.size.is_some() {
            self.size = later.size.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.size.is_none()
    }
}

/// Partial profile update for name/bio/location edits
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Kind of analytics event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Visit,
    Click,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Visit => "visit",
            EventKind::Click => "click",
        }
    }
}

/// An append-only analytics event row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub profile_id: String,
    pub event_type: EventKind,
    /// Pseudo-anonymous per-device identifier
    pub visitor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub referrer: String,
    pub country: String,
    pub page_path: String,
    /// Server-assigned; absent on insert
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A pre-aggregated daily rollup row, written by an external process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStat {
    pub profile_id: String,
    pub day: NaiveDate,
    pub visit_count: i64,
    pub click_count: i64,
}

/// The authenticated identity, distilled from the auth user record
#[derive(Debug, Clone, PartialEq)]
pub struct Viewer {
    pub id: String,
    pub email: Option<String>,
    /// Avatar supplied by a federated identity provider, if any
    pub avatar_url: Option<String>,
}
