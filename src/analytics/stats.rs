//! Dashboard aggregation over rollups and raw event rows
//!
//! Read-only: historical totals come from the externally-written daily
//! rollups, today's activity from the raw rows that have not been folded in
//! yet.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::analytics::{DAILY_STATS_TABLE, EVENTS_TABLE};
use crate::backend::Backend;
use crate::error::Error;
use crate::icons::host_of;
use crate::models::{AnalyticsEvent, DailyStat, EventKind, WidgetRow};

/// Summary statistics for an owner dashboard
#[derive(Debug, Clone, Default)]
pub struct ProfileStats {
    pub total_visits: i64,
    pub total_clicks: i64,
    /// Distinct visitor ids among the fetched raw visit rows
    pub unique_visitors: usize,
    pub browsers: HashMap<String, i64>,
    pub operating_systems: HashMap<String, i64>,
    pub referrers: HashMap<String, i64>,
    pub countries: HashMap<String, i64>,
    /// Click counts keyed by a human-readable widget label
    pub widget_clicks: HashMap<String, i64>,
    /// Most recent activity, newest first
    pub recent_activity: Vec<String>,
}

/// Computes dashboard statistics for one profile
pub struct StatsReader {
    backend: Arc<Backend>,
}

impl StatsReader {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    /// Aggregate the rollup baseline and the most recent raw rows
    pub async fn compute(&self, profile_id: &str) -> Result<ProfileStats, Error> {
        let options = self.backend.options().clone();

        let rollups: Vec<DailyStat> = self
            .backend
            .rows(DAILY_STATS_TABLE)
            .select("*")
            .eq("profile_id", profile_id)
            .fetch()
            .await?;

        let events: Vec<AnalyticsEvent> = self
            .backend
            .rows(EVENTS_TABLE)
            .select("*")
            .eq("profile_id", profile_id)
            .order("created_at", false)
            .limit(options.raw_event_limit)
            .fetch()
            .await?;

        let widgets: Vec<WidgetRow> = self
            .backend
            .rows("widgets")
            .select("*")
            .eq("profile_id", profile_id)
            .fetch()
            .await?;

        Ok(aggregate(&rollups, &events, &widgets, options.recent_activity_len))
    }
}

fn aggregate(
    rollups: &[DailyStat],
    events: &[AnalyticsEvent],
    widgets: &[WidgetRow],
    recent_len: usize,
) -> ProfileStats {
    let mut stats = ProfileStats::default();

    for rollup in rollups {
        stats.total_visits += rollup.visit_count;
        stats.total_clicks += rollup.click_count;
    }

    // Today's rows are not yet folded into the rollup
    let today = Utc::now().date_naive();
    let mut visitors = HashSet::new();

    for event in events {
        let is_today = event
            .created_at
            .map(|t| t.date_naive() == today)
            .unwrap_or(false);

        match event.event_type {
            EventKind::Visit => {
                if is_today {
                    stats.total_visits += 1;
                }
                visitors.insert(event.visitor_id.as_str());
            }
            EventKind::Click => {
                if is_today {
                    stats.total_clicks += 1;
                }
                *stats
                    .widget_clicks
                    .entry(widget_label(widgets, event))
                    .or_insert(0) += 1;
            }
        }

        *stats.browsers.entry(event.browser.clone()).or_insert(0) += 1;
        *stats
            .operating_systems
            .entry(event.os.clone())
            .or_insert(0) += 1;
        *stats.referrers.entry(event.referrer.clone()).or_insert(0) += 1;
        *stats.countries.entry(event.country.clone()).or_insert(0) += 1;
    }

    stats.unique_visitors = visitors.len();
    stats.recent_activity = events
        .iter()
        .take(recent_len)
        .map(|event| match event.event_type {
            EventKind::Visit => "Visit".to_string(),
            EventKind::Click => format!("Clicked: {}", widget_label(widgets, event)),
        })
        .collect();

    stats
}

/// Human-readable label for a clicked widget: its title, else the host of its
/// content, else the host of the click target, else a generic label.
/// Malformed URLs fall through without raising.
fn widget_label(widgets: &[WidgetRow], event: &AnalyticsEvent) -> String {
    if let Some(widget_id) = event.widget_id {
        if let Some(widget) = widgets.iter().find(|w| w.id == widget_id) {
            if let Some(title) = widget.title.as_deref().filter(|t| !t.is_empty()) {
                return title.to_string();
            }
            if let Some(host) = widget.content.as_deref().and_then(host_of) {
                return host;
            }
        }
    }
    if let Some(host) = event.target_url.as_deref().and_then(host_of) {
        return host;
    }
    "Link".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WidgetKind;
    use chrono::Duration;

    fn visit(visitor: &str, created_at: chrono::DateTime<Utc>) -> AnalyticsEvent {
        AnalyticsEvent {
            profile_id: "user-1".to_string(),
            event_type: EventKind::Visit,
            visitor_id: visitor.to_string(),
            widget_id: None,
            widget_type: None,
            target_url: None,
            browser: "Chrome".to_string(),
            os: "macOS".to_string(),
            device: "desktop".to_string(),
            referrer: "direct".to_string(),
            country: "Norway".to_string(),
            page_path: "/alexdev".to_string(),
            created_at: Some(created_at),
        }
    }

    fn click(widget_id: Option<i64>, target_url: Option<&str>) -> AnalyticsEvent {
        AnalyticsEvent {
            event_type: EventKind::Click,
            widget_id,
            widget_type: Some("social".to_string()),
            target_url: target_url.map(|s| s.to_string()),
            ..visit("v-1", Utc::now())
        }
    }

    fn widget_row(id: i64, title: Option<&str>, content: Option<&str>) -> WidgetRow {
        WidgetRow {
            id,
            profile_id: "user-1".to_string(),
            kind: WidgetKind::Social,
            title: title.map(|s| s.to_string()),
            content: content.map(|s| s.to_string()),
            size: "1x1".to_string(),
            position: 0,
        }
    }

    fn rollup(visits: i64, clicks: i64) -> DailyStat {
        DailyStat {
            profile_id: "user-1".to_string(),
            day: (Utc::now() - Duration::days(1)).date_naive(),
            visit_count: visits,
            click_count: clicks,
        }
    }

    #[test]
    fn totals_are_baseline_plus_todays_raw_rows() {
        let rollups = vec![rollup(60, 10), rollup(40, 5)];
        let now = Utc::now();
        let events = vec![
            visit("v-1", now),
            visit("v-2", now),
            visit("v-3", now),
            // Yesterday's raw row is already in the rollup
            visit("v-4", now - Duration::days(1)),
        ];

        let stats = aggregate(&rollups, &events, &[], 15);
        assert_eq!(stats.total_visits, 103);
        assert_eq!(stats.total_clicks, 15);
    }

    #[test]
    fn unique_visitors_span_all_fetched_visits() {
        let now = Utc::now();
        let events = vec![
            visit("v-1", now),
            visit("v-1", now - Duration::days(2)),
            visit("v-2", now),
            click(Some(1), None),
        ];

        let stats = aggregate(&[], &events, &[], 15);
        // Click rows never contribute visitor ids
        assert_eq!(stats.unique_visitors, 2);
    }

    #[test]
    fn breakdowns_cover_all_raw_rows() {
        let now = Utc::now();
        let mut other = visit("v-2", now - Duration::days(3));
        other.browser = "Firefox".to_string();
        other.country = "Germany".to_string();
        let events = vec![visit("v-1", now), other];

        let stats = aggregate(&[], &events, &[], 15);
        assert_eq!(stats.browsers.get("Chrome"), Some(&1));
        assert_eq!(stats.browsers.get("Firefox"), Some(&1));
        assert_eq!(stats.countries.get("Norway"), Some(&1));
        assert_eq!(stats.countries.get("Germany"), Some(&1));
        assert_eq!(stats.referrers.get("direct"), Some(&2));
    }

    #[test]
    fn widget_label_fallback_chain() {
        let widgets = vec![
            widget_row(1, Some("GitHub"), Some("https://github.com/alexdev")),
            widget_row(2, None, Some("https://blog.example.com/feed")),
            widget_row(3, None, Some("not a url")),
        ];

        let titled = click(Some(1), Some("https://github.com/alexdev"));
        assert_eq!(widget_label(&widgets, &titled), "GitHub");

        let by_content = click(Some(2), None);
        assert_eq!(widget_label(&widgets, &by_content), "blog.example.com");

        // Malformed widget content falls through to the click target
        let by_target = click(Some(3), Some("https://linked.example/x"));
        assert_eq!(widget_label(&widgets, &by_target), "linked.example");

        let unknown = click(Some(99), None);
        assert_eq!(widget_label(&widgets, &unknown), "Link");

        let malformed_everywhere = click(None, Some("::::"));
        assert_eq!(widget_label(&widgets, &malformed_everywhere), "Link");
    }

    #[test]
    fn recent_activity_is_capped_and_newest_first() {
        let now = Utc::now();
        let mut events = vec![click(Some(1), Some("https://github.com"))];
        for i in 0..20 {
            events.push(visit("v-1", now - Duration::minutes(i)));
        }
        let widgets = vec![widget_row(1, Some("GitHub"), None)];

        let stats = aggregate(&[], &events, &widgets, 15);
        assert_eq!(stats.recent_activity.len(), 15);
        assert_eq!(stats.recent_activity[0], "Clicked: GitHub");
        assert_eq!(stats.recent_activity[1], "Visit");
    }
}
