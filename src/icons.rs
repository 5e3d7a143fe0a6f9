//! Display-icon resolution for widgets
//!
//! A stored icon always wins; everything else is a best-effort heuristic
//! over the widget's title and content URL.

use url::Url;

use crate::models::{Widget, WidgetKind};

/// Brand icon classes for well-known social services. Kept ordered: the
/// URL-substring match takes the first entry whose key appears in the
/// content, so earlier entries win ties.
pub const SOCIAL_ICONS: &[(&str, &str)] = &[
    ("Instagram", "ci ci-instagram ci-2x"),
    ("GitHub", "ci ci-github ci-2x"),
    ("LinkedIn", "ci ci-linkedin ci-2x"),
    ("YouTube", "ci ci-youtube ci-2x"),
    ("Twitter (X)", "ci ci-twitter ci-2x"),
    ("TikTok", "ci ci-tiktok ci-2x"),
    ("Vimeo", "ci ci-vimeo ci-2x"),
    ("Spotify", "ci ci-spotify ci-2x"),
    ("Apple Music", "ci ci-apple-music ci-2x"),
    ("Pinterest", "ci ci-pinterest ci-2x"),
    ("Facebook", "ci ci-facebook ci-2x"),
    ("Discord", "ci ci-discord ci-2x"),
    ("Reddit", "ci ci-reddit ci-2x"),
    ("Threads", "ci ci-threads ci-2x"),
    ("Twitch", "ci ci-twitch ci-2x"),
    ("Behance", "ci ci-behance ci-2x"),
];

/// Notion's favicon is not served reliably through the generic favicon
/// service, so it gets a pinned fallback.
const NOTION_HOST: &str = "notion.so";
const NOTION_ICON: &str = "https://www.notion.so/images/favicon.ico";

/// Resolve the display icon for a widget.
///
/// Priority order: an explicit stored icon, the special-case host fallback,
/// the social-name table (by title, then by content URL substring), and
/// finally a generic favicon-service URL for any absolute content URL.
pub fn resolve_icon(widget: &Widget) -> Option<String> {
    if let Some(icon) = &widget.icon {
        if !icon.is_empty() {
            return Some(icon.clone());
        }
    }

    let content = widget.content.as_deref().unwrap_or("");

    if content.contains(NOTION_HOST) {
        return Some(NOTION_ICON.to_string());
    }

    if widget.kind != WidgetKind::Social && widget.kind != WidgetKind::Image {
        return None;
    }

    if let Some(title) = widget.title.as_deref() {
        if let Some((_, class)) = SOCIAL_ICONS.iter().find(|(name, _)| *name == title) {
            return Some((*class).to_string());
        }
    }

    if !content.is_empty() {
        let lowered = content.to_lowercase();
        for (name, class) in SOCIAL_ICONS {
            if lowered.contains(&service_key(name)) {
                return Some((*class).to_string());
            }
        }
    }

    if let Some(host) = host_of(content) {
        return Some(favicon_url(&host));
    }

    None
}

/// Favicon-service URL for a host
pub fn favicon_url(host: &str) -> String {
    format!("https://www.google.com/s2/favicons?domain={}&sz=64", host)
}

/// Lowercase service name with any parenthetical suffix removed,
/// e.g. "Twitter (X)" becomes "twitter".
fn service_key(name: &str) -> String {
    let bare = match name.find('(') {
        Some(idx) => &name[..idx],
        None => name,
    };
    bare.trim().to_lowercase()
}

/// Host of an absolute URL, if the string parses as one
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WidgetId;

    fn widget(kind: WidgetKind, title: Option<&str>, content: Option<&str>) -> Widget {
        Widget {
            id: WidgetId::Persisted(1),
            kind,
            title: title.map(|s| s.to_string()),
            content: content.map(|s| s.to_string()),
            size: "1x1".to_string(),
            position: 0,
            icon: None,
        }
    }

    #[test]
    fn explicit_icon_always_wins() {
        let mut w = widget(WidgetKind::Social, Some("GitHub"), Some("https://github.com"));
        w.icon = Some("custom-icon.png".to_string());
        assert_eq!(resolve_icon(&w).as_deref(), Some("custom-icon.png"));
    }

    #[test]
    fn notion_special_case_beats_social_table() {
        let w = widget(
            WidgetKind::Social,
            Some("GitHub"),
            Some("https://www.notion.so/alexdev/notes"),
        );
        assert_eq!(resolve_icon(&w).as_deref(), Some(NOTION_ICON));
    }

    #[test]
    fn non_social_non_image_has_no_icon() {
        let w = widget(WidgetKind::Text, None, Some("Check out my latest post"));
        assert_eq!(resolve_icon(&w), None);
        let e = widget(WidgetKind::Embed, Some("GitHub"), Some("https://github.com"));
        assert_eq!(resolve_icon(&e), None);
    }

    #[test]
    fn title_exact_match_hits_table() {
        let w = widget(WidgetKind::Social, Some("Instagram"), None);
        assert_eq!(resolve_icon(&w).as_deref(), Some("ci ci-instagram ci-2x"));
    }

    #[test]
    fn content_substring_match_strips_parenthetical() {
        let w = widget(WidgetKind::Social, Some("My feed"), Some("https://twitter.com/alexdev"));
        assert_eq!(resolve_icon(&w).as_deref(), Some("ci ci-twitter ci-2x"));
    }

    #[test]
    fn unknown_absolute_url_falls_back_to_favicon_service() {
        let w = widget(WidgetKind::Social, Some("Blog"), Some("https://blog.example.com/feed"));
        assert_eq!(
            resolve_icon(&w).as_deref(),
            Some("https://www.google.com/s2/favicons?domain=blog.example.com&sz=64")
        );
    }

    #[test]
    fn relative_or_missing_content_yields_none() {
        let w = widget(WidgetKind::Social, Some("Mystery"), Some("not a url"));
        assert_eq!(resolve_icon(&w), None);
        let empty = widget(WidgetKind::Social, Some("Mystery"), None);
        assert_eq!(resolve_icon(&empty), None);
    }

    #[test]
    fn substring_ties_break_by_table_order() {
        // Both "instagram" and "github" appear; Instagram is listed first
        let w = widget(
            WidgetKind::Social,
            None,
            Some("https://example.com/github-to-instagram-mirror"),
        );
        for _ in 0..10 {
            assert_eq!(resolve_icon(&w).as_deref(), Some("ci ci-instagram ci-2x"));
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let w = widget(WidgetKind::Social, Some("GitHub"), Some("https://github.com"));
        let first = resolve_icon(&w);
        for _ in 0..10 {
            assert_eq!(resolve_icon(&w), first);
        }
    }
}
