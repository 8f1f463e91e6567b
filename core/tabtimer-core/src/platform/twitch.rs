//! Twitch channels and past broadcasts.

use super::{first_text, host_is, PlatformAdapter};
use crate::live_start::parse_timestamp_ms;
use crate::page::PageProbe;
use serde_json::Value;

/// Client state for the stream currently shown on a channel page.
pub const STREAM_BLOB: &str = "stream";
pub const LIVE_INDICATOR_SELECTOR: &str = ".live-indicator-container";
pub const STREAM_TITLE_SELECTOR: &str = "[data-a-target=\"stream-title\"]";
/// On-player uptime counter.
pub const UPTIME_SELECTOR: &str = ".live-time";

/// First path segments that are site sections, not channels.
const RESERVED_PATHS: &[&str] = &[
    "directory",
    "downloads",
    "jobs",
    "p",
    "search",
    "settings",
    "subscriptions",
    "turbo",
    "wallet",
];

pub struct TwitchAdapter;

impl PlatformAdapter for TwitchAdapter {
    fn name(&self) -> &'static str {
        "twitch"
    }

    fn matches(&self, host: &str) -> bool {
        host_is(host, "twitch.tv")
    }

    fn is_live_platform(&self) -> bool {
        true
    }

    fn live_signal(&self, page: &dyn PageProbe) -> bool {
        if page.element_exists(LIVE_INDICATOR_SELECTOR) {
            return true;
        }
        page.state_blob(STREAM_BLOB)
            .and_then(|stream| {
                stream
                    .get("type")
                    .and_then(Value::as_str)
                    .map(|kind| kind.eq_ignore_ascii_case("live"))
            })
            .unwrap_or(false)
    }

    fn api_start_ms(&self, page: &dyn PageProbe) -> Option<i64> {
        let stream = page.state_blob(STREAM_BLOB)?;
        stream
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(parse_timestamp_ms)
    }

    fn elapsed_text_selectors(&self) -> &'static [&'static str] {
        &[UPTIME_SELECTOR]
    }

    fn identity_parts(&self, page: &dyn PageProbe) -> Option<Vec<String>> {
        match route(&page.location())? {
            Route::Video(id) => Some(vec!["video".to_string(), id]),
            Route::Channel(channel) => {
                let title = first_text(page, STREAM_TITLE_SELECTOR)?;
                let stream_id = page
                    .state_blob(STREAM_BLOB)
                    .and_then(|stream| stream.get("id").map(id_text))
                    .unwrap_or_default();
                Some(vec![channel, stream_id, title])
            }
        }
    }

    fn base_title(&self, page: &dyn PageProbe) -> Option<String> {
        first_text(page, STREAM_TITLE_SELECTOR)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Channel(String),
    Video(String),
}

fn route(location: &str) -> Option<Route> {
    let parsed = url::Url::parse(location).ok()?;
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let first = segments.next()?.to_ascii_lowercase();
    if first == "videos" {
        return segments.next().map(|id| Route::Video(id.to_string()));
    }
    if RESERVED_PATHS.contains(&first.as_str()) {
        return None;
    }
    Some(Route::Channel(first))
}

fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ScriptedPage;
    use serde_json::json;

    fn channel_page(title: &str, stream: Value) -> ScriptedPage {
        let mut page = ScriptedPage::new("https://www.twitch.tv/SomeChannel", "SomeChannel - Twitch");
        page.signals_mut()
            .texts
            .insert(STREAM_TITLE_SELECTOR.to_string(), vec![title.to_string()]);
        page.signals_mut().blobs.insert(STREAM_BLOB.to_string(), stream);
        page
    }

    #[test]
    fn identity_combines_channel_stream_and_title() {
        let page = channel_page("Speedruns", json!({"id": 42, "type": "live"}));
        assert_eq!(
            TwitchAdapter.identity_parts(&page),
            Some(vec![
                "somechannel".to_string(),
                "42".to_string(),
                "Speedruns".to_string()
            ])
        );
    }

    #[test]
    fn identity_waits_for_stream_title() {
        let page = ScriptedPage::new("https://www.twitch.tv/somechannel", "Twitch");
        assert!(TwitchAdapter.identity_parts(&page).is_none());
    }

    #[test]
    fn past_broadcasts_are_identified_by_video_id() {
        let page = ScriptedPage::new("https://www.twitch.tv/videos/123456", "VOD");
        assert_eq!(
            TwitchAdapter.identity_parts(&page),
            Some(vec!["video".to_string(), "123456".to_string()])
        );
    }

    #[test]
    fn reads_stream_state() {
        let page = channel_page(
            "Speedruns",
            json!({"id": "9", "type": "live", "createdAt": "2024-05-01T12:00:00Z"}),
        );
        assert!(TwitchAdapter.live_signal(&page));
        assert_eq!(TwitchAdapter.api_start_ms(&page), Some(1_714_564_800_000));
    }

    #[test]
    fn reserved_sections_have_no_identity() {
        let page = ScriptedPage::new("https://www.twitch.tv/directory/all", "Browse");
        assert!(TwitchAdapter.identity_parts(&page).is_none());
    }
}
