//! YouTube watch, live, shorts and embed pages.

use super::{generic::url_without_fragment, host_is, PlatformAdapter};
use crate::live_start::parse_timestamp_ms;
use crate::page::PageProbe;
use serde_json::Value;

/// Player response the watch page embeds for the current video.
pub const PLAYER_RESPONSE_BLOB: &str = "ytInitialPlayerResponse";
/// Set on the player while it shows a live stream.
pub const LIVE_BADGE_SELECTOR: &str = ".ytp-live";

const START_TIMESTAMP_POINTER: &str =
    "/microformat/playerMicroformatRenderer/liveBroadcastDetails/startTimestamp";
const LIVE_NOW_POINTER: &str = "/microformat/playerMicroformatRenderer/liveBroadcastDetails/isLiveNow";

pub struct YouTubeAdapter;

impl YouTubeAdapter {
    /// The player response, if it describes the video in the current URL.
    ///
    /// After an in-app navigation the page keeps the previous response around
    /// until the new one loads; a stale response must not leak into the next video.
    fn player_response(&self, page: &dyn PageProbe) -> Option<Value> {
        let response = page.state_blob(PLAYER_RESPONSE_BLOB)?;
        let current = video_id(&page.location());
        let described = response
            .pointer("/videoDetails/videoId")
            .and_then(Value::as_str);
        match (current, described) {
            (Some(current), Some(described)) if current != described => None,
            _ => Some(response),
        }
    }
}

impl PlatformAdapter for YouTubeAdapter {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn matches(&self, host: &str) -> bool {
        host_is(host, "youtube.com") || host_is(host, "youtube-nocookie.com") || host == "youtu.be"
    }

    fn live_signal(&self, page: &dyn PageProbe) -> bool {
        if page.element_exists(LIVE_BADGE_SELECTOR) {
            return true;
        }
        self.player_response(page)
            .map(|response| {
                response.pointer("/videoDetails/isLive").and_then(Value::as_bool) == Some(true)
                    || response.pointer(LIVE_NOW_POINTER).and_then(Value::as_bool) == Some(true)
            })
            .unwrap_or(false)
    }

    fn api_start_ms(&self, page: &dyn PageProbe) -> Option<i64> {
        let response = self.player_response(page)?;
        response
            .pointer(START_TIMESTAMP_POINTER)
            .and_then(Value::as_str)
            .and_then(parse_timestamp_ms)
    }

    fn identity_parts(&self, page: &dyn PageProbe) -> Option<Vec<String>> {
        let location = page.location();
        Some(vec![
            video_id(&location).unwrap_or_else(|| url_without_fragment(&location))
        ])
    }

    fn base_title(&self, page: &dyn PageProbe) -> Option<String> {
        self.player_response(page)
            .and_then(|response| {
                response
                    .pointer("/videoDetails/title")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .or_else(|| page.meta_content("og:title"))
            .filter(|title| !title.trim().is_empty())
    }
}

/// Video id from `watch?v=`, `/live/`, `/shorts/`, `/embed/` or `youtu.be/` URLs.
pub fn video_id(location: &str) -> Option<String> {
    let parsed = url::Url::parse(location).ok()?;
    let host = tabtimer_protocol::canonical_host(parsed.host_str()?);
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());

    let id = if host == "youtu.be" {
        segments.next().map(str::to_string)
    } else if let Some((_, v)) = parsed.query_pairs().find(|(key, _)| key == "v") {
        Some(v.into_owned())
    } else {
        match (segments.next(), segments.next()) {
            (Some("live" | "shorts" | "embed"), Some(id)) => Some(id.to_string()),
            _ => None,
        }
    };
    id.filter(|id| !id.is_empty())
}
