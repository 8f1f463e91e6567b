//! Live stream start-time acquisition.
//!
//! Sources are tried in priority order: platform API/state, embedded JSON-LD,
//! page meta tags, then on-screen elapsed-time text. A source that finds
//! nothing, or finds something implausible, falls through to the next one.

use crate::clock::MAX_ELAPSED_SECS;
use crate::page::PageProbe;
use crate::patterns::{RE_CLOCK_HMS, RE_CLOCK_MS, RE_CLOCK_WORDED};
use crate::platform::PlatformAdapter;
use chrono::{DateTime, NaiveDateTime};
use regex::Captures;
use serde::Serialize;
use serde_json::Value;

/// Start times older than this are stale or implausible.
pub const MAX_ORIGIN_AGE_MS: u64 = MAX_ELAPSED_SECS * 1000;
/// Start times this far in the future are treated as clock skew and clamped to now.
pub const FUTURE_TOLERANCE_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginSource {
    Api,
    StructuredData,
    Meta,
    ElapsedText,
}

impl OriginSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginSource::Api => "api",
            OriginSource::StructuredData => "structured-data",
            OriginSource::Meta => "meta",
            OriginSource::ElapsedText => "elapsed-text",
        }
    }
}

/// An acquired stream start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveStart {
    pub origin_ms: u64,
    pub source: OriginSource,
    /// The elapsed value read on screen, for text-derived starts.
    pub elapsed_secs: Option<u64>,
}

/// Runs the source chain for the current page.
pub fn find_live_start(
    adapter: &dyn PlatformAdapter,
    page: &dyn PageProbe,
    now_ms: u64,
) -> Option<LiveStart> {
    let timestamp_sources: [(OriginSource, Option<i64>); 3] = [
        (OriginSource::Api, adapter.api_start_ms(page)),
        (
            OriginSource::StructuredData,
            json_ld_start_ms(&page.json_ld_blobs()),
        ),
        (
            OriginSource::Meta,
            adapter
                .start_meta_keys()
                .iter()
                .filter_map(|key| page.meta_content(key))
                .find_map(|content| parse_timestamp_ms(&content)),
        ),
    ];

    for (source, timestamp) in timestamp_sources {
        let Some(timestamp) = timestamp else {
            continue;
        };
        match plausible_origin(timestamp, now_ms) {
            Some(origin_ms) => {
                return Some(LiveStart {
                    origin_ms,
                    source,
                    elapsed_secs: None,
                })
            }
            None => {
                tracing::debug!(
                    source = source.as_str(),
                    timestamp,
                    "Rejected implausible live start"
                );
            }
        }
    }

    let regions: Vec<String> = adapter
        .elapsed_text_selectors()
        .iter()
        .flat_map(|selector| page.select_text(selector))
        .collect();
    let reading = best_elapsed_reading(&regions)?;
    if reading.secs > MAX_ELAPSED_SECS {
        tracing::debug!(secs = reading.secs, "Rejected implausible elapsed text");
        return None;
    }
    Some(LiveStart {
        origin_ms: now_ms.saturating_sub(reading.secs * 1000),
        source: OriginSource::ElapsedText,
        elapsed_secs: Some(reading.secs),
    })
}

/// Accepts a start time no older than 48 hours and not meaningfully in the future.
pub fn plausible_origin(timestamp_ms: i64, now_ms: u64) -> Option<u64> {
    if timestamp_ms <= 0 {
        return None;
    }
    let origin = timestamp_ms as u64;
    if origin > now_ms {
        return (origin - now_ms <= FUTURE_TOLERANCE_MS).then_some(now_ms);
    }
    (now_ms - origin <= MAX_ORIGIN_AGE_MS).then_some(origin)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Timestamps
// ═══════════════════════════════════════════════════════════════════════════════

/// Parses RFC 3339 / ISO 8601 dates and epoch seconds or milliseconds.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(number) = raw.parse::<f64>() {
        if !number.is_finite() || number <= 0.0 {
            return None;
        }
        // Epoch seconds stay below 1e11 until the year 5138.
        return Some(if number >= 1e11 {
            number as i64
        } else {
            (number * 1000.0) as i64
        });
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// `startDate` of a live broadcast declared in JSON-LD.
///
/// Only broadcast nodes count (`BroadcastEvent` or `isLiveBroadcast`); a node
/// that already carries an `endDate` describes a finished broadcast.
pub fn json_ld_start_ms(blobs: &[String]) -> Option<i64> {
    blobs
        .iter()
        .filter_map(|blob| serde_json::from_str::<Value>(blob).ok())
        .find_map(|value| find_broadcast_start(&value))
}

fn find_broadcast_start(value: &Value) -> Option<i64> {
    match value {
        Value::Array(items) => items.iter().find_map(find_broadcast_start),
        Value::Object(map) => {
            if is_live_broadcast_node(value) && !map.contains_key("endDate") {
                if let Some(start) = map
                    .get("startDate")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp_ms)
                {
                    return Some(start);
                }
            }
            map.values()
                .filter(|child| child.is_object() || child.is_array())
                .find_map(find_broadcast_start)
        }
        _ => None,
    }
}

fn is_live_broadcast_node(value: &Value) -> bool {
    let live_flag = match value.get("isLiveBroadcast") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let broadcast_type = match value.get("@type") {
        Some(Value::String(kind)) => kind == "BroadcastEvent",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k.as_str() == Some("BroadcastEvent")),
        _ => false,
    };
    live_flag || broadcast_type
}

// ═══════════════════════════════════════════════════════════════════════════════
// Elapsed-time text
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClockFormat {
    Worded,
    MinutesSeconds,
    HoursMinutesSeconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElapsedReading {
    pub secs: u64,
    pub format: ClockFormat,
    pub has_hours: bool,
}

impl ElapsedReading {
    /// Hour-bearing readings are the most specific; then `H:MM:SS` over
    /// `M:SS` over worded.
    fn specificity(&self) -> (bool, ClockFormat) {
        (self.has_hours, self.format)
    }
}

/// Most specific elapsed reading across all candidate regions. Earlier
/// regions win ties.
pub fn best_elapsed_reading(regions: &[String]) -> Option<ElapsedReading> {
    let mut best: Option<ElapsedReading> = None;
    for reading in regions.iter().flat_map(|text| readings(text)) {
        match best {
            Some(current) if reading.specificity() <= current.specificity() => {}
            _ => best = Some(reading),
        }
    }
    best
}

/// Every clock-like reading in one text.
fn readings(text: &str) -> Vec<ElapsedReading> {
    let mut found: Vec<ElapsedReading> = RE_CLOCK_HMS
        .captures_iter(text)
        .filter_map(|caps| {
            let secs = group(&caps, 1)? * 3600 + group(&caps, 2)? * 60 + group(&caps, 3)?;
            Some(ElapsedReading {
                secs,
                format: ClockFormat::HoursMinutesSeconds,
                has_hours: true,
            })
        })
        .collect();

    if found.is_empty() {
        found.extend(RE_CLOCK_MS.captures_iter(text).filter_map(|caps| {
            Some(ElapsedReading {
                secs: group(&caps, 1)? * 60 + group(&caps, 2)?,
                format: ClockFormat::MinutesSeconds,
                has_hours: false,
            })
        }));
    }

    found.extend(RE_CLOCK_WORDED.captures_iter(text).filter_map(|caps| {
        let hours = group(&caps, 1);
        let minutes = group(&caps, 2);
        let seconds = group(&caps, 3);
        if hours.is_none() && minutes.is_none() && seconds.is_none() {
            return None;
        }
        let secs = hours
            .unwrap_or(0)
            .saturating_mul(3600)
            .saturating_add(minutes.unwrap_or(0).saturating_mul(60))
            .saturating_add(seconds.unwrap_or(0));
        Some(ElapsedReading {
            secs,
            format: ClockFormat::Worded,
            has_hours: hours.is_some(),
        })
    }));

    found
}

fn group(caps: &Captures<'_>, index: usize) -> Option<u64> {
    caps.get(index)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{GenericAdapter, TwitchAdapter};
    use crate::sim::ScriptedPage;
    use serde_json::json;

    const NOW: u64 = 1_714_564_800_000;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prefers_hour_bearing_clock_across_regions() {
        let reading = best_elapsed_reading(&texts(&["4:05", "Live for 1:02:03"])).expect("reading");
        assert_eq!(reading.secs, 3723);
        assert_eq!(reading.format, ClockFormat::HoursMinutesSeconds);
    }

    #[test]
    fn minutes_seconds_beats_worded_without_hours() {
        let reading =
            best_elapsed_reading(&texts(&["5 minutes ago", "12:34"])).expect("reading");
        assert_eq!(reading.secs, 754);
        assert_eq!(reading.format, ClockFormat::MinutesSeconds);
    }

    #[test]
    fn worded_duration_with_hours_is_read() {
        let reading = best_elapsed_reading(&texts(&["Streaming for 2 hours 5 minutes"]))
            .expect("reading");
        assert_eq!(reading.secs, 2 * 3600 + 5 * 60);
        assert!(reading.has_hours);
    }

    #[test]
    fn text_without_clock_reads_nothing() {
        assert!(best_elapsed_reading(&texts(&["LIVE", "1.2K viewers"])).is_none());
    }

    #[test]
    fn parses_timestamp_shapes() {
        assert_eq!(
            parse_timestamp_ms("2024-05-01T12:00:00Z"),
            Some(1_714_564_800_000)
        );
        assert_eq!(
            parse_timestamp_ms("2024-05-01T14:00:00+02:00"),
            Some(1_714_564_800_000)
        );
        assert_eq!(parse_timestamp_ms("1714564800"), Some(1_714_564_800_000));
        assert_eq!(parse_timestamp_ms("1714564800000"), Some(1_714_564_800_000));
        assert_eq!(
            parse_timestamp_ms("2024-05-01T12:00:00"),
            Some(1_714_564_800_000)
        );
        assert_eq!(parse_timestamp_ms("yesterday"), None);
        assert_eq!(parse_timestamp_ms("-5"), None);
    }

    #[test]
    fn json_ld_requires_live_broadcast_without_end() {
        let live = json!({
            "@context": "https://schema.org",
            "@type": "VideoObject",
            "publication": {"@type": "BroadcastEvent", "isLiveBroadcast": true,
                            "startDate": "2024-05-01T11:00:00Z"}
        })
        .to_string();
        let ended = json!({
            "@type": "BroadcastEvent",
            "startDate": "2024-05-01T09:00:00Z",
            "endDate": "2024-05-01T10:00:00Z"
        })
        .to_string();
        let event = json!({"@type": "Event", "startDate": "2024-05-01T08:00:00Z"}).to_string();

        assert_eq!(
            json_ld_start_ms(&[ended.clone(), event.clone(), live]),
            Some(1_714_561_200_000)
        );
        assert_eq!(json_ld_start_ms(&[ended, event]), None);
        assert_eq!(json_ld_start_ms(&["{broken".to_string()]), None);
    }

    #[test]
    fn rejects_stale_and_far_future_origins() {
        assert_eq!(plausible_origin((NOW - 3_600_000) as i64, NOW), Some(NOW - 3_600_000));
        assert_eq!(plausible_origin((NOW - MAX_ORIGIN_AGE_MS - 1) as i64, NOW), None);
        assert_eq!(plausible_origin((NOW + 30_000) as i64, NOW), Some(NOW));
        assert_eq!(plausible_origin((NOW + 120_000) as i64, NOW), None);
    }

    #[test]
    fn api_beats_structured_data_and_meta() {
        let mut page = ScriptedPage::new("https://www.twitch.tv/somechannel", "Twitch");
        page.signals_mut().blobs.insert(
            "stream".to_string(),
            json!({"type": "live", "createdAt": "2024-05-01T10:00:00Z"}),
        );
        page.signals_mut()
            .meta
            .insert("startDate".to_string(), "2024-05-01T11:00:00Z".to_string());

        let start = find_live_start(&TwitchAdapter, &page, NOW).expect("start");
        assert_eq!(start.source, OriginSource::Api);
        assert_eq!(start.origin_ms, NOW - 2 * 3_600_000);
    }

    #[test]
    fn stale_source_falls_through_to_next() {
        let mut page = ScriptedPage::new("https://example.com/live", "Live");
        page.signals_mut().json_ld.push(
            json!({"@type": "BroadcastEvent", "startDate": "2024-04-01T00:00:00Z"}).to_string(),
        );
        page.signals_mut()
            .meta
            .insert("startDate".to_string(), "2024-05-01T11:30:00Z".to_string());

        let start = find_live_start(&GenericAdapter, &page, NOW).expect("start");
        assert_eq!(start.source, OriginSource::Meta);
        assert_eq!(start.origin_ms, NOW - 1_800_000);
    }

    #[test]
    fn elapsed_text_derives_origin_from_now() {
        let mut page = ScriptedPage::new("https://www.twitch.tv/somechannel", "Twitch");
        page.signals_mut()
            .texts
            .insert(".live-time".to_string(), vec!["1:00:00".to_string()]);

        let start = find_live_start(&TwitchAdapter, &page, NOW).expect("start");
        assert_eq!(start.source, OriginSource::ElapsedText);
        assert_eq!(start.elapsed_secs, Some(3600));
        assert_eq!(start.origin_ms, NOW - 3_600_000);
    }

    #[test]
    fn nothing_found_yields_none() {
        let page = ScriptedPage::new("https://example.com/", "Page");
        assert!(find_live_start(&GenericAdapter, &page, NOW).is_none());
    }
}
