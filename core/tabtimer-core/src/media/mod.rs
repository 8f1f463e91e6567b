//! Media elements as the page core sees them.
//!
//! The host page owns the real `<video>`/`<audio>` nodes; the core talks to
//! them only through [`MediaElement`] and reads each one into an immutable
//! [`MediaSnapshot`] once per evaluation.

mod registry;

pub use registry::MediaRegistry;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Host-assigned identity of a media element. Stable for the element's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Playback events the registry listens to on every registered element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaEventKind {
    Play,
    Playing,
    Pause,
    Ended,
    RateChange,
    Seeking,
    LoadedMetadata,
    TimeUpdate,
}

impl MediaEventKind {
    pub const LISTENED: [MediaEventKind; 8] = [
        MediaEventKind::Play,
        MediaEventKind::Playing,
        MediaEventKind::Pause,
        MediaEventKind::Ended,
        MediaEventKind::RateChange,
        MediaEventKind::Seeking,
        MediaEventKind::LoadedMetadata,
        MediaEventKind::TimeUpdate,
    ];

    /// Events that mark the element as the most recently active one.
    pub fn starts_playback(&self) -> bool {
        matches!(self, MediaEventKind::Play | MediaEventKind::Playing)
    }
}

/// A playable element in the host document.
///
/// Mirrors the subset of `HTMLMediaElement` the core reads. Setters take
/// `&self` because the element lives in the host and mutation goes through it.
pub trait MediaElement {
    fn id(&self) -> MediaId;
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;
    fn seeking(&self) -> bool;
    /// Seconds; `f64::INFINITY` for live streams, NaN or 0 before metadata.
    fn duration(&self) -> f64;
    fn current_time(&self) -> f64;
    fn playback_rate(&self) -> f64;
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);
    fn ready_state(&self) -> u8;
    fn is_connected(&self) -> bool;
    /// Resolved source URL, empty when none.
    fn current_src(&self) -> String;

    /// Called once when the registry adopts the element. Hosts subscribe the
    /// listed events and forward them as `PageEvent::Media`.
    fn wire_listeners(&self, events: &[MediaEventKind]) {
        let _ = events;
    }
}

pub type MediaHandle = Rc<dyn MediaElement>;

/// Everything the classifier reads from one element, captured at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaSnapshot {
    pub paused: bool,
    pub ended: bool,
    pub seeking: bool,
    #[serde(with = "js_number")]
    pub duration: f64,
    #[serde(with = "js_number")]
    pub current_time: f64,
    pub playback_rate: f64,
    pub muted: bool,
    pub ready_state: u8,
    pub connected: bool,
    pub src: String,
}

/// JSON has no infinity; accept `"Infinity"`/`"NaN"` strings and `null` the
/// way scripted hosts report media timelines.
mod js_number {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_none()
        } else if *value > 0.0 {
            serializer.serialize_str("Infinity")
        } else {
            serializer.serialize_str("-Infinity")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Some(Value::String(s)) => match s.trim() {
                "Infinity" | "inf" => f64::INFINITY,
                "-Infinity" | "-inf" => f64::NEG_INFINITY,
                other => other.parse().unwrap_or(f64::NAN),
            },
            _ => f64::NAN,
        })
    }
}

impl Default for MediaSnapshot {
    fn default() -> Self {
        Self {
            paused: true,
            ended: false,
            seeking: false,
            duration: f64::NAN,
            current_time: 0.0,
            playback_rate: 1.0,
            muted: false,
            ready_state: 0,
            connected: true,
            src: String::new(),
        }
    }
}

impl MediaSnapshot {
    pub fn capture(media: &dyn MediaElement) -> Self {
        Self {
            paused: media.paused(),
            ended: media.ended(),
            seeking: media.seeking(),
            duration: media.duration(),
            current_time: media.current_time(),
            playback_rate: media.playback_rate(),
            muted: media.muted(),
            ready_state: media.ready_state(),
            connected: media.is_connected(),
            src: media.current_src(),
        }
    }

    /// Not paused, not ended, advancing at a positive rate.
    pub fn is_playing_raw(&self) -> bool {
        !self.paused && !self.ended && effective_rate(self.playback_rate) > 0.0
    }

    pub fn has_infinite_duration(&self) -> bool {
        self.duration == f64::INFINITY
    }

    pub fn has_finite_duration(&self) -> bool {
        self.duration.is_finite() && self.duration > 0.0
    }

    /// A source plus either loaded metadata or playback activity. Placeholders
    /// and unloaded ad stubs fail this.
    pub fn is_real_media(&self) -> bool {
        let has_src = !self.src.trim().is_empty();
        let has_info = self.duration.is_finite() || self.ready_state > 0;
        let active = !self.paused
            || self.seeking
            || (self.current_time.is_finite() && self.current_time > 0.0);
        has_src && (has_info || active)
    }
}

/// Non-finite rates are reported by some players before metadata; treat as 1x.
fn effective_rate(rate: f64) -> f64 {
    if rate.is_finite() {
        rate
    } else {
        1.0
    }
}

pub fn is_playing_raw(media: &dyn MediaElement) -> bool {
    !media.paused() && !media.ended() && effective_rate(media.playback_rate()) > 0.0
}

pub fn is_real_media(media: &dyn MediaElement) -> bool {
    media.is_connected() && MediaSnapshot::capture(media).is_real_media()
}
