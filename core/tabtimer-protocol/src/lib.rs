//! Wire types shared between the tab-timer page core and its collaborators.
//!
//! The popup, the options page and the background aggregator all talk to the
//! page core through these types, so keeping them in one crate prevents schema
//! drift. The page core stays the authority on validation; collaborators reuse
//! the same types to build valid requests and to read stored preferences.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;
const MAX_REQUEST_ID_LEN: usize = 128;

// ═══════════════════════════════════════════════════════════════════════════════
// Preference schema (owned by the external preference store)
// ═══════════════════════════════════════════════════════════════════════════════

/// Global settings exactly as the preference store holds them.
///
/// Every field is optional: the store may be partially written by an older
/// version, and the page core substitutes defaults for anything missing or
/// malformed. Numbers are accepted as JSON numbers or numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_playing_live: Option<String>,
    #[serde(
        default,
        rename = "prefixPlayingVOD",
        skip_serializing_if = "Option::is_none"
    )]
    pub prefix_playing_vod: Option<String>,
    /// Single playing prefix written by older builds; superseded by the split keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_playing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_paused: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_prefix: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_hold_ms: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub update_interval_ms: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_enabled: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub hide_when_inactive: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub live_show_elapsed: Option<bool>,
}

/// Per-site preferences, keyed by canonical hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteOverride {
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub enabled: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_enabled: Option<bool>,
}

/// One consistent read of the preference store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceSnapshot {
    #[serde(default)]
    pub settings: StoredSettings,
    #[serde(default)]
    pub sites: BTreeMap<String, SiteOverride>,
}

impl PreferenceSnapshot {
    /// Looks up the site entry for `host`, canonicalizing both sides.
    pub fn site(&self, host: &str) -> Option<&SiteOverride> {
        let wanted = canonical_host(host);
        if wanted.is_empty() {
            return None;
        }
        self.sites.get(&wanted).or_else(|| {
            self.sites
                .iter()
                .find(|(key, _)| canonical_host(key) == wanted)
                .map(|(_, site)| site)
        })
    }
}

/// Canonical form of a hostname used as the site key.
///
/// Lowercased, trailing dot and a leading `www.` removed. Accepts either a bare
/// hostname or a full URL.
pub fn canonical_host(input: &str) -> String {
    let trimmed = input.trim();
    let host = if trimmed.contains("://") {
        host_from_url(trimmed).unwrap_or_default()
    } else {
        trimmed.to_string()
    };
    let host = host.to_ascii_lowercase();
    let host = host.trim_end_matches('.');
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

/// Extracts the hostname of a URL, `None` when the URL has no host.
pub fn host_from_url(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.to_string()))
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Playback classification
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackKind {
    PlayingLive,
    PlayingVod,
    PausedLive,
    PausedVod,
    Finished,
    Idle,
}

impl PlaybackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackKind::PlayingLive => "playing-live",
            PlaybackKind::PlayingVod => "playing-vod",
            PlaybackKind::PausedLive => "paused-live",
            PlaybackKind::PausedVod => "paused-vod",
            PlaybackKind::Finished => "finished",
            PlaybackKind::Idle => "idle",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, PlaybackKind::PlayingLive | PlaybackKind::PausedLive)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackKind::PlayingLive | PlaybackKind::PlayingVod)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Control messages
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    ApplySettings,
    GetStatus,
    SetLocalEnabledOverride {
        #[serde(default)]
        value: Option<bool>,
    },
    GetLocalEnabledOverride,
    SetLocalHideInactiveOverride {
        #[serde(default)]
        value: Option<bool>,
    },
    GetLocalHideInactiveOverride,
    ToggleMuteAll,
    QueryMuteState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlResponse {
    Applied,
    Status(StatusReport),
    Override(OverrideReport),
    MuteToggled(MuteToggleReport),
    MuteState(MuteStateReport),
}

/// Snapshot of what the page core is currently showing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PlaybackKind>,
    /// Remaining seconds for VOD, elapsed seconds for live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    #[serde(default)]
    pub live: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,
}

impl StatusReport {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            kind: None,
            seconds: None,
            live: false,
            muted: false,
            playback_rate: None,
        }
    }

    pub fn idle() -> Self {
        Self {
            enabled: true,
            kind: Some(PlaybackKind::Idle),
            ..Self::disabled()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideReport {
    #[serde(rename = "override")]
    pub value: Option<bool>,
    pub effective: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteToggleReport {
    pub applied: usize,
    pub muted: bool,
}

/// Mute state of one frame, or of a whole tab after merging frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteStateReport {
    pub has_media: bool,
    pub any_muted: bool,
    pub all_muted: bool,
    pub count: usize,
}

/// Outcome of applying a mute value inside one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteApplyReport {
    pub applied: usize,
    pub all_muted: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Envelope
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    #[serde(default)]
    pub id: Option<String>,
    pub message: ControlRequest,
}

impl Request {
    pub fn new(message: ControlRequest) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            id: None,
            message,
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(ErrorInfo::new(
                "protocol_mismatch",
                "unsupported protocol version",
            ));
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(ErrorInfo::new("invalid_id", "id must not be blank"));
            }
            if id.len() > MAX_REQUEST_ID_LEN {
                return Err(ErrorInfo::new(
                    "invalid_id",
                    "id must be 128 characters or fewer",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ControlResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Response {
    pub fn ok(id: Option<String>, data: ControlResponse) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self::error_with_info(id, ErrorInfo::new(code, message))
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub fn parse_request(value: Value) -> Result<Request, ErrorInfo> {
    let request: Request = serde_json::from_value(value).map_err(|err| {
        ErrorInfo::new(
            "invalid_request",
            format!("request payload is invalid: {}", err),
        )
    })?;
    request.validate()?;
    Ok(request)
}

pub fn parse_request_bytes(bytes: &[u8]) -> Result<Request, ErrorInfo> {
    if bytes.len() > MAX_REQUEST_BYTES {
        return Err(ErrorInfo::new(
            "request_too_large",
            "request exceeded maximum size",
        ));
    }
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }
    let value: Value = serde_json::from_slice(bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })?;
    parse_request(value)
}
