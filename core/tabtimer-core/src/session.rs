//! Session state and the identity tracker that decides when it resets.
//!
//! A session is "one video or one stream". Everything inferred about it (live
//! origin, finished hold, last shown elapsed value) lives in [`SessionState`]
//! and is discarded as a whole when [`IdentityTracker`] sees new content.

use crate::live_start::{LiveStart, OriginSource};
use crate::media::MediaId;
use crate::platform::PlatformAdapter;
use crate::page::PageProbe;
use std::fmt;

/// Authoritative origins closer than this to the current one are the same origin.
pub const RESNAP_THRESHOLD_MS: u64 = 5_000;
/// A text-derived elapsed value this far below the last shown one means a new stream.
pub const ELAPSED_DROP_THRESHOLD_SECS: u64 = 15;

/// How long the finished indicator is forced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishedHold {
    #[default]
    NotFinished,
    Until(u64),
    Forever,
}

impl FinishedHold {
    pub fn active_at(&self, now_ms: u64) -> bool {
        match self {
            FinishedHold::NotFinished => false,
            FinishedHold::Until(until) => now_ms <= *until,
            FinishedHold::Forever => true,
        }
    }
}

/// Smoothed play state remembered for hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
}

/// Per-page session fields. Reset only as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Stream start read from the page; wins over the fallback.
    pub live_origin_ms: Option<u64>,
    pub origin_source: Option<OriginSource>,
    /// First time this session saw a live element, used until an origin is found.
    pub fallback_origin_ms: Option<u64>,
    pub last_state: Option<PlayState>,
    /// Last time the element was observed actually playing.
    pub last_playing_at_ms: Option<u64>,
    pub last_shown_elapsed_secs: Option<u64>,
    pub finished: FinishedHold,
    /// Set once a hold was entered for the current ended episode.
    pub finished_latched: bool,
    pub quarantine_until_ms: Option<u64>,
    pub last_live_seen_ms: Option<u64>,
    pub last_origin_probe_ms: Option<u64>,
    pub identity_key: Option<String>,
}

/// What happened to an offered live start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginUpdate {
    Adopted,
    Resnapped,
    Unchanged,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards every session-scoped field.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Origin elapsed time is measured from, if any is known yet.
    pub fn origin_ms(&self) -> Option<u64> {
        self.live_origin_ms.or(self.fallback_origin_ms)
    }

    /// Origin to use now, starting the fallback clock on first use.
    pub fn origin_or_start_fallback(&mut self, now_ms: u64) -> u64 {
        if let Some(origin) = self.origin_ms() {
            return origin;
        }
        self.fallback_origin_ms = Some(now_ms);
        now_ms
    }

    /// Considers a freshly acquired live start.
    ///
    /// The first start is adopted and replaces the fallback. Later starts only
    /// re-snap when they disagree by more than 5 s, or when the on-screen
    /// elapsed value dropped by more than 15 s below what was last shown.
    pub fn offer_origin(&mut self, start: &LiveStart) -> OriginUpdate {
        let Some(current) = self.live_origin_ms else {
            self.adopt_origin(start);
            return OriginUpdate::Adopted;
        };

        let disagrees = current.abs_diff(start.origin_ms) > RESNAP_THRESHOLD_MS;
        let dropped = match (start.elapsed_secs, self.last_shown_elapsed_secs) {
            (Some(read), Some(shown)) => read + ELAPSED_DROP_THRESHOLD_SECS < shown,
            _ => false,
        };
        if disagrees || dropped {
            self.adopt_origin(start);
            return OriginUpdate::Resnapped;
        }
        OriginUpdate::Unchanged
    }

    fn adopt_origin(&mut self, start: &LiveStart) {
        self.live_origin_ms = Some(start.origin_ms);
        self.origin_source = Some(start.source);
        self.fallback_origin_ms = None;
    }

    pub fn is_finished_at(&self, now_ms: u64) -> bool {
        self.finished.active_at(now_ms)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    Navigation,
    SoftNavigation,
    IdentityChanged,
    MediaReplaced,
}

impl ResetReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetReason::Navigation => "navigation",
            ResetReason::SoftNavigation => "soft-navigation",
            ResetReason::IdentityChanged => "identity-changed",
            ResetReason::MediaReplaced => "media-replaced",
        }
    }

    /// Resets that invalidate every discovered media element.
    pub fn drops_media(&self) -> bool {
        matches!(self, ResetReason::Navigation | ResetReason::SoftNavigation)
    }
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex MD5 of `"<platform>|<part>|<part>…"`.
pub fn identity_key(platform: &str, parts: &[String]) -> String {
    let mut joined = String::from(platform);
    for part in parts {
        joined.push('|');
        joined.push_str(part);
    }
    format!("{:x}", md5::compute(joined.as_bytes()))
}

/// Identity key for the page as the adapter sees it now.
pub fn page_identity(adapter: &dyn PlatformAdapter, page: &dyn PageProbe) -> Option<String> {
    adapter
        .identity_parts(page)
        .map(|parts| identity_key(adapter.name(), &parts))
}

/// Watches URL, content identity and the active element for "new content".
#[derive(Debug, Clone, Default)]
pub struct IdentityTracker {
    last_url: Option<String>,
    last_media: Option<MediaId>,
    last_navigation_ms: Option<u64>,
}

impl IdentityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an explicit navigation event from the host.
    pub fn note_navigation(&mut self, url: Option<String>, now_ms: u64) {
        if let Some(url) = url {
            self.last_url = Some(url);
        }
        self.last_media = None;
        self.last_navigation_ms = Some(now_ms);
    }

    pub fn last_navigation_ms(&self) -> Option<u64> {
        self.last_navigation_ms
    }

    /// URL change observed at tick time, for hosts that navigate without events.
    pub fn check_url(&mut self, url: &str, now_ms: u64) -> Option<ResetReason> {
        let changed = matches!(&self.last_url, Some(last) if last != url);
        if self.last_url.as_deref() != Some(url) {
            self.last_url = Some(url.to_string());
        }
        if changed {
            self.last_media = None;
            self.last_navigation_ms = Some(now_ms);
            return Some(ResetReason::Navigation);
        }
        None
    }

    /// Compares the current identity and active element against what the
    /// session was built on. The caller resets the session on `Some`.
    ///
    /// An absent identity (page not ready) keeps the previous one.
    pub fn observe(
        &mut self,
        session: &SessionState,
        identity: Option<&str>,
        active: Option<&MediaId>,
        still_attached: impl Fn(&MediaId) -> bool,
    ) -> Option<ResetReason> {
        let mut reason = None;

        if let (Some(current), Some(seen)) = (session.identity_key.as_deref(), identity) {
            if current != seen {
                reason = Some(ResetReason::IdentityChanged);
            }
        }

        if reason.is_none() {
            if let (Some(previous), Some(active)) = (&self.last_media, active) {
                if previous != active && !still_attached(previous) {
                    reason = Some(ResetReason::MediaReplaced);
                }
            }
        }

        if let Some(active) = active {
            self.last_media = Some(active.clone());
        }
        reason
    }
}
