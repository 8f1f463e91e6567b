//! Playback classification.
//!
//! Turns one media snapshot plus platform signals into a [`PlaybackKind`] and
//! the seconds to show. All memory between evaluations (hysteresis, finished
//! hold, live origin, quarantine) lives in the [`SessionState`] passed in.

use crate::clock::{elapsed_secs, remaining_secs};
use crate::media::MediaSnapshot;
use crate::session::{FinishedHold, PlayState, SessionState};
use tabtimer_protocol::PlaybackKind;

/// Pauses shorter than this after playing still count as playing.
pub const STICKY_WINDOW_MS: u64 = 1_500;
/// Remaining time at or below which a `timeupdate` counts as the end.
pub const NEAR_END_SECS: f64 = 0.15;
pub const DEFAULT_QUARANTINE_MS: u64 = 10_000;
pub const NAVIGATION_EXTENSION_MS: u64 = 5_000;

const SUSPECT_DURATION_SECS: f64 = 3_600.0;
const SUSPECT_TOLERANCE_SECS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierTuning {
    pub sticky_window_ms: u64,
    /// How long a suspicious one-hour duration is ignored on live platforms.
    pub quarantine_ms: u64,
    /// Added to the quarantine when the page navigated within this window.
    pub navigation_extension_ms: u64,
}

impl Default for ClassifierTuning {
    fn default() -> Self {
        Self {
            sticky_window_ms: STICKY_WINDOW_MS,
            quarantine_ms: DEFAULT_QUARANTINE_MS,
            navigation_extension_ms: NAVIGATION_EXTENSION_MS,
        }
    }
}

/// Everything besides the session that one classification reads.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyInput<'a> {
    pub candidate: Option<&'a MediaSnapshot>,
    pub now_ms: u64,
    /// Platform live badge or live-now state.
    pub live_signal: bool,
    pub live_platform: bool,
    pub live_show_elapsed: bool,
    pub finished_enabled: bool,
    pub finished_hold_ms: u64,
    pub last_navigation_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: PlaybackKind,
    /// Remaining seconds for VOD, elapsed seconds for live, `None` otherwise.
    pub seconds: Option<u64>,
}

impl Classification {
    pub fn idle() -> Self {
        Self {
            kind: PlaybackKind::Idle,
            seconds: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            kind: PlaybackKind::Finished,
            seconds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Show(Classification),
    /// Suspicious duration on a live platform; leave the title alone.
    Quarantined { until_ms: u64 },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    tuning: ClassifierTuning,
}

impl Classifier {
    pub fn new(tuning: ClassifierTuning) -> Self {
        Self { tuning }
    }

    pub fn tuning(&self) -> ClassifierTuning {
        self.tuning
    }

    pub fn classify(&self, input: &ClassifyInput<'_>, session: &mut SessionState) -> Verdict {
        let now = input.now_ms;

        if session.finished.active_at(now) {
            return Verdict::Show(Classification::finished());
        }
        if let FinishedHold::Until(until) = session.finished {
            tracing::debug!(until_ms = until, "Finished hold expired");
            session.finished = FinishedHold::NotFinished;
        }

        let Some(media) = input.candidate else {
            session.last_state = None;
            return Verdict::Show(Classification::idle());
        };

        if media.ended {
            session.last_state = None;
            session.last_playing_at_ms = None;
            if input.finished_enabled && enter_finished(session, input.finished_hold_ms, now) {
                return Verdict::Show(Classification::finished());
            }
            return Verdict::Show(Classification::idle());
        }

        let raw_playing = media.is_playing_raw();
        if raw_playing {
            session.finished_latched = false;
        }
        let playing = self.smooth(raw_playing, now, session);

        if media.has_infinite_duration() || input.live_signal {
            session.last_live_seen_ms = Some(now);
            session.quarantine_until_ms = None;
            return Verdict::Show(live(playing, input, session));
        }

        if let Some(until_ms) = self.quarantine(media, input, session) {
            return Verdict::Quarantined { until_ms };
        }

        match remaining_secs(media.duration, media.current_time) {
            Some(remaining) => Verdict::Show(Classification {
                kind: if playing {
                    PlaybackKind::PlayingVod
                } else {
                    PlaybackKind::PausedVod
                },
                seconds: Some(remaining),
            }),
            None => Verdict::Show(Classification::idle()),
        }
    }

    /// Raw playing wins immediately; a pause only counts once the element has
    /// not been seen playing for the sticky window.
    fn smooth(&self, raw_playing: bool, now: u64, session: &mut SessionState) -> bool {
        if raw_playing {
            session.last_state = Some(PlayState::Playing);
            session.last_playing_at_ms = Some(now);
            return true;
        }
        let sticky = session.last_state == Some(PlayState::Playing)
            && session
                .last_playing_at_ms
                .map(|at| now.saturating_sub(at) < self.tuning.sticky_window_ms)
                .unwrap_or(false);
        if sticky {
            return true;
        }
        session.last_state = Some(PlayState::Paused);
        false
    }

    /// Returns the quarantine deadline while a one-hour duration right after a
    /// live platform navigation (or right after live playback) is suppressed.
    fn quarantine(
        &self,
        media: &MediaSnapshot,
        input: &ClassifyInput<'_>,
        session: &mut SessionState,
    ) -> Option<u64> {
        let suspicious = input.live_platform
            && media.has_finite_duration()
            && (media.duration - SUSPECT_DURATION_SECS).abs() <= SUSPECT_TOLERANCE_SECS;
        if !suspicious {
            session.quarantine_until_ms = None;
            return None;
        }

        let now = input.now_ms;
        let within = |at: Option<u64>, window: u64| {
            at.map(|at| now.saturating_sub(at) <= window).unwrap_or(false)
        };

        if session.quarantine_until_ms.is_none() {
            let recently_navigated = within(input.last_navigation_ms, self.tuning.quarantine_ms);
            let recently_live = within(session.last_live_seen_ms, self.tuning.quarantine_ms);
            if !recently_navigated && !recently_live {
                return None;
            }
            let mut window = self.tuning.quarantine_ms;
            if within(input.last_navigation_ms, self.tuning.navigation_extension_ms) {
                window += self.tuning.navigation_extension_ms;
            }
            let until = now + window;
            tracing::debug!(duration = media.duration, until_ms = until, "Quarantining one-hour duration");
            session.quarantine_until_ms = Some(until);
        }

        session.quarantine_until_ms.filter(|until| now < *until)
    }
}

fn live(playing: bool, input: &ClassifyInput<'_>, session: &mut SessionState) -> Classification {
    let kind = if playing {
        PlaybackKind::PlayingLive
    } else {
        PlaybackKind::PausedLive
    };
    if !input.live_show_elapsed {
        return Classification {
            kind,
            seconds: None,
        };
    }

    let elapsed = match (playing, session.last_shown_elapsed_secs) {
        (false, Some(frozen)) => frozen,
        _ => {
            let origin = session.origin_or_start_fallback(input.now_ms);
            let elapsed = elapsed_secs(origin, input.now_ms);
            session.last_shown_elapsed_secs = Some(elapsed);
            elapsed
        }
    };
    Classification {
        kind,
        seconds: Some(elapsed),
    }
}

/// Starts the finished hold unless one was already entered for this ended
/// episode. Returns whether the hold is active now.
pub fn enter_finished(session: &mut SessionState, hold_ms: u64, now_ms: u64) -> bool {
    if !session.finished_latched {
        session.finished_latched = true;
        session.finished = if hold_ms == 0 {
            FinishedHold::Forever
        } else {
            FinishedHold::Until(now_ms.saturating_add(hold_ms))
        };
        tracing::debug!(hold_ms, "Entered finished hold");
    }
    session.finished.active_at(now_ms)
}

/// A `play`/`playing` event: a new playback episode ends any finished hold.
pub fn start_episode(session: &mut SessionState) {
    session.finished = FinishedHold::NotFinished;
    session.finished_latched = false;
}

/// Whether a finite timeline is within [`NEAR_END_SECS`] of its end.
pub fn is_near_end(media: &MediaSnapshot) -> bool {
    if !media.has_finite_duration() || !media.current_time.is_finite() {
        return false;
    }
    media.duration - media.current_time <= NEAR_END_SECS
}
