//! Mute control within one frame and across the frames of a tab.
//!
//! Each frame answers for its own real media. The tab-level merge is
//! deterministic regardless of frame order: "has media" is OR, "all muted" is
//! AND over frames that have media, "any muted" is OR, counts sum.

use crate::media::{MediaHandle, MediaRegistry};
use tabtimer_protocol::{MuteApplyReport, MuteStateReport, MuteToggleReport};

/// One frame's mute surface as seen by the tab-level coordinator.
///
/// `None` means the frame could not be reached (it navigated or was torn
/// down); such frames are skipped.
pub trait FrameMute {
    fn query_mute_state(&self) -> Option<MuteStateReport>;
    fn set_muted_all(&self, muted: bool) -> Option<MuteApplyReport>;
}

impl FrameMute for MediaRegistry {
    fn query_mute_state(&self) -> Option<MuteStateReport> {
        Some(query_mute_state(self.real_media()))
    }

    fn set_muted_all(&self, muted: bool) -> Option<MuteApplyReport> {
        Some(set_muted_all(self.real_media(), muted))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Single frame
// ═══════════════════════════════════════════════════════════════════════════════

pub fn query_mute_state<'a>(media: impl Iterator<Item = &'a MediaHandle>) -> MuteStateReport {
    let mut report = MuteStateReport {
        all_muted: true,
        ..MuteStateReport::default()
    };
    for element in media {
        let muted = element.muted();
        report.count += 1;
        report.any_muted |= muted;
        report.all_muted &= muted;
    }
    report.has_media = report.count > 0;
    report.all_muted &= report.has_media;
    report
}

pub fn set_muted_all<'a>(media: impl Iterator<Item = &'a MediaHandle>, muted: bool) -> MuteApplyReport {
    let mut applied = 0;
    let mut all_muted = true;
    for element in media {
        element.set_muted(muted);
        applied += 1;
        all_muted &= element.muted();
    }
    MuteApplyReport {
        applied,
        all_muted: if applied > 0 { all_muted } else { muted },
    }
}

/// Mutes every real element unless all are already muted, then unmutes.
pub fn toggle_mute_all(registry: &MediaRegistry) -> MuteToggleReport {
    let state = query_mute_state(registry.real_media());
    if !state.has_media {
        return MuteToggleReport {
            applied: 0,
            muted: false,
        };
    }
    let desired = !state.all_muted;
    let applied = set_muted_all(registry.real_media(), desired);
    tracing::debug!(applied = applied.applied, muted = desired, "Toggled mute");
    MuteToggleReport {
        applied: applied.applied,
        muted: desired,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Across frames
// ═══════════════════════════════════════════════════════════════════════════════

pub fn merge_mute_reports(reports: &[MuteStateReport]) -> MuteStateReport {
    let mut merged = MuteStateReport {
        all_muted: true,
        ..MuteStateReport::default()
    };
    for report in reports {
        merged.has_media |= report.has_media;
        if report.has_media {
            merged.all_muted &= report.all_muted;
        }
        merged.any_muted |= report.any_muted;
        merged.count += report.count;
    }
    merged.all_muted &= merged.has_media;
    merged
}

/// Merges per-frame apply results, starting from the requested value.
pub fn merge_mute_applied(desired: bool, reports: &[MuteApplyReport]) -> MuteApplyReport {
    reports.iter().fold(
        MuteApplyReport {
            applied: 0,
            all_muted: desired,
        },
        |acc, report| MuteApplyReport {
            applied: acc.applied + report.applied,
            all_muted: acc.all_muted && report.all_muted,
        },
    )
}

/// Value a tab-wide toggle should apply, `None` when no frame has media.
pub fn plan_toggle(merged: &MuteStateReport) -> Option<bool> {
    merged.has_media.then_some(!merged.all_muted)
}

/// Tab-wide toggle: query every frame, decide once, apply everywhere.
pub fn toggle_frames(frames: &[&dyn FrameMute]) -> Option<MuteToggleReport> {
    let reports: Vec<MuteStateReport> = frames.iter().filter_map(|f| f.query_mute_state()).collect();
    let desired = plan_toggle(&merge_mute_reports(&reports))?;
    let applied: Vec<MuteApplyReport> = frames.iter().filter_map(|f| f.set_muted_all(desired)).collect();
    let merged = merge_mute_applied(desired, &applied);
    Some(MuteToggleReport {
        applied: merged.applied,
        muted: desired,
    })
}
