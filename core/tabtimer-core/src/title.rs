//! Document title ownership.
//!
//! The renderer is the only writer of the document title. It builds
//! `"<prefix> <time> • <base>"`, writes only when the result differs from what
//! is on the page, and restores the undecorated title exactly once when
//! decoration stops.

use crate::classifier::Classification;
use crate::clock::format_hms;
use crate::config::Settings;
use crate::page::Page;
use crate::patterns::RE_DECORATION_TIME;
use tabtimer_protocol::PlaybackKind;

pub const SEPARATOR: &str = " • ";

/// Decorated title for a classification, `None` when nothing should be shown.
pub fn decorate(classification: &Classification, settings: &Settings, base: &str) -> Option<String> {
    let prefix = match classification.kind {
        PlaybackKind::PlayingLive => &settings.prefix_playing_live,
        PlaybackKind::PlayingVod => &settings.prefix_playing_vod,
        PlaybackKind::PausedLive | PlaybackKind::PausedVod => &settings.prefix_paused,
        PlaybackKind::Finished => return Some(format!("{}{}{}", settings.finished_prefix, SEPARATOR, base)),
        PlaybackKind::Idle => return None,
    };
    Some(match classification.seconds {
        Some(seconds) => format!("{} {}{}{}", prefix, format_hms(seconds), SEPARATOR, base),
        None => format!("{}{}{}", prefix, SEPARATOR, base),
    })
}

/// Removes every leading decoration this renderer could have written.
///
/// Repeats until no known prefix matches, so titles decorated more than once
/// (for example by an earlier page context) come back clean.
pub fn strip_decoration(title: &str, prefixes: &[&str]) -> String {
    let mut prefixes: Vec<&str> = prefixes.iter().copied().filter(|p| !p.is_empty()).collect();
    prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));

    let mut rest = title;
    'strip: loop {
        for prefix in &prefixes {
            let Some(after_prefix) = rest.strip_prefix(prefix) else {
                continue;
            };
            let after_time = match RE_DECORATION_TIME.find(after_prefix) {
                Some(time) => &after_prefix[time.end()..],
                None => after_prefix,
            };
            if let Some(base) = after_time.strip_prefix(SEPARATOR) {
                rest = base;
                continue 'strip;
            }
        }
        break;
    }
    rest.to_string()
}

/// Owned handle on the document title.
#[derive(Debug, Default)]
pub struct TitleRenderer {
    /// Last title this renderer wrote; cleared on session reset.
    last_applied: Option<String>,
    /// Whether the page currently carries a decoration we own.
    decorated: bool,
    /// Set while our own write may still be echoed by the title observer.
    self_write: bool,
    last_written: Option<String>,
    writes: u64,
}

impl TitleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a decorated title. Returns whether the page title was written.
    pub fn set_decoration<P: Page + ?Sized>(&mut self, page: &mut P, text: &str) -> bool {
        let current = page.document_title();
        if self.last_applied.as_deref() == Some(text) && current.as_deref() == Some(text) {
            self.decorated = true;
            return false;
        }
        self.write(page, text);
        self.last_applied = Some(text.to_string());
        self.decorated = true;
        true
    }

    /// Puts the undecorated title back. Only the first call after a
    /// decoration writes; later calls are no-ops.
    pub fn restore<P: Page + ?Sized>(&mut self, page: &mut P, base: &str) -> bool {
        if !self.decorated {
            return false;
        }
        self.decorated = false;
        self.last_applied = None;
        if page.document_title().as_deref() == Some(base) {
            return false;
        }
        self.write(page, base);
        true
    }

    /// Forgets the last applied title so the next render writes unconditionally.
    pub fn invalidate(&mut self) {
        self.last_applied = None;
    }

    pub fn is_decorating(&self) -> bool {
        self.decorated
    }

    pub fn last_applied(&self) -> Option<&str> {
        self.last_applied.as_deref()
    }

    /// Whether a title mutation seen now is the echo of our own write.
    pub fn is_own_mutation(&self, current_title: Option<&str>) -> bool {
        self.self_write && current_title.is_some() && current_title == self.last_written.as_deref()
    }

    /// Ends the scheduling turn in which our writes could still be echoed.
    pub fn end_turn(&mut self) {
        self.self_write = false;
    }

    pub fn write_count(&self) -> u64 {
        self.writes
    }

    fn write<P: Page + ?Sized>(&mut self, page: &mut P, title: &str) {
        self.self_write = true;
        self.last_written = Some(title.to_string());
        page.write_title(title);
        self.writes += 1;
        tracing::debug!(title, "Title written");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageProbe;
    use crate::sim::ScriptedPage;

    fn classification(kind: PlaybackKind, seconds: Option<u64>) -> Classification {
        Classification { kind, seconds }
    }

    #[test]
    fn decorates_each_kind() {
        let settings = Settings::default();
        let base = "Clip";
        assert_eq!(
            decorate(&classification(PlaybackKind::PlayingVod, Some(60)), &settings, base).as_deref(),
            Some("⏳ 1:00 • Clip")
        );
        assert_eq!(
            decorate(&classification(PlaybackKind::PlayingLive, Some(90)), &settings, base).as_deref(),
            Some("🔴 1:30 • Clip")
        );
        assert_eq!(
            decorate(&classification(PlaybackKind::PausedLive, Some(3_723)), &settings, base).as_deref(),
            Some("⏸ 1:02:03 • Clip")
        );
        assert_eq!(
            decorate(&classification(PlaybackKind::Finished, None), &settings, base).as_deref(),
            Some("✓ Finished • Clip")
        );
        assert_eq!(
            decorate(&classification(PlaybackKind::PlayingLive, None), &settings, base).as_deref(),
            Some("🔴 • Clip")
        );
        assert_eq!(decorate(&Classification::idle(), &settings, base), None);
    }

    #[test]
    fn strips_own_decorations_repeatedly() {
        let settings = Settings::default();
        let prefixes = settings.decoration_prefixes();
        assert_eq!(strip_decoration("⏳ 1:00 • Clip", &prefixes), "Clip");
        assert_eq!(strip_decoration("⏸ 1:02:03 • ⏳ 0:05 • Clip", &prefixes), "Clip");
        assert_eq!(strip_decoration("✓ Finished • Clip", &prefixes), "Clip");
        assert_eq!(strip_decoration("🔴 • Live show", &prefixes), "Live show");
    }

    #[test]
    fn leaves_unrelated_titles_alone() {
        let settings = Settings::default();
        let prefixes = settings.decoration_prefixes();
        assert_eq!(strip_decoration("Clip • Channel", &prefixes), "Clip • Channel");
        assert_eq!(strip_decoration("⏳ waiting room", &prefixes), "⏳ waiting room");
    }

    #[test]
    fn identical_render_writes_once() {
        let mut page = ScriptedPage::new("https://example.com/", "Clip");
        let mut renderer = TitleRenderer::new();

        assert!(renderer.set_decoration(&mut page, "⏳ 1:00 • Clip"));
        assert!(!renderer.set_decoration(&mut page, "⏳ 1:00 • Clip"));
        assert_eq!(page.title_writes().len(), 1);
        assert_eq!(renderer.write_count(), 1);
    }

    #[test]
    fn rewrites_when_page_changed_title_underneath() {
        let mut page = ScriptedPage::new("https://example.com/", "Clip");
        let mut renderer = TitleRenderer::new();
        renderer.set_decoration(&mut page, "⏳ 1:00 • Clip");

        page.set_title(Some("Clip (1)"));
        assert!(renderer.set_decoration(&mut page, "⏳ 1:00 • Clip"));
        assert_eq!(page.document_title().as_deref(), Some("⏳ 1:00 • Clip"));
    }

    #[test]
    fn restores_exactly_once() {
        let mut page = ScriptedPage::new("https://example.com/", "Clip");
        let mut renderer = TitleRenderer::new();
        assert!(!renderer.restore(&mut page, "Clip"));

        renderer.set_decoration(&mut page, "⏳ 1:00 • Clip");
        assert!(renderer.restore(&mut page, "Clip"));
        assert!(!renderer.restore(&mut page, "Clip"));
        assert_eq!(page.document_title().as_deref(), Some("Clip"));
        assert_eq!(page.title_writes().len(), 2);
    }

    #[test]
    fn invalidate_keeps_restore_obligation() {
        let mut page = ScriptedPage::new("https://example.com/", "Clip");
        let mut renderer = TitleRenderer::new();
        renderer.set_decoration(&mut page, "⏳ 1:00 • Clip");
        renderer.invalidate();
        assert!(renderer.last_applied().is_none());
        assert!(renderer.is_decorating());
        assert!(renderer.restore(&mut page, "Clip"));
    }

    #[test]
    fn recognizes_echo_of_own_write_within_turn() {
        let mut page = ScriptedPage::new("https://example.com/", "Clip");
        let mut renderer = TitleRenderer::new();
        renderer.set_decoration(&mut page, "⏳ 1:00 • Clip");
        assert!(renderer.is_own_mutation(Some("⏳ 1:00 • Clip")));
        assert!(!renderer.is_own_mutation(Some("Something else")));

        renderer.end_turn();
        assert!(!renderer.is_own_mutation(Some("⏳ 1:00 • Clip")));
    }
}
