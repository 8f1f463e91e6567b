//! Compiled regex patterns for reading clock text and title decorations.
//!
//! These patterns are compiled once on first use. Update the clock patterns
//! when a platform changes how its on-player uptime counter is worded.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Elapsed-Time Text
// ═══════════════════════════════════════════════════════════════════════════════

/// `1:02:03`, `12:00:00`
pub static RE_CLOCK_HMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3}):([0-5]\d):([0-5]\d)\b").unwrap());
/// `4:05`, `59:59`
pub static RE_CLOCK_MS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3}):([0-5]\d)\b").unwrap());
/// `2 hours 5 minutes`, `1h 3m 20s`, `45 sec`. Matches may be empty.
pub static RE_CLOCK_WORDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(\d+)\s*(?:hours?|hrs?|h)\b[\s,]*)?(?:(\d+)\s*(?:minutes?|mins?|m)\b[\s,]*)?(?:(\d+)\s*(?:seconds?|secs?|s)\b)?",
    )
    .unwrap()
});

// ═══════════════════════════════════════════════════════════════════════════════
// Title Decoration
// ═══════════════════════════════════════════════════════════════════════════════

/// Time component the renderer writes between prefix and separator.
pub static RE_DECORATION_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ (?:\d{1,3}:)?\d{1,2}:\d{2}").unwrap());
