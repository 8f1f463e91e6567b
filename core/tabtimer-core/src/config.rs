//! Settings resolution and preference loading.
//!
//! The preference store owns the raw [`PreferenceSnapshot`]; this module turns
//! it into sanitized [`Settings`] plus the per-site policy for one page, and
//! applies the enable precedence: local tab override, then site override, then
//! the global default.

use crate::error::{Result, TabTimerError};
use fs_err as fs;
use serde::Serialize;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tabtimer_protocol::{PreferenceSnapshot, SiteOverride, StoredSettings};

pub const DEFAULT_PREFIX_PLAYING_LIVE: &str = "🔴";
pub const DEFAULT_PREFIX_PLAYING_VOD: &str = "⏳";
pub const DEFAULT_PREFIX_PAUSED: &str = "⏸";
pub const DEFAULT_FINISHED_PREFIX: &str = "✓ Finished";
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 250;
pub const MIN_UPDATE_INTERVAL_MS: u64 = 100;
pub const MAX_UPDATE_INTERVAL_MS: u64 = 5_000;

const PREFERENCES_DIR: &str = ".tabtimer";
const PREFERENCES_FILE: &str = "preferences.toml";

/// Sanitized global settings, immutable within one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub prefix_playing_live: String,
    pub prefix_playing_vod: String,
    pub prefix_paused: String,
    pub finished_prefix: String,
    /// 0 holds the finished indicator until the session resets.
    pub finished_hold_ms: u64,
    pub update_interval_ms: u64,
    pub hide_when_inactive: bool,
    pub live_show_elapsed: bool,
    pub default_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prefix_playing_live: DEFAULT_PREFIX_PLAYING_LIVE.to_string(),
            prefix_playing_vod: DEFAULT_PREFIX_PLAYING_VOD.to_string(),
            prefix_paused: DEFAULT_PREFIX_PAUSED.to_string(),
            finished_prefix: DEFAULT_FINISHED_PREFIX.to_string(),
            finished_hold_ms: 0,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            hide_when_inactive: false,
            live_show_elapsed: true,
            default_enabled: false,
        }
    }
}

impl Settings {
    pub fn from_stored(stored: &StoredSettings) -> Self {
        let defaults = Settings::default();
        let legacy_playing = non_empty(&stored.prefix_playing);

        Self {
            prefix_playing_live: non_empty(&stored.prefix_playing_live)
                .or_else(|| legacy_playing.clone())
                .unwrap_or(defaults.prefix_playing_live),
            prefix_playing_vod: non_empty(&stored.prefix_playing_vod)
                .or(legacy_playing)
                .unwrap_or(defaults.prefix_playing_vod),
            prefix_paused: non_empty(&stored.prefix_paused).unwrap_or(defaults.prefix_paused),
            finished_prefix: non_empty(&stored.finished_prefix)
                .unwrap_or(defaults.finished_prefix),
            finished_hold_ms: stored
                .finished_hold_ms
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64)
                .unwrap_or(defaults.finished_hold_ms),
            update_interval_ms: stored
                .update_interval_ms
                .map(clamp_interval_ms)
                .unwrap_or(defaults.update_interval_ms),
            hide_when_inactive: stored
                .hide_when_inactive
                .unwrap_or(defaults.hide_when_inactive),
            live_show_elapsed: stored
                .live_show_elapsed
                .unwrap_or(defaults.live_show_elapsed),
            default_enabled: stored.default_enabled.unwrap_or(defaults.default_enabled),
        }
    }

    /// Every prefix the renderer may have written, for stripping old decorations.
    pub fn decoration_prefixes(&self) -> Vec<&str> {
        vec![
            self.prefix_playing_live.as_str(),
            self.prefix_playing_vod.as_str(),
            self.prefix_paused.as_str(),
            self.finished_prefix.as_str(),
        ]
    }
}

/// Clamps a raw interval to `[100, 5000]` ms; non-finite input gets the default.
pub fn clamp_interval_ms(raw: f64) -> u64 {
    if !raw.is_finite() {
        return DEFAULT_UPDATE_INTERVAL_MS;
    }
    (raw.round().max(0.0) as u64).clamp(MIN_UPDATE_INTERVAL_MS, MAX_UPDATE_INTERVAL_MS)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
}

/// Stored per-site policy after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SitePolicy {
    pub enabled: Option<bool>,
    pub finished_enabled: bool,
}

impl SitePolicy {
    pub fn from_override(site: Option<&SiteOverride>) -> Self {
        Self {
            enabled: site.and_then(|s| s.enabled),
            finished_enabled: site.and_then(|s| s.finished_enabled).unwrap_or(true),
        }
    }
}

/// Everything the page core needs from the preference store for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageConfig {
    pub settings: Settings,
    pub site: SitePolicy,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            site: SitePolicy::from_override(None),
        }
    }
}

impl PageConfig {
    pub fn resolve(snapshot: &PreferenceSnapshot, host: &str) -> Self {
        Self {
            settings: Settings::from_stored(&snapshot.settings),
            site: SitePolicy::from_override(snapshot.site(host)),
        }
    }

    pub fn enabled(&self, local_override: Option<bool>) -> bool {
        resolve_enabled(local_override, self.site.enabled, self.settings.default_enabled)
    }

    pub fn hide_when_inactive(&self, local_override: Option<bool>) -> bool {
        local_override.unwrap_or(self.settings.hide_when_inactive)
    }
}

/// Local tab override beats the stored site override, which beats the default.
pub fn resolve_enabled(local: Option<bool>, site: Option<bool>, default: bool) -> bool {
    local.or(site).unwrap_or(default)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Preference stores
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of preference snapshots, owned by the surrounding extension.
pub trait PreferenceStore {
    fn snapshot(&self) -> Result<PreferenceSnapshot>;
}

/// In-memory store; collaborators replace the snapshot and then notify the core.
#[derive(Debug, Default)]
pub struct StaticPreferences {
    snapshot: RefCell<PreferenceSnapshot>,
    outage: RefCell<Option<String>>,
}

impl StaticPreferences {
    pub fn new(snapshot: PreferenceSnapshot) -> Self {
        Self {
            snapshot: RefCell::new(snapshot),
            outage: RefCell::new(None),
        }
    }

    /// Makes every read fail with `reason` until cleared with `None`.
    pub fn set_outage(&self, reason: Option<&str>) {
        *self.outage.borrow_mut() = reason.map(str::to_string);
    }

    pub fn replace(&self, snapshot: PreferenceSnapshot) {
        *self.snapshot.borrow_mut() = snapshot;
    }

    pub fn update(&self, f: impl FnOnce(&mut PreferenceSnapshot)) {
        f(&mut self.snapshot.borrow_mut());
    }
}

impl PreferenceStore for StaticPreferences {
    fn snapshot(&self) -> Result<PreferenceSnapshot> {
        if let Some(reason) = self.outage.borrow().as_ref() {
            return Err(TabTimerError::StoreUnavailable(reason.clone()));
        }
        Ok(self.snapshot.borrow().clone())
    }
}

impl<S: PreferenceStore + ?Sized> PreferenceStore for std::rc::Rc<S> {
    fn snapshot(&self) -> Result<PreferenceSnapshot> {
        (**self).snapshot()
    }
}

/// Preference file on disk, re-read on every snapshot.
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FilePreferences {
    fn snapshot(&self) -> Result<PreferenceSnapshot> {
        load_preferences(&self.path)
    }
}

/// Returns `~/.tabtimer/preferences.toml`.
pub fn default_preferences_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(PREFERENCES_DIR).join(PREFERENCES_FILE))
}

/// Loads preferences from TOML (`.toml`) or JSON (anything else).
///
/// A missing file yields the default snapshot.
pub fn load_preferences(path: &Path) -> Result<PreferenceSnapshot> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(PreferenceSnapshot::default())
        }
        Err(source) => {
            return Err(TabTimerError::ConfigReadFailed {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    if is_toml {
        toml::from_str(&contents).map_err(|err| TabTimerError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })
    } else {
        serde_json::from_str(&contents).map_err(|err| TabTimerError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })
    }
}
