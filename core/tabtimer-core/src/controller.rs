//! The per-page state machine.
//!
//! [`PageController`] owns every piece of page-context state: settings, the
//! media registry, the session, the title renderer and the scheduler. Hosts
//! feed it [`PageEvent`]s and control messages, and call
//! [`PageController::run_due`] whenever [`PageController::next_deadline`] passes.
//!
//! All work is synchronous. Nothing here blocks or spawns.

use std::collections::BTreeSet;

use crate::aggregate::{query_mute_state, toggle_mute_all};
use crate::classifier::{
    enter_finished, is_near_end, start_episode, Classification, Classifier, ClassifierTuning,
    ClassifyInput, Verdict,
};
use crate::clock::Clock;
use crate::config::{PageConfig, PreferenceStore, Settings};
use crate::error::Result;
use crate::live_start::find_live_start;
use crate::media::{MediaEventKind, MediaHandle, MediaId, MediaRegistry, MediaSnapshot};
use crate::page::{Page, PageProbe};
use crate::platform::{PlatformAdapter, PlatformRouter};
use crate::scheduler::{Scheduler, Wake, PROBE_DELAYS_MS};
use crate::session::{
    page_identity, IdentityTracker, OriginUpdate, PlayState, ResetReason, SessionState,
};
use crate::title::{decorate, strip_decoration, TitleRenderer};
use tabtimer_protocol::{
    canonical_host, parse_request_bytes, ControlRequest, ControlResponse, OverrideReport,
    PreferenceSnapshot, Request, Response, StatusReport,
};

/// How often live-start sources are re-read while a live stream is shown.
pub const LIVE_REPROBE_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTuning {
    pub classifier: ClassifierTuning,
    pub live_reprobe_ms: u64,
}

impl Default for ControllerTuning {
    fn default() -> Self {
        Self {
            classifier: ClassifierTuning::default(),
            live_reprobe_ms: LIVE_REPROBE_MS,
        }
    }
}

/// Everything the host page reports to the core.
pub enum PageEvent {
    /// A media element was inserted directly.
    MediaAdded(MediaHandle),
    /// A subtree was inserted; rescan it for media.
    NodesAdded,
    Media {
        id: MediaId,
        event: MediaEventKind,
    },
    VisibilityChanged,
    /// The preference store changed.
    SettingsChanged,
    /// In-app (SPA) navigation began.
    NavigationStarted { url: Option<String> },
    NavigationFinished { url: Option<String> },
    /// `<head>` or metadata changed; live-start data may have appeared.
    HeadMutated,
    TitleMutated,
    Teardown,
}

impl PageEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PageEvent::MediaAdded(_) => "media-added",
            PageEvent::NodesAdded => "nodes-added",
            PageEvent::Media { .. } => "media",
            PageEvent::VisibilityChanged => "visibility-changed",
            PageEvent::SettingsChanged => "settings-changed",
            PageEvent::NavigationStarted { .. } => "navigation-started",
            PageEvent::NavigationFinished { .. } => "navigation-finished",
            PageEvent::HeadMutated => "head-mutated",
            PageEvent::TitleMutated => "title-mutated",
            PageEvent::Teardown => "teardown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    TornDown,
}

pub struct PageController<P: Page, C: Clock, S: PreferenceStore> {
    page: P,
    clock: C,
    store: S,
    router: PlatformRouter,
    classifier: Classifier,
    live_reprobe_ms: u64,
    config: PageConfig,
    /// Every prefix ever applied in this page, so stale decorations still strip.
    known_prefixes: BTreeSet<String>,
    local_enabled: Option<bool>,
    local_hide_inactive: Option<bool>,
    registry: MediaRegistry,
    session: SessionState,
    identity: IdentityTracker,
    renderer: TitleRenderer,
    scheduler: Scheduler,
    status: StatusReport,
    lifecycle: Lifecycle,
}

impl<P: Page, C: Clock, S: PreferenceStore> PageController<P, C, S> {
    pub fn new(page: P, clock: C, store: S) -> Self {
        let config = PageConfig::default();
        let mut controller = Self {
            page,
            clock,
            store,
            router: PlatformRouter::new(),
            classifier: Classifier::default(),
            live_reprobe_ms: LIVE_REPROBE_MS,
            scheduler: Scheduler::new(config.settings.update_interval_ms),
            config,
            known_prefixes: BTreeSet::new(),
            local_enabled: None,
            local_hide_inactive: None,
            registry: MediaRegistry::new(),
            session: SessionState::new(),
            identity: IdentityTracker::new(),
            renderer: TitleRenderer::new(),
            status: StatusReport::disabled(),
            lifecycle: Lifecycle::Created,
        };
        controller.remember_prefixes();
        controller
    }

    pub fn with_router(mut self, router: PlatformRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_tuning(mut self, tuning: ControllerTuning) -> Self {
        self.classifier = Classifier::new(tuning.classifier);
        self.live_reprobe_ms = tuning.live_reprobe_ms;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    /// Loads settings, scans the document and renders the first title.
    pub fn boot(&mut self) {
        if self.lifecycle != Lifecycle::Created {
            return;
        }
        self.lifecycle = Lifecycle::Running;
        let now = self.clock.now_ms();
        self.identity.check_url(&self.page.location(), now);
        self.rescan();
        tracing::info!(url = %self.page.location(), "Page controller started");
        self.resync();
    }

    /// Cancels every pending wake and restores the title exactly once.
    pub fn teardown(&mut self) {
        if self.lifecycle == Lifecycle::TornDown {
            return;
        }
        self.scheduler.cancel_all();
        self.restore_title();
        self.lifecycle = Lifecycle::TornDown;
        tracing::info!("Page controller torn down");
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// When the host should next call [`run_due`](Self::run_due).
    pub fn next_deadline(&self) -> Option<u64> {
        if self.lifecycle == Lifecycle::TornDown {
            return None;
        }
        self.scheduler.next_deadline()
    }

    /// Runs whatever is due on the controller's clock. Returns the number of
    /// wakes consumed.
    pub fn run_due(&mut self) -> usize {
        if self.lifecycle != Lifecycle::Running {
            return 0;
        }
        let now = self.clock.now_ms();
        self.renderer.end_turn();
        let wakes = self.scheduler.take_due(now);
        if wakes.is_empty() {
            return 0;
        }
        let force_probe = wakes.contains(&Wake::Probe);
        self.evaluate(now, force_probe);
        wakes.len()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Settings
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reloads settings from the store and restarts. A failing store keeps
    /// the previous settings.
    pub fn resync(&mut self) {
        if let Err(err) = self.reload_settings() {
            tracing::warn!(error = %err, "Keeping previous settings");
            self.restart();
        }
    }

    pub fn reload_settings(&mut self) -> Result<()> {
        let snapshot = self.store.snapshot()?;
        self.apply_settings(&snapshot);
        Ok(())
    }

    /// Applies a preference snapshot and restarts the scheduler. Session
    /// state is kept.
    pub fn apply_settings(&mut self, snapshot: &PreferenceSnapshot) {
        let host = canonical_host(&self.page.location());
        self.config = PageConfig::resolve(snapshot, &host);
        self.remember_prefixes();
        tracing::info!(
            host = %host,
            enabled = self.is_enabled(),
            interval_ms = self.config.settings.update_interval_ms,
            "Settings applied"
        );
        self.restart();
    }

    /// Recreates the periodic timer for the current interval and renders now.
    fn restart(&mut self) {
        let now = self.clock.now_ms();
        if self.is_enabled() {
            self.scheduler
                .restart(self.config.settings.update_interval_ms, now);
        } else {
            self.scheduler.stop();
        }
        self.evaluate(now, false);
    }

    fn remember_prefixes(&mut self) {
        let defaults = Settings::default();
        for prefix in defaults
            .decoration_prefixes()
            .into_iter()
            .chain(self.config.settings.decoration_prefixes())
        {
            self.known_prefixes.insert(prefix.to_string());
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled(self.local_enabled)
    }

    pub fn hide_when_inactive(&self) -> bool {
        self.config.hide_when_inactive(self.local_hide_inactive)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Host events
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn handle_event(&mut self, event: PageEvent) {
        if self.lifecycle == Lifecycle::TornDown {
            return;
        }
        let now = self.clock.now_ms();
        tracing::debug!(event = event.name(), "Page event");

        match event {
            PageEvent::MediaAdded(media) => {
                if self.registry.register(media) {
                    self.tick_soon(now);
                }
            }
            PageEvent::NodesAdded => {
                if !self.rescan().is_empty() {
                    self.tick_soon(now);
                }
            }
            PageEvent::Media { id, event } => self.on_media_event(&id, event, now),
            PageEvent::VisibilityChanged => self.tick_soon(now),
            PageEvent::SettingsChanged => self.resync(),
            PageEvent::NavigationStarted { url } => {
                self.identity.note_navigation(url, now);
                self.reset_session(ResetReason::SoftNavigation);
                self.tick_soon(now);
            }
            PageEvent::NavigationFinished { url } => {
                self.identity.note_navigation(url, now);
                self.reset_session(ResetReason::SoftNavigation);
                self.schedule_probes(now);
                self.resync();
            }
            PageEvent::HeadMutated => self.schedule_probes(now),
            PageEvent::TitleMutated => {
                let current = self.page.document_title();
                if self.renderer.is_own_mutation(current.as_deref()) {
                    tracing::trace!("Ignoring echo of own title write");
                } else {
                    self.tick_soon(now);
                }
            }
            PageEvent::Teardown => self.teardown(),
        }
    }

    fn on_media_event(&mut self, id: &MediaId, event: MediaEventKind, now: u64) {
        let Some(media) = self.registry.get(id) else {
            tracing::debug!(media_id = %id, ?event, "Event for unregistered media");
            return;
        };

        if event.starts_playback() {
            self.registry.mark_active(id);
            start_episode(&mut self.session);
        }

        let snapshot = MediaSnapshot::capture(media.as_ref());

        // The sticky window runs from the pause, not from the last tick.
        if event == MediaEventKind::Pause
            && self.session.last_state == Some(PlayState::Playing)
            && self.registry.pick_active().map(|m| m.id()).as_ref() == Some(id)
        {
            self.session.last_playing_at_ms = Some(now);
        }

        // A live edge sits at the end of a finite DVR window.
        let strongly_live = snapshot.has_infinite_duration()
            || self
                .router
                .for_url(&self.page.location())
                .live_signal(&self.page);

        if self.config.site.finished_enabled && !strongly_live {
            let ended = match event {
                MediaEventKind::Ended => true,
                MediaEventKind::TimeUpdate => is_near_end(&snapshot),
                _ => false,
            };
            if ended {
                enter_finished(&mut self.session, self.config.settings.finished_hold_ms, now);
            }
        }

        self.tick_soon(now);
    }

    fn tick_soon(&mut self, now: u64) {
        if self.lifecycle != Lifecycle::TornDown {
            self.scheduler.schedule_debounced(now);
        }
    }

    fn schedule_probes(&mut self, now: u64) {
        for delay in PROBE_DELAYS_MS {
            self.scheduler.schedule_probe(delay, now);
        }
    }

    /// Registers media present in the document. Returns the new ids.
    fn rescan(&mut self) -> Vec<MediaId> {
        self.registry.prune();
        let found = self.page.media_elements();
        self.registry.attach(found)
    }

    fn reset_session(&mut self, reason: ResetReason) {
        tracing::info!(%reason, "Session reset");
        self.session.reset();
        self.renderer.invalidate();
        if reason.drops_media() {
            self.registry.reset();
            self.rescan();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Evaluation
    // ═══════════════════════════════════════════════════════════════════════════

    fn evaluate(&mut self, now: u64, force_probe: bool) {
        if self.lifecycle != Lifecycle::Running {
            return;
        }

        let url = self.page.location();
        if let Some(reason) = self.identity.check_url(&url, now) {
            self.reset_session(reason);
        }

        if !self.is_enabled() {
            self.restore_title();
            self.status = StatusReport::disabled();
            return;
        }
        if self.hide_when_inactive() && self.page.is_hidden() {
            self.restore_title();
            self.status = StatusReport::idle();
            return;
        }

        self.registry.prune();
        let candidate = self.registry.pick_active();
        let active_id = candidate.as_ref().map(|m| m.id());

        let identity = page_identity(self.router.for_url(&url), &self.page);
        let registry = &self.registry;
        let reset = self.identity.observe(
            &self.session,
            identity.as_deref(),
            active_id.as_ref(),
            |id| registry.contains(id),
        );
        if let Some(reason) = reset {
            self.reset_session(reason);
        }
        if identity.is_some() {
            self.session.identity_key = identity;
        }

        let snapshot = candidate.as_ref().map(|m| MediaSnapshot::capture(m.as_ref()));
        let adapter = self.router.for_url(&url);
        let live_signal = adapter.live_signal(&self.page);
        let strongly_live = live_signal
            || snapshot
                .as_ref()
                .map(MediaSnapshot::has_infinite_duration)
                .unwrap_or(false);

        if strongly_live && self.config.settings.live_show_elapsed {
            let due = force_probe
                || self
                    .session
                    .last_origin_probe_ms
                    .map(|at| now.saturating_sub(at) >= self.live_reprobe_ms)
                    .unwrap_or(true);
            if due {
                probe_live_start(adapter, &self.page, &mut self.session, now);
            }
        }

        let input = ClassifyInput {
            candidate: snapshot.as_ref(),
            now_ms: now,
            live_signal,
            live_platform: adapter.is_live_platform(),
            live_show_elapsed: self.config.settings.live_show_elapsed,
            finished_enabled: self.config.site.finished_enabled,
            finished_hold_ms: self.config.settings.finished_hold_ms,
            last_navigation_ms: self.identity.last_navigation_ms(),
        };

        match self.classifier.classify(&input, &mut self.session) {
            Verdict::Quarantined { until_ms } => {
                tracing::debug!(until_ms, "Title update suppressed during quarantine");
            }
            Verdict::Show(classification) => {
                self.render(&classification, snapshot.as_ref());
            }
        }
    }

    fn render(&mut self, classification: &Classification, snapshot: Option<&MediaSnapshot>) {
        let Some(base) = self.resolve_base_title() else {
            tracing::debug!("No title element; skipping tick");
            return;
        };

        match decorate(classification, &self.config.settings, &base) {
            Some(text) => {
                self.renderer.set_decoration(&mut self.page, &text);
            }
            None => {
                self.renderer.restore(&mut self.page, &base);
            }
        }

        tracing::debug!(
            kind = classification.kind.as_str(),
            seconds = ?classification.seconds,
            "Classified"
        );
        self.status = StatusReport {
            enabled: true,
            kind: Some(classification.kind),
            seconds: classification.seconds,
            live: classification.kind.is_live(),
            muted: snapshot.map(|s| s.muted).unwrap_or(false),
            playback_rate: snapshot.map(|s| s.playback_rate),
        };
    }

    /// Undecorated title, recomputed from the page every time.
    ///
    /// The current title with any of our decorations stripped wins; platform
    /// metadata fills in when the page title is empty.
    fn resolve_base_title(&self) -> Option<String> {
        let current = self.page.document_title()?;
        let prefixes: Vec<&str> = self.known_prefixes.iter().map(String::as_str).collect();
        let stripped = strip_decoration(&current, &prefixes);
        if !stripped.trim().is_empty() {
            return Some(stripped);
        }
        let adapter = self.router.for_url(&self.page.location());
        Some(adapter.base_title(&self.page).unwrap_or(stripped))
    }

    fn restore_title(&mut self) {
        if !self.renderer.is_decorating() {
            return;
        }
        match self.resolve_base_title() {
            Some(base) => {
                self.renderer.restore(&mut self.page, &base);
            }
            None => tracing::debug!("No title element; restore deferred"),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Control messages
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn handle_message(&mut self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::ApplySettings => {
                self.resync();
                ControlResponse::Applied
            }
            ControlRequest::GetStatus => ControlResponse::Status(self.current_status()),
            ControlRequest::SetLocalEnabledOverride { value } => {
                self.local_enabled = value;
                tracing::info!(?value, "Local enable override set");
                self.restart();
                ControlResponse::Override(self.enabled_override())
            }
            ControlRequest::GetLocalEnabledOverride => {
                ControlResponse::Override(self.enabled_override())
            }
            ControlRequest::SetLocalHideInactiveOverride { value } => {
                self.local_hide_inactive = value;
                tracing::info!(?value, "Local hide-when-inactive override set");
                let now = self.clock.now_ms();
                self.evaluate(now, false);
                ControlResponse::Override(self.hide_inactive_override())
            }
            ControlRequest::GetLocalHideInactiveOverride => {
                ControlResponse::Override(self.hide_inactive_override())
            }
            ControlRequest::ToggleMuteAll => {
                self.rescan();
                ControlResponse::MuteToggled(toggle_mute_all(&self.registry))
            }
            ControlRequest::QueryMuteState => {
                self.rescan();
                ControlResponse::MuteState(query_mute_state(self.registry.real_media()))
            }
        }
    }

    /// Handles a framed request. Malformed or mismatched requests get an
    /// error response.
    pub fn handle_request(&mut self, request: Request) -> Response {
        if let Err(err) = request.validate() {
            tracing::warn!(error = %err, "Rejected control request");
            return Response::error_with_info(request.id, err);
        }
        let data = self.handle_message(request.message);
        Response::ok(request.id, data)
    }

    pub fn handle_request_bytes(&mut self, bytes: &[u8]) -> Response {
        match parse_request_bytes(bytes) {
            Ok(request) => self.handle_request(request),
            Err(err) => {
                tracing::warn!(error = %err, "Rejected control request");
                Response::error_with_info(None, err)
            }
        }
    }

    fn current_status(&mut self) -> StatusReport {
        if !self.is_enabled() {
            return StatusReport::disabled();
        }
        let now = self.clock.now_ms();
        self.evaluate(now, false);
        self.status.clone()
    }

    fn enabled_override(&self) -> OverrideReport {
        OverrideReport {
            value: self.local_enabled,
            effective: self.is_enabled(),
        }
    }

    fn hide_inactive_override(&self) -> OverrideReport {
        OverrideReport {
            value: self.local_hide_inactive,
            effective: self.hide_when_inactive(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PageConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn registry(&self) -> &MediaRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> &TitleRenderer {
        &self.renderer
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Status as of the last evaluation.
    pub fn status(&self) -> &StatusReport {
        &self.status
    }
}

fn probe_live_start(
    adapter: &dyn PlatformAdapter,
    page: &dyn PageProbe,
    session: &mut SessionState,
    now: u64,
) {
    session.last_origin_probe_ms = Some(now);
    let Some(start) = find_live_start(adapter, page, now) else {
        return;
    };
    match session.offer_origin(&start) {
        OriginUpdate::Unchanged => {}
        update => tracing::info!(
            source = start.source.as_str(),
            origin_ms = start.origin_ms,
            ?update,
            "Live origin updated"
        ),
    }
}
