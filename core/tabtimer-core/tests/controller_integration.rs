//! End-to-end tests driving a page controller through a scripted page.

use std::rc::Rc;

use serde_json::json;
use tabtimer_core::controller::{PageController, PageEvent};
use tabtimer_core::session::identity_key;
use tabtimer_core::{
    ControlRequest, ControlResponse, ManualClock, MediaElement, MediaEventKind, MediaHandle,
    MediaSnapshot, PlaybackKind, PreferenceSnapshot, ScriptedPage, StaticPreferences,
};
use tabtimer_protocol::{MuteToggleReport, OverrideReport, SiteOverride};

const T0: u64 = 1_700_000_000_000;

type Controller = PageController<ScriptedPage, Rc<ManualClock>, Rc<StaticPreferences>>;

struct Harness {
    clock: Rc<ManualClock>,
    prefs: Rc<StaticPreferences>,
    controller: Controller,
}

impl Harness {
    fn boot(page: ScriptedPage, prefs: PreferenceSnapshot) -> Self {
        let clock = Rc::new(ManualClock::new(T0));
        let prefs = Rc::new(StaticPreferences::new(prefs));
        let mut controller = PageController::new(page, clock.clone(), prefs.clone());
        controller.boot();
        Self {
            clock,
            prefs,
            controller,
        }
    }

    fn advance(&mut self, ms: u64) -> usize {
        self.clock.advance(ms);
        self.controller.run_due()
    }

    fn title(&self) -> Option<&str> {
        self.controller.page().title()
    }

    fn writes(&self) -> usize {
        self.controller.page().title_writes().len()
    }
}

fn enabled() -> PreferenceSnapshot {
    let mut prefs = PreferenceSnapshot::default();
    prefs.settings.default_enabled = Some(true);
    prefs
}

fn vod(duration: f64, current_time: f64, paused: bool) -> MediaSnapshot {
    MediaSnapshot {
        paused,
        duration,
        current_time,
        ready_state: 4,
        src: "https://cdn.example/clip.mp4".to_string(),
        ..MediaSnapshot::default()
    }
}

fn live_stream() -> MediaSnapshot {
    MediaSnapshot {
        paused: false,
        duration: f64::INFINITY,
        ready_state: 4,
        src: "blob:https://www.twitch.tv/1".to_string(),
        ..MediaSnapshot::default()
    }
}

#[test]
fn test_vod_countdown_is_written_once_per_change() {
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    let media = page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, enabled());

    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));

    media.update(|s| s.current_time = 65.25);
    assert_eq!(h.advance(250), 1);
    assert_eq!(h.writes(), 1, "identical render must not rewrite the title");

    media.update(|s| s.current_time = 66.0);
    h.advance(250);
    assert_eq!(h.title(), Some("⏳ 0:59 • Clip"));
    assert_eq!(h.writes(), 2);

    let status = h.controller.status();
    assert_eq!(status.kind, Some(PlaybackKind::PlayingVod));
    assert_eq!(status.seconds, Some(59));
}

#[test]
fn test_disabled_page_is_never_touched() {
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, PreferenceSnapshot::default());

    h.advance(250);
    assert_eq!(h.title(), Some("Clip"));
    assert_eq!(h.writes(), 0);
    assert!(!h.controller.status().enabled);
}

#[test]
fn test_local_override_beats_site_override() {
    let mut prefs = enabled();
    prefs.sites.insert(
        "example.com".to_string(),
        SiteOverride {
            enabled: Some(false),
            finished_enabled: None,
        },
    );
    let mut page = ScriptedPage::new("https://www.example.com/watch", "Clip");
    page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, prefs);
    assert_eq!(h.title(), Some("Clip"));

    let response = h.controller.handle_message(ControlRequest::SetLocalEnabledOverride {
        value: Some(true),
    });
    assert_eq!(
        response,
        ControlResponse::Override(OverrideReport {
            value: Some(true),
            effective: true,
        })
    );
    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));

    h.controller
        .handle_message(ControlRequest::SetLocalEnabledOverride { value: None });
    assert_eq!(h.title(), Some("Clip"));
    assert!(!h.controller.is_enabled());
}

#[test]
fn test_settings_change_restarts_with_new_interval() {
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, enabled());
    assert_eq!(h.controller.scheduler().interval_ms(), 250);

    h.prefs.update(|prefs| {
        prefs.settings.update_interval_ms = Some(1_000.0);
        prefs.settings.prefix_playing_vod = Some("VOD".to_string());
    });
    h.controller.handle_event(PageEvent::SettingsChanged);

    assert_eq!(h.controller.scheduler().interval_ms(), 1_000);
    assert_eq!(h.controller.next_deadline(), Some(T0 + 1_000));
    assert_eq!(h.title(), Some("VOD 1:00 • Clip"));
}

#[test]
fn test_finished_hold_expires_back_to_base_title() {
    let mut prefs = enabled();
    prefs.settings.finished_hold_ms = Some(5_000.0);
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    let media = page.add_media("v1", vod(10.0, 9.5, false));
    let mut h = Harness::boot(page, prefs);
    assert_eq!(h.title(), Some("⏳ 0:01 • Clip"));

    media.update(|s| {
        s.ended = true;
        s.paused = true;
        s.current_time = 10.0;
    });
    h.controller.handle_event(PageEvent::Media {
        id: media.id(),
        event: MediaEventKind::Ended,
    });
    h.advance(0);
    assert_eq!(h.title(), Some("✓ Finished • Clip"));

    h.advance(4_999);
    assert_eq!(h.title(), Some("✓ Finished • Clip"));

    h.advance(250);
    assert_eq!(h.title(), Some("Clip"));

    h.advance(250);
    assert_eq!(h.title(), Some("Clip"), "hold is entered once per ended episode");
}

#[test]
fn test_finished_disabled_for_site_goes_idle() {
    let mut prefs = enabled();
    prefs.sites.insert(
        "example.com".to_string(),
        SiteOverride {
            enabled: None,
            finished_enabled: Some(false),
        },
    );
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    let media = page.add_media("v1", vod(10.0, 9.5, false));
    let mut h = Harness::boot(page, prefs);

    media.update(|s| {
        s.ended = true;
        s.paused = true;
    });
    h.controller.handle_event(PageEvent::Media {
        id: media.id(),
        event: MediaEventKind::Ended,
    });
    h.advance(0);
    assert_eq!(h.title(), Some("Clip"));
}

#[test]
fn test_short_pause_keeps_playing_prefix() {
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    let media = page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, enabled());

    media.update(|s| s.paused = true);
    h.advance(250);
    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));

    h.advance(1_250);
    assert_eq!(h.title(), Some("⏸ 1:00 • Clip"));
}

#[test]
fn test_twitch_live_uses_stream_start() {
    let mut page = ScriptedPage::new("https://www.twitch.tv/somechannel", "somechannel - Twitch");
    page.add_media("live", live_stream());
    let signals = page.signals_mut();
    signals.blobs.insert(
        "stream".to_string(),
        json!({
            "id": "4711",
            "type": "live",
            "createdAt": (T0 - 3_723_000).to_string(),
        }),
    );
    signals.texts.insert(
        "[data-a-target=\"stream-title\"]".to_string(),
        vec!["Speedrun night".to_string()],
    );
    let mut h = Harness::boot(page, enabled());

    assert_eq!(h.title(), Some("🔴 1:02:03 • somechannel - Twitch"));
    assert!(h.controller.status().live);

    h.advance(1_000);
    assert_eq!(h.title(), Some("🔴 1:02:04 • somechannel - Twitch"));
}

fn twitch_channel(stream: serde_json::Value, stream_title: &str) -> ScriptedPage {
    let mut page = ScriptedPage::new("https://www.twitch.tv/somechannel", "somechannel - Twitch");
    let signals = page.signals_mut();
    signals.blobs.insert("stream".to_string(), stream);
    signals.texts.insert(
        "[data-a-target=\"stream-title\"]".to_string(),
        vec![stream_title.to_string()],
    );
    page
}

#[test]
fn test_live_edge_of_dvr_window_is_not_finished() {
    let mut page = twitch_channel(json!({ "id": "4711", "type": "live" }), "Speedrun night");
    let media = page.add_media(
        "player",
        MediaSnapshot {
            duration: 7_200.0,
            current_time: 7_199.9,
            ..live_stream()
        },
    );
    let mut h = Harness::boot(page, enabled());
    assert_eq!(h.title(), Some("🔴 0:00 • somechannel - Twitch"));

    h.controller.handle_event(PageEvent::Media {
        id: media.id(),
        event: MediaEventKind::TimeUpdate,
    });
    h.advance(0);
    assert_eq!(h.title(), Some("🔴 0:00 • somechannel - Twitch"));

    h.advance(60_000);
    assert_eq!(h.title(), Some("🔴 1:00 • somechannel - Twitch"));
    assert_eq!(h.controller.status().kind, Some(PlaybackKind::PlayingLive));
}

#[test]
fn test_stream_title_change_restarts_live_clock() {
    let page = {
        let mut page = twitch_channel(json!({ "id": "4711", "type": "live" }), "Speedrun night");
        page.add_media("player", live_stream());
        page
    };
    let mut h = Harness::boot(page, enabled());
    h.advance(90_000);
    assert_eq!(h.title(), Some("🔴 1:30 • somechannel - Twitch"));

    h.controller.page_mut().signals_mut().texts.insert(
        "[data-a-target=\"stream-title\"]".to_string(),
        vec!["Any% attempts".to_string()],
    );
    h.advance(250);

    assert_eq!(h.title(), Some("🔴 0:00 • somechannel - Twitch"));
    let session = h.controller.session();
    assert_eq!(session.fallback_origin_ms, Some(T0 + 90_250));
    assert_eq!(session.live_origin_ms, None);
    assert_eq!(
        session.identity_key.as_deref(),
        Some(
            identity_key(
                "twitch",
                &[
                    "somechannel".to_string(),
                    "4711".to_string(),
                    "Any% attempts".to_string()
                ]
            )
            .as_str()
        )
    );
}

#[test]
fn test_head_mutation_resnaps_live_origin() {
    let page = {
        let mut page = twitch_channel(
            json!({ "id": "4711", "type": "live", "createdAt": (T0 - 60_000).to_string() }),
            "Speedrun night",
        );
        page.add_media("player", live_stream());
        page
    };
    let mut h = Harness::boot(page, enabled());
    assert_eq!(h.title(), Some("🔴 1:00 • somechannel - Twitch"));

    h.controller.page_mut().signals_mut().blobs.insert(
        "stream".to_string(),
        json!({ "id": "4711", "type": "live", "createdAt": (T0 - 120_000).to_string() }),
    );
    h.controller.handle_event(PageEvent::HeadMutated);
    h.advance(300);

    assert_eq!(h.controller.session().live_origin_ms, Some(T0 - 120_000));
    assert_eq!(h.title(), Some("🔴 2:00 • somechannel - Twitch"));
}

#[test]
fn test_one_hour_duration_after_navigation_is_quarantined() {
    let page = ScriptedPage::new("https://www.twitch.tv/somechannel", "somechannel - Twitch");
    let mut h = Harness::boot(page, enabled());
    assert_eq!(h.writes(), 0);

    let next = "https://www.twitch.tv/otherchannel";
    let page = h.controller.page_mut();
    page.set_url(next);
    page.set_title(Some("otherchannel - Twitch"));
    page.add_media("ad", vod(3_600.0, 0.0, false));
    h.controller.handle_event(PageEvent::NavigationFinished {
        url: Some(next.to_string()),
    });
    h.advance(0);
    assert_eq!(h.writes(), 0);

    h.advance(14_750);
    assert_eq!(h.writes(), 0, "no title writes while quarantined");
    assert_eq!(h.title(), Some("otherchannel - Twitch"));

    h.advance(250);
    assert_eq!(h.title(), Some("⏳ 1:00:00 • otherchannel - Twitch"));
}

#[test]
fn test_live_without_start_counts_from_first_sighting() {
    let mut page = ScriptedPage::new("https://example.com/live", "Stream");
    page.add_media("live", live_stream());
    let mut h = Harness::boot(page, enabled());
    assert_eq!(h.title(), Some("🔴 0:00 • Stream"));

    h.advance(90_000);
    assert_eq!(h.title(), Some("🔴 1:30 • Stream"));
}

#[test]
fn test_spa_navigation_resets_session_and_identity() {
    let mut page = ScriptedPage::new("https://www.youtube.com/watch?v=aaaaaaaaaaa", "First");
    page.add_media("v1", vod(300.0, 0.0, false));
    let mut h = Harness::boot(page, enabled());
    assert_eq!(h.title(), Some("⏳ 5:00 • First"));
    assert_eq!(
        h.controller.session().identity_key.as_deref(),
        Some(identity_key("youtube", &["aaaaaaaaaaa".to_string()]).as_str())
    );

    let next = "https://www.youtube.com/watch?v=bbbbbbbbbbb";
    let page = h.controller.page_mut();
    page.set_url(next);
    page.set_title(Some("Second"));
    h.controller.handle_event(PageEvent::NavigationFinished {
        url: Some(next.to_string()),
    });

    assert_eq!(h.title(), Some("⏳ 5:00 • Second"));
    assert_eq!(
        h.controller.session().identity_key.as_deref(),
        Some(identity_key("youtube", &["bbbbbbbbbbb".to_string()]).as_str())
    );
}

#[test]
fn test_url_change_without_events_is_detected_at_tick() {
    let mut prefs = enabled();
    prefs.settings.finished_hold_ms = Some(0.0);
    let mut page = ScriptedPage::new("https://example.com/a", "Clip");
    let media = page.add_media("v1", vod(10.0, 10.0, true));
    media.update(|s| s.ended = true);
    let mut h = Harness::boot(page, prefs);
    assert_eq!(h.title(), Some("✓ Finished • Clip"));

    h.controller.page_mut().set_url("https://example.com/b");
    h.controller.page_mut().remove_media(&media.id());
    h.controller
        .page_mut()
        .add_media("v2", vod(60.0, 0.0, false));
    h.advance(250);

    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));
}

#[test]
fn test_replaced_media_element_resets_session() {
    let mut prefs = enabled();
    prefs.settings.finished_hold_ms = Some(0.0);
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    let first = page.add_media("v1", vod(10.0, 10.0, true));
    first.update(|s| s.ended = true);
    let mut h = Harness::boot(page, prefs);
    assert_eq!(h.title(), Some("✓ Finished • Clip"));

    h.controller.page_mut().remove_media(&first.id());
    let second = h
        .controller
        .page_mut()
        .add_media("v2", vod(60.0, 0.0, false));
    h.controller
        .handle_event(PageEvent::MediaAdded(second as MediaHandle));
    h.advance(0);

    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));
}

#[test]
fn test_pause_starts_sticky_window_between_slow_ticks() {
    let mut prefs = enabled();
    prefs.settings.update_interval_ms = Some(5_000.0);
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    let media = page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, prefs);
    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));

    assert_eq!(h.advance(4_900), 0);
    media.update(|s| s.paused = true);
    h.controller.handle_event(PageEvent::Media {
        id: media.id(),
        event: MediaEventKind::Pause,
    });
    h.advance(0);
    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));

    h.advance(100);
    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));

    h.advance(5_000);
    assert_eq!(h.title(), Some("⏸ 1:00 • Clip"));
}

#[test]
fn test_hidden_tab_restores_when_hide_when_inactive() {
    let mut prefs = enabled();
    prefs.settings.hide_when_inactive = Some(true);
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, prefs);
    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));

    h.controller.page_mut().set_hidden(true);
    h.controller.handle_event(PageEvent::VisibilityChanged);
    h.advance(0);
    assert_eq!(h.title(), Some("Clip"));

    let response = h
        .controller
        .handle_message(ControlRequest::SetLocalHideInactiveOverride { value: Some(false) });
    assert_eq!(
        response,
        ControlResponse::Override(OverrideReport {
            value: Some(false),
            effective: false,
        })
    );
    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));
}

#[test]
fn test_own_title_write_is_not_echoed() {
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, enabled());

    h.controller.handle_event(PageEvent::TitleMutated);
    assert!(!h.controller.scheduler().has_debounced());

    h.advance(250);
    h.controller.page_mut().set_title(Some("Renamed"));
    h.controller.handle_event(PageEvent::TitleMutated);
    assert!(h.controller.scheduler().has_debounced());

    h.advance(0);
    assert_eq!(h.title(), Some("⏳ 1:00 • Renamed"));
}

#[test]
fn test_teardown_restores_once_and_stops() {
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, enabled());

    h.controller.handle_event(PageEvent::Teardown);
    assert_eq!(h.title(), Some("Clip"));
    assert_eq!(h.controller.next_deadline(), None);

    let writes = h.writes();
    h.controller.teardown();
    assert_eq!(h.advance(10_000), 0);
    assert_eq!(h.writes(), writes);
}

#[test]
fn test_mute_toggle_through_control_messages() {
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    page.add_media("v1", vod(125.0, 65.0, false));
    page.add_media("v2", vod(30.0, 0.0, true));
    page.add_media("stub", MediaSnapshot::default());
    page.add_media(
        "ad",
        MediaSnapshot {
            src: "https://ads.example/stub.mp4".to_string(),
            ..MediaSnapshot::default()
        },
    );
    let mut h = Harness::boot(page, enabled());

    let state = h.controller.handle_message(ControlRequest::QueryMuteState);
    match state {
        ControlResponse::MuteState(report) => {
            assert!(report.has_media);
            assert!(!report.any_muted);
            assert_eq!(report.count, 2);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    let toggled = h.controller.handle_message(ControlRequest::ToggleMuteAll);
    assert_eq!(
        toggled,
        ControlResponse::MuteToggled(MuteToggleReport {
            applied: 2,
            muted: true,
        })
    );
}

#[test]
fn test_framed_requests_are_validated() {
    let page = ScriptedPage::new("https://example.com/watch", "Clip");
    let mut h = Harness::boot(page, enabled());

    let ok = h
        .controller
        .handle_request_bytes(br#"{"protocolVersion":1,"id":"r1","message":{"type":"GET_STATUS"}}"#);
    assert!(ok.ok);
    assert_eq!(ok.id.as_deref(), Some("r1"));
    match ok.data {
        Some(ControlResponse::Status(status)) => {
            assert!(status.enabled);
            assert_eq!(status.kind, Some(PlaybackKind::Idle));
        }
        other => panic!("unexpected data: {other:?}"),
    }

    let mismatch = h
        .controller
        .handle_request_bytes(br#"{"protocolVersion":9,"message":{"type":"GET_STATUS"}}"#);
    assert!(!mismatch.ok);
    assert_eq!(mismatch.error.expect("error").code, "protocol_mismatch");

    let garbage = h.controller.handle_request_bytes(b"not json");
    assert_eq!(garbage.error.expect("error").code, "invalid_json");
}

#[test]
fn test_unavailable_store_keeps_previous_settings() {
    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    page.add_media("v1", vod(125.0, 65.0, false));
    let mut h = Harness::boot(page, enabled());

    h.prefs.set_outage(Some("storage quota"));
    h.prefs.update(|prefs| prefs.settings.default_enabled = Some(false));
    h.controller.handle_event(PageEvent::SettingsChanged);
    assert!(h.controller.is_enabled());
    assert_eq!(h.title(), Some("⏳ 1:00 • Clip"));

    h.prefs.set_outage(None);
    h.controller.handle_event(PageEvent::SettingsChanged);
    assert!(!h.controller.is_enabled());
    assert_eq!(h.title(), Some("Clip"));
}

#[test]
fn test_malformed_preference_file_keeps_previous_settings() {
    use tabtimer_core::{FilePreferences, SystemClock};

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("preferences.toml");
    std::fs::write(&path, "[settings]\ndefaultEnabled = true\n").expect("write prefs");

    let mut page = ScriptedPage::new("https://example.com/watch", "Clip");
    page.add_media("v1", vod(125.0, 65.0, false));
    let mut controller = PageController::new(page, SystemClock, FilePreferences::new(path.clone()));
    controller.boot();
    assert!(controller.is_enabled());

    std::fs::write(&path, "[settings\n").expect("write prefs");
    controller.handle_event(PageEvent::SettingsChanged);
    assert!(controller.is_enabled());
    assert_eq!(controller.page().title(), Some("⏳ 1:00 • Clip"));
}
