//! Scenario replay on a virtual clock.
//!
//! A scenario is a JSON document describing the initial page (URL, title,
//! media, metadata signals, preferences) and a list of steps. Steps mutate the
//! scripted page and forward the matching host event to the controller; time
//! only moves on `advance`, which fires every timer deadline on the way.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tabtimer_core::controller::{PageController, PageEvent};
use tabtimer_core::{
    Clock, ControlRequest, ControlResponse, ManualClock, MediaEventKind, MediaHandle, MediaId,
    MediaSnapshot, PageSignals, PreferenceSnapshot, ScriptedPage, StaticPreferences,
    TabTimerError,
};

const DEFAULT_START_MS: u64 = 1_700_000_000_000;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to read scenario {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] TabTimerError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub url: String,
    /// `null` means the document has no title element.
    #[serde(default = "empty_title")]
    pub title: Option<String>,
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,
    #[serde(default)]
    pub preferences: PreferenceSnapshot,
    #[serde(default)]
    pub media: Vec<MediaSpec>,
    #[serde(default)]
    pub signals: PageSignals,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn empty_title() -> Option<String> {
    Some(String::new())
}

fn default_start_ms() -> u64 {
    DEFAULT_START_MS
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaSpec {
    pub id: String,
    #[serde(default)]
    pub state: MediaSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Advance {
        ms: u64,
    },
    AddMedia {
        id: String,
        #[serde(default)]
        state: MediaSnapshot,
    },
    UpdateMedia {
        id: String,
        state: MediaSnapshot,
    },
    RemoveMedia {
        id: String,
    },
    MediaEvent {
        id: String,
        event: MediaEventKind,
    },
    /// In-app navigation. With `announce: false` only the URL changes and the
    /// controller has to notice on its own.
    Navigate {
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default = "announce_default")]
        announce: bool,
    },
    SetTitle {
        title: Option<String>,
    },
    SetHidden {
        hidden: bool,
    },
    SetSignals {
        signals: PageSignals,
    },
    Preferences {
        preferences: PreferenceSnapshot,
    },
    Message {
        message: ControlRequest,
    },
    Teardown,
}

fn announce_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleWrite {
    /// Milliseconds since the scenario started.
    pub at_ms: u64,
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub writes: Vec<TitleWrite>,
    pub responses: Vec<ControlResponse>,
    pub final_title: Option<String>,
}

pub fn load(path: &Path) -> Result<Scenario, ReplayError> {
    let contents = fs_err::read_to_string(path).map_err(|source| ReplayError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let scenario = serde_json::from_str(&contents).map_err(|source| TabTimerError::Json {
        context: format!("scenario {}", path.display()),
        source,
    })?;
    Ok(scenario)
}

type Controller = PageController<ScriptedPage, Rc<ManualClock>, Rc<StaticPreferences>>;

struct Replay {
    clock: Rc<ManualClock>,
    prefs: Rc<StaticPreferences>,
    controller: Controller,
    start_ms: u64,
    report: ReplayReport,
}

pub fn run(scenario: &Scenario) -> ReplayReport {
    let clock = Rc::new(ManualClock::new(scenario.start_ms));
    let prefs = Rc::new(StaticPreferences::new(scenario.preferences.clone()));

    let mut page = ScriptedPage::new(&scenario.url, scenario.title.as_deref().unwrap_or(""));
    if scenario.title.is_none() {
        page.set_title(None);
    }
    page.set_signals(scenario.signals.clone());
    for spec in &scenario.media {
        page.add_media(&spec.id, spec.state.clone());
    }

    let mut replay = Replay {
        controller: PageController::new(page, clock.clone(), prefs.clone()),
        clock,
        prefs,
        start_ms: scenario.start_ms,
        report: ReplayReport::default(),
    };

    replay.controller.boot();
    replay.advance(0);
    for step in &scenario.steps {
        replay.apply(step);
    }

    replay.report.final_title = replay.controller.page().title().map(str::to_string);
    replay.report
}

impl Replay {
    fn apply(&mut self, step: &Step) {
        tracing::debug!(?step, "Replay step");
        match step {
            Step::Advance { ms } => {
                self.advance(*ms);
                return;
            }
            Step::AddMedia { id, state } => {
                let media = self.controller.page_mut().add_media(id, state.clone());
                self.controller
                    .handle_event(PageEvent::MediaAdded(media as MediaHandle));
            }
            Step::UpdateMedia { id, state } => {
                match self.controller.page().media(&MediaId::new(id.as_str())) {
                    Some(media) => media.replace(state.clone()),
                    None => tracing::warn!(media_id = %id, "Unknown media in scenario"),
                }
            }
            Step::RemoveMedia { id } => {
                self.controller
                    .page_mut()
                    .remove_media(&MediaId::new(id.as_str()));
                self.controller.handle_event(PageEvent::NodesAdded);
            }
            Step::MediaEvent { id, event } => {
                self.controller.handle_event(PageEvent::Media {
                    id: MediaId::new(id.as_str()),
                    event: *event,
                });
            }
            Step::Navigate {
                url,
                title,
                announce,
            } => {
                let page = self.controller.page_mut();
                page.set_url(url);
                if let Some(title) = title {
                    page.set_title(Some(title.as_str()));
                }
                if *announce {
                    self.controller.handle_event(PageEvent::NavigationStarted {
                        url: Some(url.clone()),
                    });
                    self.controller.handle_event(PageEvent::NavigationFinished {
                        url: Some(url.clone()),
                    });
                }
            }
            Step::SetTitle { title } => {
                self.controller.page_mut().set_title(title.as_deref());
                self.controller.handle_event(PageEvent::TitleMutated);
            }
            Step::SetHidden { hidden } => {
                self.controller.page_mut().set_hidden(*hidden);
                self.controller.handle_event(PageEvent::VisibilityChanged);
            }
            Step::SetSignals { signals } => {
                self.controller.page_mut().set_signals(signals.clone());
                self.controller.handle_event(PageEvent::HeadMutated);
            }
            Step::Preferences { preferences } => {
                self.prefs.replace(preferences.clone());
                self.controller.handle_event(PageEvent::SettingsChanged);
            }
            Step::Message { message } => {
                let response = self.controller.handle_message(message.clone());
                self.report.responses.push(response);
            }
            Step::Teardown => self.controller.handle_event(PageEvent::Teardown),
        }
        self.advance(0);
    }

    /// Moves the clock forward, firing each deadline at its own instant.
    fn advance(&mut self, ms: u64) {
        let target = self.clock.now_ms().saturating_add(ms);
        while let Some(deadline) = self.controller.next_deadline() {
            if deadline > target {
                break;
            }
            self.clock.set(deadline.max(self.clock.now_ms()));
            let fired = self.controller.run_due();
            self.collect();
            if fired == 0 {
                break;
            }
        }
        self.clock.set(target);
        self.controller.run_due();
        self.collect();
    }

    fn collect(&mut self) {
        let at_ms = self.clock.now_ms().saturating_sub(self.start_ms);
        for title in self.controller.page_mut().take_title_writes() {
            self.report.writes.push(TitleWrite { at_ms, title });
        }
    }
}
