//! In-memory page host.
//!
//! [`ScriptedPage`] and [`ScriptedMedia`] implement the host seams with plain
//! data so replays and tests can drive the controller without a browser.

use crate::media::{MediaElement, MediaEventKind, MediaHandle, MediaId, MediaSnapshot};
use crate::page::{Page, PageProbe};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

// ═══════════════════════════════════════════════════════════════════════════════
// Media
// ═══════════════════════════════════════════════════════════════════════════════

/// Media element whose state is whatever the script last set.
#[derive(Debug)]
pub struct ScriptedMedia {
    id: MediaId,
    state: RefCell<MediaSnapshot>,
    wired: Cell<usize>,
}

impl ScriptedMedia {
    pub fn new(id: &str, snapshot: MediaSnapshot) -> Self {
        Self {
            id: MediaId::new(id),
            state: RefCell::new(snapshot),
            wired: Cell::new(0),
        }
    }

    pub fn snapshot(&self) -> MediaSnapshot {
        self.state.borrow().clone()
    }

    pub fn replace(&self, snapshot: MediaSnapshot) {
        *self.state.borrow_mut() = snapshot;
    }

    pub fn update(&self, f: impl FnOnce(&mut MediaSnapshot)) {
        f(&mut self.state.borrow_mut());
    }

    /// How many times a registry wired listeners on this element.
    pub fn wire_count(&self) -> usize {
        self.wired.get()
    }
}

impl MediaElement for ScriptedMedia {
    fn id(&self) -> MediaId {
        self.id.clone()
    }

    fn paused(&self) -> bool {
        self.state.borrow().paused
    }

    fn ended(&self) -> bool {
        self.state.borrow().ended
    }

    fn seeking(&self) -> bool {
        self.state.borrow().seeking
    }

    fn duration(&self) -> f64 {
        self.state.borrow().duration
    }

    fn current_time(&self) -> f64 {
        self.state.borrow().current_time
    }

    fn playback_rate(&self) -> f64 {
        self.state.borrow().playback_rate
    }

    fn muted(&self) -> bool {
        self.state.borrow().muted
    }

    fn set_muted(&self, muted: bool) {
        self.state.borrow_mut().muted = muted;
    }

    fn ready_state(&self) -> u8 {
        self.state.borrow().ready_state
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn current_src(&self) -> String {
        self.state.borrow().src.clone()
    }

    fn wire_listeners(&self, _events: &[MediaEventKind]) {
        self.wired.set(self.wired.get() + 1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Page
// ═══════════════════════════════════════════════════════════════════════════════

/// Structured data a page exposes to platform adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSignals {
    pub json_ld: Vec<String>,
    pub meta: BTreeMap<String, String>,
    /// Selector to the text of each matching element.
    pub texts: BTreeMap<String, Vec<String>>,
    /// Selectors that match at least one element.
    pub elements: BTreeSet<String>,
    pub blobs: BTreeMap<String, Value>,
}

#[derive(Debug)]
pub struct ScriptedPage {
    url: String,
    title: Option<String>,
    hidden: bool,
    signals: PageSignals,
    media: Vec<Rc<ScriptedMedia>>,
    title_writes: Vec<String>,
}

impl ScriptedPage {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: Some(title.to_string()),
            hidden: false,
            signals: PageSignals::default(),
            media: Vec::new(),
            title_writes: Vec::new(),
        }
    }

    /// Adds a media element to the document and returns a handle to script it.
    pub fn add_media(&mut self, id: &str, snapshot: MediaSnapshot) -> Rc<ScriptedMedia> {
        let media = Rc::new(ScriptedMedia::new(id, snapshot));
        self.media.push(media.clone());
        media
    }

    /// Detaches and forgets an element.
    pub fn remove_media(&mut self, id: &MediaId) -> bool {
        let before = self.media.len();
        self.media.retain(|m| {
            let keep = &m.id != id;
            if !keep {
                m.update(|s| s.connected = false);
            }
            keep
        });
        before != self.media.len()
    }

    pub fn media(&self, id: &MediaId) -> Option<Rc<ScriptedMedia>> {
        self.media.iter().find(|m| &m.id == id).cloned()
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    /// Simulates the page (not the controller) changing its own title.
    pub fn set_title(&mut self, title: Option<&str>) {
        self.title = title.map(str::to_string);
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub fn signals_mut(&mut self) -> &mut PageSignals {
        &mut self.signals
    }

    pub fn set_signals(&mut self, signals: PageSignals) {
        self.signals = signals;
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Every title the controller wrote, oldest first.
    pub fn title_writes(&self) -> &[String] {
        &self.title_writes
    }

    pub fn take_title_writes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.title_writes)
    }
}

impl PageProbe for ScriptedPage {
    fn location(&self) -> String {
        self.url.clone()
    }

    fn document_title(&self) -> Option<String> {
        self.title.clone()
    }

    fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn json_ld_blobs(&self) -> Vec<String> {
        self.signals.json_ld.clone()
    }

    fn meta_content(&self, key: &str) -> Option<String> {
        self.signals.meta.get(key).cloned()
    }

    fn select_text(&self, selector: &str) -> Vec<String> {
        self.signals.texts.get(selector).cloned().unwrap_or_default()
    }

    fn element_exists(&self, selector: &str) -> bool {
        self.signals.elements.contains(selector) || self.signals.texts.contains_key(selector)
    }

    fn state_blob(&self, key: &str) -> Option<Value> {
        self.signals.blobs.get(key).cloned()
    }
}

impl Page for ScriptedPage {
    fn write_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
        self.title_writes.push(title.to_string());
    }

    fn media_elements(&self) -> Vec<MediaHandle> {
        self.media
            .iter()
            .filter(|m| m.is_connected())
            .map(|m| m.clone() as MediaHandle)
            .collect()
    }
}
