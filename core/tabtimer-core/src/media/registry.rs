use std::collections::HashSet;

use super::{is_playing_raw, is_real_media, MediaEventKind, MediaHandle, MediaId};

/// Set of media elements currently attached to the page.
///
/// Elements are kept in discovery order, registered at most once, and dropped
/// as soon as the host reports them disconnected. Listener wiring survives a
/// [`reset`](MediaRegistry::reset) so a rescan never subscribes twice.
#[derive(Default)]
pub struct MediaRegistry {
    entries: Vec<MediaHandle>,
    wired: HashSet<MediaId>,
    last_active: Option<MediaId>,
}

impl MediaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every element found by a scan of some DOM subtree.
    /// Returns the ids that were newly registered.
    pub fn attach<I>(&mut self, found: I) -> Vec<MediaId>
    where
        I: IntoIterator<Item = MediaHandle>,
    {
        found
            .into_iter()
            .filter_map(|media| {
                let id = media.id();
                self.register(media).then_some(id)
            })
            .collect()
    }

    /// Registers one element. `false` if it was already registered or is detached.
    pub fn register(&mut self, media: MediaHandle) -> bool {
        if !media.is_connected() {
            return false;
        }
        let id = media.id();
        if self.contains(&id) {
            return false;
        }
        if self.wired.insert(id.clone()) {
            media.wire_listeners(&MediaEventKind::LISTENED);
        }
        if is_playing_raw(media.as_ref()) {
            self.last_active = Some(id.clone());
        }
        tracing::debug!(media_id = %id, "Media element registered");
        self.entries.push(media);
        true
    }

    pub fn contains(&self, id: &MediaId) -> bool {
        self.entries.iter().any(|m| &m.id() == id)
    }

    pub fn get(&self, id: &MediaId) -> Option<MediaHandle> {
        self.entries.iter().find(|m| &m.id() == id).cloned()
    }

    /// Drops elements that left the document. Returns the dropped ids.
    pub fn prune(&mut self) -> Vec<MediaId> {
        let mut dropped = Vec::new();
        self.entries.retain(|media| {
            let connected = media.is_connected();
            if !connected {
                dropped.push(media.id());
            }
            connected
        });
        if let Some(last) = &self.last_active {
            if dropped.contains(last) {
                self.last_active = None;
            }
        }
        for id in &dropped {
            tracing::debug!(media_id = %id, "Media element dropped");
        }
        dropped
    }

    /// Forgets every element and the activity history.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.last_active = None;
    }

    pub fn mark_active(&mut self, id: &MediaId) {
        if self.contains(id) {
            self.last_active = Some(id.clone());
        }
    }

    pub fn last_active(&self) -> Option<&MediaId> {
        self.last_active.as_ref()
    }

    /// Real, connected media in discovery order.
    pub fn real_media(&self) -> impl Iterator<Item = &MediaHandle> {
        self.entries.iter().filter(|m| is_real_media(m.as_ref()))
    }

    /// Best candidate to decorate the title with.
    ///
    /// Actually-playing beats most-recently-active, which beats any other
    /// connected candidate. Placeholders are never picked.
    pub fn pick_active(&self) -> Option<MediaHandle> {
        if let Some(playing) = self.real_media().find(|m| is_playing_raw(m.as_ref())) {
            return Some(playing.clone());
        }
        if let Some(last) = &self.last_active {
            if let Some(media) = self.real_media().find(|m| &m.id() == last) {
                return Some(media.clone());
            }
        }
        self.real_media().next().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
