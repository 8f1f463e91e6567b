//! The host document, as far as the page core is concerned.
//!
//! [`PageProbe`] is the read-only view platform adapters get; [`Page`] adds
//! the two operations only the controller may perform: writing the title and
//! scanning for media.

use crate::media::MediaHandle;
use serde_json::Value;

pub trait PageProbe {
    fn location(&self) -> String;

    /// Current document title; `None` when the page has no title element yet.
    fn document_title(&self) -> Option<String>;

    fn is_hidden(&self) -> bool;

    /// Raw text of every `application/ld+json` script.
    fn json_ld_blobs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Content of the first `<meta>` whose name, property or itemprop is `key`.
    fn meta_content(&self, key: &str) -> Option<String> {
        let _ = key;
        None
    }

    /// Text content of every element matching a CSS selector.
    fn select_text(&self, selector: &str) -> Vec<String> {
        let _ = selector;
        Vec::new()
    }

    fn element_exists(&self, selector: &str) -> bool {
        let _ = selector;
        false
    }

    /// Platform state exposed by the page's own scripts (player responses,
    /// client caches), keyed by a platform-specific name.
    fn state_blob(&self, key: &str) -> Option<Value> {
        let _ = key;
        None
    }
}

pub trait Page: PageProbe {
    /// The only title mutation in the system. Called by the title renderer.
    fn write_title(&mut self, title: &str);

    /// Every `<video>`/`<audio>` currently in the document, including frames
    /// the host can reach.
    fn media_elements(&self) -> Vec<MediaHandle>;
}
