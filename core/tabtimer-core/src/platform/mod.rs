//! Platform-specific page signals.
//!
//! # Architecture
//!
//! - [`PlatformAdapter`]: what a supported site can tell us beyond the media
//!   element itself (live badges, stream start time, content identity)
//! - [`PlatformRouter`]: picks the adapter for a hostname
//!
//! Adapters never fail. A lookup that finds nothing returns `None`/`false`
//! and the caller falls through to the next, less authoritative source.

mod generic;
mod twitch;
mod youtube;

pub use generic::GenericAdapter;
pub use twitch::TwitchAdapter;
pub use youtube::YouTubeAdapter;

use crate::page::PageProbe;

/// Meta keys that commonly carry a broadcast start time.
pub const DEFAULT_START_META_KEYS: &[&str] = &["startDate", "og:video:start_time"];

pub trait PlatformAdapter {
    /// Adapter name, used as the first identity fingerprint part.
    fn name(&self) -> &'static str;

    /// Whether this adapter handles the given canonical hostname.
    fn matches(&self, host: &str) -> bool;

    /// Continuous live platforms swap streams in place and show the
    /// one-hour DVR duration glitch after internal navigation.
    fn is_live_platform(&self) -> bool {
        false
    }

    /// A live badge or live-now state independent of the media duration.
    fn live_signal(&self, page: &dyn PageProbe) -> bool {
        let _ = page;
        false
    }

    /// Stream start from the platform's own API or client state, in epoch ms.
    fn api_start_ms(&self, page: &dyn PageProbe) -> Option<i64> {
        let _ = page;
        None
    }

    fn start_meta_keys(&self) -> &'static [&'static str] {
        DEFAULT_START_META_KEYS
    }

    /// Selectors of on-screen regions that show elapsed stream time.
    fn elapsed_text_selectors(&self) -> &'static [&'static str] {
        &[]
    }

    /// Parts identifying what is loaded. `None` when the page does not expose
    /// enough yet; the tracker then keeps its previous identity.
    fn identity_parts(&self, page: &dyn PageProbe) -> Option<Vec<String>>;

    /// Undecorated title from platform metadata, when the site exposes one.
    fn base_title(&self, page: &dyn PageProbe) -> Option<String> {
        let _ = page;
        None
    }
}

/// Routes hostnames to platform adapters.
///
/// Adapters are checked in registration order. First match wins; the generic
/// adapter matches everything and is always last.
pub struct PlatformRouter {
    adapters: Vec<Box<dyn PlatformAdapter>>,
}

impl PlatformRouter {
    pub fn new() -> Self {
        let adapters: Vec<Box<dyn PlatformAdapter>> = vec![
            Box::new(YouTubeAdapter),
            Box::new(TwitchAdapter),
            Box::new(GenericAdapter),
        ];
        Self { adapters }
    }

    /// Router with custom adapters ahead of the generic fallback.
    pub fn with_adapters(mut adapters: Vec<Box<dyn PlatformAdapter>>) -> Self {
        adapters.push(Box::new(GenericAdapter));
        Self { adapters }
    }

    pub fn for_host(&self, host: &str) -> &dyn PlatformAdapter {
        self.adapters
            .iter()
            .find(|adapter| adapter.matches(host))
            .map(|adapter| adapter.as_ref())
            .unwrap_or(&GenericAdapter)
    }

    pub fn for_url(&self, url: &str) -> &dyn PlatformAdapter {
        self.for_host(&tabtimer_protocol::canonical_host(url))
    }
}

impl Default for PlatformRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `host` is `domain` or one of its subdomains.
pub(crate) fn host_is(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map(|rest| rest.ends_with('.'))
            .unwrap_or(false)
}

/// First non-empty trimmed text among the elements matching `selector`.
pub(crate) fn first_text(page: &dyn PageProbe, selector: &str) -> Option<String> {
    page.select_text(selector)
        .into_iter()
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_registers_generic_last() {
        let router = PlatformRouter::new();
        assert_eq!(router.adapters.len(), 3);
        assert_eq!(router.adapters[0].name(), "youtube");
        assert_eq!(router.adapters[1].name(), "twitch");
        assert_eq!(router.adapters[2].name(), "generic");
    }

    #[test]
    fn router_matches_platform_hosts() {
        let router = PlatformRouter::new();
        assert_eq!(router.for_host("youtube.com").name(), "youtube");
        assert_eq!(router.for_host("m.youtube.com").name(), "youtube");
        assert_eq!(router.for_host("youtu.be").name(), "youtube");
        assert_eq!(router.for_host("twitch.tv").name(), "twitch");
        assert_eq!(router.for_url("https://www.twitch.tv/somechannel").name(), "twitch");
        assert_eq!(router.for_host("vimeo.com").name(), "generic");
        assert_eq!(router.for_host("notyoutube.com").name(), "generic");
    }

    #[test]
    fn host_is_requires_label_boundary() {
        assert!(host_is("player.twitch.tv", "twitch.tv"));
        assert!(!host_is("faketwitch.tv", "twitch.tv"));
    }
}
