use super::PlatformAdapter;
use crate::page::PageProbe;

/// Any site without a dedicated adapter. Live only via infinite duration.
pub struct GenericAdapter;

impl PlatformAdapter for GenericAdapter {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn matches(&self, _host: &str) -> bool {
        true
    }

    fn identity_parts(&self, page: &dyn PageProbe) -> Option<Vec<String>> {
        Some(vec![url_without_fragment(&page.location())])
    }
}

/// The page URL with its `#fragment` removed. Unparseable input is cut at `#`.
pub(crate) fn url_without_fragment(location: &str) -> String {
    match url::Url::parse(location) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => location.split('#').next().unwrap_or_default().to_string(),
    }
}
