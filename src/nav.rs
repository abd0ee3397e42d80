use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::form_urlencoded;

/// Characters that cannot appear raw in a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?');

/// A shareable app location: path plus preserved query parameters. The
/// terminal client has no address bar, but the location is what deep links
/// enter through and what the share action copies out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    path: String,
    query: Vec<(String, String)>,
}

impl Location {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (path, query_str) = match raw.split_once('?') {
            Some((path, query)) => (path, query),
            None => (raw, ""),
        };
        let mut path = path.to_string();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }

        let query = form_urlencoded::parse(query_str.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        Self { path, query }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|segment| !segment.is_empty())
    }

    fn with_path(&self, path: String) -> Self {
        Self {
            path,
            query: self.query.clone(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if !self.query.is_empty() {
            let encoded: String = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .finish();
            write!(f, "?{encoded}")?;
        }
        Ok(())
    }
}

/// Keeps the location in lockstep with the dominant item and resolves
/// deep-linked ids, without ever feeding back into the scroll/visibility
/// system: scrolling is requested as a target index, and dominance is still
/// derived purely from reported ratios.
pub struct NavigationCoordinator {
    base_path: String,
    location: Location,
    deep_link_id: Option<String>,
}

impl NavigationCoordinator {
    /// `base_path` is the feed's root segment, e.g. `/following`. A location
    /// whose path extends the base by one segment carries a deep-linked id.
    pub fn new(base_path: impl Into<String>, location: Location) -> Self {
        let base_path = normalize_base(base_path.into());
        let deep_link_id = location
            .path()
            .strip_prefix(base_path.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(|rest| {
                percent_encoding::percent_decode_str(rest)
                    .decode_utf8_lossy()
                    .into_owned()
            });

        Self {
            base_path,
            location,
            deep_link_id,
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The id the app was opened on, if any. Consumed once resolved.
    pub fn take_deep_link_id(&mut self) -> Option<String> {
        self.deep_link_id.take()
    }

    pub fn has_deep_link(&self) -> bool {
        self.deep_link_id.is_some()
    }

    /// Feed switch: rebase the location, dropping any stale id segment but
    /// preserving the query.
    pub fn rebase(&mut self, base_path: impl Into<String>) {
        self.base_path = normalize_base(base_path.into());
        self.location = self.location.with_path(self.base_path.clone());
    }

    /// Replace (never push) the location's path segment with the active
    /// item's id, preserving existing query parameters. Synchronous with the
    /// active-index change; back/forward-style history is never polluted.
    pub fn sync_active(&mut self, id: &str) -> &Location {
        let encoded = utf8_percent_encode(id, SEGMENT);
        self.location = self
            .location
            .with_path(format!("{}/{}", self.base_path, encoded));
        &self.location
    }

    /// Absolute URL for sharing, e.g. copied to the clipboard.
    pub fn share_url(&self, origin: &str) -> String {
        format!("{}{}", origin.trim_end_matches('/'), self.location)
    }
}

fn normalize_base(mut base: String) -> String {
    if !base.starts_with('/') {
        base.insert(0, '/');
    }
    while base.len() > 1 && base.ends_with('/') {
        base.pop();
    }
    base
}

/// Keyboard stepping targets, clamped to the loaded list.
pub fn next_index(active: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (active + 1).min(len - 1)
}

pub fn prev_index(active: usize) -> usize {
    active.saturating_sub(1)
}
