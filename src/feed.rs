use crate::library::{FeedType, ListOptions, Video, VideosPage};

/// Page size for ordinary feed browsing.
pub const FEED_PAGE_SIZE: usize = 5;
/// Item budget for resolving a deep-linked video id: pages are collected
/// until the target is locally present or this many items have been fetched.
pub const DEEP_LINK_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub feed_type: FeedType,
    pub author_id: Option<String>,
    pub limit: usize,
}

impl FeedQuery {
    pub fn new(feed_type: FeedType) -> Self {
        Self {
            feed_type,
            author_id: None,
            limit: FEED_PAGE_SIZE,
        }
    }

    pub fn with_author(mut self, author_id: Option<String>) -> Self {
        self.author_id = author_id;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self::new(FeedType::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Replace,
    Append,
}

/// A fetch the store wants performed. The caller runs it (typically on a
/// worker thread) and feeds the outcome back through `apply_page` /
/// `apply_error` with the same `request_id`.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub request_id: u64,
    pub mode: LoadMode,
    pub opts: ListOptions,
}

/// Cursor-pagination state for one feed view. All mutation is synchronous;
/// the store never performs I/O itself. Responses carry a request id, and
/// anything but the most recently issued id is discarded, so a fetch that
/// completes after its feed was switched away can never corrupt the list.
pub struct FeedStore {
    query: FeedQuery,
    videos: Vec<Video>,
    cursor: Option<String>,
    has_more: bool,
    in_flight: Option<(u64, LoadMode)>,
    error: Option<String>,
    next_request_id: u64,
}

impl FeedStore {
    pub fn new(query: FeedQuery) -> Self {
        Self {
            query,
            videos: Vec::new(),
            cursor: None,
            has_more: true,
            in_flight: None,
            error: None,
            next_request_id: 0,
        }
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn query(&self) -> &FeedQuery {
        &self.query
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading_initial(&self) -> bool {
        matches!(self.in_flight, Some((_, LoadMode::Replace)))
    }

    pub fn is_loading_more(&self) -> bool {
        matches!(self.in_flight, Some((_, LoadMode::Append)))
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.videos.iter().position(|video| video.id == id)
    }

    /// Adjust the per-fetch limit without resetting pagination. Used after an
    /// over-sized deep-link fetch so later pages return to the normal size.
    pub fn set_limit(&mut self, limit: usize) {
        self.query.limit = limit;
    }

    /// Reset pagination for (possibly new) query and issue the initial fetch.
    /// Supersedes any in-flight request: its completion will arrive with an
    /// older request id and be dropped.
    pub fn begin_initial(&mut self, query: FeedQuery) -> FetchRequest {
        self.query = query;
        self.cursor = None;
        self.has_more = true;
        self.error = None;

        let request_id = self.bump_request_id();
        self.in_flight = Some((request_id, LoadMode::Replace));
        FetchRequest {
            request_id,
            mode: LoadMode::Replace,
            opts: self.list_options(None),
        }
    }

    /// Issue a load-more fetch from the current cursor. A call while any load
    /// is in flight, or once the feed is exhausted, is a no-op (never queued).
    pub fn begin_more(&mut self) -> Option<FetchRequest> {
        if self.in_flight.is_some() || !self.has_more {
            return None;
        }

        let request_id = self.bump_request_id();
        self.in_flight = Some((request_id, LoadMode::Append));
        Some(FetchRequest {
            request_id,
            mode: LoadMode::Append,
            opts: self.list_options(self.cursor.clone()),
        })
    }

    /// Apply a completed fetch. Returns false when the response is stale.
    pub fn apply_page(&mut self, request_id: u64, page: VideosPage) -> bool {
        let Some((current, mode)) = self.in_flight else {
            return false;
        };
        if current != request_id {
            return false;
        }

        self.in_flight = None;
        self.error = None;
        self.cursor = page.next_cursor.clone();
        self.has_more = page.next_cursor.is_some();

        match mode {
            LoadMode::Replace => {
                self.videos = page.videos;
            }
            LoadMode::Append => {
                for video in page.videos {
                    match self.index_of(&video.id) {
                        // A refreshed item replaces the prior one by identity.
                        Some(existing) => self.videos[existing] = video,
                        None => self.videos.push(video),
                    }
                }
            }
        }
        true
    }

    /// Record a failed fetch. Already-loaded items are left intact; the error
    /// is surfaced and retry becomes possible once the loading flag clears.
    pub fn apply_error(&mut self, request_id: u64, message: String) -> bool {
        let Some((current, _)) = self.in_flight else {
            return false;
        };
        if current != request_id {
            return false;
        }

        self.in_flight = None;
        self.error = Some(message);
        true
    }

    fn list_options(&self, cursor: Option<String>) -> ListOptions {
        ListOptions {
            feed_type: self.query.feed_type,
            author_id: self.query.author_id.clone(),
            cursor,
            limit: self.query.limit,
        }
    }

    fn bump_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }
}
