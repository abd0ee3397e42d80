use anyhow::{Context, Result};
use std::sync::Arc;

use crate::library::{self, ListOptions, Video, VideosPage};

pub trait FeedService: Send + Sync {
    fn list_videos(&self, opts: &ListOptions) -> Result<VideosPage>;
}

pub trait VideoService: Send + Sync {
    fn get_video(&self, id: &str) -> Result<Option<Video>>;
}

pub trait AuthorService: Send + Sync {
    fn list_following(&self) -> Result<Vec<library::AuthorSummary>>;
}

pub struct LibraryFeedService {
    client: Arc<library::Client>,
}

impl LibraryFeedService {
    pub fn new(client: Arc<library::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for LibraryFeedService {
    fn list_videos(&self, opts: &ListOptions) -> Result<VideosPage> {
        self.client
            .list_videos(opts)
            .with_context(|| format!("fetch {} feed page", opts.feed_type.as_str()))
    }
}

pub struct LibraryVideoService {
    client: Arc<library::Client>,
}

impl LibraryVideoService {
    pub fn new(client: Arc<library::Client>) -> Self {
        Self { client }
    }
}

impl VideoService for LibraryVideoService {
    fn get_video(&self, id: &str) -> Result<Option<Video>> {
        match self.client.get_video(id) {
            Ok(video) => Ok(Some(video)),
            Err(library::ApiError::NotFound) => Ok(None),
            Err(err) => Err(err).with_context(|| format!("fetch video {id}")),
        }
    }
}

pub struct LibraryAuthorService {
    client: Arc<library::Client>,
}

impl LibraryAuthorService {
    pub fn new(client: Arc<library::Client>) -> Self {
        Self { client }
    }
}

impl AuthorService for LibraryAuthorService {
    fn list_following(&self) -> Result<Vec<library::AuthorSummary>> {
        self.client
            .list_following_authors()
            .context("fetch followed authors")
    }
}

/// Resolve a deep link by paging until `id` is locally present. The server
/// caps each request at `MAX_PAGE_LIMIT`, so a single over-sized fetch cannot
/// reach ids deeper than the cap; pages are folded into one response, bounded
/// by `opts.limit` items, that the store applies as a single replace.
pub fn collect_until_present(
    service: &dyn FeedService,
    opts: &ListOptions,
    id: &str,
) -> Result<VideosPage> {
    let budget = opts.limit.max(1);
    let mut combined = VideosPage::default();
    let mut cursor = opts.cursor.clone();

    loop {
        let remaining = budget - combined.videos.len();
        let page = service.list_videos(&ListOptions {
            cursor: cursor.clone(),
            limit: remaining.min(library::MAX_PAGE_LIMIT),
            ..opts.clone()
        })?;
        let stalled = page.videos.is_empty();
        combined.videos.extend(page.videos);
        combined.next_cursor = page.next_cursor;

        let found = combined.videos.iter().any(|video| video.id == id);
        if found || stalled || combined.next_cursor.is_none() || combined.videos.len() >= budget {
            return Ok(combined);
        }
        cursor = combined.next_cursor.clone();
    }
}

/// In-memory feed over a fixed video list. Pages are cut with the same
/// over-fetch-by-one cursor scheme the server uses, which makes it a faithful
/// stand-in for pagination tests.
pub struct MockFeedService {
    videos: Vec<Video>,
}

impl MockFeedService {
    pub fn new(videos: Vec<Video>) -> Self {
        Self { videos }
    }
}

impl FeedService for MockFeedService {
    fn list_videos(&self, opts: &ListOptions) -> Result<VideosPage> {
        let matches: Vec<&Video> = self
            .videos
            .iter()
            .filter(|video| match opts.feed_type {
                library::FeedType::All => true,
                library::FeedType::Liked => video.is_liked,
                library::FeedType::Favorite => video.is_favorite,
                library::FeedType::Following => video.is_following,
            })
            .filter(|video| {
                opts.author_id
                    .as_deref()
                    .map(|author| video.author_id == author)
                    .unwrap_or(true)
            })
            .collect();

        let start = match opts.cursor.as_deref() {
            Some(cursor) => matches
                .iter()
                .position(|video| video.id == cursor)
                .unwrap_or(matches.len()),
            None => 0,
        };
        let limit = opts.limit.min(library::MAX_PAGE_LIMIT).max(1);
        let end = (start + limit).min(matches.len());

        Ok(VideosPage {
            videos: matches[start..end].iter().map(|v| (*v).clone()).collect(),
            next_cursor: matches.get(end).map(|video| video.id.clone()),
        })
    }
}

#[derive(Default)]
pub struct MockVideoService {
    videos: Vec<Video>,
}

impl MockVideoService {
    pub fn new(videos: Vec<Video>) -> Self {
        Self { videos }
    }
}

impl VideoService for MockVideoService {
    fn get_video(&self, id: &str) -> Result<Option<Video>> {
        Ok(self.videos.iter().find(|video| video.id == id).cloned())
    }
}

#[derive(Default)]
pub struct MockAuthorService {
    authors: Vec<library::AuthorSummary>,
}

impl MockAuthorService {
    pub fn new(authors: Vec<library::AuthorSummary>) -> Self {
        Self { authors }
    }
}

impl AuthorService for MockAuthorService {
    fn list_following(&self) -> Result<Vec<library::AuthorSummary>> {
        Ok(self
            .authors
            .iter()
            .filter(|author| author.is_following)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
pub fn sample_video(id: &str) -> Video {
    use chrono::TimeZone;

    Video {
        id: id.to_string(),
        author_id: "a1".into(),
        author: library::AuthorSummary {
            id: "a1".into(),
            unique_id: "handle".into(),
            nickname: "Name".into(),
            avatar_path: None,
            is_following: false,
        },
        description: None,
        create_time: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        digg_count: Some(0),
        play_count: Some(0),
        audio_id: None,
        size: None,
        video_path: format!("videos/{id}.mp4"),
        cover_path: None,
        is_liked: false,
        is_favorite: false,
        is_following: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::FeedType;

    fn feed(count: usize) -> MockFeedService {
        MockFeedService::new((0..count).map(|i| sample_video(&format!("v{i}"))).collect())
    }

    #[test]
    fn mock_feed_pages_with_cursor() {
        let service = feed(7);
        let opts = ListOptions {
            feed_type: FeedType::All,
            limit: 5,
            ..Default::default()
        };
        let first = service.list_videos(&opts).unwrap();
        assert_eq!(first.videos.len(), 5);
        assert_eq!(first.next_cursor.as_deref(), Some("v5"));

        let second = service
            .list_videos(&ListOptions {
                cursor: first.next_cursor.clone(),
                ..opts
            })
            .unwrap();
        assert_eq!(second.videos.len(), 2);
        assert_eq!(second.videos[0].id, "v5");
        assert!(second.next_cursor.is_none());
    }

    #[test]
    fn deep_targets_past_the_page_cap_are_collected() {
        let service = feed(70);
        let opts = ListOptions {
            feed_type: FeedType::All,
            limit: 200,
            ..Default::default()
        };

        // v63 sits beyond the server's 50-item cap: two requests are folded.
        let page = collect_until_present(&service, &opts, "v63").unwrap();
        assert!(page.videos.iter().any(|video| video.id == "v63"));
        assert_eq!(page.videos.len(), 70);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn missing_deep_target_stops_at_the_budget() {
        let service = feed(300);
        let opts = ListOptions {
            feed_type: FeedType::All,
            limit: 120,
            ..Default::default()
        };

        let page = collect_until_present(&service, &opts, "ghost").unwrap();
        assert_eq!(page.videos.len(), 120);
        assert_eq!(page.next_cursor.as_deref(), Some("v120"));
    }

    #[test]
    fn mock_feed_filters_liked() {
        let mut videos: Vec<Video> = (0..4).map(|i| sample_video(&format!("v{i}"))).collect();
        videos[1].is_liked = true;
        videos[3].is_liked = true;
        let service = MockFeedService::new(videos);

        let page = service
            .list_videos(&ListOptions {
                feed_type: FeedType::Liked,
                limit: 5,
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<&str> = page.videos.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["v1", "v3"]);
    }

    #[test]
    fn mock_feed_scopes_to_author() {
        let mut videos: Vec<Video> = (0..3).map(|i| sample_video(&format!("v{i}"))).collect();
        videos[2].author_id = "a2".into();
        let service = MockFeedService::new(videos);

        let page = service
            .list_videos(&ListOptions {
                feed_type: FeedType::All,
                author_id: Some("a2".into()),
                limit: 5,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.videos.len(), 1);
        assert_eq!(page.videos[0].id, "v2");
    }
}
