use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

/// Hard cap the server applies to a single page request.
pub const MAX_PAGE_LIMIT: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    #[default]
    All,
    Liked,
    Favorite,
    Following,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::All => "all",
            FeedType::Liked => "liked",
            FeedType::Favorite => "favorite",
            FeedType::Following => "following",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FeedType::All => "All",
            FeedType::Liked => "Liked",
            FeedType::Favorite => "Favorites",
            FeedType::Following => "Following",
        }
    }

    /// Path segment the feed lives under, e.g. `/liked/{videoId}`.
    pub fn base_path(&self) -> &'static str {
        match self {
            FeedType::All => "/all",
            FeedType::Liked => "/liked",
            FeedType::Favorite => "/favorites",
            FeedType::Following => "/following",
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "all" => Some(FeedType::All),
            "liked" => Some(FeedType::Liked),
            "favorites" | "favorite" => Some(FeedType::Favorite),
            "following" => Some(FeedType::Following),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: String,
    pub unique_id: String,
    pub nickname: String,
    #[serde(default)]
    pub avatar_path: Option<String>,
    #[serde(default)]
    pub is_following: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub author_id: String,
    pub author: AuthorSummary,
    #[serde(default)]
    pub description: Option<String>,
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub digg_count: Option<i64>,
    #[serde(default)]
    pub play_count: Option<i64>,
    #[serde(default)]
    pub audio_id: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    pub video_path: String,
    #[serde(default)]
    pub cover_path: Option<String>,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_following: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideosPage {
    pub videos: Vec<Video>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub feed_type: FeedType,
    pub author_id: Option<String>,
    pub cursor: Option<String>,
    pub limit: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("video not found")]
    NotFound,
    #[error("library server returned {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("library client user agent required");
        }
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|err| anyhow::anyhow!("invalid library base url {:?}: {err}", config.base_url))?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    /// Cursor-paginated listing, newest first. The server over-fetches by one
    /// row to derive `nextCursor`, so a non-null cursor means more pages exist.
    pub fn list_videos(&self, opts: &ListOptions) -> Result<VideosPage, ApiError> {
        let mut url = self.endpoint("api/videos");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("type", opts.feed_type.as_str());
            pairs.append_pair("limit", &opts.limit.min(MAX_PAGE_LIMIT).to_string());
            if let Some(author) = opts.author_id.as_deref() {
                pairs.append_pair("authorId", author);
            }
            if let Some(cursor) = opts.cursor.as_deref() {
                pairs.append_pair("cursor", cursor);
            }
        }

        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }
        Ok(response.json()?)
    }

    /// Single-item lookup, used only for deep-link resolution.
    pub fn get_video(&self, id: &str) -> Result<Video, ApiError> {
        let mut url = self.endpoint("api/videos");
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }

        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            status if !status.is_success() => Err(ApiError::Status(status)),
            _ => Ok(response.json()?),
        }
    }

    /// Authors the user follows; powers the Following feed's author filter.
    pub fn list_following_authors(&self) -> Result<Vec<AuthorSummary>, ApiError> {
        let mut url = self.endpoint("api/authors");
        url.query_pairs_mut().append_pair("following", "true");

        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }
        Ok(response.json()?)
    }

    /// Media paths from the API are opaque relative paths; the server serves
    /// the bytes (with range support) under `/media/`.
    pub fn media_url(&self, path: &str) -> String {
        let mut url = self.endpoint("media");
        if let Ok(mut segments) = url.path_segments_mut() {
            for part in path.split('/').filter(|part| !part.is_empty()) {
                segments.push(part);
            }
        }
        url.to_string()
    }

    pub fn video_url(&self, video: &Video) -> String {
        self.media_url(&video.video_path)
    }

    pub fn cover_url(&self, video: &Video) -> Option<String> {
        video.cover_path.as_deref().map(|path| self.media_url(path))
    }

    pub fn avatar_url(&self, author: &AuthorSummary) -> Option<String> {
        author
            .avatar_path
            .as_deref()
            .map(|path| self.media_url(path))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for part in path.split('/') {
                segments.push(part);
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new(ClientConfig {
            base_url: "http://localhost:3000".into(),
            user_agent: "clipfeed-test/0.1".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn media_url_joins_relative_paths() {
        let client = client();
        assert_eq!(
            client.media_url("videos/v1.mp4"),
            "http://localhost:3000/media/videos/v1.mp4"
        );
        assert_eq!(
            client.media_url("/covers/c1.jpg"),
            "http://localhost:3000/media/covers/c1.jpg"
        );
    }

    #[test]
    fn rejects_blank_user_agent() {
        let err = Client::new(ClientConfig {
            base_url: "http://localhost:3000".into(),
            user_agent: "  ".into(),
            ..Default::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn page_deserializes_camel_case() {
        let raw = r#"{
            "videos": [{
                "id": "v1",
                "authorId": "a1",
                "author": {"id": "a1", "uniqueId": "handle", "nickname": "Name"},
                "createTime": "2024-05-01T12:00:00Z",
                "diggCount": 3,
                "videoPath": "videos/v1.mp4",
                "isLiked": true
            }],
            "nextCursor": "v2"
        }"#;
        let page: VideosPage = serde_json::from_str(raw).unwrap();
        assert_eq!(page.videos.len(), 1);
        assert_eq!(page.videos[0].author.unique_id, "handle");
        assert!(page.videos[0].is_liked);
        assert!(page.videos[0].play_count.is_none());
        assert_eq!(page.next_cursor.as_deref(), Some("v2"));
    }

    #[test]
    fn feed_type_paths_round_trip() {
        for feed in [
            FeedType::All,
            FeedType::Liked,
            FeedType::Favorite,
            FeedType::Following,
        ] {
            let segment = feed.base_path().trim_start_matches('/');
            assert_eq!(FeedType::from_path_segment(segment), Some(feed));
        }
        assert_eq!(FeedType::from_path_segment("trending"), None);
    }
}
