use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::data::{
    AuthorService, FeedService, LibraryAuthorService, LibraryFeedService, LibraryVideoService,
    VideoService,
};
use crate::library;
use crate::nav::Location;
use crate::ui;

/// Wire config, the library client, and the services into the terminal model
/// and hand over to the event loop. `initial_location` is an optional app
/// path such as `/following/abc123?authorId=a1` used for deep-link entry.
pub fn run(initial_location: Option<&str>) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let user_agent = if cfg.server.user_agent.trim().is_empty() {
        config::ServerConfig::default().user_agent
    } else {
        cfg.server.user_agent.clone()
    };

    let client = Arc::new(
        library::Client::new(library::ClientConfig {
            base_url: cfg.server.base_url.clone(),
            user_agent,
            timeout: Some(cfg.server.timeout),
            http_client: None,
        })
        .context("create library client")?,
    );

    let feed_service: Arc<dyn FeedService> = Arc::new(LibraryFeedService::new(client.clone()));
    let video_service: Arc<dyn VideoService> = Arc::new(LibraryVideoService::new(client.clone()));
    let author_service: Arc<dyn AuthorService> =
        Arc::new(LibraryAuthorService::new(client.clone()));

    let location = Location::parse(initial_location.unwrap_or("/all"));
    let status_message = format!(
        "Browsing {}. j/k to scroll, Space to play, q to quit.",
        cfg.server.base_url
    );

    let mut model = ui::Model::new(ui::Options {
        config: cfg,
        client,
        feed_service,
        video_service,
        author_service,
        location,
        status_message,
    });
    model.run()
}
