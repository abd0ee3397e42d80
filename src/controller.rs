use crate::feed::{FeedQuery, FeedStore, FetchRequest, LoadMode, FEED_PAGE_SIZE};
use crate::library::{Video, VideosPage};
use crate::nav::{self, NavigationCoordinator};
use crate::playback::{MediaEvent, MediaSurface, PlaybackController};
use crate::session::SessionFlags;
use crate::visibility::{Observation, VisibilityTracker};

/// The dominant item moved; the previous holder (if any) must be paused and
/// rewound before the new one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DominanceChange {
    pub prev: Option<usize>,
    pub next: usize,
}

/// A scroll the coordinator requests of the viewport. Deep-link entry jumps
/// without animation on first paint; keyboard stepping animates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jump {
    pub index: usize,
    pub animated: bool,
}

/// Everything a state transition asks the host to do. Pure data, so the
/// whole dominance/prefetch/navigation pipeline is testable without a
/// terminal or a network.
#[derive(Debug, Default)]
pub struct Effects {
    pub dominance: Option<DominanceChange>,
    pub fetch: Option<FetchRequest>,
    pub jump: Option<Jump>,
    /// Deep-linked id that was not present in the loaded window; the host may
    /// consult the single-item endpoint for a better status message. The feed
    /// itself has already fallen back to the head of the list.
    pub deep_link_missing: Option<String>,
    /// New location string, produced in the same synchronous step as the
    /// dominance change it reflects.
    pub location: Option<String>,
}

/// Composition root for one feed view: pagination store, visibility tracker,
/// per-item playback machines, and location coordination. All methods are
/// synchronous; fetches are returned as `FetchRequest` values for the host to
/// run on a worker.
pub struct FeedController {
    store: FeedStore,
    tracker: VisibilityTracker,
    nav: NavigationCoordinator,
    session: SessionFlags,
    players: Vec<PlaybackController>,
    global_muted: bool,
    pending_deep_link: Option<String>,
    last_prefetch_boundary: Option<usize>,
    steady_limit: usize,
}

impl FeedController {
    pub fn new(
        query: FeedQuery,
        mut nav: NavigationCoordinator,
        session: SessionFlags,
    ) -> (Self, FetchRequest) {
        let pending_deep_link = nav.take_deep_link_id();
        let mut store = FeedStore::new(query.clone());
        let request = store.begin_initial(query);

        (
            Self {
                store,
                tracker: VisibilityTracker::new(),
                nav,
                session,
                players: Vec::new(),
                global_muted: false,
                pending_deep_link,
                last_prefetch_boundary: None,
                steady_limit: FEED_PAGE_SIZE,
            },
            request,
        )
    }

    /// Page size used once the (possibly over-sized) initial fetch landed.
    pub fn set_steady_limit(&mut self, limit: usize) {
        if limit > 0 {
            self.steady_limit = limit;
        }
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn active_index(&self) -> usize {
        self.tracker.active_index()
    }

    pub fn active_video(&self) -> Option<&Video> {
        self.store.videos().get(self.active_index())
    }

    pub fn global_muted(&self) -> bool {
        self.global_muted
    }

    /// Deep-linked id the initial fetch must make locally present.
    pub fn pending_deep_link(&self) -> Option<&str> {
        self.pending_deep_link.as_deref()
    }

    pub fn location(&self) -> &crate::nav::Location {
        self.nav.location()
    }

    pub fn share_url(&self, origin: &str) -> String {
        self.nav.share_url(origin)
    }

    pub fn playback(&self, index: usize) -> Option<&PlaybackController> {
        self.players.get(index)
    }

    pub fn playback_mut(&mut self, index: usize) -> Option<&mut PlaybackController> {
        self.players.get_mut(index)
    }

    pub fn active_playback(&self) -> Option<&PlaybackController> {
        self.playback(self.tracker.active_index())
    }

    /// Apply a completed page fetch. Stale request ids are dropped wholesale.
    pub fn apply_page(&mut self, request: &FetchRequest, page: VideosPage) -> Effects {
        let mut effects = Effects::default();
        if !self.store.apply_page(request.request_id, page) {
            return effects;
        }

        self.sync_players(request.mode);
        self.tracker.sync_len(self.store.len());

        if request.mode == LoadMode::Replace {
            self.store.set_limit(self.steady_limit);
        }
        if request.mode == LoadMode::Replace && !self.store.is_empty() {
            let (index, animated) = match self.pending_deep_link.take() {
                Some(id) => match self.store.index_of(&id) {
                    Some(index) => (index, false),
                    None => {
                        effects.deep_link_missing = Some(id);
                        (0, false)
                    }
                },
                None => (0, false),
            };
            self.tracker.set_active(index);
            let active = self.tracker.active_index();
            effects.jump = Some(Jump { index: active, animated });
            effects.dominance = Some(DominanceChange {
                prev: None,
                next: active,
            });
            effects.location = self.sync_location();
        }

        effects.fetch = self.maybe_prefetch();
        effects
    }

    pub fn apply_error(&mut self, request: &FetchRequest, message: String) -> bool {
        self.store.apply_error(request.request_id, message)
    }

    /// Feed one observation batch through the tracker. A dominance shift
    /// pauses nothing by itself; the returned effects tell the host which
    /// playback machines to drive, and the location is already synced.
    pub fn observe(&mut self, batch: &[Observation]) -> Effects {
        let mut effects = Effects::default();
        let prev = self.tracker.active_index();
        if let Some(next) = self.tracker.apply_batch(batch) {
            effects.dominance = Some(DominanceChange {
                prev: Some(prev),
                next,
            });
            effects.location = self.sync_location();
        }
        effects.fetch = self.maybe_prefetch();
        effects
    }

    /// Switch to another feed (filter tabs / author scope). Pagination and
    /// visibility reset; the session flags deliberately do not.
    pub fn switch_feed(&mut self, query: FeedQuery) -> FetchRequest {
        self.nav.rebase(query.feed_type.base_path());
        self.last_prefetch_boundary = None;
        self.players.clear();
        let request = self.store.begin_initial(query);
        self.tracker.sync_len(0);
        request
    }

    /// Retry after a surfaced load-more failure.
    pub fn retry_more(&mut self) -> Option<FetchRequest> {
        self.store.begin_more()
    }

    pub fn step_next(&self) -> Option<Jump> {
        if self.store.is_empty() {
            return None;
        }
        Some(Jump {
            index: nav::next_index(self.tracker.active_index(), self.store.len()),
            animated: true,
        })
    }

    pub fn step_prev(&self) -> Option<Jump> {
        if self.store.is_empty() {
            return None;
        }
        Some(Jump {
            index: nav::prev_index(self.tracker.active_index()),
            animated: true,
        })
    }

    /// Flip the global mute preference and apply it to the active item.
    pub fn toggle_mute(&mut self, surface: &mut dyn MediaSurface) -> bool {
        self.global_muted = !self.global_muted;
        let muted = self.global_muted;
        let index = self.tracker.active_index();
        if let Some(player) = self.players.get_mut(index) {
            player.apply_mute(muted, surface);
        }
        muted
    }

    /// User press on the active item (gate release or play/pause toggle).
    pub fn toggle_active(&mut self, surface: &mut dyn MediaSurface) {
        let muted = self.global_muted;
        let index = self.tracker.active_index();
        if let Some(player) = self.players.get_mut(index) {
            player.toggle(muted, surface);
        }
    }

    pub fn activate(&mut self, index: usize, surface: &mut dyn MediaSurface) {
        let muted = self.global_muted;
        if let Some(player) = self.players.get_mut(index) {
            player.activate(muted, surface);
        }
    }

    pub fn deactivate(&mut self, index: usize, surface: &mut dyn MediaSurface) {
        if let Some(player) = self.players.get_mut(index) {
            player.deactivate(surface);
        }
    }

    pub fn seek_fraction(&mut self, fraction: f64, surface: &mut dyn MediaSurface) {
        let index = self.tracker.active_index();
        if let Some(player) = self.players.get_mut(index) {
            player.seek_fraction(fraction, surface);
        }
    }

    pub fn seek_step(&mut self, forward: bool, surface: &mut dyn MediaSurface) {
        let index = self.tracker.active_index();
        if let Some(player) = self.players.get_mut(index) {
            player.seek_step(forward, surface);
        }
    }

    /// Media surface events always concern the active item; anything else
    /// was torn down when dominance moved.
    pub fn handle_media_event(&mut self, event: MediaEvent) {
        let index = self.tracker.active_index();
        if let Some(player) = self.players.get_mut(index) {
            player.handle_event(event);
        }
    }

    fn sync_location(&mut self) -> Option<String> {
        let id = self
            .store
            .videos()
            .get(self.tracker.active_index())
            .map(|video| video.id.clone())?;
        Some(self.nav.sync_active(&id).to_string())
    }

    /// Prefetch when dominance reaches the second-to-last loaded item, at
    /// most once per chunk boundary. The in-flight and `has_more` guards in
    /// the store make repeated dominance events cheap no-ops even before the
    /// boundary check.
    fn maybe_prefetch(&mut self) -> Option<FetchRequest> {
        let len = self.store.len();
        if len == 0 || !self.store.has_more() || self.store.is_loading() {
            return None;
        }
        // A single loaded item counts as its own boundary, otherwise a
        // one-item page could never grow.
        if self.tracker.active_index() + 2 < len {
            return None;
        }
        if self.last_prefetch_boundary == Some(len) {
            return None;
        }

        let request = self.store.begin_more()?;
        self.last_prefetch_boundary = Some(len);
        Some(request)
    }

    fn sync_players(&mut self, mode: LoadMode) {
        match mode {
            LoadMode::Replace => {
                self.players = (0..self.store.len())
                    .map(|index| PlaybackController::new(self.session.clone(), index == 0))
                    .collect();
            }
            LoadMode::Append => {
                while self.players.len() < self.store.len() {
                    self.players
                        .push(PlaybackController::new(self.session.clone(), false));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{sample_video, FeedService, MockFeedService};
    use crate::library::FeedType;
    use crate::nav::Location;
    use crate::playback::testing::FakeSurface;
    use crate::playback::Phase;
    use crate::visibility::Observation;

    fn service(count: usize) -> MockFeedService {
        MockFeedService::new((0..count).map(|i| sample_video(&format!("v{i}"))).collect())
    }

    fn controller_with(
        service: &MockFeedService,
        query: FeedQuery,
        location: &str,
    ) -> FeedController {
        let nav = NavigationCoordinator::new(query.feed_type.base_path(), Location::parse(location));
        let (mut controller, request) = FeedController::new(query.clone(), nav, SessionFlags::new());
        let page = service.list_videos(&request.opts).unwrap();
        controller.apply_page(&request, page);
        controller
    }

    fn dominant(index: usize) -> Vec<Observation> {
        vec![Observation::new(index, 0.9)]
    }

    #[test]
    fn prefetch_fires_once_per_chunk_boundary() {
        let service = service(12);
        let mut controller = controller_with(&service, FeedQuery::default(), "/all");
        assert_eq!(controller.store().len(), 5);

        // Second-to-last of the 5-pack becomes dominant: exactly one fetch.
        let effects = controller.observe(&dominant(3));
        let request = effects.fetch.expect("prefetch at chunk boundary");

        // Repeated dominance events in the same chunk do not fetch again.
        assert!(controller.observe(&dominant(3)).fetch.is_none());
        assert!(controller.observe(&dominant(2)).fetch.is_none());
        assert!(controller.observe(&dominant(3)).fetch.is_none());

        let page = service.list_videos(&request.opts).unwrap();
        let effects = controller.apply_page(&request, page);
        assert_eq!(controller.store().len(), 10);
        assert!(effects.fetch.is_none());

        // Fetch completed; still within the old boundary's chunk, no refire.
        assert!(controller.observe(&dominant(3)).fetch.is_none());
        // Next boundary triggers the next chunk.
        assert!(controller.observe(&dominant(8)).fetch.is_some());
    }

    #[test]
    fn single_item_page_reaches_the_boundary_immediately() {
        let service = service(3);
        let query = FeedQuery::default().with_limit(1);
        let nav = NavigationCoordinator::new("/all", Location::parse("/all"));
        let (mut controller, request) = FeedController::new(query, nav, SessionFlags::new());
        controller.set_steady_limit(1);

        let page = service.list_videos(&request.opts).unwrap();
        let effects = controller.apply_page(&request, page);
        assert_eq!(controller.store().len(), 1);
        let more = effects.fetch.expect("one-item page still loads more");

        let page = service.list_videos(&more.opts).unwrap();
        let effects = controller.apply_page(&more, page);
        assert_eq!(controller.store().len(), 2);
        assert!(effects.fetch.is_some());
    }

    #[test]
    fn exhausted_feed_never_fetches() {
        let service = service(3);
        let mut controller = controller_with(&service, FeedQuery::default(), "/all");
        assert!(!controller.store().has_more());

        assert!(controller.observe(&dominant(1)).fetch.is_none());
        assert!(controller.observe(&dominant(2)).fetch.is_none());
    }

    #[test]
    fn initial_page_marks_head_dominant() {
        let service = service(3);
        let nav = NavigationCoordinator::new("/all", Location::parse("/all"));
        let (mut controller, request) =
            FeedController::new(FeedQuery::default(), nav, SessionFlags::new());
        let page = service.list_videos(&request.opts).unwrap();
        let effects = controller.apply_page(&request, page);

        let change = effects.dominance.expect("head becomes dominant");
        assert_eq!(change.next, 0);
        assert_eq!(change.prev, None);
        assert_eq!(effects.jump, Some(Jump { index: 0, animated: false }));
        assert_eq!(effects.location.as_deref(), Some("/all/v0"));
    }

    #[test]
    fn dominance_syncs_location_preserving_query() {
        let service = service(5);
        let query = FeedQuery::new(FeedType::All).with_author(Some("a1".into()));
        let mut controller = controller_with(&service, query, "/all?authorId=a1");

        let effects = controller.observe(&dominant(2));
        assert_eq!(effects.location.as_deref(), Some("/all/v2?authorId=a1"));
    }

    #[test]
    fn below_threshold_batches_change_nothing() {
        let service = service(5);
        let mut controller = controller_with(&service, FeedQuery::default(), "/all");

        let effects = controller.observe(&[Observation::new(1, 0.5), Observation::new(2, 0.5)]);
        assert!(effects.dominance.is_none());
        assert!(effects.location.is_none());
        assert_eq!(controller.active_index(), 0);
    }

    #[test]
    fn gate_then_autoplay_end_to_end() {
        let service = service(5);
        let mut controller = controller_with(&service, FeedQuery::default(), "/all");
        let mut surface = FakeSurface::default();

        // Fresh session: head of the feed is gated, never played.
        controller.activate(0, &mut surface);
        assert!(controller.playback(0).unwrap().is_gated());
        assert_eq!(surface.play_attempts(), 0);

        // User press releases the gate.
        controller.toggle_active(&mut surface);
        assert_eq!(controller.playback(0).unwrap().state().phase, Phase::Playing);

        // The next dominant item autoplays without another press.
        let change = controller.observe(&dominant(1)).dominance.unwrap();
        controller.deactivate(change.prev.unwrap(), &mut surface);
        let mut surface2 = FakeSurface::default();
        controller.activate(change.next, &mut surface2);
        assert_eq!(surface2.play_attempts(), 1);
    }

    #[test]
    fn deep_link_jumps_without_animation() {
        let service = service(8);
        let query = FeedQuery::new(FeedType::All).with_limit(50);
        let nav = NavigationCoordinator::new("/all", Location::parse("/all/v6?x=1"));
        let (mut controller, request) = FeedController::new(query, nav, SessionFlags::new());
        let page = service.list_videos(&request.opts).unwrap();

        let effects = controller.apply_page(&request, page);
        assert_eq!(effects.jump, Some(Jump { index: 6, animated: false }));
        assert_eq!(controller.active_index(), 6);
        assert_eq!(effects.location.as_deref(), Some("/all/v6?x=1"));
        assert!(effects.deep_link_missing.is_none());
    }

    #[test]
    fn deep_link_limit_resets_for_later_pages() {
        let service = service(60);
        let query = FeedQuery::new(FeedType::All).with_limit(50);
        let nav = NavigationCoordinator::new("/all", Location::parse("/all/v40"));
        let (mut controller, request) = FeedController::new(query, nav, SessionFlags::new());
        assert_eq!(request.opts.limit, 50);

        let page = service.list_videos(&request.opts).unwrap();
        controller.apply_page(&request, page);
        assert_eq!(controller.active_index(), 40);

        let more = controller.observe(&dominant(48)).fetch.unwrap();
        assert_eq!(more.opts.limit, FEED_PAGE_SIZE);
    }

    #[test]
    fn missing_deep_link_falls_back_to_head() {
        let service = service(3);
        let nav = NavigationCoordinator::new("/all", Location::parse("/all/ghost"));
        let (mut controller, request) =
            FeedController::new(FeedQuery::default(), nav, SessionFlags::new());
        let page = service.list_videos(&request.opts).unwrap();

        let effects = controller.apply_page(&request, page);
        assert_eq!(effects.deep_link_missing.as_deref(), Some("ghost"));
        assert_eq!(controller.active_index(), 0);
        assert_eq!(effects.location.as_deref(), Some("/all/v0"));
    }

    #[test]
    fn feed_switch_supersedes_inflight_initial() {
        let all = service(6);
        let mut liked_videos = vec![sample_video("L0"), sample_video("L1")];
        for video in &mut liked_videos {
            video.is_liked = true;
        }
        let liked = MockFeedService::new(liked_videos);

        let nav = NavigationCoordinator::new("/all", Location::parse("/all"));
        let (mut controller, stale_request) =
            FeedController::new(FeedQuery::default(), nav, SessionFlags::new());

        // The filter changes before the first fetch lands.
        let fresh_request = controller.switch_feed(FeedQuery::new(FeedType::Liked));
        let fresh_page = liked.list_videos(&fresh_request.opts).unwrap();
        let stale_page = all.list_videos(&stale_request.opts).unwrap();

        controller.apply_page(&fresh_request, fresh_page);
        let effects = controller.apply_page(&stale_request, stale_page);
        assert!(effects.dominance.is_none());

        let ids: Vec<&str> = controller
            .store()
            .videos()
            .iter()
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(ids, ["L0", "L1"]);
        assert_eq!(controller.location().path(), "/liked/L0");
    }

    #[test]
    fn feed_switch_keeps_session_flags() {
        let service = service(5);
        let session = SessionFlags::new();
        let nav = NavigationCoordinator::new("/all", Location::parse("/all"));
        let (mut controller, request) =
            FeedController::new(FeedQuery::default(), nav, session.clone());
        let page = service.list_videos(&request.opts).unwrap();
        controller.apply_page(&request, page);

        let mut surface = FakeSurface::default();
        controller.activate(0, &mut surface);
        controller.toggle_active(&mut surface);
        assert!(session.playback_started());

        let request = controller.switch_feed(FeedQuery::default());
        let page = service.list_videos(&request.opts).unwrap();
        controller.apply_page(&request, page);

        // New feed's first item is not gated: the session already started.
        let mut surface2 = FakeSurface::default();
        controller.activate(0, &mut surface2);
        assert!(!controller.playback(0).unwrap().is_gated());
        assert_eq!(surface2.play_attempts(), 1);
    }

    #[test]
    fn keyboard_stepping_clamps() {
        let service = service(3);
        let mut controller = controller_with(&service, FeedQuery::default(), "/all");
        controller.observe(&dominant(2));

        assert_eq!(controller.step_next().unwrap().index, 2);
        assert_eq!(controller.step_prev().unwrap().index, 1);
    }

    #[test]
    fn load_more_failure_surfaces_and_retries() {
        let service = service(12);
        let mut controller = controller_with(&service, FeedQuery::default(), "/all");

        let request = controller.observe(&dominant(3)).fetch.unwrap();
        assert!(controller.apply_error(&request, "connection refused".into()));
        assert_eq!(controller.store().error(), Some("connection refused"));
        assert_eq!(controller.store().len(), 5);

        let retry = controller.retry_more().expect("retry once idle");
        let page = service.list_videos(&retry.opts).unwrap();
        controller.apply_page(&retry, page);
        assert_eq!(controller.store().len(), 10);
    }
}
