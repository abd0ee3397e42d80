use anyhow::Result;

use crate::debug;
use crate::session::SessionFlags;

/// Keyboard seeks move by this fraction of the duration.
pub const SEEK_STEP_FRACTION: f64 = 0.05;

/// Lifecycle of one feed item relative to the dominant index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Not dominant; surface is parked at position 0.
    #[default]
    Idle,
    /// Dominant, but held back until the first user-initiated start of the
    /// session. Controls are surfaced instead of autoplaying.
    Gated,
    Playing,
    Paused,
}

/// Mirror of the media surface's observable state for one mounted item.
#[derive(Debug, Clone, Default)]
pub struct ItemPlayback {
    pub phase: Phase,
    pub progress_secs: f64,
    pub duration_secs: f64,
    pub metadata_loaded: bool,
    /// True only when an unmuted playback start was rejected and the
    /// controller silently muted to recover. Distinct from the user's global
    /// mute preference.
    pub fallback_muted: bool,
}

/// The one media element the feed drives. Implementations: the inline mpv
/// session in `player`, scripted fakes in tests.
pub trait MediaSurface {
    /// Attempt to start playback. Platforms may refuse; the controller
    /// absorbs the error via the muted-fallback path.
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn seek(&mut self, position_secs: f64);
    fn set_muted(&mut self, muted: bool);
}

/// Events observed from the media surface and mirrored into `ItemPlayback`.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    MetadataLoaded { duration_secs: f64 },
    Progress { position_secs: f64 },
    Played,
    Paused,
    Error { message: String },
}

/// Per-item playback state machine. One controller exists per mounted item;
/// the dominant item's controller is the only one issuing surface commands.
/// Session flags are shared and monotonic, so gating decisions stay
/// consistent across feed switches and remounts.
pub struct PlaybackController {
    session: SessionFlags,
    is_first: bool,
    state: ItemPlayback,
}

impl PlaybackController {
    pub fn new(session: SessionFlags, is_first: bool) -> Self {
        Self {
            session,
            is_first,
            state: ItemPlayback::default(),
        }
    }

    pub fn state(&self) -> &ItemPlayback {
        &self.state
    }

    pub fn is_gated(&self) -> bool {
        self.state.phase == Phase::Gated
    }

    pub fn effective_muted(&self, global_muted: bool) -> bool {
        global_muted || self.state.fallback_muted
    }

    /// The item became dominant. The first item of a fresh session stays
    /// gated until the user explicitly starts playback; everything else
    /// attempts playback immediately.
    pub fn activate(&mut self, global_muted: bool, surface: &mut dyn MediaSurface) {
        if self.is_first && !self.session.playback_started() {
            surface.pause();
            self.state.phase = Phase::Gated;
            return;
        }
        self.try_play(global_muted, surface);
    }

    /// The item lost dominance: pause and reset to the start, so re-entry
    /// always restarts from 0 rather than resuming mid-point.
    pub fn deactivate(&mut self, surface: &mut dyn MediaSurface) {
        surface.pause();
        surface.seek(0.0);
        self.state.progress_secs = 0.0;
        self.state.phase = Phase::Idle;
    }

    /// User press on the item: releases the gate (marking the session's
    /// first playback), or toggles play/pause afterwards.
    pub fn toggle(&mut self, global_muted: bool, surface: &mut dyn MediaSurface) {
        if self.state.fallback_muted {
            // A user gesture supersedes the silent fallback.
            self.state.fallback_muted = false;
        }

        match self.state.phase {
            Phase::Playing => {
                surface.pause();
                self.state.phase = Phase::Paused;
            }
            Phase::Gated | Phase::Paused | Phase::Idle => {
                self.session.mark_playback_started();
                surface.set_muted(global_muted);
                match surface.play() {
                    Ok(()) => self.state.phase = Phase::Playing,
                    Err(err) => {
                        debug::log(format!("user-initiated play rejected: {err:#}"));
                        self.state.phase = Phase::Paused;
                    }
                }
            }
        }
    }

    /// The global mute preference changed. Unmuting the designated first
    /// item triggers the one-time restart-to-zero, so the viewer hears the
    /// opening of the clip instead of wherever silent autoplay advanced to.
    pub fn apply_mute(&mut self, global_muted: bool, surface: &mut dyn MediaSurface) {
        if global_muted {
            surface.set_muted(true);
            return;
        }

        self.state.fallback_muted = false;
        if self.is_first && !self.session.unmute_restarted() {
            self.session.mark_unmute_restarted();
            surface.seek(0.0);
            self.state.progress_secs = 0.0;
        }
        surface.set_muted(false);
        if self.state.phase == Phase::Playing {
            // Re-assert playback in the same gesture; audio policies vary.
            if let Err(err) = surface.play() {
                debug::log(format!("replay on unmute rejected: {err:#}"));
            }
        }
    }

    /// Pointer seek: fraction of the progress track, clamped to [0, 1].
    pub fn seek_fraction(&mut self, fraction: f64, surface: &mut dyn MediaSurface) {
        if self.state.duration_secs <= 0.0 {
            return;
        }
        let target = fraction.clamp(0.0, 1.0) * self.state.duration_secs;
        surface.seek(target);
        self.state.progress_secs = target;
    }

    /// Keyboard seek: +/- 5% of the duration, clamped to [0, duration].
    pub fn seek_step(&mut self, forward: bool, surface: &mut dyn MediaSurface) {
        if self.state.duration_secs <= 0.0 {
            return;
        }
        let step = self.state.duration_secs * SEEK_STEP_FRACTION;
        let delta = if forward { step } else { -step };
        let target = (self.state.progress_secs + delta).clamp(0.0, self.state.duration_secs);
        surface.seek(target);
        self.state.progress_secs = target;
    }

    /// Mirror one observed media event. Errors are reported and leave the
    /// item pausable; they never affect sibling items or the feed.
    pub fn handle_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::MetadataLoaded { duration_secs } => {
                self.state.duration_secs = duration_secs;
                self.state.metadata_loaded = true;
            }
            MediaEvent::Progress { position_secs } => {
                self.state.progress_secs = position_secs;
            }
            MediaEvent::Played => {
                self.state.phase = Phase::Playing;
            }
            MediaEvent::Paused => {
                if self.state.phase == Phase::Playing {
                    self.state.phase = Phase::Paused;
                }
            }
            MediaEvent::Error { message } => {
                debug::log(format!("media error: {message}"));
            }
        }
    }

    fn try_play(&mut self, global_muted: bool, surface: &mut dyn MediaSurface) {
        surface.set_muted(self.effective_muted(global_muted));
        match surface.play() {
            Ok(()) => {
                self.state.phase = Phase::Playing;
                return;
            }
            Err(err) => {
                debug::log(format!("play rejected: {err:#}"));
            }
        }

        if self.effective_muted(global_muted) {
            // Already muted and still refused: give up, controls stay usable.
            self.state.phase = Phase::Paused;
            return;
        }

        // Unmuted autoplay was blocked; retry once muted. A second refusal
        // leaves the item paused with no further automatic retries.
        self.state.fallback_muted = true;
        surface.set_muted(true);
        match surface.play() {
            Ok(()) => self.state.phase = Phase::Playing,
            Err(err) => {
                debug::log(format!("muted fallback rejected: {err:#}"));
                self.state.phase = Phase::Paused;
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use anyhow::anyhow;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Play,
        Pause,
        Seek(f64),
        SetMuted(bool),
    }

    /// Scripted surface: fails the first `reject_plays` play attempts, records
    /// every command.
    #[derive(Debug, Default)]
    pub struct FakeSurface {
        pub calls: Vec<Call>,
        pub reject_plays: usize,
    }

    impl FakeSurface {
        pub fn rejecting(reject_plays: usize) -> Self {
            Self {
                calls: Vec::new(),
                reject_plays,
            }
        }

        pub fn play_attempts(&self) -> usize {
            self.calls.iter().filter(|call| **call == Call::Play).count()
        }
    }

    impl MediaSurface for FakeSurface {
        fn play(&mut self) -> Result<()> {
            self.calls.push(Call::Play);
            if self.reject_plays > 0 {
                self.reject_plays -= 1;
                return Err(anyhow!("playback not allowed"));
            }
            Ok(())
        }

        fn pause(&mut self) {
            self.calls.push(Call::Pause);
        }

        fn seek(&mut self, position_secs: f64) {
            self.calls.push(Call::Seek(position_secs));
        }

        fn set_muted(&mut self, muted: bool) {
            self.calls.push(Call::SetMuted(muted));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Call, FakeSurface};
    use super::*;

    #[test]
    fn first_item_is_gated_until_user_press() {
        let session = SessionFlags::new();
        let mut controller = PlaybackController::new(session.clone(), true);
        let mut surface = FakeSurface::default();

        controller.activate(false, &mut surface);
        assert_eq!(controller.state().phase, Phase::Gated);
        assert_eq!(surface.play_attempts(), 0);

        controller.toggle(false, &mut surface);
        assert_eq!(controller.state().phase, Phase::Playing);
        assert_eq!(surface.play_attempts(), 1);
        assert!(session.playback_started());
    }

    #[test]
    fn later_items_autoplay_after_first_gesture() {
        let session = SessionFlags::new();
        let mut first = PlaybackController::new(session.clone(), true);
        let mut surface = FakeSurface::default();
        first.activate(false, &mut surface);
        first.toggle(false, &mut surface);

        let mut second = PlaybackController::new(session.clone(), false);
        let mut surface2 = FakeSurface::default();
        second.activate(false, &mut surface2);
        assert_eq!(second.state().phase, Phase::Playing);
        assert_eq!(surface2.play_attempts(), 1);
    }

    #[test]
    fn first_item_autoplays_once_session_already_started() {
        let session = SessionFlags::new();
        session.mark_playback_started();
        let mut controller = PlaybackController::new(session, true);
        let mut surface = FakeSurface::default();

        controller.activate(false, &mut surface);
        assert_eq!(controller.state().phase, Phase::Playing);
    }

    #[test]
    fn losing_dominance_pauses_and_rewinds() {
        let session = SessionFlags::new();
        session.mark_playback_started();
        let mut controller = PlaybackController::new(session, false);
        let mut surface = FakeSurface::default();
        controller.activate(false, &mut surface);
        controller.handle_event(MediaEvent::Progress { position_secs: 7.5 });

        controller.deactivate(&mut surface);
        assert_eq!(controller.state().phase, Phase::Idle);
        assert_eq!(controller.state().progress_secs, 0.0);
        assert!(surface.calls.ends_with(&[Call::Pause, Call::Seek(0.0)]));
    }

    #[test]
    fn unmuted_rejection_falls_back_to_muted_retry() {
        let session = SessionFlags::new();
        session.mark_playback_started();
        let mut controller = PlaybackController::new(session, false);
        let mut surface = FakeSurface::rejecting(1);

        controller.activate(false, &mut surface);
        assert_eq!(controller.state().phase, Phase::Playing);
        assert!(controller.state().fallback_muted);
        assert_eq!(surface.play_attempts(), 2);
        assert!(surface.calls.contains(&Call::SetMuted(true)));
    }

    #[test]
    fn double_rejection_stops_retrying() {
        let session = SessionFlags::new();
        session.mark_playback_started();
        let mut controller = PlaybackController::new(session, false);
        let mut surface = FakeSurface::rejecting(2);

        controller.activate(false, &mut surface);
        assert_eq!(controller.state().phase, Phase::Paused);
        assert_eq!(surface.play_attempts(), 2);
    }

    #[test]
    fn rejection_while_globally_muted_does_not_retry() {
        let session = SessionFlags::new();
        session.mark_playback_started();
        let mut controller = PlaybackController::new(session, false);
        let mut surface = FakeSurface::rejecting(1);

        controller.activate(true, &mut surface);
        assert_eq!(controller.state().phase, Phase::Paused);
        assert_eq!(surface.play_attempts(), 1);
        assert!(!controller.state().fallback_muted);
    }

    #[test]
    fn unmute_restart_fires_at_most_once_per_session() {
        let session = SessionFlags::new();
        session.mark_playback_started();

        let mut first = PlaybackController::new(session.clone(), true);
        let mut surface = FakeSurface::default();
        first.activate(true, &mut surface);
        first.handle_event(MediaEvent::Progress { position_secs: 5.0 });
        first.apply_mute(false, &mut surface);
        assert!(surface.calls.contains(&Call::Seek(0.0)));
        assert_eq!(first.state().progress_secs, 0.0);

        // Feed switch: a fresh first item remounts within the same session.
        let mut remounted = PlaybackController::new(session.clone(), true);
        let mut surface2 = FakeSurface::default();
        remounted.activate(true, &mut surface2);
        remounted.handle_event(MediaEvent::Progress { position_secs: 7.0 });
        remounted.apply_mute(false, &mut surface2);
        assert!(!surface2.calls.contains(&Call::Seek(0.0)));
        assert_eq!(remounted.state().progress_secs, 7.0);
    }

    #[test]
    fn muting_never_triggers_restart() {
        let session = SessionFlags::new();
        let mut controller = PlaybackController::new(session.clone(), true);
        let mut surface = FakeSurface::default();
        controller.apply_mute(true, &mut surface);
        assert_eq!(surface.calls, vec![Call::SetMuted(true)]);
        assert!(!session.unmute_restarted());
    }

    #[test]
    fn effective_mute_combines_global_and_fallback() {
        let session = SessionFlags::new();
        session.mark_playback_started();
        let mut controller = PlaybackController::new(session, false);
        let mut surface = FakeSurface::rejecting(1);
        controller.activate(false, &mut surface);
        assert!(controller.state().fallback_muted);
        assert!(controller.effective_muted(false));
        assert!(controller.effective_muted(true));
    }

    #[test]
    fn seek_fraction_targets_track_position() {
        let session = SessionFlags::new();
        let mut controller = PlaybackController::new(session, false);
        let mut surface = FakeSurface::default();
        controller.handle_event(MediaEvent::MetadataLoaded { duration_secs: 40.0 });

        controller.seek_fraction(0.25, &mut surface);
        assert_eq!(surface.calls, vec![Call::Seek(10.0)]);
        assert_eq!(controller.state().progress_secs, 10.0);

        controller.seek_fraction(1.5, &mut surface);
        assert_eq!(controller.state().progress_secs, 40.0);
    }

    #[test]
    fn keyboard_seek_steps_five_percent_clamped() {
        let session = SessionFlags::new();
        let mut controller = PlaybackController::new(session, false);
        let mut surface = FakeSurface::default();
        controller.handle_event(MediaEvent::MetadataLoaded { duration_secs: 100.0 });
        controller.handle_event(MediaEvent::Progress { position_secs: 2.0 });

        controller.seek_step(false, &mut surface);
        assert_eq!(controller.state().progress_secs, 0.0);

        controller.seek_step(true, &mut surface);
        assert_eq!(controller.state().progress_secs, 5.0);
    }

    #[test]
    fn seeks_are_ignored_before_metadata() {
        let session = SessionFlags::new();
        let mut controller = PlaybackController::new(session, false);
        let mut surface = FakeSurface::default();
        controller.seek_fraction(0.5, &mut surface);
        controller.seek_step(true, &mut surface);
        assert!(surface.calls.is_empty());
    }

    #[test]
    fn media_error_leaves_item_pausable() {
        let session = SessionFlags::new();
        session.mark_playback_started();
        let mut controller = PlaybackController::new(session, false);
        let mut surface = FakeSurface::default();
        controller.activate(false, &mut surface);

        controller.handle_event(MediaEvent::Error {
            message: "decode failed".into(),
        });
        assert_eq!(controller.state().phase, Phase::Playing);

        controller.toggle(false, &mut surface);
        assert_eq!(controller.state().phase, Phase::Paused);
    }
}
