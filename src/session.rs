use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug, Default)]
struct Flags {
    playback_started: bool,
    unmute_restarted: bool,
}

/// One-shot playback corrections scoped to a single run of the program (the
/// terminal analogue of a page load). Both booleans are monotonic: set once,
/// never reset, shared across every feed/filter view. Constructed once in the
/// composition root and injected, never read from ambient global state.
#[derive(Debug, Clone, Default)]
pub struct SessionFlags {
    inner: Arc<RwLock<Flags>>,
}

impl SessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Has the user ever explicitly started playback this session?
    pub fn playback_started(&self) -> bool {
        self.inner.read().playback_started
    }

    pub fn mark_playback_started(&self) {
        self.inner.write().playback_started = true;
    }

    /// Has the one-time restart-on-first-unmute already fired this session?
    pub fn unmute_restarted(&self) -> bool {
        self.inner.read().unmute_restarted
    }

    pub fn mark_unmute_restarted(&self) {
        self.inner.write().unmute_restarted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_monotonic_and_shared() {
        let flags = SessionFlags::new();
        let handle = flags.clone();
        assert!(!flags.playback_started());

        handle.mark_playback_started();
        assert!(flags.playback_started());
        assert!(!flags.unmute_restarted());

        flags.mark_unmute_restarted();
        assert!(handle.unmute_restarted());
    }
}
