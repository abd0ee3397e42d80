use std::collections::{HashMap, HashSet};

/// An item only becomes active once it clearly dominates the viewport; below
/// this ratio the previous active index is retained, which keeps fast
/// scroll-throughs and half-visible neighbors from flickering playback.
pub const DOMINANCE_THRESHOLD: f64 = 0.6;

/// Ratio grid the viewport quantizes to, mirroring observer-style threshold
/// callbacks rather than a continuous stream.
pub const RATIO_THRESHOLDS: [f64; 6] = [0.0, 0.25, 0.5, 0.75, 0.9, 1.0];

/// One intersection report for a mounted item surface. `ratio` is 0 when the
/// surface left the viewport entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub index: usize,
    pub ratio: f64,
}

impl Observation {
    pub fn new(index: usize, ratio: f64) -> Self {
        Self { index, ratio }
    }
}

/// Tracks per-index visibility ratios and derives the single dominant index.
/// Batches are deltas: only the reported indices are updated, then the whole
/// map is scanned. The scan is synchronous per batch, so a partially applied
/// batch is never observable.
#[derive(Debug, Default)]
pub struct VisibilityTracker {
    ratios: HashMap<usize, f64>,
    active: usize,
    tracked_len: usize,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn ratio(&self, index: usize) -> f64 {
        self.ratios.get(&index).copied().unwrap_or(0.0)
    }

    /// Reconcile with the current item count. Any change clears the ratio map
    /// (the mounted surfaces were torn down and rebuilt, so stale ratios must
    /// not re-trigger a dominance decision) and clamps the active index when
    /// the list shrank. Returns the new active index if it moved.
    pub fn sync_len(&mut self, len: usize) -> Option<usize> {
        if len != self.tracked_len {
            self.ratios.clear();
            self.tracked_len = len;
        }
        if len > 0 && self.active > len - 1 {
            self.active = len - 1;
            return Some(self.active);
        }
        None
    }

    /// Apply one observation batch and rescan. Returns the new active index
    /// when dominance shifted, None when the previous active index stands.
    pub fn apply_batch(&mut self, batch: &[Observation]) -> Option<usize> {
        let mut fresh = HashSet::new();
        for observation in batch {
            if observation.index >= self.tracked_len {
                continue;
            }
            self.ratios.insert(observation.index, observation.ratio);
            fresh.insert(observation.index);
        }

        let mut best: Option<(usize, f64)> = None;
        for (&index, &ratio) in &self.ratios {
            let wins = match best {
                None => ratio > 0.0,
                Some((best_index, best_ratio)) => {
                    ratio > best_ratio
                        || (ratio == best_ratio && self.breaks_tie(index, best_index, &fresh))
                }
            };
            if wins {
                best = Some((index, ratio));
            }
        }

        match best {
            Some((index, ratio)) if ratio >= DOMINANCE_THRESHOLD && index != self.active => {
                self.active = index;
                Some(index)
            }
            _ => None,
        }
    }

    /// Map iteration order must never decide dominance. Ties at the max
    /// resolve to the index reported in this batch (a stored ratio goes stale
    /// the moment the viewport moves past it), then to the current active
    /// index, then to the lower index.
    fn breaks_tie(&self, candidate: usize, incumbent: usize, fresh: &HashSet<usize>) -> bool {
        let candidate_fresh = fresh.contains(&candidate);
        if candidate_fresh != fresh.contains(&incumbent) {
            return candidate_fresh;
        }
        if candidate == self.active || incumbent == self.active {
            return candidate == self.active;
        }
        candidate < incumbent
    }

    /// Force the active index, bypassing the hysteresis. Used for deep-link
    /// entry where the target is marked active before any ratios exist.
    pub fn set_active(&mut self, index: usize) {
        self.active = if self.tracked_len == 0 {
            index
        } else {
            index.min(self.tracked_len - 1)
        };
    }
}

/// Terminal rendition of the viewport-intersection primitive: each item is a
/// full-viewport page in a virtual column, and the scroll offset (in rows,
/// fractional during smooth scrolling) determines each mounted page's overlap
/// with the visible region.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub height: u16,
}

impl Viewport {
    pub fn new(height: u16) -> Self {
        Self { height }
    }

    /// Scroll offset (top row) that puts `index` at the top edge.
    pub fn offset_for(&self, index: usize) -> f64 {
        index as f64 * f64::from(self.height.max(1))
    }

    /// Report ratios for every page overlapping the viewport plus its
    /// immediate neighbors (which report 0 as they leave), quantized to the
    /// threshold grid.
    pub fn observe(&self, scroll_offset: f64, len: usize) -> Vec<Observation> {
        let height = f64::from(self.height.max(1));
        if len == 0 {
            return Vec::new();
        }

        let first_visible = (scroll_offset / height).floor().max(0.0) as usize;
        let start = first_visible.saturating_sub(1);
        let end = (first_visible + 2).min(len.saturating_sub(1));

        (start..=end)
            .map(|index| {
                let top = index as f64 * height;
                let bottom = top + height;
                let view_top = scroll_offset;
                let view_bottom = scroll_offset + height;
                let overlap = (bottom.min(view_bottom) - top.max(view_top)).max(0.0);
                Observation::new(index, quantize_ratio(overlap / height))
            })
            .collect()
    }
}

fn quantize_ratio(ratio: f64) -> f64 {
    let clamped = ratio.clamp(0.0, 1.0);
    RATIO_THRESHOLDS
        .iter()
        .rev()
        .copied()
        .find(|threshold| clamped >= *threshold)
        .unwrap_or(0.0)
}
