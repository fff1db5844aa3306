//! # Free-Space Allocator
//!
//! Tracks unused byte ranges ("gaps") in the swap file and hands out offsets
//! for new tiles. The file is a flat, headerless byte array; everything known
//! about its layout lives here and in the backend indexes, so the allocator
//! maintains one global invariant:
//!
//! ```text
//! union(live entry ranges) ∪ union(gap ranges) == [0, total), no overlap
//! ```
//!
//! ## Allocation Strategy
//!
//! - `find_offset` scans the gap list in ascending order and takes the first
//!   gap large enough (first-fit), shrinking it from the front. A gap that
//!   empties exactly is removed.
//! - When no gap fits, the file grows by [`GROW_BATCH_TILES`] tiles at once.
//!   The first tile of the batch is returned; the remainder becomes a new
//!   trailing gap, so the next 31 allocations are satisfied without resizing.
//! - `release` reinserts a freed range, coalescing with an adjacent gap on
//!   either side. Gaps stay disjoint, non-adjacent, and sorted by start.
//!
//! ## Hysteresis
//!
//! The file only shrinks when the gap touching end-of-file grows beyond
//! [`GROW_BATCH_TILES`] tiles, and then only back down to
//! `gap_start + GROW_BATCH_TILES * tile_size`. Growing and shrinking across
//! the same 32-tile band means a workload hovering around a size boundary
//! never causes alternating truncations.
//!
//! ## Thread Safety
//!
//! The allocator is not thread-safe on its own; [`super::SwapService`] wraps
//! it in a mutex because the writer thread reads the shared total when it
//! executes a truncation.

use crate::config::GROW_BATCH_TILES;

/// Half-open unused byte range `[start, end)` in the swap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: u64,
    pub end: u64,
}

impl Gap {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// First-fit free-space allocator over a growable, shrinkable file.
#[derive(Debug, Default)]
pub struct Allocator {
    /// Disjoint, non-adjacent gaps ordered ascending by start.
    gaps: Vec<Gap>,
    /// Current total allocated size of the swap file.
    total: u64,
}

impl Allocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Sum of all gap sizes.
    pub fn free_bytes(&self) -> u64 {
        self.gaps.iter().map(Gap::len).sum()
    }

    pub fn gap_count(&self) -> usize {
        self.gaps.len()
    }

    #[cfg(test)]
    pub(crate) fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    /// Find space for one tile of `tile_size` bytes.
    ///
    /// Returns the offset and whether the total size changed; when it did,
    /// the caller must queue a truncation so the file catches up.
    pub fn find_offset(&mut self, tile_size: u64) -> (u64, bool) {
        for i in 0..self.gaps.len() {
            if self.gaps[i].len() >= tile_size {
                let offset = self.gaps[i].start;
                self.gaps[i].start += tile_size;
                if self.gaps[i].is_empty() {
                    self.gaps.remove(i);
                }
                return (offset, false);
            }
        }

        // No gap fits: grow by a whole batch and keep the slack as a gap,
        // amortizing the resize cost across GROW_BATCH_TILES allocations.
        let offset = self.total;
        self.total += GROW_BATCH_TILES * tile_size;
        if offset + tile_size < self.total {
            self.insert_gap(Gap {
                start: offset + tile_size,
                end: self.total,
            });
        }

        (offset, true)
    }

    /// Release `[start, end)` back into the gap list.
    ///
    /// Coalesces with an immediately adjacent gap on either side, then
    /// applies the shrink rule: if the gap touching end-of-file now exceeds
    /// the hysteresis band, the total drops to `gap_start + band` and the
    /// gap shrinks with it. Returns whether the total size changed.
    pub fn release(&mut self, start: u64, end: u64, tile_size: u64) -> bool {
        debug_assert!(start < end && end <= self.total);

        self.insert_gap(Gap { start, end });

        let band = GROW_BATCH_TILES * tile_size;
        if let Some(last) = self.gaps.last_mut() {
            if last.end == self.total && last.len() > band {
                self.total = last.start + band;
                last.end = self.total;
                return true;
            }
        }

        false
    }

    fn insert_gap(&mut self, gap: Gap) {
        let idx = self.gaps.partition_point(|g| g.start < gap.start);
        let merge_left = idx > 0 && self.gaps[idx - 1].end == gap.start;
        let merge_right = idx < self.gaps.len() && self.gaps[idx].start == gap.end;

        match (merge_left, merge_right) {
            (true, true) => {
                self.gaps[idx - 1].end = self.gaps[idx].end;
                self.gaps.remove(idx);
            }
            (true, false) => self.gaps[idx - 1].end = gap.end,
            (false, true) => self.gaps[idx].start = gap.start,
            (false, false) => self.gaps.insert(idx, gap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = 100;

    #[test]
    fn first_allocation_grows_by_a_full_batch() {
        let mut alloc = Allocator::new();

        let (offset, resized) = alloc.find_offset(T);
        assert_eq!(offset, 0);
        assert!(resized);
        assert_eq!(alloc.total(), GROW_BATCH_TILES * T);
    }

    #[test]
    fn second_allocation_reuses_the_growth_slack() {
        let mut alloc = Allocator::new();

        alloc.find_offset(T);
        let (offset, resized) = alloc.find_offset(T);

        assert_eq!(offset, T);
        assert!(!resized);
        assert_eq!(alloc.total(), GROW_BATCH_TILES * T);
    }

    #[test]
    fn first_fit_takes_the_earliest_gap_that_fits() {
        let mut alloc = Allocator::new();
        for _ in 0..4 {
            alloc.find_offset(T);
        }

        alloc.release(T, 2 * T, T);
        let (offset, _) = alloc.find_offset(T);
        assert_eq!(offset, T);
    }

    #[test]
    fn releasing_adjacent_ranges_coalesces_into_one_gap() {
        let mut alloc = Allocator::new();
        // Fill the whole first batch so the trailing slack gap is gone.
        for _ in 0..GROW_BATCH_TILES {
            alloc.find_offset(T);
        }
        assert_eq!(alloc.gap_count(), 0);

        alloc.release(0, T, T);
        alloc.release(T, 2 * T, T);

        assert_eq!(alloc.gaps(), &[Gap { start: 0, end: 2 * T }]);
    }

    #[test]
    fn coalesces_across_both_neighbours() {
        let mut alloc = Allocator::new();
        for _ in 0..GROW_BATCH_TILES {
            alloc.find_offset(T);
        }

        alloc.release(0, T, T);
        alloc.release(2 * T, 3 * T, T);
        assert_eq!(alloc.gap_count(), 2);

        // The middle range joins both sides into a single gap.
        alloc.release(T, 2 * T, T);
        assert_eq!(alloc.gaps(), &[Gap { start: 0, end: 3 * T }]);
    }

    #[test]
    fn trailing_gap_beyond_the_band_shrinks_the_file() {
        let mut alloc = Allocator::new();
        // Two full batches of live tiles.
        for _ in 0..2 * GROW_BATCH_TILES {
            alloc.find_offset(T);
        }
        assert_eq!(alloc.total(), 2 * GROW_BATCH_TILES * T);

        // Free the whole second batch, then one more tile: the trailing gap
        // exceeds the band and the file truncates to gap_start + band.
        for i in (GROW_BATCH_TILES..2 * GROW_BATCH_TILES).rev() {
            alloc.release(i * T, (i + 1) * T, T);
        }
        assert_eq!(alloc.total(), 2 * GROW_BATCH_TILES * T);

        let last = GROW_BATCH_TILES - 1;
        let resized = alloc.release(last * T, (last + 1) * T, T);

        assert!(resized);
        assert_eq!(alloc.total(), last * T + GROW_BATCH_TILES * T);
        // The trailing gap shrank to exactly the band.
        assert_eq!(
            alloc.gaps().last(),
            Some(&Gap {
                start: last * T,
                end: alloc.total()
            })
        );
    }

    #[test]
    fn no_shrink_while_a_live_tile_touches_end_of_file() {
        let mut alloc = Allocator::new();
        for _ in 0..2 * GROW_BATCH_TILES {
            alloc.find_offset(T);
        }

        // Free everything except the last tile: a huge gap, but not trailing.
        for i in 0..2 * GROW_BATCH_TILES - 1 {
            alloc.release(i * T, (i + 1) * T, T);
        }

        assert_eq!(alloc.total(), 2 * GROW_BATCH_TILES * T);
    }

    #[test]
    fn space_is_conserved_through_alloc_release_churn() {
        let mut alloc = Allocator::new();
        let mut live: Vec<u64> = Vec::new();

        for round in 0..200u64 {
            if round % 3 == 2 {
                if let Some(offset) = live.pop() {
                    alloc.release(offset, offset + T, T);
                }
            } else {
                let (offset, _) = alloc.find_offset(T);
                live.push(offset);
            }

            let live_bytes = live.len() as u64 * T;
            assert_eq!(
                alloc.free_bytes() + live_bytes,
                alloc.total(),
                "conservation violated at round {round}"
            );
        }
    }

    #[test]
    fn gaps_stay_sorted_and_non_adjacent() {
        let mut alloc = Allocator::new();
        for _ in 0..GROW_BATCH_TILES {
            alloc.find_offset(T);
        }

        for i in [5u64, 1, 9, 3, 7, 2, 8] {
            alloc.release(i * T, (i + 1) * T, T);
        }

        let gaps = alloc.gaps();
        for pair in gaps.windows(2) {
            assert!(pair[0].end < pair[1].start, "adjacent or unsorted: {pair:?}");
        }
    }
}
