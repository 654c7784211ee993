//! Pending-track queue plus the "current" slot.
//!
//! One `PlayQueue` per guild session. Insertion order is play order; the
//! loop policy is applied when the next track is popped, before the pop.

use std::collections::VecDeque;

use rand::Rng;
use rand::seq::SliceRandom;

use muzebot_common::models::{LoopMode, Track};

#[derive(Debug, Default)]
pub struct PlayQueue {
    pending: VecDeque<Track>,
    current: Option<Track>,
    loop_mode: LoopMode,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the back of the pending queue. No de-duplication, no cap.
    pub fn enqueue(&mut self, track: Track) {
        self.pending.push_back(track);
    }

    /// Apply the loop policy to the finished `current`, then pop the next
    /// track into the current slot.
    ///
    /// Policy, applied before the pop:
    /// - `LoopMode::Track`: the current track goes back to the FRONT, so it
    ///   is immediately popped again (same track replays);
    /// - `LoopMode::Queue`: the current track goes to the BACK (full cycle);
    /// - `LoopMode::Off`: the current track is discarded.
    ///
    /// Returns the new current track, or `None` when nothing remains.
    pub fn next_track(&mut self) -> Option<Track> {
        match (self.loop_mode, self.current.take()) {
            (LoopMode::Track, Some(cur)) => self.pending.push_front(cur),
            (LoopMode::Queue, Some(cur)) => self.pending.push_back(cur),
            _ => {}
        }
        self.current = self.pending.pop_front();
        self.current.clone()
    }

    /// Snapshot of the pending queue in play order. Does not mutate.
    pub fn tracks(&self) -> Vec<Track> {
        self.pending.iter().cloned().collect()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    /// Uniform in-place permutation of the pending queue (Fisher–Yates via
    /// `SliceRandom`; every permutation reachable).
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.pending.make_contiguous().shuffle(rng);
    }

    /// Discard the current slot without applying loop policy. Used when the
    /// current track failed: a broken locator must not re-enter the queue,
    /// even under a loop mode.
    pub fn drop_current(&mut self) {
        self.current = None;
    }

    /// Drop everything: pending tracks and the current slot.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True when a call to `next_track()` would yield something: either a
    /// pending item exists, or loop-track mode will replay the current one.
    pub fn has_next(&self) -> bool {
        !self.pending.is_empty()
            || (self.loop_mode == LoopMode::Track && self.current.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn track(name: &str) -> Track {
        Track::new(format!("https://example.com/{name}.mp3"), name, None)
    }

    #[test]
    fn enqueue_preserves_insertion_order() {
        let mut q = PlayQueue::new();
        q.enqueue(track("a"));
        q.enqueue(track("b"));
        q.enqueue(track("c"));

        let titles: Vec<_> = q.tracks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn next_track_pops_in_order() {
        let mut q = PlayQueue::new();
        q.enqueue(track("a"));
        q.enqueue(track("b"));

        assert_eq!(q.next_track().unwrap().title, "a");
        assert_eq!(q.current().unwrap().title, "a");
        assert_eq!(q.next_track().unwrap().title, "b");
        assert!(q.next_track().is_none());
        assert!(q.current().is_none());
    }

    #[test]
    fn loop_track_replays_same_track() {
        let mut q = PlayQueue::new();
        q.set_loop_mode(LoopMode::Track);
        q.enqueue(track("a"));
        q.enqueue(track("b"));

        assert_eq!(q.next_track().unwrap().title, "a");
        for _ in 0..5 {
            assert_eq!(q.next_track().unwrap().title, "a");
        }
        // "b" never surfaces while loop-track holds "a" in place
        assert_eq!(q.tracks()[0].title, "b");
    }

    #[test]
    fn loop_queue_cycles_whole_queue() {
        let mut q = PlayQueue::new();
        q.set_loop_mode(LoopMode::Queue);
        q.enqueue(track("a"));
        q.enqueue(track("b"));

        assert_eq!(q.next_track().unwrap().title, "a");
        assert_eq!(q.next_track().unwrap().title, "b");
        // after both played once, pending is [a, b] again
        let titles: Vec<_> = q.tracks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(q.next_track().unwrap().title, "a");
    }

    #[test]
    fn off_mode_discards_current_and_drains() {
        let mut q = PlayQueue::new();
        q.enqueue(track("a"));

        assert_eq!(q.next_track().unwrap().title, "a");
        assert!(q.next_track().is_none());
        assert!(q.is_empty());
        assert!(q.current().is_none());
    }

    #[test]
    fn clear_empties_pending_and_current() {
        let mut q = PlayQueue::new();
        q.enqueue(track("a"));
        q.enqueue(track("b"));
        q.next_track();

        q.clear();
        assert!(q.is_empty());
        assert!(q.current().is_none());
    }

    #[test]
    fn shuffle_reaches_every_permutation() {
        // 3 tracks -> 6 permutations; with a uniform shuffle and 500 draws
        // the odds of missing one are negligible. A comparator-based
        // "random sort" would fail this for some seed sets.
        let mut seen = HashSet::new();
        let mut rng = StdRng::seed_from_u64(0xB07);
        for _ in 0..500 {
            let mut q = PlayQueue::new();
            q.enqueue(track("a"));
            q.enqueue(track("b"));
            q.enqueue(track("c"));
            q.shuffle(&mut rng);
            let order: Vec<_> = q.tracks().into_iter().map(|t| t.title).collect();
            seen.insert(order);
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn shuffle_keeps_current_untouched() {
        let mut q = PlayQueue::new();
        q.enqueue(track("a"));
        q.enqueue(track("b"));
        q.enqueue(track("c"));
        q.next_track();

        let mut rng = StdRng::seed_from_u64(7);
        q.shuffle(&mut rng);
        assert_eq!(q.current().unwrap().title, "a");
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn drop_current_bypasses_loop_policy() {
        let mut q = PlayQueue::new();
        q.set_loop_mode(LoopMode::Track);
        q.enqueue(track("broken"));
        q.enqueue(track("good"));

        assert_eq!(q.next_track().unwrap().title, "broken");
        // resolve failed: the broken track is dropped, not re-fronted
        q.drop_current();
        assert_eq!(q.next_track().unwrap().title, "good");
    }

    #[test]
    fn has_next_accounts_for_loop_track() {
        let mut q = PlayQueue::new();
        q.enqueue(track("a"));
        assert!(q.has_next());

        q.next_track();
        assert!(!q.has_next());

        q.set_loop_mode(LoopMode::Track);
        assert!(q.has_next());
    }
}
