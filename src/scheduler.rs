use std::time::{Duration, Instant};

use tracing::debug;

const HISTORY_LIMIT: usize = 64;

/// Decides which preset plays next and when.
///
/// Candidates are every catalog index, minus blocked ones, narrowed to the
/// playlist when one is set. Shuffle draws from a deck so that every
/// candidate plays once before any repeats.
#[derive(Debug, Clone)]
pub struct PresetScheduler {
    preset_count: usize,
    playlist: Option<Vec<usize>>,
    blocked: Vec<bool>,
    candidates: Vec<usize>,
    active: Option<usize>,
    auto_switch: bool,
    interval: Duration,
    shuffle: bool,
    last_switch: Instant,
    deck: Vec<usize>,
    history: Vec<usize>,
}

impl PresetScheduler {
    pub fn new(preset_count: usize, now: Instant) -> Self {
        let mut s = Self {
            preset_count,
            playlist: None,
            blocked: vec![false; preset_count],
            candidates: Vec::new(),
            active: None,
            auto_switch: true,
            interval: Duration::from_secs(15),
            shuffle: false,
            last_switch: now,
            deck: Vec::new(),
            history: Vec::new(),
        };
        s.rebuild();
        s
    }

    pub fn preset_count(&self) -> usize {
        self.preset_count
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn candidates(&self) -> &[usize] {
        &self.candidates
    }

    pub fn auto_switch(&self) -> bool {
        self.auto_switch
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_auto_switch(&mut self, enabled: bool, interval: Duration, shuffle: bool, now: Instant) {
        self.auto_switch = enabled;
        self.interval = interval.max(Duration::from_millis(100));
        self.set_shuffle(shuffle);
        self.last_switch = now;
    }

    pub fn toggle_auto_switch(&mut self, now: Instant) {
        self.auto_switch = !self.auto_switch;
        self.last_switch = now;
    }

    pub fn set_shuffle(&mut self, on: bool) {
        if on != self.shuffle {
            self.deck.clear();
        }
        self.shuffle = on;
    }

    pub fn toggle_shuffle(&mut self) {
        self.set_shuffle(!self.shuffle);
    }

    /// Restricts candidates to `indices` (deduplicated, out of range dropped).
    /// `None` or a list with no valid index lifts the restriction.
    pub fn set_playlist(&mut self, indices: Option<&[usize]>) {
        self.playlist = indices.and_then(|indices| {
            let mut seen = vec![false; self.preset_count];
            let mut playlist = Vec::with_capacity(indices.len());
            for &idx in indices {
                if idx < self.preset_count && !seen[idx] {
                    seen[idx] = true;
                    playlist.push(idx);
                }
            }
            (!playlist.is_empty()).then_some(playlist)
        });
        self.rebuild();
    }

    pub fn set_blocked(&mut self, indices: &[usize]) {
        self.blocked.fill(false);
        for &idx in indices {
            if let Some(b) = self.blocked.get_mut(idx) {
                *b = true;
            }
        }
        self.rebuild();
    }

    pub fn is_blocked(&self, index: usize) -> bool {
        self.blocked.get(index).copied().unwrap_or(false)
    }

    fn rebuild(&mut self) {
        let base: Vec<usize> = match &self.playlist {
            Some(p) => p.clone(),
            None => (0..self.preset_count).collect(),
        };
        self.candidates = base.into_iter().filter(|&i| !self.blocked[i]).collect();
        self.deck.clear();
        debug!(candidates = self.candidates.len(), "preset candidates updated");
    }

    /// Marks `index` as playing and restarts the switch timer.
    pub fn select(&mut self, index: usize, now: Instant) -> bool {
        if index >= self.preset_count {
            return false;
        }
        if let Some(prev) = self.active.filter(|&a| a != index) {
            self.history.push(prev);
            if self.history.len() > HISTORY_LIMIT {
                self.history.remove(0);
            }
        }
        self.active = Some(index);
        self.last_switch = now;
        true
    }

    pub fn restart_timer(&mut self, now: Instant) {
        self.last_switch = now;
    }

    /// Picks and selects the following preset.
    pub fn next(&mut self, now: Instant) -> Option<usize> {
        let idx = if self.shuffle {
            self.draw_shuffled()
        } else {
            self.sequential_after()
        }?;
        self.select(idx, now);
        Some(idx)
    }

    /// Goes back through play history when shuffling, otherwise one step
    /// back in candidate order.
    pub fn prev(&mut self, now: Instant) -> Option<usize> {
        let idx = if self.shuffle {
            loop {
                match self.history.pop() {
                    Some(i) if self.candidates.contains(&i) => break Some(i),
                    Some(_) => continue,
                    None => break self.sequential_before(),
                }
            }
        } else {
            self.sequential_before()
        }?;
        let stash = std::mem::take(&mut self.history);
        self.select(idx, now);
        self.history = stash;
        Some(idx)
    }

    /// Switches when auto-switch is on and the interval has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<usize> {
        if !self.auto_switch || self.elapsed(now) < self.interval {
            return None;
        }
        let next = self.next(now);
        if next.is_none() {
            self.last_switch = now;
        }
        next
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_switch)
    }

    fn sequential_after(&self) -> Option<usize> {
        let first = *self.candidates.first()?;
        let Some(active) = self.active else {
            return Some(first);
        };
        Some(match self.candidates.iter().position(|&i| i == active) {
            Some(pos) => self.candidates[(pos + 1) % self.candidates.len()],
            None => self.candidates.iter().copied().find(|&i| i > active).unwrap_or(first),
        })
    }

    fn sequential_before(&self) -> Option<usize> {
        let last = *self.candidates.last()?;
        let Some(active) = self.active else {
            return Some(last);
        };
        Some(match self.candidates.iter().position(|&i| i == active) {
            Some(0) => last,
            Some(pos) => self.candidates[pos - 1],
            None => self.candidates.iter().rev().copied().find(|&i| i < active).unwrap_or(last),
        })
    }

    fn draw_shuffled(&mut self) -> Option<usize> {
        if self.candidates.is_empty() {
            return None;
        }
        if self.candidates.len() == 1 {
            return Some(self.candidates[0]);
        }
        loop {
            if self.deck.is_empty() {
                self.deck = self.candidates.clone();
                fastrand::shuffle(&mut self.deck);
                // The deck is drawn from the back; never open a round with a repeat.
                if self.deck.last().copied() == self.active {
                    let last = self.deck.len() - 1;
                    let swap = fastrand::usize(..last);
                    self.deck.swap(swap, last);
                }
            }
            let idx = self.deck.pop()?;
            if Some(idx) != self.active {
                return Some(idx);
            }
        }
    }
}
