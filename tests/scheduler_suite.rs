use milkwarp::scheduler::PresetScheduler;
use std::collections::HashSet;
use std::time::{Duration, Instant};

fn sched(n: usize) -> (PresetScheduler, Instant) {
    let now = Instant::now();
    (PresetScheduler::new(n, now), now)
}

// ── Sequential order ────────────────────────────────────────────────────────

#[test]
fn next_walks_candidates_in_order_and_wraps() {
    let (mut s, now) = sched(3);
    assert_eq!(s.next(now), Some(0));
    assert_eq!(s.next(now), Some(1));
    assert_eq!(s.next(now), Some(2));
    assert_eq!(s.next(now), Some(0));
    assert_eq!(s.active(), Some(0));
}

#[test]
fn prev_steps_back_and_wraps() {
    let (mut s, now) = sched(3);
    s.select(1, now);
    assert_eq!(s.prev(now), Some(0));
    assert_eq!(s.prev(now), Some(2));
}

#[test]
fn blocked_presets_are_skipped() {
    let (mut s, now) = sched(4);
    s.set_blocked(&[1, 2, 99]);
    assert!(s.is_blocked(1));
    assert!(!s.is_blocked(99));
    assert_eq!(s.candidates(), &[0, 3]);
    s.select(0, now);
    assert_eq!(s.next(now), Some(3));
    assert_eq!(s.next(now), Some(0));
}

#[test]
fn active_outside_candidates_moves_to_the_next_higher() {
    let (mut s, now) = sched(5);
    s.set_blocked(&[2]);
    s.select(2, now);
    assert_eq!(s.next(now), Some(3));
    s.select(2, now);
    assert_eq!(s.prev(now), Some(1));
}

#[test]
fn playlist_orders_and_dedups() {
    let (mut s, now) = sched(6);
    s.set_playlist(Some(&[4, 1, 4, 9, 2]));
    assert_eq!(s.candidates(), &[4, 1, 2]);
    s.select(4, now);
    assert_eq!(s.next(now), Some(1));
    assert_eq!(s.next(now), Some(2));
    assert_eq!(s.next(now), Some(4));
}

#[test]
fn empty_playlist_lifts_the_filter() {
    let (mut s, _) = sched(3);
    s.set_playlist(Some(&[1]));
    assert_eq!(s.candidates(), &[1]);
    s.set_playlist(Some(&[7]));
    assert_eq!(s.candidates(), &[0, 1, 2]);
    s.set_playlist(Some(&[1]));
    s.set_playlist(None);
    assert_eq!(s.candidates().len(), 3);
}

#[test]
fn blocking_everything_leaves_nothing_to_pick() {
    let (mut s, now) = sched(2);
    s.set_blocked(&[0, 1]);
    assert_eq!(s.next(now), None);
    assert_eq!(s.prev(now), None);
    assert_eq!(s.poll(now + Duration::from_secs(60)), None);
}

#[test]
fn select_rejects_out_of_range() {
    let (mut s, now) = sched(2);
    assert!(!s.select(2, now));
    assert_eq!(s.active(), None);
    assert!(s.select(1, now));
}

// ── Shuffle ─────────────────────────────────────────────────────────────────

#[test]
fn shuffle_plays_everything_before_repeating() {
    let (mut s, now) = sched(8);
    s.set_shuffle(true);
    let mut seen = HashSet::new();
    for _ in 0..8 {
        let i = s.next(now).unwrap();
        assert!(seen.insert(i), "{i} repeated");
    }
    assert_eq!(seen.len(), 8);
}

#[test]
fn shuffle_never_repeats_back_to_back() {
    let (mut s, now) = sched(3);
    s.set_shuffle(true);
    let mut last = s.next(now).unwrap();
    for _ in 0..200 {
        let i = s.next(now).unwrap();
        assert_ne!(i, last);
        last = i;
    }
}

#[test]
fn shuffle_with_one_candidate_returns_it() {
    let (mut s, now) = sched(3);
    s.set_playlist(Some(&[2]));
    s.set_shuffle(true);
    assert_eq!(s.next(now), Some(2));
    assert_eq!(s.next(now), Some(2));
}

#[test]
fn shuffled_prev_retraces_history() {
    let (mut s, now) = sched(10);
    s.set_shuffle(true);
    let a = s.next(now).unwrap();
    let b = s.next(now).unwrap();
    let c = s.next(now).unwrap();
    assert_eq!(s.active(), Some(c));
    assert_eq!(s.prev(now), Some(b));
    assert_eq!(s.prev(now), Some(a));
}

#[test]
fn toggling_shuffle_flips_the_mode() {
    let (mut s, _) = sched(3);
    assert!(!s.shuffle());
    s.toggle_shuffle();
    assert!(s.shuffle());
}

// ── Timer ───────────────────────────────────────────────────────────────────

#[test]
fn poll_switches_after_the_interval() {
    let (mut s, now) = sched(3);
    s.set_auto_switch(true, Duration::from_secs(2), false, now);
    s.select(0, now);
    assert_eq!(s.poll(now + Duration::from_millis(1_999)), None);
    let later = now + Duration::from_secs(2);
    assert_eq!(s.poll(later), Some(1));
    assert_eq!(s.poll(later + Duration::from_secs(1)), None);
    assert_eq!(s.poll(later + Duration::from_secs(2)), Some(2));
}

#[test]
fn manual_select_restarts_the_timer() {
    let (mut s, now) = sched(3);
    s.set_auto_switch(true, Duration::from_secs(2), false, now);
    s.select(0, now + Duration::from_millis(1_500));
    assert_eq!(s.poll(now + Duration::from_secs(2)), None);
    assert_eq!(s.elapsed(now + Duration::from_secs(2)), Duration::from_millis(500));
}

#[test]
fn disabled_auto_switch_never_fires() {
    let (mut s, now) = sched(3);
    s.set_auto_switch(false, Duration::from_secs(1), false, now);
    assert!(!s.auto_switch());
    assert_eq!(s.poll(now + Duration::from_secs(3600)), None);
    s.toggle_auto_switch(now);
    assert!(s.auto_switch());
}

#[test]
fn interval_has_a_floor() {
    let (mut s, now) = sched(2);
    s.set_auto_switch(true, Duration::ZERO, false, now);
    assert_eq!(s.interval(), Duration::from_millis(100));
}
