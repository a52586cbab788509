//! Fixed-capacity observation window

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use crate::constants::feeds::{MAX_WINDOW_SAMPLES, WINDOW_SLACK_FACTOR};

/// Entries needed to cover `width` at `interval`, slack included, before clamping
pub fn samples_for(width: Duration, interval: Duration) -> f64 {
    if interval.is_zero() {
        return 1.0;
    }
    (width.as_secs_f64() / interval.as_secs_f64() * WINDOW_SLACK_FACTOR).ceil()
}

/// Ring buffer sized for `ceil(width / interval * 1.25)` entries, clamped to
/// `[1, MAX_WINDOW_SAMPLES]`
pub fn capacity_for(width: Duration, interval: Duration) -> usize {
    let samples = samples_for(width, interval);
    if samples >= MAX_WINDOW_SAMPLES as f64 {
        return MAX_WINDOW_SAMPLES;
    }
    (samples as usize).max(1)
}

/// FIFO ring buffer: pushing into a full window evicts the oldest entry.
/// Storage grows with the entries actually pushed; `capacity` only bounds it.
#[derive(Debug, Clone, Serialize)]
pub struct Window<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> Window<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::new(),
        }
    }

    /// Append, returning the evicted entry if the window was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_for_default_window() {
        // 7 minutes at 1s: 420 * 1.25
        assert_eq!(
            capacity_for(Duration::from_secs(420), Duration::from_secs(1)),
            525
        );
        // 10s at 3s: 3.33 * 1.25 = 4.16 -> 5
        assert_eq!(capacity_for(Duration::from_secs(10), Duration::from_secs(3)), 5);
        assert_eq!(capacity_for(Duration::from_secs(1), Duration::ZERO), 1);
        assert_eq!(capacity_for(Duration::ZERO, Duration::from_secs(1)), 1);
    }

    #[test]
    fn test_capacity_for_is_clamped() {
        let month = Duration::from_secs(30 * 24 * 3600);
        assert!(samples_for(month, Duration::from_millis(1)) > 3.0e9);
        assert_eq!(capacity_for(month, Duration::from_millis(1)), MAX_WINDOW_SAMPLES);
    }

    #[test]
    fn test_large_capacity_window_allocates_lazily() {
        let mut window = Window::with_capacity(3_240_000_000);
        for i in 0..3 {
            assert_eq!(window.push(i), None);
        }

        assert_eq!(window.capacity(), 3_240_000_000);
        assert_eq!(window.len(), 3);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_push_evicts_oldest_first() {
        let mut window = Window::with_capacity(3);
        for i in 1..=3 {
            assert_eq!(window.push(i), None);
        }
        assert_eq!(window.push(4), Some(1));
        assert_eq!(window.push(5), Some(2));

        assert_eq!(window.len(), 3);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(window.latest(), Some(&5));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut window = Window::with_capacity(7);
        for i in 0..1000 {
            window.push(i);
            assert!(window.len() <= window.capacity());
        }
        assert_eq!(window.len(), 7);
    }
}
