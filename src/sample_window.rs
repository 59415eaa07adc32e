//! Sliding window of frame-time samples used by frame-rate detection.

use crate::output_timing::{MAX_FRAME_RATE_HZ, MIN_FRAME_RATE_HZ};
use std::collections::VecDeque;
use std::time::Duration;

/// Seconds of frame history a detection window holds.
pub const WINDOW_SECONDS: f64 = 2.0;

/// Fixed-capacity window of frame durations, kept in arrival order.
///
/// Unlike a ring buffer the window doesn't evict on its own: the detector
/// decides when to slide it after an unstable evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl SampleWindow {
    /// Create a window holding `capacity` samples (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a window covering two seconds of frames at `refresh_rate_hz`.
    pub fn for_refresh_rate(refresh_rate_hz: f64) -> Self {
        Self::with_capacity(capacity_for_refresh_rate(refresh_rate_hz))
    }

    /// Append a sample. If the window is already full the oldest sample is
    /// dropped first so `len() <= capacity()` always holds.
    pub fn push(&mut self, sample: Duration) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Slide the window by one sample.
    pub fn evict_oldest(&mut self) -> Option<Duration> {
        self.samples.pop_front()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Duration> {
        self.samples.iter()
    }

    /// Exact sum of all samples.
    pub fn total(&self) -> Duration {
        self.samples.iter().sum()
    }

    /// Mean sample rounded to the nearest nanosecond, or `None` when empty.
    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let len = self.samples.len() as u128;
        let total = self.total().as_nanos();
        let nanos = (total + len / 2) / len;
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }

    /// Walk consecutive pairs in arrival order and return the index of the
    /// later sample and the difference in seconds for the first pair that
    /// differs by more than `slack_secs`.
    pub fn first_unstable_pair(&self, slack_secs: f64) -> Option<(usize, f64)> {
        self.samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .enumerate()
            .find_map(|(i, (prev, cur))| {
                let diff = (prev.as_secs_f64() - cur.as_secs_f64()).abs();
                (diff > slack_secs).then_some((i + 1, diff))
            })
    }

    /// Whether every consecutive pair differs by at most `slack_secs`.
    pub fn is_stable(&self, slack_secs: f64) -> bool {
        self.first_unstable_pair(slack_secs).is_none()
    }
}

/// Number of samples in a two-second window at `refresh_rate_hz`. Rates
/// outside 20..=250 Hz are clamped to that range.
pub fn capacity_for_refresh_rate(refresh_rate_hz: f64) -> usize {
    if !refresh_rate_hz.is_finite() || refresh_rate_hz <= 0.0 {
        return 1;
    }
    let hz = refresh_rate_hz.clamp(MIN_FRAME_RATE_HZ, MAX_FRAME_RATE_HZ);
    ((hz * WINDOW_SECONDS).round() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: f64) -> Duration {
        Duration::from_secs_f64(v / 1000.0)
    }

    #[test]
    fn test_capacity_for_common_rates() {
        assert_eq!(capacity_for_refresh_rate(60.0), 120);
        assert_eq!(capacity_for_refresh_rate(59.94), 120);
        assert_eq!(capacity_for_refresh_rate(50.0), 100);
        assert_eq!(capacity_for_refresh_rate(144.0), 288);
        assert_eq!(capacity_for_refresh_rate(0.0), 1);
        assert_eq!(capacity_for_refresh_rate(f64::NAN), 1);
    }

    #[test]
    fn test_capacity_clamped_to_detectable_rates() {
        assert_eq!(capacity_for_refresh_rate(1e20), 500);
        assert_eq!(capacity_for_refresh_rate(1e9), 500);
        assert_eq!(capacity_for_refresh_rate(f64::INFINITY), 1);
        assert_eq!(capacity_for_refresh_rate(5.0), 40);
        assert_eq!(SampleWindow::for_refresh_rate(1e20).capacity(), 500);
    }

    #[test]
    fn test_fills_then_reports_full() {
        let mut window = SampleWindow::with_capacity(3);
        assert!(window.is_empty());
        window.push(ms(16.0));
        window.push(ms(16.0));
        assert!(!window.is_full());
        window.push(ms(16.0));
        assert!(window.is_full());
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_mean_rounds_to_nanoseconds() {
        let mut window = SampleWindow::with_capacity(3);
        window.push(Duration::from_nanos(10));
        window.push(Duration::from_nanos(10));
        window.push(Duration::from_nanos(11));
        // 31 / 3 = 10.33 -> 10
        assert_eq!(window.mean(), Some(Duration::from_nanos(10)));

        window.push(Duration::from_nanos(11));
        // 10 + 11 + 11 = 32 / 3 = 10.67 -> 11
        assert_eq!(window.mean(), Some(Duration::from_nanos(11)));
        assert_eq!(SampleWindow::with_capacity(2).mean(), None);
    }

    #[test]
    fn test_first_unstable_pair_reports_first_offender() {
        let mut window = SampleWindow::with_capacity(5);
        for v in [16.0, 16.5, 20.0, 16.0, 25.0] {
            window.push(ms(v));
        }
        let (index, diff) = window.first_unstable_pair(0.00175).unwrap();
        assert_eq!(index, 2);
        assert!((diff - 0.0035).abs() < 1e-9);
        assert!(!window.is_stable(0.00175));
    }

    #[test]
    fn test_stable_within_slack() {
        let mut window = SampleWindow::with_capacity(4);
        for v in [16.6, 16.7, 17.0, 16.2] {
            window.push(ms(v));
        }
        assert!(window.is_stable(0.00175));
    }

    #[test]
    fn test_evict_slides_by_one() {
        let mut window = SampleWindow::with_capacity(3);
        for v in [1.0, 2.0, 3.0] {
            window.push(ms(v));
        }
        assert_eq!(window.evict_oldest(), Some(ms(1.0)));
        let remaining: Vec<Duration> = window.iter().copied().collect();
        assert_eq!(remaining, vec![ms(2.0), ms(3.0)]);
        assert!(!window.is_full());
    }

    proptest! {
        /// The window never exceeds its capacity and keeps the most recent
        /// samples in arrival order.
        #[test]
        fn prop_capacity_and_order(
            capacity in 1usize..64,
            samples in prop::collection::vec(0u64..100_000_000, 0..256),
        ) {
            let mut window = SampleWindow::with_capacity(capacity);
            for s in &samples {
                window.push(Duration::from_nanos(*s));
                prop_assert!(window.len() <= capacity);
            }

            let expected_start = samples.len().saturating_sub(capacity);
            let kept: Vec<u64> = window.iter().map(|d| d.as_nanos() as u64).collect();
            prop_assert_eq!(kept, samples[expected_start..].to_vec());
        }

        /// The total is exact regardless of where instability occurs.
        #[test]
        fn prop_total_is_exact(samples in prop::collection::vec(0u64..1_000_000_000, 1..128)) {
            let mut window = SampleWindow::with_capacity(samples.len());
            for s in &samples {
                window.push(Duration::from_nanos(*s));
            }
            let expected: u64 = samples.iter().sum();
            prop_assert_eq!(window.total(), Duration::from_nanos(expected));
        }
    }
}
