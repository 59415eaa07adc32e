//! Frame-rate detection state machine.
//!
//! Feeds per-frame timestamps into a [`SampleWindow`] until two seconds of
//! consecutive frame times agree within a small slack, then reports their
//! mean as the calibrated frame interval.

use crate::error::DetectionError;
use crate::output_timing::{MAX_FRAME_RATE_HZ, MIN_FRAME_RATE_HZ};
use crate::sample_window::SampleWindow;
use std::time::Duration;
use tracing::{debug, info};

/// Callbacks ignored at the start of a session while timing settles.
pub const CALLBACKS_TO_SKIP: u32 = 10;

/// Largest allowed difference between consecutive frame times, in seconds.
pub const FRAME_TIME_SLACK_SECS: f64 = 0.00175;

/// Multiple of the window capacity after which detection gives up.
pub const TIME_LIMIT_WINDOWS: u32 = 10;

/// Accept a screen refresh rate only if a detection window can be sized
/// for it.
pub fn check_refresh_rate(refresh_rate_hz: f64) -> Result<f64, DetectionError> {
    if (MIN_FRAME_RATE_HZ..=MAX_FRAME_RATE_HZ).contains(&refresh_rate_hz) {
        Ok(refresh_rate_hz)
    } else {
        Err(DetectionError::RefreshRateOutOfRange)
    }
}

/// Detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Skipping the first callbacks
    WarmingUp,
    /// Filling the sample window
    Sampling,
    /// Window is full and being checked for stability
    Evaluating,
    /// Stable frame interval found
    Succeeded(Duration),
    /// Session ended without an interval
    Failed(DetectionError),
}

impl DetectorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DetectorState::Succeeded(_) | DetectorState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            DetectorState::WarmingUp => "WarmingUp",
            DetectorState::Sampling => "Sampling",
            DetectorState::Evaluating => "Evaluating",
            DetectorState::Succeeded(_) => "Succeeded",
            DetectorState::Failed(_) => "Failed",
        }
    }
}

/// What the frame pump should do after delivering a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    /// Keep delivering frames
    Continue,
    /// Stop delivering frames; the session is over
    Done(Result<Duration, DetectionError>),
}

/// Point-in-time view of the detector, for display and replay checks.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSnapshot {
    pub state: DetectorState,
    pub callbacks: u32,
    pub total_frames_seen: u32,
    pub samples: Vec<Duration>,
}

/// Adaptive frame-rate detector.
///
/// One instance covers one detection session. Timestamps are monotonic
/// offsets from an arbitrary epoch chosen by the frame pump.
#[derive(Debug, Clone)]
pub struct FrameRateDetector {
    state: DetectorState,
    window: SampleWindow,
    callbacks: u32,
    total_frames_seen: u32,
    frames_to_time_limit: u32,
    last_timestamp: Option<Duration>,
    last_estimate: Option<Duration>,
    slack_secs: f64,
}

impl FrameRateDetector {
    /// Create a detector sized for a screen running at `refresh_rate_hz`.
    pub fn new(refresh_rate_hz: f64) -> Self {
        Self::with_window(SampleWindow::for_refresh_rate(refresh_rate_hz))
    }

    /// Create a detector around an explicit window.
    pub fn with_window(window: SampleWindow) -> Self {
        let capacity = u32::try_from(window.capacity()).unwrap_or(u32::MAX);
        Self {
            state: DetectorState::WarmingUp,
            window,
            callbacks: 0,
            total_frames_seen: 0,
            frames_to_time_limit: capacity.saturating_mul(TIME_LIMIT_WINDOWS),
            last_timestamp: None,
            last_estimate: None,
            slack_secs: FRAME_TIME_SLACK_SECS,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }

    pub fn total_frames_seen(&self) -> u32 {
        self.total_frames_seen
    }

    pub fn frames_to_time_limit(&self) -> u32 {
        self.frames_to_time_limit
    }

    /// Rate implied by the most recent full-window mean, if any.
    pub fn estimate_hz(&self) -> Option<f64> {
        self.last_estimate
            .filter(|d| !d.is_zero())
            .map(|d| 1.0 / d.as_secs_f64())
    }

    pub fn snapshot(&self) -> DetectorSnapshot {
        DetectorSnapshot {
            state: self.state,
            callbacks: self.callbacks,
            total_frames_seen: self.total_frames_seen,
            samples: self.window.iter().copied().collect(),
        }
    }

    /// Abort the session. Has no effect once the detector is terminal.
    pub fn cancel(&mut self) -> FrameStep {
        if !self.state.is_terminal() {
            info!("Frame rate detection cancelled");
            self.state = DetectorState::Failed(DetectionError::Cancelled);
        }
        self.current_step()
    }

    /// Process one frame callback.
    pub fn on_frame(&mut self, timestamp: Duration) -> FrameStep {
        if self.state.is_terminal() {
            return self.current_step();
        }

        self.callbacks = self.callbacks.saturating_add(1);
        let previous = self.last_timestamp.replace(timestamp);

        if self.callbacks <= CALLBACKS_TO_SKIP {
            return FrameStep::Continue;
        }

        // The last warm-up frame always provides the baseline
        let delta = previous
            .map(|p| timestamp.saturating_sub(p))
            .unwrap_or_default();

        self.state = DetectorState::Sampling;
        self.total_frames_seen += 1;
        self.window.push(delta);

        if self.window.is_full() {
            self.state = DetectorState::Evaluating;
            self.evaluate();
        }

        if !self.state.is_terminal() && self.total_frames_seen >= self.frames_to_time_limit {
            info!(
                "Frame times never stabilized after {} frames",
                self.total_frames_seen
            );
            self.state = DetectorState::Failed(DetectionError::Unstable {
                frames_seen: self.total_frames_seen,
            });
        }

        self.current_step()
    }

    fn evaluate(&mut self) {
        let mean = self.window.mean().unwrap_or_default();
        self.last_estimate = Some(mean);

        if let Some((index, diff)) = self.window.first_unstable_pair(self.slack_secs) {
            debug!("Frame times differed by {:.6}s at sample {}", diff, index);
            self.window.evict_oldest();
            self.state = DetectorState::Sampling;
            return;
        }

        if mean.is_zero() {
            self.state = DetectorState::Failed(DetectionError::ZeroInterval);
        } else {
            info!("Found frame time: {:.9}s", mean.as_secs_f64());
            self.state = DetectorState::Succeeded(mean);
        }
    }

    fn current_step(&self) -> FrameStep {
        match self.state {
            DetectorState::Succeeded(interval) => FrameStep::Done(Ok(interval)),
            DetectorState::Failed(err) => FrameStep::Done(Err(err)),
            DetectorState::WarmingUp | DetectorState::Sampling | DetectorState::Evaluating => {
                FrameStep::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Feed evenly timestamped frames built from `deltas` (the first frame
    /// sits at t = 1s) and return the final step.
    fn feed(detector: &mut FrameRateDetector, deltas: impl IntoIterator<Item = Duration>) -> FrameStep {
        let mut t = Duration::from_secs(1);
        let mut step = detector.on_frame(t);
        for d in deltas {
            if let FrameStep::Done(_) = step {
                break;
            }
            t += d;
            step = detector.on_frame(t);
        }
        step
    }

    /// Run the warm-up callbacks `delta` apart; returns the last timestamp.
    fn warmup_then(
        detector: &mut FrameRateDetector,
        delta: Duration,
        warmup: u32,
    ) -> Duration {
        let mut t = Duration::from_secs(1);
        for _ in 0..warmup {
            t += delta;
            assert_eq!(detector.on_frame(t), FrameStep::Continue);
        }
        t
    }

    #[test]
    fn test_check_refresh_rate_bounds() {
        assert_eq!(check_refresh_rate(60.0), Ok(60.0));
        assert_eq!(check_refresh_rate(20.0), Ok(20.0));
        assert_eq!(check_refresh_rate(250.0), Ok(250.0));
        for bad in [0.0, -60.0, 19.9, 250.1, 1e20, f64::NAN, f64::INFINITY] {
            assert_eq!(
                check_refresh_rate(bad),
                Err(DetectionError::RefreshRateOutOfRange)
            );
        }
    }

    #[test]
    fn test_new_detector_is_warming_up() {
        let detector = FrameRateDetector::new(60.0);
        assert_eq!(detector.state(), DetectorState::WarmingUp);
        assert_eq!(detector.capacity(), 120);
        assert_eq!(detector.frames_to_time_limit(), 1200);
        assert!(detector.estimate_hz().is_none());
    }

    #[test]
    fn test_warm_up_callbacks_are_not_sampled() {
        let mut detector = FrameRateDetector::new(60.0);
        let mut t = Duration::ZERO;
        for _ in 0..CALLBACKS_TO_SKIP {
            t += Duration::from_millis(100);
            assert_eq!(detector.on_frame(t), FrameStep::Continue);
        }
        assert_eq!(detector.state(), DetectorState::WarmingUp);
        assert_eq!(detector.total_frames_seen(), 0);
        assert!(detector.snapshot().samples.is_empty());

        detector.on_frame(t + Duration::from_millis(16));
        assert_eq!(detector.state(), DetectorState::Sampling);
        assert_eq!(detector.snapshot().samples, vec![Duration::from_millis(16)]);
    }

    #[test]
    fn test_end_to_end_sixty_hz() {
        // 10 warm-up frames then 120 frames at 16666667ns
        let frame = Duration::from_nanos(16_666_667);
        let mut detector = FrameRateDetector::new(60.0);
        let mut t = warmup_then(&mut detector, frame, CALLBACKS_TO_SKIP);
        let mut step = FrameStep::Continue;
        for _ in 0..120 {
            t += frame;
            step = detector.on_frame(t);
        }
        assert_eq!(step, FrameStep::Done(Ok(frame)));
        assert_eq!(detector.state(), DetectorState::Succeeded(frame));
        let hz = detector.estimate_hz().unwrap();
        assert!((hz - 60.0).abs() < 0.001);
    }

    #[test]
    fn test_window_full_exactly_at_capacity() {
        let frame = Duration::from_millis(20);
        let mut detector = FrameRateDetector::with_window(SampleWindow::with_capacity(4));
        let mut t = warmup_then(&mut detector, frame, CALLBACKS_TO_SKIP);
        for _ in 0..3 {
            t += frame;
            assert_eq!(detector.on_frame(t), FrameStep::Continue);
            assert_eq!(detector.state(), DetectorState::Sampling);
        }
        t += frame;
        assert_eq!(detector.on_frame(t), FrameStep::Done(Ok(frame)));
    }

    #[test]
    fn test_alternating_frame_times_fail_at_limit() {
        let d = Duration::from_millis(20);
        let d2 = Duration::from_millis(22);
        let mut detector = FrameRateDetector::new(50.0);
        let limit = detector.frames_to_time_limit();

        let deltas = (0..).map(|i| if i % 2 == 0 { d } else { d2 });
        let step = feed(&mut detector, deltas.take((CALLBACKS_TO_SKIP + limit + 10) as usize));

        assert_eq!(
            step,
            FrameStep::Done(Err(DetectionError::Unstable { frames_seen: limit }))
        );
        assert_eq!(detector.total_frames_seen(), limit);
        // A display estimate is still available after unstable evaluations
        assert!(detector.estimate_hz().is_some());
    }

    #[test]
    fn test_unstable_evaluation_slides_window_by_one() {
        let mut detector = FrameRateDetector::with_window(SampleWindow::with_capacity(3));
        let mut t = warmup_then(&mut detector, Duration::from_millis(10), CALLBACKS_TO_SKIP);
        for d in [10u64, 30, 10] {
            t += Duration::from_millis(d);
            detector.on_frame(t);
        }
        let snapshot = detector.snapshot();
        assert_eq!(snapshot.state, DetectorState::Sampling);
        assert_eq!(
            snapshot.samples,
            vec![Duration::from_millis(30), Duration::from_millis(10)]
        );
        assert_eq!(snapshot.total_frames_seen, 3);
    }

    #[test]
    fn test_recovers_after_unstable_start() {
        let frame = Duration::from_millis(20);
        let mut detector = FrameRateDetector::with_window(SampleWindow::with_capacity(4));
        let mut t = warmup_then(&mut detector, frame, CALLBACKS_TO_SKIP);
        // one long frame, then steady
        t += Duration::from_millis(45);
        detector.on_frame(t);
        let mut step = FrameStep::Continue;
        for _ in 0..4 {
            t += frame;
            step = detector.on_frame(t);
        }
        assert_eq!(step, FrameStep::Done(Ok(frame)));
        assert_eq!(detector.total_frames_seen(), 5);
    }

    #[test]
    fn test_zero_interval_fails() {
        let mut detector = FrameRateDetector::with_window(SampleWindow::with_capacity(3));
        let t = Duration::from_secs(5);
        let mut step = FrameStep::Continue;
        for _ in 0..(CALLBACKS_TO_SKIP + 3) {
            step = detector.on_frame(t);
        }
        assert_eq!(step, FrameStep::Done(Err(DetectionError::ZeroInterval)));
    }

    #[test]
    fn test_cancel_is_terminal() {
        let mut detector = FrameRateDetector::new(60.0);
        detector.on_frame(Duration::from_millis(1));
        assert_eq!(
            detector.cancel(),
            FrameStep::Done(Err(DetectionError::Cancelled))
        );
        assert_eq!(
            detector.on_frame(Duration::from_millis(50)),
            FrameStep::Done(Err(DetectionError::Cancelled))
        );
        assert_eq!(detector.snapshot().callbacks, 1);
    }

    #[test]
    fn test_cancel_after_success_keeps_result() {
        let frame = Duration::from_millis(20);
        let mut detector = FrameRateDetector::with_window(SampleWindow::with_capacity(2));
        let mut t = warmup_then(&mut detector, frame, CALLBACKS_TO_SKIP);
        for _ in 0..2 {
            t += frame;
            detector.on_frame(t);
        }
        assert_eq!(detector.cancel(), FrameStep::Done(Ok(frame)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// A constant frame time converges to exactly that frame time once
        /// the window is full.
        #[test]
        fn prop_constant_stream_converges(
            nanos in 4_000_000u64..50_000_000,
            rate in 30.0f64..150.0,
        ) {
            let frame = Duration::from_nanos(nanos);
            let mut detector = FrameRateDetector::new(rate);
            let capacity = detector.capacity();
            let step = feed(
                &mut detector,
                std::iter::repeat(frame).take(CALLBACKS_TO_SKIP as usize + capacity),
            );
            prop_assert_eq!(step, FrameStep::Done(Ok(frame)));
            prop_assert_eq!(detector.total_frames_seen() as usize, capacity);
        }

        /// Alternating frame times further apart than the slack never succeed.
        #[test]
        fn prop_alternating_stream_never_succeeds(
            base_ms in 18u64..40,
            capacity in 2usize..40,
        ) {
            let d = Duration::from_millis(base_ms);
            let d2 = d + d / 10;
            let mut detector = FrameRateDetector::with_window(SampleWindow::with_capacity(capacity));
            let limit = detector.frames_to_time_limit();
            let deltas = (0..).map(|i| if i % 2 == 0 { d } else { d2 });
            let step = feed(&mut detector, deltas.take((CALLBACKS_TO_SKIP + limit) as usize + 5));
            prop_assert_eq!(step, FrameStep::Done(Err(DetectionError::Unstable { frames_seen: limit })));
        }

        /// Replaying the same timestamps reproduces identical intermediate
        /// states.
        #[test]
        fn prop_replay_is_deterministic(
            deltas in prop::collection::vec(1_000_000u64..40_000_000, 1..200),
            capacity in 1usize..32,
        ) {
            let run = || {
                let mut detector = FrameRateDetector::with_window(SampleWindow::with_capacity(capacity));
                let mut t = Duration::from_secs(2);
                let mut snapshots = vec![];
                for d in &deltas {
                    t += Duration::from_nanos(*d);
                    detector.on_frame(t);
                    snapshots.push(detector.snapshot());
                }
                snapshots
            };
            prop_assert_eq!(run(), run());
        }
    }
}
