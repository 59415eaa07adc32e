//! Frame pump integration for frame-rate detection.
//!
//! The display's frame pump delivers one callback per display frame. A
//! detection session registers with the pump, asks the host for low-latency
//! scheduling and pins the intended frame rate; all three are released by
//! [`FrameCallbackGuard`] no matter how the session ends.

use crate::error::DetectionError;
use crate::frame_detect::{check_refresh_rate, FrameRateDetector, FrameStep};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Frames buffered between the pump and a session before new ones are dropped.
pub const FRAME_QUEUE_DEPTH: usize = 256;

/// Nice value requested while a session needs low-latency scheduling.
#[cfg(unix)]
const LOW_LATENCY_NICE: libc::c_int = -10;

/// Per-frame data delivered by the pump.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameParams {
    /// Monotonic time of the frame, from an epoch chosen by the pump
    pub timestamp: Duration,
    /// Refresh rate the display currently reports
    pub refresh_hint: f64,
}

/// Display host that owns the frame pump.
pub trait FrameHost: Send + Sync {
    /// Register a frame callback; frames arrive on the returned channel.
    fn add_on_frame(&self) -> mpsc::Receiver<FrameParams>;

    /// Deregister the frame callback.
    fn remove_on_frame(&self);

    /// Pin the rate the window intends to present at. Zero clears it.
    fn set_intended_frame_rate(&self, rate_hz: f64);

    fn set_cpu_needs_low_latency(&self, needs: bool);
}

/// Scoped frame callback registration.
pub struct FrameCallbackGuard<'a, H: FrameHost + ?Sized> {
    host: &'a H,
    frames: mpsc::Receiver<FrameParams>,
}

impl<'a, H: FrameHost + ?Sized> FrameCallbackGuard<'a, H> {
    pub fn acquire(host: &'a H, intended_rate_hz: f64) -> Self {
        host.set_intended_frame_rate(intended_rate_hz);
        let frames = host.add_on_frame();
        host.set_cpu_needs_low_latency(true);
        Self { host, frames }
    }

    /// Next frame, or `None` once the pump has dropped the callback.
    pub async fn next_frame(&mut self) -> Option<FrameParams> {
        self.frames.recv().await
    }
}

impl<H: FrameHost + ?Sized> Drop for FrameCallbackGuard<'_, H> {
    fn drop(&mut self) {
        self.host.set_intended_frame_rate(0.0);
        self.host.set_cpu_needs_low_latency(false);
        self.host.remove_on_frame();
        debug!("Frame callback released");
    }
}

/// Parameters of a detection session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionRequest {
    /// Screen refresh rate used to size the window; zero or less means use
    /// the first frame's refresh hint
    pub screen_rate_hz: f64,
    /// Rate to pin on the window while detecting (the emulated system's rate)
    pub intended_rate_hz: f64,
}

/// Progress of a running session, published for status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionProgress {
    pub state: String,
    pub frames_seen: u32,
    pub estimate_hz: Option<f64>,
}

impl Default for DetectionProgress {
    fn default() -> Self {
        Self {
            state: "Idle".to_string(),
            frames_seen: 0,
            estimate_hz: None,
        }
    }
}

impl DetectionProgress {
    fn from_detector(detector: &FrameRateDetector) -> Self {
        Self {
            state: detector.state().name().to_string(),
            frames_seen: detector.total_frames_seen(),
            estimate_hz: detector.estimate_hz(),
        }
    }
}

/// Run one detection session against `host` until it succeeds, fails, or
/// `cancel` flips to true. The pump closing early counts as a cancellation.
///
/// A screen rate or first-frame refresh hint outside 20..=250 Hz ends the
/// session with [`DetectionError::RefreshRateOutOfRange`].
pub async fn run_detection<H: FrameHost + ?Sized>(
    host: &H,
    request: DetectionRequest,
    mut cancel: watch::Receiver<bool>,
    progress: Option<&watch::Sender<DetectionProgress>>,
) -> Result<Duration, DetectionError> {
    let mut detector = if request.screen_rate_hz > 0.0 {
        Some(FrameRateDetector::new(check_refresh_rate(request.screen_rate_hz)?))
    } else {
        None
    };
    let mut guard = FrameCallbackGuard::acquire(host, request.intended_rate_hz);

    info!(
        "Frame rate detection started (screen {:.3}Hz, intended {:.3}Hz)",
        request.screen_rate_hz, request.intended_rate_hz
    );

    if *cancel.borrow() {
        return Err(DetectionError::Cancelled);
    }

    loop {
        let step = tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    info!("Detection aborted");
                    match detector.as_mut() {
                        Some(d) => d.cancel(),
                        None => FrameStep::Done(Err(DetectionError::Cancelled)),
                    }
                } else {
                    FrameStep::Continue
                }
            }
            frame = guard.next_frame() => match frame {
                Some(params) => match detector.as_mut() {
                    Some(d) => d.on_frame(params.timestamp),
                    None => match check_refresh_rate(params.refresh_hint) {
                        Ok(hz) => detector
                            .insert(FrameRateDetector::new(hz))
                            .on_frame(params.timestamp),
                        Err(e) => {
                            warn!(
                                "Frame reported refresh rate {}Hz, giving up",
                                params.refresh_hint
                            );
                            FrameStep::Done(Err(e))
                        }
                    },
                },
                None => {
                    warn!("Frame pump closed during detection");
                    FrameStep::Done(Err(DetectionError::Cancelled))
                }
            },
        };

        if let (Some(tx), Some(d)) = (progress, detector.as_ref()) {
            let _ = tx.send(DetectionProgress::from_detector(d));
        }

        if let FrameStep::Done(result) = step {
            return result;
        }
    }
}

/// Frame host fed by frames pushed from outside the process.
pub struct ChannelFrameHost {
    sender: Mutex<Option<mpsc::Sender<FrameParams>>>,
    intended_rate_bits: AtomicU64,
    low_latency: AtomicBool,
    adjust_priority: bool,
}

impl ChannelFrameHost {
    /// Host that only tracks requests without touching the process.
    pub fn new() -> Self {
        Self {
            sender: Mutex::new(None),
            intended_rate_bits: AtomicU64::new(0f64.to_bits()),
            low_latency: AtomicBool::new(false),
            adjust_priority: false,
        }
    }

    /// Host that also raises process priority while low latency is requested.
    pub fn with_priority_control() -> Self {
        Self {
            adjust_priority: true,
            ..Self::new()
        }
    }

    /// Deliver a frame to the registered callback. Returns false when no
    /// session is listening or the queue is full.
    pub fn push_frame(&self, params: FrameParams) -> bool {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return false,
        };
        let Some(tx) = sender else {
            return false;
        };
        match tx.try_send(params) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                // The next delta the detector sees spans the missing frame
                warn!(
                    "Frame queue full ({} frames), dropping frame at {:?}",
                    FRAME_QUEUE_DEPTH, dropped.timestamp
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.sender.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn intended_frame_rate(&self) -> f64 {
        f64::from_bits(self.intended_rate_bits.load(Ordering::SeqCst))
    }

    pub fn cpu_needs_low_latency(&self) -> bool {
        self.low_latency.load(Ordering::SeqCst)
    }
}

impl Default for ChannelFrameHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHost for ChannelFrameHost {
    fn add_on_frame(&self) -> mpsc::Receiver<FrameParams> {
        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        if let Ok(mut sender) = self.sender.lock() {
            *sender = Some(tx);
        }
        rx
    }

    fn remove_on_frame(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            *sender = None;
        }
    }

    fn set_intended_frame_rate(&self, rate_hz: f64) {
        self.intended_rate_bits
            .store(rate_hz.to_bits(), Ordering::SeqCst);
    }

    fn set_cpu_needs_low_latency(&self, needs: bool) {
        let was = self.low_latency.swap(needs, Ordering::SeqCst);
        if self.adjust_priority && was != needs {
            apply_low_latency_priority(needs);
        }
    }
}

#[cfg(unix)]
fn apply_low_latency_priority(enabled: bool) {
    let nice = if enabled { LOW_LATENCY_NICE } else { 0 };
    // SAFETY: setpriority only reads its integer arguments.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if result != 0 {
        warn!(
            "Failed to set process nice value to {}: {}",
            nice,
            std::io::Error::last_os_error()
        );
    } else {
        debug!("Process nice value set to {}", nice);
    }
}

#[cfg(not(unix))]
fn apply_low_latency_priority(_enabled: bool) {
    debug!("Low-latency scheduling not available on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_detect::CALLBACKS_TO_SKIP;
    use std::sync::Arc;

    /// Host that records every call in order.
    #[derive(Default)]
    struct RecordingHost {
        inner: ChannelFrameHost,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingHost {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl FrameHost for RecordingHost {
        fn add_on_frame(&self) -> mpsc::Receiver<FrameParams> {
            self.calls.lock().unwrap().push("add".to_string());
            self.inner.add_on_frame()
        }

        fn remove_on_frame(&self) {
            self.calls.lock().unwrap().push("remove".to_string());
            self.inner.remove_on_frame();
        }

        fn set_intended_frame_rate(&self, rate_hz: f64) {
            self.calls.lock().unwrap().push(format!("rate {}", rate_hz));
            self.inner.set_intended_frame_rate(rate_hz);
        }

        fn set_cpu_needs_low_latency(&self, needs: bool) {
            self.calls.lock().unwrap().push(format!("latency {}", needs));
            self.inner.set_cpu_needs_low_latency(needs);
        }
    }

    fn request() -> DetectionRequest {
        DetectionRequest {
            screen_rate_hz: 60.0,
            intended_rate_hz: 60.0988,
        }
    }

    async fn wait_for_subscription(host: &ChannelFrameHost) {
        while !host.is_subscribed() {
            tokio::task::yield_now().await;
        }
    }

    fn frame(i: u64, nanos: u64) -> FrameParams {
        FrameParams {
            timestamp: Duration::from_nanos(1_000_000_000 + i * nanos),
            refresh_hint: 60.0,
        }
    }

    #[tokio::test]
    async fn test_detection_succeeds_and_releases_host() {
        let host = Arc::new(ChannelFrameHost::new());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(DetectionProgress::default());

        let task_host = Arc::clone(&host);
        let handle = tokio::spawn(async move {
            run_detection(&*task_host, request(), cancel_rx, Some(&progress_tx)).await
        });

        wait_for_subscription(&host).await;
        assert!(host.cpu_needs_low_latency());
        assert_eq!(host.intended_frame_rate(), 60.0988);

        for i in 0..(CALLBACKS_TO_SKIP as u64 + 120) {
            assert!(host.push_frame(frame(i, 16_666_667)));
        }

        let result = handle.await.unwrap();
        assert_eq!(result, Ok(Duration::from_nanos(16_666_667)));
        assert!(!host.is_subscribed());
        assert!(!host.cpu_needs_low_latency());
        assert_eq!(host.intended_frame_rate(), 0.0);
        assert_eq!(progress_rx.borrow().state, "Succeeded");
        assert_eq!(progress_rx.borrow().frames_seen, 120);
    }

    #[tokio::test]
    async fn test_cancel_releases_host() {
        let host = Arc::new(ChannelFrameHost::new());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task_host = Arc::clone(&host);
        let handle = tokio::spawn(async move {
            run_detection(&*task_host, request(), cancel_rx, None).await
        });

        wait_for_subscription(&host).await;
        for i in 0..20 {
            host.push_frame(frame(i, 16_666_667));
        }
        cancel_tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert_eq!(result, Err(DetectionError::Cancelled));
        assert!(!host.is_subscribed());
        assert!(!host.cpu_needs_low_latency());
    }

    #[tokio::test]
    async fn test_pump_teardown_counts_as_cancel() {
        let host = Arc::new(ChannelFrameHost::new());
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let task_host = Arc::clone(&host);
        let handle = tokio::spawn(async move {
            run_detection(&*task_host, request(), cancel_rx, None).await
        });

        wait_for_subscription(&host).await;
        host.remove_on_frame();

        assert_eq!(handle.await.unwrap(), Err(DetectionError::Cancelled));
    }

    #[tokio::test]
    async fn test_already_cancelled_releases_immediately() {
        let host = RecordingHost::default();
        let (_cancel_tx, cancel_rx) = watch::channel(true);

        let result = run_detection(&host, request(), cancel_rx, None).await;
        assert_eq!(result, Err(DetectionError::Cancelled));
        assert_eq!(
            host.calls(),
            vec![
                "rate 60.0988",
                "add",
                "latency true",
                "rate 0",
                "latency false",
                "remove",
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_session_releases_host() {
        let host = RecordingHost::default();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        {
            let session = run_detection(&host, request(), cancel_rx, None);
            tokio::pin!(session);
            let timed_out = tokio::time::timeout(Duration::from_millis(5), &mut session).await;
            assert!(timed_out.is_err());
        }
        let calls = host.calls();
        assert_eq!(calls.last().map(String::as_str), Some("remove"));
        assert!(calls.contains(&"latency false".to_string()));
        assert!(!host.inner.is_subscribed());
    }

    #[tokio::test]
    async fn test_window_sized_from_refresh_hint() {
        let host = Arc::new(ChannelFrameHost::new());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let unknown_screen = DetectionRequest {
            screen_rate_hz: 0.0,
            intended_rate_hz: 50.0,
        };

        let task_host = Arc::clone(&host);
        let handle = tokio::spawn(async move {
            run_detection(&*task_host, unknown_screen, cancel_rx, None).await
        });

        wait_for_subscription(&host).await;
        // 50Hz hint gives a 100-sample window
        for i in 0..(CALLBACKS_TO_SKIP as u64 + 100) {
            host.push_frame(FrameParams {
                timestamp: Duration::from_millis(i * 20),
                refresh_hint: 50.0,
            });
        }
        assert_eq!(handle.await.unwrap(), Ok(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_out_of_range_screen_rate_rejected_before_subscribing() {
        let host = RecordingHost::default();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let huge = DetectionRequest {
            screen_rate_hz: 1e20,
            intended_rate_hz: 60.0,
        };

        let result = run_detection(&host, huge, cancel_rx, None).await;
        assert_eq!(result, Err(DetectionError::RefreshRateOutOfRange));
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bad_refresh_hint_ends_session() {
        for hint in [0.0, -50.0, 1e20] {
            let host = Arc::new(ChannelFrameHost::new());
            let (_cancel_tx, cancel_rx) = watch::channel(false);
            let unknown_screen = DetectionRequest {
                screen_rate_hz: 0.0,
                intended_rate_hz: 60.0,
            };

            let task_host = Arc::clone(&host);
            let handle = tokio::spawn(async move {
                run_detection(&*task_host, unknown_screen, cancel_rx, None).await
            });

            wait_for_subscription(&host).await;
            host.push_frame(FrameParams {
                timestamp: Duration::from_secs(1),
                refresh_hint: hint,
            });

            assert_eq!(
                handle.await.unwrap(),
                Err(DetectionError::RefreshRateOutOfRange),
                "hint {}",
                hint
            );
            assert!(!host.is_subscribed());
            assert!(!host.cpu_needs_low_latency());
        }
    }

    #[test]
    fn test_full_queue_drops_frames() {
        let host = ChannelFrameHost::new();
        let _rx = host.add_on_frame();
        for i in 0..FRAME_QUEUE_DEPTH as u64 {
            assert!(host.push_frame(frame(i, 16_666_667)));
        }
        assert!(!host.push_frame(frame(FRAME_QUEUE_DEPTH as u64, 16_666_667)));
    }

    #[test]
    fn test_push_after_receiver_dropped_fails() {
        let host = ChannelFrameHost::new();
        drop(host.add_on_frame());
        assert!(!host.push_frame(frame(0, 1)));
    }

    #[test]
    fn test_push_without_subscriber_is_dropped() {
        let host = ChannelFrameHost::new();
        assert!(!host.push_frame(frame(0, 1)));
        let _rx = host.add_on_frame();
        assert!(host.push_frame(frame(0, 1)));
    }
}
