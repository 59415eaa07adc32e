//! Output frame-time options per video system.
//!
//! Each emulated video system (NTSC, PAL) can present at the screen's own
//! rate (`Auto`), at the system's native rate (`Original`), or at a custom
//! interval, usually one produced by frame-rate detection.

use crate::error::{DetectionError, TimingError};
use crate::store::StoreHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Lowest custom frame rate accepted.
pub const MIN_FRAME_RATE_HZ: f64 = 20.0;

/// Highest custom frame rate accepted.
pub const MAX_FRAME_RATE_HZ: f64 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSystem {
    Ntsc,
    Pal,
}

impl VideoSystem {
    pub const ALL: [VideoSystem; 2] = [VideoSystem::Ntsc, VideoSystem::Pal];

    /// Typical native refresh rate of consoles on this system.
    pub fn native_rate_hz(self) -> f64 {
        match self {
            VideoSystem::Ntsc => 60.0988,
            VideoSystem::Pal => 50.0070,
        }
    }

    fn store_key(self) -> String {
        format!("frame_time/{}", self)
    }
}

impl fmt::Display for VideoSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSystem::Ntsc => write!(f, "ntsc"),
            VideoSystem::Pal => write!(f, "pal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameTimeOption {
    /// Present at the screen's refresh rate
    #[default]
    Auto,
    /// Present at the video system's native rate
    Original,
    /// Present at a fixed interval
    Custom(Duration),
}

/// Parse a user-entered frame rate such as `59.94` or `60000/1001` and
/// return the matching frame interval.
pub fn parse_custom_rate(input: &str) -> Result<Duration, TimingError> {
    let invalid = || TimingError::InvalidRate(input.to_string());
    let text = input.trim();

    let rate = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().map_err(|_| invalid())?;
            let den: f64 = den.trim().parse().map_err(|_| invalid())?;
            if den == 0.0 {
                return Err(invalid());
            }
            num / den
        }
        None => text.parse::<f64>().map_err(|_| invalid())?,
    };

    if !rate.is_finite() || rate <= 0.0 {
        return Err(invalid());
    }
    check_rate(rate)?;
    Ok(Duration::from_secs_f64(1.0 / rate))
}

fn check_rate(hz: f64) -> Result<(), TimingError> {
    if !(MIN_FRAME_RATE_HZ..=MAX_FRAME_RATE_HZ).contains(&hz) {
        return Err(TimingError::RateOutOfRange {
            hz,
            min: MIN_FRAME_RATE_HZ,
            max: MAX_FRAME_RATE_HZ,
        });
    }
    Ok(())
}

fn validate_option(option: FrameTimeOption) -> Result<(), TimingError> {
    match option {
        FrameTimeOption::Auto | FrameTimeOption::Original => Ok(()),
        FrameTimeOption::Custom(interval) => {
            if interval.is_zero() {
                return Err(TimingError::InvalidRate("0".to_string()));
            }
            check_rate(1.0 / interval.as_secs_f64())
        }
    }
}

/// Holds and persists the frame-time option of every video system.
#[derive(Debug)]
pub struct OutputTimingManager {
    store: StoreHandle,
    options: HashMap<VideoSystem, FrameTimeOption>,
}

impl OutputTimingManager {
    /// Load saved options, falling back to `Auto` for missing or unreadable
    /// entries.
    pub fn load(store: StoreHandle) -> Self {
        let mut options = HashMap::new();
        for system in VideoSystem::ALL {
            let option = match store.load::<FrameTimeOption>(&system.store_key()) {
                Ok(Some(option)) if validate_option(option).is_ok() => option,
                Ok(Some(option)) => {
                    warn!("Ignoring out-of-range saved frame time {:?} for {}", option, system);
                    FrameTimeOption::Auto
                }
                Ok(None) => FrameTimeOption::Auto,
                Err(e) => {
                    warn!("Failed to load frame time for {}: {}", system, e);
                    FrameTimeOption::Auto
                }
            };
            options.insert(system, option);
        }
        Self { store, options }
    }

    pub fn option(&self, system: VideoSystem) -> FrameTimeOption {
        self.options.get(&system).copied().unwrap_or_default()
    }

    /// Change the option for `system` and persist it. Returns whether the
    /// value changed. A failed write still leaves the new value in effect.
    pub fn set_option(
        &mut self,
        system: VideoSystem,
        option: FrameTimeOption,
    ) -> Result<bool, TimingError> {
        validate_option(option)?;
        if self.option(system) == option {
            return Ok(false);
        }

        self.options.insert(system, option);
        info!("Frame time for {} set to {}", system, self.label(system));
        self.store.save(&system.store_key(), &option)?;
        Ok(true)
    }

    /// Apply the outcome of a detection session. Success becomes a custom
    /// interval; cancellation changes nothing and is not an error.
    pub fn apply_detected(
        &mut self,
        system: VideoSystem,
        result: Result<Duration, DetectionError>,
    ) -> Result<Option<FrameTimeOption>, TimingError> {
        match result {
            Ok(interval) => {
                let option = FrameTimeOption::Custom(interval);
                self.set_option(system, option)?;
                Ok(Some(option))
            }
            Err(DetectionError::Cancelled) => Ok(None),
            Err(e) => Err(TimingError::Detection(e)),
        }
    }

    /// Interval to present at, or `None` to follow the screen.
    pub fn effective_interval(&self, system: VideoSystem) -> Option<Duration> {
        match self.option(system) {
            FrameTimeOption::Auto => None,
            FrameTimeOption::Original => {
                Some(Duration::from_secs_f64(1.0 / system.native_rate_hz()))
            }
            FrameTimeOption::Custom(interval) => Some(interval),
        }
    }

    pub fn label(&self, system: VideoSystem) -> String {
        match self.option(system) {
            FrameTimeOption::Auto => "Auto".to_string(),
            FrameTimeOption::Original => "Original".to_string(),
            FrameTimeOption::Custom(interval) => {
                format!("{:.2}Hz", 1.0 / interval.as_secs_f64())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_parse_decimal_and_fraction() {
        let decimal = parse_custom_rate("59.94").unwrap();
        assert!((1.0 / decimal.as_secs_f64() - 59.94).abs() < 1e-6);

        let fraction = parse_custom_rate(" 60000 / 1001 ").unwrap();
        assert!((1.0 / fraction.as_secs_f64() - 59.94006).abs() < 1e-4);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_custom_rate("fast"), Err(TimingError::InvalidRate(_))));
        assert!(matches!(parse_custom_rate("60/0"), Err(TimingError::InvalidRate(_))));
        assert!(matches!(parse_custom_rate("-60"), Err(TimingError::InvalidRate(_))));
        assert!(matches!(
            parse_custom_rate("300"),
            Err(TimingError::RateOutOfRange { .. })
        ));
        assert!(matches!(
            parse_custom_rate("10"),
            Err(TimingError::RateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_set_option_persists() {
        let store = StoreHandle::in_memory();
        let mut timing = OutputTimingManager::load(store.clone());
        assert_eq!(timing.option(VideoSystem::Pal), FrameTimeOption::Auto);

        let interval = Duration::from_millis(20);
        assert!(timing
            .set_option(VideoSystem::Pal, FrameTimeOption::Custom(interval))
            .unwrap());
        assert!(!timing
            .set_option(VideoSystem::Pal, FrameTimeOption::Custom(interval))
            .unwrap());

        let reloaded = OutputTimingManager::load(store);
        assert_eq!(
            reloaded.option(VideoSystem::Pal),
            FrameTimeOption::Custom(interval)
        );
        assert_eq!(reloaded.option(VideoSystem::Ntsc), FrameTimeOption::Auto);
        assert_eq!(reloaded.label(VideoSystem::Pal), "50.00Hz");
    }

    #[test]
    fn test_apply_detected() {
        let mut timing = OutputTimingManager::load(StoreHandle::in_memory());

        let cancelled = timing
            .apply_detected(VideoSystem::Ntsc, Err(DetectionError::Cancelled))
            .unwrap();
        assert_eq!(cancelled, None);
        assert_eq!(timing.option(VideoSystem::Ntsc), FrameTimeOption::Auto);

        let err = timing
            .apply_detected(
                VideoSystem::Ntsc,
                Err(DetectionError::Unstable { frames_seen: 1200 }),
            )
            .unwrap_err();
        assert!(err.to_string().contains("too unstable"));

        let interval = Duration::from_nanos(16_666_667);
        let applied = timing
            .apply_detected(VideoSystem::Ntsc, Ok(interval))
            .unwrap();
        assert_eq!(applied, Some(FrameTimeOption::Custom(interval)));
        assert_eq!(timing.effective_interval(VideoSystem::Ntsc), Some(interval));
        assert_eq!(timing.label(VideoSystem::Ntsc), "60.00Hz");
    }

    #[test]
    fn test_original_uses_native_rate() {
        let mut timing = OutputTimingManager::load(StoreHandle::in_memory());
        timing
            .set_option(VideoSystem::Ntsc, FrameTimeOption::Original)
            .unwrap();
        let interval = timing.effective_interval(VideoSystem::Ntsc).unwrap();
        assert!((1.0 / interval.as_secs_f64() - 60.0988).abs() < 1e-6);
        assert_eq!(timing.label(VideoSystem::Ntsc), "Original");
        assert_eq!(timing.effective_interval(VideoSystem::Pal), None);
    }

    #[test]
    fn test_failed_write_keeps_new_value() {
        let store = MemoryStore::new();
        let switch = store.failure_switch();
        let mut timing = OutputTimingManager::load(StoreHandle::new(store));

        switch.store(true, Ordering::SeqCst);
        let err = timing
            .set_option(VideoSystem::Pal, FrameTimeOption::Original)
            .unwrap_err();
        assert!(matches!(err, TimingError::Persistence(_)));
        assert_eq!(timing.option(VideoSystem::Pal), FrameTimeOption::Original);
    }
}
