//! D-pad touch geometry.

use crate::element::DPadConfig;
use crate::geometry::{Density, Point, Rect, Size};
use crate::keys::KeyCode;
use serde::Serialize;

/// D-pad side length as a multiple of the button size.
pub const DPAD_SIZE_FACTOR: f64 = 2.5;

pub fn dpad_size(button_px: i32) -> Size {
    Size::square((f64::from(button_px) * DPAD_SIZE_FACTOR).round() as i32)
}

/// Directions pressed by a touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DPadDirections {
    pub up: bool,
    pub right: bool,
    pub down: bool,
    pub left: bool,
}

impl DPadDirections {
    pub fn is_none(&self) -> bool {
        !(self.up || self.right || self.down || self.left)
    }

    /// Keys of the pressed directions, in up/right/down/left order.
    pub fn keys(&self, config: &DPadConfig) -> Vec<KeyCode> {
        [self.up, self.right, self.down, self.left]
            .iter()
            .zip(config.keys.iter())
            .filter(|(pressed, _)| **pressed)
            .map(|(_, key)| key.code)
            .collect()
    }
}

/// Half-width in degrees of the band around each diagonal that counts as
/// that diagonal.
pub fn diagonal_band_degrees(sensitivity: f64) -> f64 {
    22.5 * (2.0 - sensitivity.clamp(0.0, 1.0))
}

/// Directions pressed by a touch at `p` on a d-pad drawn in `bounds`.
pub fn directions_at(
    config: &DPadConfig,
    bounds: &Rect,
    density: &dyn Density,
    p: Point,
) -> DPadDirections {
    let mut dirs = DPadDirections::default();
    if !bounds.contains(p) {
        return dirs;
    }

    let center = bounds.center();
    let dx = f64::from(p.x - center.x);
    let dy = f64::from(center.y - p.y);
    let deadzone_px = f64::from(density.mm_to_px(f64::from(config.deadzone) / 100.0));
    if dx.hypot(dy) < deadzone_px {
        return dirs;
    }

    // 0 is right, counter-clockwise
    let angle = dy.atan2(dx).to_degrees().rem_euclid(360.0);
    let nearest_diagonal = (angle / 90.0).floor() * 90.0 + 45.0;
    let band = diagonal_band_degrees(config.diagonal_sensitivity);

    if (angle - nearest_diagonal).abs() <= band {
        match nearest_diagonal as i32 {
            45 => (dirs.up, dirs.right) = (true, true),
            135 => (dirs.up, dirs.left) = (true, true),
            225 => (dirs.down, dirs.left) = (true, true),
            _ => (dirs.down, dirs.right) = (true, true),
        }
        return dirs;
    }

    match ((angle + 45.0) / 90.0).floor() as i32 % 4 {
        0 => dirs.right = true,
        1 => dirs.up = true,
        2 => dirs.left = true,
        _ => dirs.down = true,
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Dpi;
    use crate::keys::key;

    fn pad(sensitivity: f64) -> DPadConfig {
        let mut config = DPadConfig::new([key::UP, key::RIGHT, key::DOWN, key::LEFT]);
        config.diagonal_sensitivity = sensitivity;
        config.deadzone = 100;
        config
    }

    // 254 dpi gives 10px per mm, so the 1mm deadzone is 10px
    const DPI: Dpi = Dpi(254.0);
    const BOUNDS: Rect = Rect::new(0, 0, 200, 200);

    fn at(config: &DPadConfig, x: i32, y: i32) -> DPadDirections {
        directions_at(config, &BOUNDS, &DPI, Point::new(x, y))
    }

    #[test]
    fn test_deadzone_and_outside() {
        let config = pad(1.0);
        assert!(at(&config, 105, 100).is_none());
        assert!(directions_at(&config, &BOUNDS, &DPI, Point::new(250, 100)).is_none());
    }

    #[test]
    fn test_cardinals() {
        let config = pad(1.0);
        assert_eq!(at(&config, 190, 100).keys(&config), vec![key::RIGHT]);
        assert_eq!(at(&config, 100, 10).keys(&config), vec![key::UP]);
        assert_eq!(at(&config, 10, 100).keys(&config), vec![key::LEFT]);
        assert_eq!(at(&config, 100, 190).keys(&config), vec![key::DOWN]);
    }

    #[test]
    fn test_diagonals() {
        let config = pad(1.0);
        assert_eq!(at(&config, 180, 20).keys(&config), vec![key::UP, key::RIGHT]);
        assert_eq!(at(&config, 20, 180).keys(&config), vec![key::DOWN, key::LEFT]);
    }

    #[test]
    fn test_sensitivity_widens_diagonal_band() {
        // About 18 degrees above the right axis
        let (x, y) = (190, 71);
        assert_eq!(at(&pad(1.0), x, y).keys(&pad(1.0)), vec![key::RIGHT]);
        assert_eq!(at(&pad(0.4), x, y).keys(&pad(0.4)), vec![key::UP, key::RIGHT]);
    }

    #[test]
    fn test_band_width() {
        assert_eq!(diagonal_band_degrees(1.0), 22.5);
        assert!((diagonal_band_degrees(0.5) - 33.75).abs() < 1e-9);
        assert_eq!(dpad_size(40), Size::square(100));
    }
}
