//! Routing from tempo to rotation parameters.
//!
//! [`map_speed`] turns a tempo into a base rotation rate, the [`rhythm`]
//! module snaps user multipliers onto musical ratios, and [`speed_update`]
//! combines both into the update a running engine consumes.

pub mod rhythm;

use crate::{analysis::TempoEstimate, config::ConfigUpdate};

pub use rhythm::{candidate_ratios, closest, CANDIDATE_RATIOS};

/// Fraction of the beat frequency used as base rotation rate.
const BEAT_FRACTION: f32 = 0.25;
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 5.0;

/// Maps a tempo onto a base rotation frequency in `[0.5, 5.0]`, rounded to
/// two decimals.
pub fn map_speed(bpm: u32) -> f32 {
    let beat_frequency = bpm as f32 / 60.0;
    let speed = (beat_frequency * BEAT_FRACTION).clamp(MIN_SPEED, MAX_SPEED);
    (speed * 100.0).round() / 100.0
}

/// Rotation speed for a tempo estimate and a free-form user multiplier. The
/// multiplier is quantized to the nearest rhythmic ratio first.
pub fn rotation_speed(estimate: &TempoEstimate, multiplier: f32) -> f32 {
    estimate.optimal_speed * closest(multiplier, estimate.bpm)
}

/// Builds the partial engine update that retunes the rotation to a tempo.
pub fn speed_update(estimate: &TempoEstimate, multiplier: f32) -> ConfigUpdate {
    ConfigUpdate::speed(rotation_speed(estimate, multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_stays_in_bounds_for_supported_tempi() {
        for bpm in 60..=200 {
            let speed = map_speed(bpm);
            assert!((MIN_SPEED..=MAX_SPEED).contains(&speed), "bpm {bpm} -> {speed}");
        }
    }

    #[test]
    fn speed_is_clamped_and_rounded() {
        assert_eq!(map_speed(0), 0.5);
        assert_eq!(map_speed(120), 0.5);
        assert_eq!(map_speed(180), 0.75);
        assert_eq!(map_speed(200), 0.83);
        assert_eq!(map_speed(2_000), 5.0);
    }

    #[test]
    fn rotation_speed_uses_quantized_multiplier() {
        let estimate = TempoEstimate {
            bpm: 180,
            confidence: 0.85,
            optimal_speed: 0.75,
        };

        assert!((rotation_speed(&estimate, 1.9) - 1.5).abs() < 1e-6);
        assert_eq!(speed_update(&estimate, 1.0), ConfigUpdate::speed(0.75));
    }
}
