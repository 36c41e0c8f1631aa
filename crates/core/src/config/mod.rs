use std::{ops::RangeInclusive, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Result, TempoOrbitError};

/// Accepted rotation rates. Values outside the range are clamped on merge.
pub const SPEED_RANGE: RangeInclusive<f32> = 0.01..=20.0;
/// Accepted intensity multipliers.
pub const INTENSITY_RANGE: RangeInclusive<f32> = 0.0..=4.0;
/// Accepted orbit radii.
pub const RADIUS_RANGE: RangeInclusive<f32> = 0.1..=50.0;
/// Accepted reference frame rates in Hz.
pub const TICK_RATE_RANGE: RangeInclusive<f32> = 1.0..=1_000.0;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tempo: TempoConfig,
    pub spatial: SpatializationConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Reads a TOML file. Missing sections and fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.validate()?;
        config.spatial = config.spatial.clamped();
        Ok(config)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.tempo.validate()?;
        self.engine.validate()
    }
}

/// Parameters of the short-time energy analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Length of one energy window in seconds.
    pub window_seconds: f32,
    /// Fraction of a window shared with the next one.
    pub overlap: f32,
    /// Fraction of the loudest window a peak has to exceed.
    pub peak_threshold: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            window_seconds: 0.1,
            overlap: 0.5,
            peak_threshold: 0.3,
        }
    }
}

impl TempoConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.window_seconds > 0.0 && self.window_seconds.is_finite()) {
            return Err(TempoOrbitError::InvalidConfig(format!(
                "tempo.window_seconds must be positive, got {}",
                self.window_seconds
            )));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(TempoOrbitError::InvalidConfig(format!(
                "tempo.overlap must lie in [0, 1), got {}",
                self.overlap
            )));
        }
        if !(0.0..=1.0).contains(&self.peak_threshold) {
            return Err(TempoOrbitError::InvalidConfig(format!(
                "tempo.peak_threshold must lie in [0, 1], got {}",
                self.peak_threshold
            )));
        }
        Ok(())
    }
}

/// Parameters of the circular motion. Owned by the rotation engine once it
/// is constructed; later changes go through [`ConfigUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatializationConfig {
    /// Rotation rate, roughly in revolutions-per-second units.
    pub speed: f32,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for SpatializationConfig {
    fn default() -> Self {
        Self {
            speed: 2.5,
            intensity: 1.0,
            radius: 5.0,
        }
    }
}

impl SpatializationConfig {
    /// Returns a copy with every field forced into its accepted range.
    /// Non-finite fields are replaced by their defaults.
    pub fn clamped(self) -> Self {
        let defaults = Self::default();
        Self {
            speed: clamp_field("speed", self.speed, &SPEED_RANGE).unwrap_or(defaults.speed),
            intensity: clamp_field("intensity", self.intensity, &INTENSITY_RANGE)
                .unwrap_or(defaults.intensity),
            radius: clamp_field("radius", self.radius, &RADIUS_RANGE).unwrap_or(defaults.radius),
        }
    }

    /// Merges the provided fields. Unset or non-finite fields keep their
    /// prior values.
    pub fn merge(&mut self, update: &ConfigUpdate) {
        if let Some(speed) = update.speed.and_then(|v| clamp_field("speed", v, &SPEED_RANGE)) {
            self.speed = speed;
        }
        if let Some(intensity) = update
            .intensity
            .and_then(|v| clamp_field("intensity", v, &INTENSITY_RANGE))
        {
            self.intensity = intensity;
        }
        if let Some(radius) = update.radius.and_then(|v| clamp_field("radius", v, &RADIUS_RANGE)) {
            self.radius = radius;
        }
    }
}

fn clamp_field(name: &str, value: f32, range: &RangeInclusive<f32>) -> Option<f32> {
    if !value.is_finite() {
        tracing::warn!(field = name, value, "ignoring non-finite spatialization value");
        return None;
    }
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        tracing::debug!(field = name, value, clamped, "clamped spatialization value");
    }
    Some(clamped)
}

/// Partial update of a [`SpatializationConfig`]. Unknown fields are ignored
/// when deserialising.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub speed: Option<f32>,
    pub intensity: Option<f32>,
    pub radius: Option<f32>,
}

impl ConfigUpdate {
    pub fn speed(speed: f32) -> Self {
        Self {
            speed: Some(speed),
            ..Default::default()
        }
    }

    /// Parses an update sent as a JSON object, e.g. `{"speed": 1.5}`.
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_none() && self.intensity.is_none() && self.radius.is_none()
    }
}

/// Settings of the rotation engine itself and its spectrum analyser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reference frame rate. One frame at this rate advances the angle by
    /// exactly one tick.
    pub tick_rate_hz: f32,
    /// FFT length of the analyser; snapshots hold half as many bins.
    pub analysis_window: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub input_gain: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            analysis_window: 2048,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            input_gain: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let window = self.analysis_window;
        if !window.is_power_of_two() || !(32..=32_768).contains(&window) {
            return Err(TempoOrbitError::InvalidConfig(format!(
                "engine.analysis_window must be a power of two in [32, 32768], got {window}"
            )));
        }
        if !TICK_RATE_RANGE.contains(&self.tick_rate_hz) {
            return Err(TempoOrbitError::InvalidConfig(format!(
                "engine.tick_rate_hz must lie in [{}, {}], got {}",
                TICK_RATE_RANGE.start(),
                TICK_RATE_RANGE.end(),
                self.tick_rate_hz
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(TempoOrbitError::InvalidConfig(format!(
                "engine.smoothing must lie in [0, 1), got {}",
                self.smoothing
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(TempoOrbitError::InvalidConfig(format!(
                "engine.min_decibels ({}) must be below engine.max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        if !(self.input_gain >= 0.0 && self.input_gain.is_finite()) {
            return Err(TempoOrbitError::InvalidConfig(format!(
                "engine.input_gain must be non-negative, got {}",
                self.input_gain
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.spatial.speed, 2.5);
        assert_eq!(config.spatial.intensity, 1.0);
        assert_eq!(config.spatial.radius, 5.0);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [spatial]
            radius = 2.0

            [engine]
            analysis_window = 256
            "#,
        )
        .unwrap();

        assert_eq!(config.spatial.radius, 2.0);
        assert_eq!(config.spatial.speed, 2.5);
        assert_eq!(config.engine.analysis_window, 256);
        assert_eq!(config.engine.tick_rate_hz, 60.0);
    }

    #[test]
    fn file_values_are_clamped() {
        let config = AppConfig::from_toml("[spatial]\nradius = -3.0\nintensity = 100.0\n").unwrap();
        assert_eq!(config.spatial.radius, *RADIUS_RANGE.start());
        assert_eq!(config.spatial.intensity, *INTENSITY_RANGE.end());
    }

    #[test]
    fn rejects_invalid_analysis_window() {
        let err = AppConfig::from_toml("[engine]\nanalysis_window = 1000\n").unwrap_err();
        assert!(format!("{err}").contains("analysis_window"));
    }

    #[test]
    fn rejects_out_of_range_tick_rates() {
        for rate in ["0.0", "1e-20", "0.5", "5000.0", "nan"] {
            let err = AppConfig::from_toml(&format!("[engine]\ntick_rate_hz = {rate}\n")).unwrap_err();
            assert!(format!("{err}").contains("tick_rate_hz"), "{rate}: {err}");
        }
        assert!(AppConfig::from_toml("[engine]\ntick_rate_hz = 1000.0\n").is_ok());
    }

    #[test]
    fn rejects_smoothing_outside_unit_interval() {
        for smoothing in ["1.0", "-0.1", "2.5"] {
            let err =
                AppConfig::from_toml(&format!("[engine]\nsmoothing = {smoothing}\n")).unwrap_err();
            assert!(format!("{err}").contains("smoothing"), "{smoothing}: {err}");
        }
        assert!(AppConfig::from_toml("[engine]\nsmoothing = 0.0\n").is_ok());
    }

    #[test]
    fn rejects_invalid_tempo_settings() {
        let cases = [
            ("overlap = 1.0", "overlap"),
            ("overlap = -0.5", "overlap"),
            ("window_seconds = 0.0", "window_seconds"),
            ("window_seconds = -0.1", "window_seconds"),
            ("peak_threshold = 1.5", "peak_threshold"),
        ];
        for (line, field) in cases {
            let err = AppConfig::from_toml(&format!("[tempo]\n{line}\n")).unwrap_err();
            assert!(matches!(err, TempoOrbitError::InvalidConfig(_)), "{line}");
            assert!(format!("{err}").contains(field), "{line}: {err}");
        }
        assert!(TempoConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_decibel_range() {
        let err =
            AppConfig::from_toml("[engine]\nmin_decibels = -10.0\nmax_decibels = -20.0\n").unwrap_err();
        assert!(matches!(err, TempoOrbitError::InvalidConfig(_)));
    }

    #[test]
    fn merge_only_touches_provided_fields() {
        let mut config = SpatializationConfig::default();
        config.merge(&ConfigUpdate {
            intensity: Some(0.5),
            ..Default::default()
        });

        assert_eq!(config.intensity, 0.5);
        assert_eq!(config.speed, 2.5);
        assert_eq!(config.radius, 5.0);
    }

    #[test]
    fn merge_clamps_and_skips_non_finite() {
        let mut config = SpatializationConfig::default();
        config.merge(&ConfigUpdate {
            speed: Some(f32::NAN),
            intensity: Some(-1.0),
            radius: Some(1_000.0),
        });

        assert_eq!(config.speed, 2.5);
        assert_eq!(config.intensity, 0.0);
        assert_eq!(config.radius, 50.0);
    }

    #[test]
    fn json_updates_ignore_unknown_fields() {
        let update = ConfigUpdate::from_json(r#"{"speed": 1.5, "tilt": 3}"#).unwrap();
        assert_eq!(update, ConfigUpdate::speed(1.5));
        assert!(ConfigUpdate::from_json("{}").unwrap().is_empty());
        assert!(ConfigUpdate::from_json("not json").is_err());
    }
}
