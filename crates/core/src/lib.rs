//! Core library for the Tempo Orbit rotation engine.
//!
//! Audio flows through the crate in one direction: a [`PcmSource`] decodes a
//! file, the [`TempoEstimator`] turns the samples into a [`TempoEstimate`],
//! the [`mapping`] module derives a musically quantized rotation speed from
//! it, and the [`SpatialRotationEngine`] turns that speed into a stream of
//! listener-space positions for an external spatializer.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod mapping;
pub mod spatial;
pub mod timeline;

pub use analysis::{EnergyWindow, TempoAnalysis, TempoEstimate, TempoEstimator};
pub use audio::{BufferSource, PcmBuffer, PcmSource, SourceNode};
pub use config::{AppConfig, ConfigUpdate, EngineConfig, SpatializationConfig, TempoConfig};
pub use error::{Result, TempoOrbitError};
pub use mapping::{candidate_ratios, closest, map_speed, rotation_speed, speed_update};
pub use spatial::{
    Panner, Position3, RotationState, SharedEngine, SpatialRotationEngine, SpectrumAnalyser,
};
pub use timeline::{FrameClock, FrameQueue, FrameRequest, FrameScheduler};
