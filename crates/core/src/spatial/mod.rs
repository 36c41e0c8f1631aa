//! Tempo-synchronised circular motion of a virtual source around the
//! listener.
//!
//! [`SpatialRotationEngine`] owns the upstream [`SourceNode`], pipes its
//! signal through an input gain and a [`SpectrumAnalyser`], and publishes the
//! source position to a downstream [`Panner`] on every frame. Frames are
//! requested through a [`FrameScheduler`]; the engine never holds more than
//! one outstanding request.

mod handle;
mod spectrum;

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    audio::SourceNode,
    config::{ConfigUpdate, EngineConfig, SpatializationConfig},
    timeline::{FrameRequest, FrameScheduler},
    Result,
};

pub use handle::SharedEngine;
pub use spectrum::SpectrumAnalyser;

/// Radians per tick at speed 1.
pub const ANGULAR_GAIN: f32 = 0.05;

/// A point in listener space: x to the right, y up, negative z ahead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position3 {
    /// Directly ahead of the listener.
    pub const CENTER_FRONT: Self = Self {
        x: 0.0,
        y: 0.0,
        z: -1.0,
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    /// Accumulated phase in radians, never wrapped.
    pub angle: f32,
    pub is_active: bool,
}

/// Downstream spatializer consuming the position stream.
pub trait Panner: Send {
    fn set_position(&mut self, position: Position3);

    /// Called once when the engine is destroyed.
    fn release(&mut self) {}
}

pub struct SpatialRotationEngine {
    config: SpatializationConfig,
    tick_rate_hz: f32,
    input_gain: f32,
    state: RotationState,
    position: Position3,
    pending: Option<FrameRequest>,
    released: bool,
    scheduler: Box<dyn FrameScheduler>,
    source: Box<dyn SourceNode>,
    panner: Box<dyn Panner>,
    analyser: SpectrumAnalyser,
}

impl SpatialRotationEngine {
    /// Takes exclusive ownership of `source` and wires it through the
    /// analyser to `panner`. The engine starts stopped, parked at
    /// [`Position3::CENTER_FRONT`].
    pub fn new(
        source: impl SourceNode + 'static,
        panner: impl Panner + 'static,
        scheduler: impl FrameScheduler + 'static,
        config: SpatializationConfig,
        engine: &EngineConfig,
    ) -> Result<Self> {
        engine.validate()?;
        let analyser = SpectrumAnalyser::new(engine)?;

        let mut panner: Box<dyn Panner> = Box::new(panner);
        panner.set_position(Position3::CENTER_FRONT);

        Ok(Self {
            config: config.clamped(),
            tick_rate_hz: engine.tick_rate_hz,
            input_gain: engine.input_gain,
            state: RotationState::default(),
            position: Position3::CENTER_FRONT,
            pending: None,
            released: false,
            scheduler: Box::new(scheduler),
            source: Box::new(source),
            panner,
            analyser,
        })
    }

    pub fn config(&self) -> SpatializationConfig {
        self.config
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    pub fn position(&self) -> Position3 {
        self.position
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active
    }

    /// The frame request the engine is waiting for, if any.
    pub fn pending_frame(&self) -> Option<FrameRequest> {
        self.pending
    }

    /// Starts rotating from the current angle. No-op while running.
    pub fn start(&mut self) {
        if self.state.is_active {
            return;
        }

        self.state.is_active = true;
        self.pending = Some(self.scheduler.request_frame());
        tracing::debug!(angle = self.state.angle, "rotation started");
    }

    /// Stops rotating, cancels the outstanding frame and parks the source at
    /// [`Position3::CENTER_FRONT`]. The angle is kept for the next start.
    pub fn stop(&mut self) {
        if let Some(request) = self.pending.take() {
            self.scheduler.cancel_frame(request);
        }
        if self.state.is_active {
            tracing::debug!(angle = self.state.angle, "rotation stopped");
        }

        self.state.is_active = false;
        self.position = Position3::CENTER_FRONT;
        self.panner.set_position(self.position);
    }

    /// Advances by one reference tick (`speed * 0.05` radians). Returns
    /// `None` while stopped.
    pub fn tick(&mut self) -> Option<Position3> {
        if !self.state.is_active {
            return None;
        }
        Some(self.advance_ticks(1.0))
    }

    /// Advances by `elapsed` wall-clock time; one period of the configured
    /// tick rate equals one [`tick`](Self::tick).
    pub fn advance(&mut self, elapsed: Duration) -> Option<Position3> {
        if !self.state.is_active {
            return None;
        }
        Some(self.advance_ticks(elapsed.as_secs_f32() * self.tick_rate_hz))
    }

    /// Handles a frame callback from the scheduler. Requests that are not
    /// the outstanding one (cancelled or stale) are ignored; otherwise the
    /// rotation advances and the next frame is requested.
    pub fn on_frame(&mut self, request: FrameRequest, elapsed: Duration) -> Option<Position3> {
        if self.pending != Some(request) {
            tracing::trace!(request = request.id(), "ignoring stale frame");
            return None;
        }

        self.pending = None;
        let position = self.advance(elapsed);
        if self.state.is_active {
            self.pending = Some(self.scheduler.request_frame());
        }
        position
    }

    /// Merges `update` into the current configuration. Takes effect on the
    /// next tick; the angle is left untouched.
    pub fn update_config(&mut self, update: &ConfigUpdate) -> SpatializationConfig {
        self.config.merge(update);
        tracing::debug!(?update, config = ?self.config, "spatialization updated");
        self.config
    }

    /// Pulls up to `frames` samples from the source, applies the input gain
    /// and feeds the analyser. Returns the processed block for the
    /// downstream spatializer; an empty block marks the end of the source.
    pub fn render(&mut self, frames: usize) -> Result<Vec<f32>> {
        let mut block = vec![0.0; frames];
        let count = self.source.read(&mut block);
        block.truncate(count);

        for sample in &mut block {
            *sample *= self.input_gain;
        }
        self.analyser.push(&block)?;
        Ok(block)
    }

    /// Latest byte-scaled magnitude spectrum; all zeros until a signal has
    /// been rendered.
    pub fn snapshot(&self) -> &[u8] {
        self.analyser.snapshot()
    }

    /// Stops the rotation and releases the source and panner.
    pub fn destroy(mut self) {
        self.release();
    }

    fn advance_ticks(&mut self, ticks: f32) -> Position3 {
        self.state.angle += self.config.speed * ANGULAR_GAIN * ticks;

        let reach = self.config.radius * self.config.intensity;
        self.position = Position3 {
            x: self.state.angle.cos() * reach,
            y: 0.0,
            z: self.state.angle.sin() * reach,
        };
        self.panner.set_position(self.position);
        self.position
    }

    fn release(&mut self) {
        if self.released {
            return;
        }

        self.stop();
        self.source.disconnect();
        self.panner.release();
        self.released = true;
        tracing::debug!("rotation engine released");
    }
}

impl Drop for SpatialRotationEngine {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SpatialRotationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialRotationEngine")
            .field("config", &self.config)
            .field("tick_rate_hz", &self.tick_rate_hz)
            .field("state", &self.state)
            .field("position", &self.position)
            .field("pending", &self.pending)
            .field("analyser", &self.analyser)
            .finish()
    }
}
