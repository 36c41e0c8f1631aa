use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    config::{ConfigUpdate, SpatializationConfig},
    timeline::FrameRequest,
    Result, TempoOrbitError,
};

use super::{Position3, RotationState, SpatialRotationEngine};

/// Thread-safe handle over one [`SpatialRotationEngine`]. Every operation
/// runs under a single mutex, so frame callbacks and configuration updates
/// issued from different threads are serialised.
#[derive(Clone)]
pub struct SharedEngine {
    shared: Arc<Mutex<Option<SpatialRotationEngine>>>,
}

impl SharedEngine {
    pub fn new(engine: SpatialRotationEngine) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Some(engine))),
        }
    }

    pub fn start(&self) -> Result<()> {
        self.with(SpatialRotationEngine::start)
    }

    pub fn stop(&self) -> Result<()> {
        self.with(SpatialRotationEngine::stop)
    }

    pub fn tick(&self) -> Result<Option<Position3>> {
        self.with(SpatialRotationEngine::tick)
    }

    pub fn on_frame(&self, request: FrameRequest, elapsed: Duration) -> Result<Option<Position3>> {
        self.with(|engine| engine.on_frame(request, elapsed))
    }

    pub fn update_config(&self, update: &ConfigUpdate) -> Result<SpatializationConfig> {
        self.with(|engine| engine.update_config(update))
    }

    pub fn render(&self, frames: usize) -> Result<Vec<f32>> {
        self.with(|engine| engine.render(frames))?
    }

    pub fn state(&self) -> Result<RotationState> {
        self.with(|engine| engine.state())
    }

    /// Copies the latest spectrum snapshot.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        self.with(|engine| engine.snapshot().to_vec())
    }

    /// Destroys the engine for every clone of this handle. Later calls fail.
    pub fn destroy(&self) -> Result<()> {
        let engine = self
            .lock()?
            .take()
            .ok_or_else(|| TempoOrbitError::msg("rotation engine has already been destroyed"))?;
        engine.destroy();
        Ok(())
    }

    fn with<R>(&self, f: impl FnOnce(&mut SpatialRotationEngine) -> R) -> Result<R> {
        let mut slot = self.lock()?;
        let engine = slot
            .as_mut()
            .ok_or_else(|| TempoOrbitError::msg("rotation engine has been destroyed"))?;
        Ok(f(engine))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<SpatialRotationEngine>>> {
        self.shared
            .lock()
            .map_err(|_| TempoOrbitError::msg("rotation engine lock has been poisoned"))
    }
}

impl fmt::Debug for SharedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedEngine").finish()
    }
}
