//! Pose-estimation collaborators and the registry they are injected through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::adapter::RawDetection;
use super::topology::Backend;
use crate::error::{MeasureError, MeasureResult};
use crate::imaging::DecodedImage;

/// A loaded pose model (or a connection to one).
///
/// One inference may yield several topology layers, e.g. MediaPipe returns both image
/// landmarks and world landmarks. Implementations that cannot run concurrently serialize
/// internally.
#[async_trait]
pub trait PoseBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Layers returned by `infer`
    fn provides(&self) -> &[Backend];

    /// One `RawDetection` per provided layer; empty keypoints when nobody is visible
    async fn infer(&self, image: &DecodedImage) -> anyhow::Result<Vec<RawDetection>>;
}

/// Backends constructed at startup, looked up by the layer they provide.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    providers: Vec<Arc<dyn PoseBackend>>,
    by_layer: HashMap<Backend, usize>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider; the first provider registered for a layer wins
    pub fn register(&mut self, backend: Arc<dyn PoseBackend>) {
        let idx = self.providers.len();
        for &layer in backend.provides() {
            self.by_layer.entry(layer).or_insert(idx);
        }
        self.providers.push(backend);
    }

    pub fn with(mut self, backend: Arc<dyn PoseBackend>) -> Self {
        self.register(backend);
        self
    }

    /// Index and handle of the provider serving `layer`
    pub fn provider(&self, layer: Backend) -> MeasureResult<(usize, &Arc<dyn PoseBackend>)> {
        let idx = *self
            .by_layer
            .get(&layer)
            .ok_or(MeasureError::BackendUnavailable(layer))?;
        Ok((idx, &self.providers[idx]))
    }

    pub fn supports(&self, layer: Backend) -> bool {
        self.by_layer.contains_key(&layer)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
