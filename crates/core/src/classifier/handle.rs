use crate::classifier::{EmotionModel, ModelError};
use crate::emotion::Emotion;
use std::path::Path;
use std::sync::{Arc, RwLock};

const LOG_TARGET: &str = "classifier::handle";

/// Shared, swappable reference to the current model.
///
/// Readers take a snapshot and keep using it for as long as they like;
/// `replace` only changes which model later snapshots see.
#[derive(Clone)]
pub struct ModelHandle {
    current: Arc<RwLock<Arc<EmotionModel>>>,
}

impl ModelHandle {
    pub fn new(model: EmotionModel) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(model))),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        EmotionModel::load(path).map(Self::new)
    }

    pub fn snapshot(&self) -> Arc<EmotionModel> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Installs `model` and returns the one it displaced.
    pub fn replace(&self, model: EmotionModel) -> Arc<EmotionModel> {
        let next = Arc::new(model);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }

    /// Loads a fresh artifact and swaps it in. On error the current model stays.
    pub fn reload_from(&self, path: &Path) -> Result<(), ModelError> {
        let model = EmotionModel::load(path)?;
        self.replace(model);
        tracing::info!(target: LOG_TARGET, path = %path.display(), "model swapped");
        Ok(())
    }

    pub fn predict(&self, descriptor: &[f32]) -> Result<Emotion, ModelError> {
        self.snapshot().predict(descriptor)
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let model = self.snapshot();
        f.debug_struct("ModelHandle")
            .field("labels", &model.labels())
            .field("dimension", &model.dimension())
            .finish()
    }
}
