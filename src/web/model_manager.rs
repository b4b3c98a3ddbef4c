use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::{spawn_blocking, JoinError};

use super::backend::{ModelHandle, ModelLoader, Tokenizer};
use super::error::{ReclaimWarning, SidecarError};
use super::model_source::ModelSource;
use super::models::StatusView;

/// The resident model: weights and tokenizer always travel together.
pub struct ModelSlot {
    pub handle: Box<dyn ModelHandle>,
    pub tokenizer: Box<dyn Tokenizer>,
    /// Path string exactly as the caller supplied it.
    pub source_path: String,
}

impl std::fmt::Debug for ModelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSlot")
            .field("source_path", &self.source_path)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadStatus {
    Unloaded,
    NoModelLoaded,
}

impl UnloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnloadStatus::Unloaded => "unloaded",
            UnloadStatus::NoModelLoaded => "no_model_loaded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadOutcome {
    pub status: UnloadStatus,
    pub warnings: Vec<ReclaimWarning>,
}

/// Owner of the single model slot.
///
/// The slot mutex is only held long enough to clone or swap an `Arc`, so status
/// queries never wait on a load or a generation. Load and unload are serialized
/// by a separate async transition lock.
pub struct ModelLifecycleManager {
    loader: Arc<dyn ModelLoader>,
    slot: Mutex<Option<Arc<ModelSlot>>>,
    transition: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ModelLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLifecycleManager")
            .field("loader", &self.loader.name())
            .field("status", &self.status())
            .finish()
    }
}

impl ModelLifecycleManager {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slot: Mutex::new(None),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<ModelSlot>>> {
        // Handle poisoned mutex by recovering from panic
        self.slot.lock().unwrap_or_else(|poisoned| {
            debug!("Model slot mutex was poisoned, recovering...");
            poisoned.into_inner()
        })
    }

    pub fn status(&self) -> StatusView {
        let model_path = self.lock_slot().as_ref().map(|slot| slot.source_path.clone());
        StatusView {
            running: true,
            model_loaded: model_path.is_some(),
            model_path,
        }
    }

    /// Snapshot the resident model for one generation. The snapshot stays valid
    /// even if the slot is unloaded or replaced meanwhile.
    pub fn acquire(&self) -> Option<Arc<ModelSlot>> {
        self.lock_slot().clone()
    }

    /// Replace whatever is resident with the model at `path`.
    ///
    /// The previous model is released before the new one is acquired, so two
    /// models are never held by the slot at once. On failure the slot is empty.
    pub async fn load(&self, path: &str) -> Result<(), SidecarError> {
        let _transition = self.transition.lock().await;

        let previous = self.lock_slot().take();
        if let Some(previous) = previous {
            info!("Releasing {} before loading {path}", previous.source_path);
            self.release(previous).await;
        }

        info!("Loading model from {path} using {} backend", self.loader.name());
        let started = std::time::Instant::now();

        let loader = Arc::clone(&self.loader);
        let requested = path.to_string();
        let result = spawn_blocking(move || {
            let source = ModelSource::resolve(&requested)?;
            debug!("Resolved {requested} to {source:?}");
            loader.load(&source)
        })
        .await;

        let loaded = match result {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(cause)) => return Err(self.load_failed(path, cause)),
            Err(join_error) => return Err(self.load_failed(path, join_error_cause(join_error))),
        };

        *self.lock_slot() = Some(Arc::new(ModelSlot {
            handle: loaded.handle,
            tokenizer: loaded.tokenizer,
            source_path: path.to_string(),
        }));

        info!("Model loaded successfully in {:.2?}: {path}", started.elapsed());
        Ok(())
    }

    fn load_failed(&self, path: &str, cause: String) -> SidecarError {
        warn!("Failed to load model {path}: {cause}");
        SidecarError::LoadFailed {
            path: path.to_string(),
            cause,
        }
    }

    /// Empty the slot and reclaim the model's memory. Never fails; release
    /// problems come back as warnings.
    pub async fn unload(&self) -> UnloadOutcome {
        let _transition = self.transition.lock().await;

        let previous = self.lock_slot().take();
        let Some(previous) = previous else {
            debug!("Unload requested with no model loaded");
            return UnloadOutcome {
                status: UnloadStatus::NoModelLoaded,
                warnings: Vec::new(),
            };
        };

        info!("Unloading model {}", previous.source_path);
        let warnings = self.release(previous).await;
        UnloadOutcome {
            status: UnloadStatus::Unloaded,
            warnings,
        }
    }

    pub async fn shutdown(&self) {
        let outcome = self.unload().await;
        if outcome.status == UnloadStatus::Unloaded {
            info!("Model released on shutdown");
        }
    }

    /// Drop our reference to a model taken out of the slot, then ask the
    /// backend to clear its caches.
    async fn release(&self, slot: Arc<ModelSlot>) -> Vec<ReclaimWarning> {
        let mut warnings = Vec::new();

        match Arc::try_unwrap(slot) {
            Ok(slot) => drop(slot),
            Err(shared) => {
                let holders = Arc::strong_count(&shared).saturating_sub(1);
                warnings.push(ReclaimWarning::InFlight { holders });
            }
        }

        let loader = Arc::clone(&self.loader);
        match spawn_blocking(move || loader.reclaim()).await {
            Ok(Ok(())) => {}
            Ok(Err(cause)) => warnings.push(ReclaimWarning::AcceleratorCache(cause)),
            Err(join_error) => {
                warnings.push(ReclaimWarning::AcceleratorCache(join_error_cause(join_error)))
            }
        }

        for warning in &warnings {
            warn!("Model release: {warning}");
        }
        warnings
    }
}

/// Describe a failed blocking task, including the panic payload when there is one.
pub(crate) fn join_error_cause(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("backend panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("backend panicked: {msg}")
    } else {
        "backend panicked".to_string()
    }
}
