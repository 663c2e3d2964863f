use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;
use snafu::ensure;
use tokio::sync::{OnceCell, RwLock};

use super::backend::{BackendFactory, Generator, LoadedBackend, Processor};
use super::error::{EmptyIdentifierSnafu, ModelLoadResult};

/// A loaded model, shared read-only by every session that uses its identifier.
pub struct ModelHandle {
    identifier: String,
    processor: Arc<dyn Processor>,
    model: Arc<dyn Generator>,
    loaded_at_unix_seconds: u64,
}

impl ModelHandle {
    pub fn new(identifier: impl Into<String>, backend: LoadedBackend) -> Self {
        Self {
            identifier: identifier.into(),
            processor: backend.processor,
            model: backend.model,
            loaded_at_unix_seconds: unix_timestamp_seconds(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }

    pub fn model(&self) -> &dyn Generator {
        self.model.as_ref()
    }

    pub fn loaded_at_unix_seconds(&self) -> u64 {
        self.loaded_at_unix_seconds
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ModelHandle")
            .field("identifier", &self.identifier)
            .field("loaded_at_unix_seconds", &self.loaded_at_unix_seconds)
            .finish_non_exhaustive()
    }
}

type HandleSlot = Arc<OnceCell<Arc<ModelHandle>>>;

/// Keyed, load-once cache of model handles.
///
/// Each identifier owns a once-cell, so two sessions asking for the same model at the same
/// time share a single backend open. A failed open leaves the cell empty and the next call
/// retries. Handles are never evicted; the most recent successful `load` becomes active.
pub struct ModelLoader {
    factory: Arc<dyn BackendFactory>,
    slots: RwLock<HashMap<String, HandleSlot>>,
    active: ArcSwapOption<ModelHandle>,
}

impl ModelLoader {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            slots: RwLock::new(HashMap::new()),
            active: ArcSwapOption::empty(),
        }
    }

    pub fn backend_id(&self) -> &str {
        self.factory.backend_id()
    }

    pub async fn load(&self, identifier: &str) -> ModelLoadResult<Arc<ModelHandle>> {
        let identifier = identifier.trim();
        ensure!(
            !identifier.is_empty(),
            EmptyIdentifierSnafu {
                stage: "model-loader-load"
            }
        );

        let slot = self.slot(identifier).await;
        let handle = slot
            .get_or_try_init(|| self.open_handle(identifier))
            .await?
            .clone();

        let previous = self.active.swap(Some(handle.clone()));
        if previous
            .as_ref()
            .is_none_or(|previous| !Arc::ptr_eq(previous, &handle))
        {
            tracing::info!(model_id = %identifier, "active model switched");
        }

        Ok(handle)
    }

    /// Returns the cached handle for `identifier` without triggering a load.
    pub async fn get(&self, identifier: &str) -> Option<Arc<ModelHandle>> {
        let slots = self.slots.read().await;
        slots
            .get(identifier.trim())
            .and_then(|slot| slot.get().cloned())
    }

    pub fn active(&self) -> Option<Arc<ModelHandle>> {
        self.active.load_full()
    }

    /// Resident handles ordered by identifier.
    pub async fn loaded(&self) -> Vec<Arc<ModelHandle>> {
        let slots = self.slots.read().await;
        let mut handles = slots
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect::<Vec<_>>();
        handles.sort_by(|left, right| left.identifier().cmp(right.identifier()));
        handles
    }

    async fn slot(&self, identifier: &str) -> HandleSlot {
        if let Some(slot) = self.slots.read().await.get(identifier) {
            return slot.clone();
        }

        let mut slots = self.slots.write().await;
        slots.entry(identifier.to_string()).or_default().clone()
    }

    async fn open_handle(&self, identifier: &str) -> ModelLoadResult<Arc<ModelHandle>> {
        let started_at = Instant::now();
        tracing::info!(
            backend_id = %self.factory.backend_id(),
            model_id = %identifier,
            "loading model"
        );

        match self.factory.open(identifier).await {
            Ok(backend) => {
                tracing::info!(
                    model_id = %identifier,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "model loaded"
                );
                Ok(Arc::new(ModelHandle::new(identifier, backend)))
            }
            Err(error) => {
                tracing::error!(
                    model_id = %identifier,
                    error = %error,
                    "model load failed"
                );
                Err(error)
            }
        }
    }
}

fn unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
