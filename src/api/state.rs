use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::bus::Bus;
use crate::concurrency_error;
use crate::error::Result;
use crate::semaphore::{Semaphore, SemaphoreEvent, SemaphoreId};
use crate::settings::Settings;

/// Handler state: the process-wide heartbeat bus plus every semaphore this
/// process hosts, keyed by id.
///
/// Each hosted semaphore is created lazily on its first acquire and then
/// lives for the rest of the process, keeping its peer identity stable
/// across API calls.
#[derive(Clone)]
pub struct AppState {
    bus: Arc<dyn Bus>,
    settings: Settings,
    semaphores: Arc<RwLock<HashMap<SemaphoreId, Arc<Semaphore>>>>,
}

impl AppState {
    pub fn new(bus: Arc<dyn Bus>, settings: Settings) -> Self {
        Self {
            bus,
            settings,
            semaphores: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn get(&self, semaphore_id: &SemaphoreId) -> Option<Arc<Semaphore>> {
        self.semaphores.read().ok()?.get(semaphore_id).cloned()
    }

    /// The existing instance, or a fresh one joined to the process bus.
    ///
    /// An explicit `resources` count resizes an existing instance; a fresh
    /// one uses it directly, falling back to the configured default.
    pub fn get_or_create(
        &self,
        semaphore_id: &SemaphoreId,
        resources: Option<u32>,
    ) -> Result<Arc<Semaphore>> {
        let mut semaphores = self
            .semaphores
            .write()
            .map_err(|e| concurrency_error!("semaphore registry lock poisoned: {}", e))?;

        if let Some(existing) = semaphores.get(semaphore_id) {
            if let Some(resources) = resources {
                existing.set_resources(resources)?;
            }
            return Ok(Arc::clone(existing));
        }

        let semaphore = Arc::new(Semaphore::new(
            semaphore_id.clone(),
            resources.unwrap_or(self.settings.default_resources),
            Arc::clone(&self.bus),
            self.settings.semaphore_settings(),
        )?);
        spawn_event_logger(&semaphore);
        info!(
            "Hosting semaphore '{}' as peer {}",
            semaphore_id,
            semaphore.peer_id()
        );
        semaphores.insert(semaphore_id.clone(), Arc::clone(&semaphore));
        Ok(semaphore)
    }

    pub fn all(&self) -> Vec<Arc<Semaphore>> {
        self.semaphores
            .read()
            .map(|semaphores| semaphores.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.semaphores
            .read()
            .map(|semaphores| semaphores.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Log admission flips for a hosted semaphore until it is dropped.
fn spawn_event_logger(semaphore: &Arc<Semaphore>) {
    let mut events = semaphore.events();
    let semaphore_id = semaphore.semaphore_id().clone();
    let peer_id = semaphore.peer_id().clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SemaphoreEvent::Acquired) => {
                    info!("[{}] holds a slot of '{}'", peer_id, semaphore_id);
                }
                Ok(SemaphoreEvent::Released) => {
                    info!("[{}] gave up its slot of '{}'", peer_id, semaphore_id);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        "[{}] event watcher for '{}' lagged, skipped {} events",
                        peer_id, semaphore_id, missed
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
