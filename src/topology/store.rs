//! Topology repository
//!
//! ## Responsibilities
//!
//! - Hold the single authoritative in-memory topology document
//! - Validate every replacement before it becomes authoritative
//! - Save through the host's storage collaborator on each mutation
//! - Broadcast change notifications to subscribers

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use crate::error::Result;

use super::types::Topology;

/// Storage collaborator owned by the host. The engine treats the stored
/// document as opaque; it never re-parses blobs on its own.
#[async_trait]
pub trait TopologyStore: Send + Sync {
    async fn load(&self) -> Result<Option<Topology>>;
    async fn save(&self, topology: &Topology) -> Result<()>;
}

/// In-memory store for tests and embedded hosts
#[derive(Default)]
pub struct MemoryTopologyStore {
    inner: RwLock<Option<Topology>>,
}

impl MemoryTopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial(topology: Topology) -> Self {
        Self {
            inner: RwLock::new(Some(topology)),
        }
    }
}

#[async_trait]
impl TopologyStore for MemoryTopologyStore {
    async fn load(&self) -> Result<Option<Topology>> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, topology: &Topology) -> Result<()> {
        *self.inner.write().await = Some(topology.clone());
        Ok(())
    }
}

/// Change notification sent to subscribers after each successful mutation
#[derive(Debug, Clone)]
pub struct TopologyUpdate {
    pub revision: u64,
    pub topology: Arc<Topology>,
}

struct CurrentDoc {
    topology: Arc<Topology>,
    revision: u64,
}

/// TopologyService instance
pub struct TopologyService {
    store: Arc<dyn TopologyStore>,
    current: RwLock<CurrentDoc>,
    changes: broadcast::Sender<TopologyUpdate>,
}

impl TopologyService {
    pub fn new(store: Arc<dyn TopologyStore>) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            store,
            current: RwLock::new(CurrentDoc {
                topology: Arc::new(Topology::default()),
                revision: 0,
            }),
            changes,
        }
    }

    /// Adopt the stored document if one exists and validates. An invalid
    /// stored document is reported and the current one stays live.
    pub async fn load(&self) -> Result<()> {
        match self.store.load().await? {
            Some(topology) => match topology.validate() {
                Ok(()) => {
                    let mut current = self.current.write().await;
                    current.topology = Arc::new(topology);
                    current.revision += 1;
                    info!(
                        cameras = current.topology.cameras.len(),
                        connections = current.topology.connections.len(),
                        "Loaded stored topology"
                    );
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "Stored topology failed validation, keeping current");
                    Err(e)
                }
            },
            None => Ok(()),
        }
    }

    pub async fn get(&self) -> Arc<Topology> {
        self.current.read().await.topology.clone()
    }

    pub async fn revision(&self) -> u64 {
        self.current.read().await.revision
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopologyUpdate> {
        self.changes.subscribe()
    }

    /// Replace the whole document. Validation failure leaves the previous
    /// document authoritative.
    pub async fn replace(&self, topology: Topology) -> Result<u64> {
        topology.validate()?;
        self.commit(topology).await
    }

    /// Mutate a copy of the current document and swap it in if the result
    /// validates. The closure's error aborts without touching anything.
    pub async fn apply<F>(&self, mutate: F) -> Result<u64>
    where
        F: FnOnce(&mut Topology) -> Result<()>,
    {
        let mut draft = (*self.get().await).clone();
        mutate(&mut draft)?;
        draft.validate()?;
        self.commit(draft).await
    }

    async fn commit(&self, topology: Topology) -> Result<u64> {
        let shared = Arc::new(topology);
        let revision = {
            let mut current = self.current.write().await;
            current.topology = shared.clone();
            current.revision += 1;
            current.revision
        };

        // In-memory document stays authoritative even when the save fails
        if let Err(e) = self.store.save(&shared).await {
            error!(error = %e, revision, "Failed to persist topology");
        }

        let _ = self.changes.send(TopologyUpdate {
            revision,
            topology: shared.clone(),
        });
        info!(
            revision,
            cameras = shared.cameras.len(),
            connections = shared.connections.len(),
            "Topology updated"
        );
        Ok(revision)
    }
}
