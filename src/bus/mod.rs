//! The heartbeat bus: how peers reach each other.
//!
//! Semaphores only ever talk to the [`Bus`] trait. Delivery is best-effort
//! and fire-and-forget on every implementation; peers are built to converge
//! off repeated heartbeats, so a lost message costs one interval of
//! freshness, nothing more.

pub mod memory;
pub mod udp;

pub use memory::MemoryBus;
pub use udp::UdpBus;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::semaphore::heartbeat::Heartbeat;
use crate::semaphore::ids::SemaphoreId;

/// Heartbeats one subscription will buffer before the bus starts dropping
/// them. Heartbeats repeat every interval, so dropped messages self-heal.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Broadcast transport for heartbeats.
///
/// Publishing must reach every subscription on the heartbeat's semaphore id,
/// the publishing process's own subscriptions included. Implementations never
/// surface per-peer delivery failures; they log and move on.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    /// Broadcast one heartbeat to everyone listening on its semaphore id.
    ///
    /// `expire_after` is how long the message stays meaningful. Transports
    /// that queue messages may discard older ones; the built-in transports
    /// deliver immediately or not at all, so they ignore it.
    async fn publish(&self, heartbeat: &Heartbeat, expire_after: Duration) -> Result<()>;

    /// Open a subscription that yields only heartbeats for `topic`.
    /// Dropping the returned handle tears the subscription down.
    fn subscribe(&self, topic: &SemaphoreId) -> Result<BusSubscription>;
}

struct Route {
    topic: SemaphoreId,
    tx: mpsc::Sender<Heartbeat>,
}

/// Topic-keyed fan-out of decoded heartbeats to local subscriptions.
///
/// Both bus implementations feed their inbound heartbeats through one of
/// these. Dispatch is lossy: a subscription whose buffer is full misses that
/// heartbeat rather than stalling the bus.
#[derive(Default)]
pub(crate) struct SubscriberTable {
    routes: RwLock<HashMap<u64, Route>>,
    next_id: AtomicU64,
}

impl SubscriberTable {
    pub(crate) fn register(table: &Arc<SubscriberTable>, topic: &SemaphoreId) -> BusSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = table.next_id.fetch_add(1, Ordering::Relaxed);
        match table.routes.write() {
            Ok(mut routes) => {
                routes.insert(
                    id,
                    Route {
                        topic: topic.clone(),
                        tx,
                    },
                );
            }
            Err(err) => {
                // Lock poisoning leaves the subscription connected to nothing;
                // recv() then simply pends while heartbeats keep flowing.
                warn!("subscriber table lock poisoned on register: {}", err);
            }
        }
        BusSubscription {
            id,
            rx,
            table: Arc::clone(table),
        }
    }

    fn unregister(&self, id: u64) {
        if let Ok(mut routes) = self.routes.write() {
            routes.remove(&id);
        }
    }

    /// Hand one heartbeat to every subscription on its topic. Returns how
    /// many subscriptions took it.
    pub(crate) fn dispatch(&self, heartbeat: &Heartbeat) -> usize {
        let routes = match self.routes.read() {
            Ok(routes) => routes,
            Err(err) => {
                warn!("subscriber table lock poisoned on dispatch: {}", err);
                return 0;
            }
        };
        let mut delivered = 0;
        for route in routes.values() {
            if route.topic != heartbeat.semaphore_id {
                continue;
            }
            match route.tx.try_send(heartbeat.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(
                        "subscription on '{}' is full, dropping heartbeat from {}",
                        heartbeat.semaphore_id, heartbeat.peer_id
                    );
                }
                // The receiver was dropped and is about to unregister.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    #[cfg(test)]
    pub(crate) fn route_count(&self) -> usize {
        self.routes.read().map(|routes| routes.len()).unwrap_or(0)
    }
}

/// Receiving end of one topic subscription.
pub struct BusSubscription {
    id: u64,
    rx: mpsc::Receiver<Heartbeat>,
    table: Arc<SubscriberTable>,
}

impl BusSubscription {
    /// Next heartbeat for the subscribed topic.
    pub async fn recv(&mut self) -> Option<Heartbeat> {
        self.rx.recv().await
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.table.unregister(self.id);
    }
}
