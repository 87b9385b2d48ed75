//! In-process heartbeat bus.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::{Bus, BusSubscription, SubscriberTable};
use crate::error::Result;
use crate::semaphore::heartbeat::Heartbeat;
use crate::semaphore::ids::SemaphoreId;

/// Bus that never leaves the process: every subscription in this process on
/// the heartbeat's topic gets each published message, the publisher's own
/// subscriptions included.
///
/// Cloning is cheap and every clone shares the same subscriber table, so
/// handing clones to several semaphores wires them all together. Useful on
/// its own for single-process coordination and all over the tests.
#[derive(Clone, Default)]
pub struct MemoryBus {
    table: Arc<SubscriberTable>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, heartbeat: &Heartbeat, _expire_after: Duration) -> Result<()> {
        self.table.dispatch(heartbeat);
        Ok(())
    }

    fn subscribe(&self, topic: &SemaphoreId) -> Result<BusSubscription> {
        Ok(SubscriberTable::register(&self.table, topic))
    }
}
