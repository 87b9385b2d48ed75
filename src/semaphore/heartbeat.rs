//! Heartbeat messages exchanged between peers.
//!
//! Heartbeats travel as JSON so field names survive the trip unchanged and
//! decoders ignore fields they do not know about. Rolling out a new field is
//! therefore an additive change: old peers keep decoding new heartbeats and
//! new peers keep decoding old ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::semaphore::ids::{PeerId, SemaphoreId};

/// Whether the sender is contending for the resource or walking away from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Acquire,
    Release,
}

/// One broadcast announcement from a peer.
///
/// `joined_at` is fixed at instance creation and never changes across
/// acquire/release cycles; it is the primary admission rank. `sent_at` is
/// stamped per message and drives staleness eviction on the receiving side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub semaphore_id: SemaphoreId,
    pub peer_id: PeerId,
    pub sent_at: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
    pub status: HeartbeatStatus,
}

impl Heartbeat {
    /// Acquire-status heartbeat stamped with the current time.
    pub fn acquire(semaphore_id: SemaphoreId, peer_id: PeerId, joined_at: DateTime<Utc>) -> Self {
        Self {
            semaphore_id,
            peer_id,
            sent_at: Utc::now(),
            joined_at,
            status: HeartbeatStatus::Acquire,
        }
    }

    /// Release-status heartbeat stamped with the current time.
    pub fn release(semaphore_id: SemaphoreId, peer_id: PeerId, joined_at: DateTime<Utc>) -> Self {
        Self {
            semaphore_id,
            peer_id,
            sent_at: Utc::now(),
            joined_at,
            status: HeartbeatStatus::Release,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(Into::into)
    }
}
