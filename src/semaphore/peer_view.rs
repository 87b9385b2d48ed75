//! Peer bookkeeping and the admission decision.
//!
//! Every peer keeps its own map of who currently wants the resource and
//! independently ranks that map to decide who holds a slot. There is no
//! coordinator: as long as two peers have seen the same heartbeats they will
//! compute the same active set, because ranking is a total order over
//! (join time, peer id).

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::semaphore::heartbeat::{Heartbeat, HeartbeatStatus};
use crate::semaphore::ids::PeerId;

/// What one peer believes about a contender: when it joined the contest and
/// when it was last heard from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerEntry {
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// All peers believed to currently want the resource, the local peer
/// included, keyed by peer id.
///
/// The map is copy-on-write: every update returns a fresh view so readers can
/// hold a snapshot while the heartbeat loop moves on. Entries appear on
/// Acquire heartbeats, disappear on Release heartbeats, and fall out when
/// they go stale.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerView {
    entries: BTreeMap<PeerId, PeerEntry>,
}

impl PeerView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.entries.contains_key(peer_id)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerEntry> {
        self.entries.get(peer_id)
    }

    /// Fold one heartbeat into the view. Acquire upserts the sender (the last
    /// message processed wins on timestamps), Release removes it.
    pub fn observe(&self, heartbeat: &Heartbeat) -> PeerView {
        let mut entries = self.entries.clone();
        match heartbeat.status {
            HeartbeatStatus::Acquire => {
                entries.insert(
                    heartbeat.peer_id.clone(),
                    PeerEntry {
                        joined_at: heartbeat.joined_at,
                        last_seen: heartbeat.sent_at,
                    },
                );
            }
            HeartbeatStatus::Release => {
                entries.remove(&heartbeat.peer_id);
            }
        }
        PeerView { entries }
    }

    /// Insert or refresh a peer entry directly, without going through the
    /// bus. Used to seed the local peer at acquire time and to refresh it on
    /// every timer tick.
    pub fn touch(&self, peer_id: &PeerId, joined_at: DateTime<Utc>, seen_at: DateTime<Utc>) -> PeerView {
        let mut entries = self.entries.clone();
        entries.insert(
            peer_id.clone(),
            PeerEntry {
                joined_at,
                last_seen: seen_at,
            },
        );
        PeerView { entries }
    }

    pub fn remove(&self, peer_id: &PeerId) -> PeerView {
        let mut entries = self.entries.clone();
        entries.remove(peer_id);
        PeerView { entries }
    }

    /// Drop every entry whose `last_seen` has fallen outside the staleness
    /// window. The local peer is exempt: it only ever leaves the view through
    /// its own release, never by aging out.
    pub fn evict_stale(&self, now: DateTime<Utc>, window: Duration, local: &PeerId) -> PeerView {
        let cutoff = now.timestamp_millis() - window.as_millis() as i64;
        let entries = self
            .entries
            .iter()
            .filter(|(peer_id, entry)| {
                *peer_id == local || entry.last_seen.timestamp_millis() >= cutoff
            })
            .map(|(peer_id, entry)| (peer_id.clone(), *entry))
            .collect();
        PeerView { entries }
    }

    /// Entries in admission order: earliest `joined_at` first, ties broken by
    /// peer id. Insertion and arrival order play no part, which is what makes
    /// the ranking reproducible on every peer.
    pub fn ranked(&self) -> Vec<(&PeerId, &PeerEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| {
            a.1.joined_at
                .cmp(&b.1.joined_at)
                .then_with(|| a.0.cmp(b.0))
        });
        entries
    }
}

/// Outcome of one admission pass over a view snapshot.
#[derive(Clone, Debug)]
pub struct Admission {
    /// The view with stale entries already evicted.
    pub view: PeerView,
    /// The peers holding the `resources` slots, in rank order.
    pub active: Vec<PeerId>,
    /// Contender count after eviction, the local peer included.
    pub peers: usize,
    /// Slots believed taken: `min(resources, peers)`.
    pub consumed: u32,
    /// Whether the local peer is in the active set.
    pub admitted: bool,
}

/// Evict, rank, and take the first `resources` entries.
///
/// Pure with respect to its inputs: any two peers evaluating equal views with
/// equal resource counts reach the same active set.
pub fn evaluate(
    view: &PeerView,
    local: &PeerId,
    now: DateTime<Utc>,
    resources: u32,
    staleness: Duration,
) -> Admission {
    let view = view.evict_stale(now, staleness, local);
    let active: Vec<PeerId> = view
        .ranked()
        .into_iter()
        .take(resources as usize)
        .map(|(peer_id, _)| peer_id.clone())
        .collect();
    let admitted = active.iter().any(|peer_id| peer_id == local);
    let peers = view.len();
    let consumed = resources.min(peers as u32);
    Admission {
        view,
        active,
        peers,
        consumed,
        admitted,
    }
}
