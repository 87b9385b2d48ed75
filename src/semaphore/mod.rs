//! Gossip-backed distributed counting semaphore.
//!
//! Peers coordinate access to at most `resources` slots of a named resource
//! with nothing but periodic broadcast heartbeats; there is no coordinator
//! and no lock server. Each peer folds every heartbeat it hears into its own
//! [`PeerView`] and independently takes the `resources` longest-standing
//! contenders as the active set. Because ranking is a total order over
//! (join time, peer id), peers that have heard the same heartbeats agree on
//! who holds the slots, and peers that crash silently age out of everyone
//! else's view after a staleness window.
//!
//! Admission is advisory and eventually consistent: during partitions or
//! while heartbeats are still propagating, more than `resources` peers can
//! briefly each believe they hold a slot. Callers who need a hard guarantee
//! must layer their own fencing on top.

pub mod heartbeat;
pub mod ids;
pub mod peer_view;

pub use heartbeat::{Heartbeat, HeartbeatStatus};
pub use ids::{PeerId, SemaphoreId};
pub use peer_view::{Admission, PeerEntry, PeerView};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::bus::{Bus, BusSubscription};
use crate::concurrency_error;
use crate::error::{Result, SemaphoreError};
use crate::settings::SemaphoreSettings;

/// Acquired/Released notifications a subscriber can miss before the channel
/// starts overwriting the oldest ones.
const EVENT_CAPACITY: usize = 16;

/// Edge-triggered admission notifications.
///
/// Exactly one event is delivered per flip of the admitted state, never one
/// per heartbeat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SemaphoreEvent {
    /// This peer entered the active set.
    Acquired,
    /// This peer left the active set, by releasing or by being displaced.
    Released,
}

/// Point-in-time snapshot of one instance, as served by the HTTP API.
#[derive(Clone, Debug, Serialize)]
pub struct SemaphoreStatus {
    pub semaphore_id: SemaphoreId,
    pub peer_id: PeerId,
    pub resources: u32,
    pub peers: usize,
    pub consumed: u32,
    pub is_acquired: bool,
    pub seeking: bool,
}

/// State shared between the public API and the seeker task.
struct Shared {
    view: PeerView,
    resources: u32,
    peers: usize,
    consumed: u32,
    is_acquired: bool,
    seeking: bool,
    closed: bool,
}

/// One peer's handle on a named distributed semaphore.
///
/// The instance carries a random [`PeerId`] and a creation timestamp that
/// together fix its admission rank for its whole lifetime, across any number
/// of acquire/release cycles. `acquire` and `release` return immediately;
/// admission happens in the background and is reported through [`Semaphore::events`]
/// and the snapshot getters.
///
/// Calls that spawn background work (`acquire`, `release`, `close`) must run
/// inside a tokio runtime.
///
/// Call [`Semaphore::release`] or [`Semaphore::close`] to leave gracefully.
/// Dropping a seeking instance stops its heartbeats without a Release
/// broadcast, so remote peers treat it like a crash and only evict it after
/// the staleness window.
pub struct Semaphore {
    semaphore_id: SemaphoreId,
    peer_id: PeerId,
    joined_at: DateTime<Utc>,
    settings: SemaphoreSettings,
    bus: Arc<dyn Bus>,
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<SemaphoreEvent>,
    // Also serializes acquire/release/close against each other.
    seeker: Mutex<Option<JoinHandle<()>>>,
}

impl Semaphore {
    pub fn new(
        semaphore_id: SemaphoreId,
        resources: u32,
        bus: Arc<dyn Bus>,
        settings: SemaphoreSettings,
    ) -> Result<Self> {
        if resources < 1 {
            return Err(SemaphoreError::InvalidResources(resources).into());
        }
        settings.validate()?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            semaphore_id,
            peer_id: PeerId::random(),
            joined_at: Utc::now(),
            settings,
            bus,
            shared: Arc::new(Mutex::new(Shared {
                view: PeerView::new(),
                resources,
                peers: 0,
                consumed: 0,
                is_acquired: false,
                seeking: false,
                closed: false,
            })),
            events,
            seeker: Mutex::new(None),
        })
    }

    pub fn semaphore_id(&self) -> &SemaphoreId {
        &self.semaphore_id
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn resources(&self) -> u32 {
        self.shared.lock().map(|s| s.resources).unwrap_or(0)
    }

    /// Contenders currently in view, this peer included. Zero while idle.
    pub fn peers(&self) -> usize {
        self.shared.lock().map(|s| s.peers).unwrap_or(0)
    }

    /// Slots believed taken cluster-wide: `min(resources, peers)`.
    pub fn consumed(&self) -> u32 {
        self.shared.lock().map(|s| s.consumed).unwrap_or(0)
    }

    pub fn is_acquired(&self) -> bool {
        self.shared.lock().map(|s| s.is_acquired).unwrap_or(false)
    }

    pub fn is_seeking(&self) -> bool {
        self.shared.lock().map(|s| s.seeking).unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().map(|s| s.closed).unwrap_or(false)
    }

    pub fn status(&self) -> Result<SemaphoreStatus> {
        let shared = self.lock_shared()?;
        Ok(SemaphoreStatus {
            semaphore_id: self.semaphore_id.clone(),
            peer_id: self.peer_id.clone(),
            resources: shared.resources,
            peers: shared.peers,
            consumed: shared.consumed,
            is_acquired: shared.is_acquired,
            seeking: shared.seeking,
        })
    }

    /// Subscribe to admission flips.
    ///
    /// Subscribe before calling [`Semaphore::acquire`] to observe the initial
    /// admission; the channel only delivers events sent after subscription.
    /// A receiver that falls more than [`EVENT_CAPACITY`] events behind sees
    /// a `Lagged` error and skips ahead.
    pub fn events(&self) -> broadcast::Receiver<SemaphoreEvent> {
        self.events.subscribe()
    }

    /// Change the slot count. Takes effect on the next admission evaluation
    /// unless `reevaluate_on_resize` is set, in which case a seeking instance
    /// re-ranks immediately.
    pub fn set_resources(&self, resources: u32) -> Result<()> {
        if resources < 1 {
            return Err(SemaphoreError::InvalidResources(resources).into());
        }
        let mut shared = self.lock_shared()?;
        if shared.closed {
            return Err(SemaphoreError::Closed.into());
        }
        shared.resources = resources;
        if self.settings.reevaluate_on_resize && shared.seeking {
            run_admission(
                &mut shared,
                &self.peer_id,
                Utc::now(),
                self.settings.staleness_window,
                &self.events,
            );
        }
        Ok(())
    }

    /// Start contending for a slot. Returns immediately; watch
    /// [`Semaphore::events`] or [`Semaphore::is_acquired`] for the outcome.
    ///
    /// Seeds this peer's own entry and evaluates before any heartbeat goes
    /// out, so a peer with no competition is admitted on the spot. Calling
    /// again while already seeking is a no-op.
    pub fn acquire(&self) -> Result<()> {
        let mut seeker_slot = self.lock_seeker()?;
        {
            let shared = self.lock_shared()?;
            if shared.closed {
                return Err(SemaphoreError::Closed.into());
            }
            if shared.seeking {
                debug!(
                    "[{}] already seeking '{}', nothing to do",
                    self.peer_id, self.semaphore_id
                );
                return Ok(());
            }
        }

        // The seeker slot is still held, so no other lifecycle call can slip
        // in between the guard above and the state flip below.
        let subscription = match self.bus.subscribe(&self.semaphore_id) {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(
                    "[{}] could not subscribe to '{}', heartbeating blind: {}",
                    self.peer_id, self.semaphore_id, e
                );
                None
            }
        };

        let resources = {
            let mut shared = self.lock_shared()?;
            shared.seeking = true;
            let now = Utc::now();
            shared.view = shared.view.touch(&self.peer_id, self.joined_at, now);
            run_admission(
                &mut shared,
                &self.peer_id,
                now,
                self.settings.staleness_window,
                &self.events,
            );
            shared.resources
        };

        let seeker = Seeker {
            semaphore_id: self.semaphore_id.clone(),
            peer_id: self.peer_id.clone(),
            joined_at: self.joined_at,
            settings: self.settings.clone(),
            bus: Arc::clone(&self.bus),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
        };
        *seeker_slot = Some(tokio::spawn(seeker.run(subscription)));

        info!(
            "[{}] seeking '{}' ({} resources)",
            self.peer_id, self.semaphore_id, resources
        );
        Ok(())
    }

    /// Stop contending. Stops the heartbeat task, drops the subscription,
    /// broadcasts one best-effort Release, and clears all counters. If this
    /// peer was admitted, a `Released` event fires before the call returns.
    /// Calling while idle is a no-op.
    pub fn release(&self) -> Result<()> {
        let mut seeker_slot = self.lock_seeker()?;
        let was_acquired;
        {
            let mut shared = self.lock_shared()?;
            if shared.closed {
                return Err(SemaphoreError::Closed.into());
            }
            if !shared.seeking {
                debug!(
                    "[{}] release on idle '{}', nothing to do",
                    self.peer_id, self.semaphore_id
                );
                return Ok(());
            }
            was_acquired = shared.is_acquired;
            shared.seeking = false;
            shared.is_acquired = false;
            shared.peers = 0;
            shared.consumed = 0;
            shared.view = PeerView::new();
        }
        if let Some(task) = seeker_slot.take() {
            task.abort();
        }
        self.broadcast_release();
        if was_acquired {
            let _ = self.events.send(SemaphoreEvent::Released);
        }
        info!("[{}] released '{}'", self.peer_id, self.semaphore_id);
        Ok(())
    }

    /// Retire the instance for good: release if seeking, then refuse all
    /// further acquire/release calls. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut seeker_slot = self.lock_seeker()?;
        let was_acquired;
        let was_seeking;
        {
            let mut shared = self.lock_shared()?;
            if shared.closed {
                return Ok(());
            }
            was_seeking = shared.seeking;
            was_acquired = shared.is_acquired;
            shared.seeking = false;
            shared.is_acquired = false;
            shared.peers = 0;
            shared.consumed = 0;
            shared.view = PeerView::new();
            shared.closed = true;
        }
        if let Some(task) = seeker_slot.take() {
            task.abort();
        }
        if was_seeking {
            self.broadcast_release();
        }
        if was_acquired {
            let _ = self.events.send(SemaphoreEvent::Released);
        }
        info!("[{}] closed '{}'", self.peer_id, self.semaphore_id);
        Ok(())
    }

    /// Final Release broadcast, detached so lifecycle calls never block on
    /// the network. Losing it costs remote peers one staleness window.
    fn broadcast_release(&self) {
        let bus = Arc::clone(&self.bus);
        let heartbeat = Heartbeat::release(
            self.semaphore_id.clone(),
            self.peer_id.clone(),
            self.joined_at,
        );
        let expire_after = self.settings.staleness_window;
        tokio::spawn(async move {
            if let Err(e) = bus.publish(&heartbeat, expire_after).await {
                debug!(
                    "Release broadcast for '{}' failed: {}",
                    heartbeat.semaphore_id, e
                );
            }
        });
    }

    fn lock_shared(&self) -> Result<MutexGuard<'_, Shared>> {
        self.shared
            .lock()
            .map_err(|e| concurrency_error!("semaphore state lock poisoned: {}", e))
    }

    fn lock_seeker(&self) -> Result<MutexGuard<'_, Option<JoinHandle<()>>>> {
        self.seeker
            .lock()
            .map_err(|e| concurrency_error!("seeker task lock poisoned: {}", e))
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        if let Ok(mut seeker_slot) = self.seeker.lock() {
            if let Some(task) = seeker_slot.take() {
                task.abort();
            }
        }
    }
}

/// One admission pass under the state lock. Flips of the admitted state fire
/// exactly one event each.
fn run_admission(
    shared: &mut Shared,
    local: &PeerId,
    now: DateTime<Utc>,
    staleness: Duration,
    events: &broadcast::Sender<SemaphoreEvent>,
) {
    let outcome = peer_view::evaluate(&shared.view, local, now, shared.resources, staleness);
    let was_acquired = shared.is_acquired;
    shared.view = outcome.view;
    shared.peers = outcome.peers;
    shared.consumed = outcome.consumed;
    shared.is_acquired = outcome.admitted;

    if outcome.admitted && !was_acquired {
        debug!(
            "[{}] admitted ({}/{} slots taken, {} peers)",
            local, outcome.consumed, shared.resources, outcome.peers
        );
        let _ = events.send(SemaphoreEvent::Acquired);
    } else if !outcome.admitted && was_acquired {
        debug!("[{}] displaced ({} peers contending)", local, outcome.peers);
        let _ = events.send(SemaphoreEvent::Released);
    }
}

/// Background task owning the heartbeat clock and the bus subscription for
/// one seeking instance. Aborted by release/close.
struct Seeker {
    semaphore_id: SemaphoreId,
    peer_id: PeerId,
    joined_at: DateTime<Utc>,
    settings: SemaphoreSettings,
    bus: Arc<dyn Bus>,
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<SemaphoreEvent>,
}

impl Seeker {
    async fn run(self, subscription: Option<BusSubscription>) {
        let mut ticker = interval(self.settings.heartbeat_interval);

        if let Some(mut sub) = subscription {
            loop {
                tokio::select! {
                    inbound = sub.recv() => match inbound {
                        Some(heartbeat) => self.handle_heartbeat(heartbeat),
                        None => {
                            warn!(
                                "[{}] subscription for '{}' closed, heartbeating blind",
                                self.peer_id, self.semaphore_id
                            );
                            break;
                        }
                    },
                    _ = ticker.tick() => self.handle_tick().await,
                }
            }
        }

        // No subscription left: keep announcing ourselves anyway so remote
        // views stay fresh.
        loop {
            ticker.tick().await;
            self.handle_tick().await;
        }
    }

    /// Refresh our own view entry and announce ourselves. The outbound send
    /// itself triggers no evaluation; the loopback copy comes back through
    /// `handle_heartbeat` like any other peer's.
    async fn handle_tick(&self) {
        let heartbeat = Heartbeat::acquire(
            self.semaphore_id.clone(),
            self.peer_id.clone(),
            self.joined_at,
        );
        {
            let mut shared = match self.shared.lock() {
                Ok(guard) => guard,
                Err(e) => {
                    error!(
                        "[{}] state lock poisoned in heartbeat tick: {}",
                        self.peer_id, e
                    );
                    return;
                }
            };
            if !shared.seeking {
                return;
            }
            shared.view = shared
                .view
                .touch(&self.peer_id, self.joined_at, heartbeat.sent_at);
        }

        if let Err(e) = self
            .bus
            .publish(&heartbeat, self.settings.staleness_window)
            .await
        {
            debug!(
                "[{}] heartbeat publish for '{}' failed, retrying next tick: {}",
                self.peer_id, self.semaphore_id, e
            );
        }
    }

    fn handle_heartbeat(&self, heartbeat: Heartbeat) {
        if heartbeat.semaphore_id != self.semaphore_id {
            debug!(
                "[{}] ignoring heartbeat for foreign semaphore '{}'",
                self.peer_id, heartbeat.semaphore_id
            );
            return;
        }
        // An echo of our own Release (stale from a previous cycle) must not
        // evict us; only release() removes the local entry.
        if heartbeat.peer_id == self.peer_id && heartbeat.status == HeartbeatStatus::Release {
            return;
        }

        let mut shared = match self.shared.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!(
                    "[{}] state lock poisoned handling heartbeat: {}",
                    self.peer_id, e
                );
                return;
            }
        };
        // release() raced this message; the view is already cleared.
        if !shared.seeking {
            return;
        }
        shared.view = shared.view.observe(&heartbeat);
        run_admission(
            &mut shared,
            &self.peer_id,
            Utc::now(),
            self.settings.staleness_window,
            &self.events,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;

    fn fast_settings() -> SemaphoreSettings {
        SemaphoreSettings::with_heartbeat_interval(Duration::from_millis(50))
    }

    fn solo_semaphore(resources: u32) -> Semaphore {
        Semaphore::new(
            SemaphoreId::from("unit-test"),
            resources,
            Arc::new(MemoryBus::new()),
            fast_settings(),
        )
        .unwrap()
    }

    #[test]
    fn test_zero_resources_is_rejected_at_creation() {
        let result = Semaphore::new(
            SemaphoreId::from("unit-test"),
            0,
            Arc::new(MemoryBus::new()),
            fast_settings(),
        );
        assert!(matches!(
            result,
            Err(crate::error::UsherError::Semaphore(
                SemaphoreError::InvalidResources(0)
            ))
        ));
    }

    #[test]
    fn test_zero_resources_is_rejected_at_resize() {
        let semaphore = solo_semaphore(2);
        assert!(semaphore.set_resources(0).is_err());
        assert_eq!(semaphore.resources(), 2);
        assert!(semaphore.set_resources(5).is_ok());
        assert_eq!(semaphore.resources(), 5);
    }

    #[tokio::test]
    async fn test_solo_peer_is_admitted_synchronously() {
        let semaphore = solo_semaphore(1);
        let mut events = semaphore.events();

        semaphore.acquire().unwrap();
        assert!(semaphore.is_acquired());
        assert!(semaphore.is_seeking());
        assert_eq!(semaphore.peers(), 1);
        assert_eq!(semaphore.consumed(), 1);
        assert_eq!(events.try_recv().unwrap(), SemaphoreEvent::Acquired);
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent_while_seeking() {
        let semaphore = solo_semaphore(1);
        let mut events = semaphore.events();

        semaphore.acquire().unwrap();
        semaphore.acquire().unwrap();

        assert_eq!(events.try_recv().unwrap(), SemaphoreEvent::Acquired);
        // No second Acquired from the repeat call.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_release_clears_counters_and_fires_released() {
        let semaphore = solo_semaphore(1);
        let mut events = semaphore.events();

        semaphore.acquire().unwrap();
        semaphore.release().unwrap();

        assert!(!semaphore.is_acquired());
        assert!(!semaphore.is_seeking());
        assert_eq!(semaphore.peers(), 0);
        assert_eq!(semaphore.consumed(), 0);
        assert_eq!(events.try_recv().unwrap(), SemaphoreEvent::Acquired);
        assert_eq!(events.try_recv().unwrap(), SemaphoreEvent::Released);
    }

    #[tokio::test]
    async fn test_release_while_idle_is_a_silent_no_op() {
        let semaphore = solo_semaphore(1);
        let mut events = semaphore.events();

        semaphore.release().unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reacquire_keeps_peer_identity() {
        let semaphore = solo_semaphore(1);
        let peer_id = semaphore.peer_id().clone();
        let joined_at = semaphore.joined_at();

        semaphore.acquire().unwrap();
        semaphore.release().unwrap();
        semaphore.acquire().unwrap();

        assert_eq!(semaphore.peer_id(), &peer_id);
        assert_eq!(semaphore.joined_at(), joined_at);
        assert!(semaphore.is_acquired());
    }

    #[tokio::test]
    async fn test_closed_instance_rejects_everything() {
        let semaphore = solo_semaphore(1);
        semaphore.acquire().unwrap();
        semaphore.close().unwrap();

        assert!(semaphore.is_closed());
        assert!(!semaphore.is_acquired());
        assert!(matches!(
            semaphore.acquire(),
            Err(crate::error::UsherError::Semaphore(SemaphoreError::Closed))
        ));
        assert!(matches!(
            semaphore.release(),
            Err(crate::error::UsherError::Semaphore(SemaphoreError::Closed))
        ));
        assert!(semaphore.set_resources(3).is_err());
        // Closing again stays quiet.
        assert!(semaphore.close().is_ok());
    }

    #[tokio::test]
    async fn test_close_fires_released_when_admitted() {
        let semaphore = solo_semaphore(1);
        let mut events = semaphore.events();

        semaphore.acquire().unwrap();
        semaphore.close().unwrap();

        assert_eq!(events.try_recv().unwrap(), SemaphoreEvent::Acquired);
        assert_eq!(events.try_recv().unwrap(), SemaphoreEvent::Released);
    }

    #[tokio::test]
    async fn test_resize_with_reevaluation_can_displace() {
        let mut settings = fast_settings();
        settings.reevaluate_on_resize = true;
        let bus = Arc::new(MemoryBus::new());
        let semaphore = Semaphore::new(SemaphoreId::from("unit-test"), 2, bus, settings).unwrap();
        let mut events = semaphore.events();

        semaphore.acquire().unwrap();
        assert!(semaphore.is_acquired());

        // Pretend an earlier peer is already holding the only remaining slot.
        {
            let mut shared = semaphore.shared.lock().unwrap();
            let earlier = semaphore.joined_at() - chrono::Duration::seconds(30);
            shared.view = shared
                .view
                .touch(&PeerId::from("earlier-peer"), earlier, Utc::now());
        }

        semaphore.set_resources(1).unwrap();
        assert!(!semaphore.is_acquired());
        assert_eq!(events.try_recv().unwrap(), SemaphoreEvent::Acquired);
        assert_eq!(events.try_recv().unwrap(), SemaphoreEvent::Released);
    }
}
