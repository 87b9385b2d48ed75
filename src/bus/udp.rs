//! UDP heartbeat bus for a static peer topology.
//!
//! Every publish fans the encoded heartbeat out to each configured peer
//! address as one datagram and hands a copy straight to this process's own
//! subscriptions, so local delivery never depends on the network stack.
//! Datagrams that fail to send or fail to decode are logged and dropped;
//! the protocol heals itself on the next heartbeat interval.

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{Bus, BusSubscription, SubscriberTable};
use crate::error::Result;
use crate::semaphore::heartbeat::Heartbeat;
use crate::semaphore::ids::SemaphoreId;
use crate::transport_error;

// 64KB maximum UDP packet size
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Datagram bus wiring this process to a fixed set of peer processes.
///
/// Peers can be added and removed at runtime; there is no discovery. The
/// socket's receive side runs on a background task that decodes inbound
/// datagrams and routes them to local subscriptions by semaphore id.
pub struct UdpBus {
    socket: Arc<UdpSocket>,
    local_address: SocketAddr,
    peers: Arc<RwLock<HashSet<SocketAddr>>>,
    table: Arc<SubscriberTable>,
    receiver: JoinHandle<()>,
}

impl UdpBus {
    /// Bind a socket and start the receive task.
    ///
    /// Bind to port 0 to let the OS assign one; `local_address` reports the
    /// result.
    pub async fn bind(bind_addr: SocketAddr, initial_peers: Vec<SocketAddr>) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local_address = socket.local_addr()?;
        let peers = Arc::new(RwLock::new(initial_peers.into_iter().collect()));
        let table = Arc::new(SubscriberTable::default());

        let receiver = tokio::spawn(Self::receive_loop(Arc::clone(&socket), Arc::clone(&table)));

        info!("UDP heartbeat bus listening on {}", local_address);
        Ok(Self {
            socket,
            local_address,
            peers,
            table,
            receiver,
        })
    }

    /// Get the local socket address
    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Add a peer to the current peer list
    pub fn add_peer(&self, address: SocketAddr) {
        if let Ok(mut peers) = self.peers.write() {
            if peers.insert(address) {
                info!("Added heartbeat peer: {}", address);
            }
        }
    }

    /// Remove a peer from the current peer list
    pub fn remove_peer(&self, address: &SocketAddr) {
        if let Ok(mut peers) = self.peers.write() {
            if peers.remove(address) {
                info!("Removed heartbeat peer: {}", address);
            }
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().map(|peers| peers.len()).unwrap_or(0)
    }

    pub fn has_peer(&self, address: &SocketAddr) -> bool {
        self.peers
            .read()
            .map(|peers| peers.contains(address))
            .unwrap_or(false)
    }

    /// Decode inbound datagrams forever, routing good ones to subscriptions.
    /// Malformed datagrams and transient socket errors are logged and
    /// skipped; neither stops the loop.
    async fn receive_loop(socket: Arc<UdpSocket>, table: Arc<SubscriberTable>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => match Heartbeat::decode(&buf[..len]) {
                    Ok(heartbeat) => {
                        table.dispatch(&heartbeat);
                    }
                    Err(e) => {
                        debug!("Failed to decode datagram from {}: {}", addr, e);
                    }
                },
                Err(e) => {
                    // Linux surfaces ICMP errors from earlier sends here.
                    warn!("UDP receive failed: {}", e);
                }
            }
        }
    }
}

impl Drop for UdpBus {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

#[async_trait]
impl Bus for UdpBus {
    /// Continues sending to the remaining peers when some sends fail, then
    /// loops the heartbeat back to local subscriptions.
    async fn publish(&self, heartbeat: &Heartbeat, _expire_after: Duration) -> Result<()> {
        let data = heartbeat.encode()?;
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(transport_error!(
                "Heartbeat too large: {} bytes (max: {} bytes)",
                data.len(),
                MAX_DATAGRAM_SIZE
            ));
        }

        let targets: Vec<SocketAddr> = self
            .peers
            .read()
            .map(|peers| peers.iter().cloned().collect())
            .unwrap_or_default();

        let mut failures = 0;
        for peer in &targets {
            if let Err(e) = self.socket.send_to(&data, peer).await {
                failures += 1;
                debug!("Failed to send heartbeat to {}: {}", peer, e);
            }
        }
        if failures > 0 {
            warn!(
                "Heartbeat for '{}' reached {}/{} peers",
                heartbeat.semaphore_id,
                targets.len() - failures,
                targets.len()
            );
        }

        self.table.dispatch(heartbeat);
        Ok(())
    }

    fn subscribe(&self, topic: &SemaphoreId) -> Result<BusSubscription> {
        Ok(SubscriberTable::register(&self.table, topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semaphore::ids::PeerId;
    use chrono::Utc;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::time::timeout;

    const NO_EXPIRY: Duration = Duration::from_secs(60);

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    async fn bind_test_bus() -> UdpBus {
        UdpBus::bind(loopback(0), vec![])
            .await
            .expect("Failed to bind test bus")
    }

    #[tokio::test]
    async fn test_bind_assigns_a_port() {
        let bus = bind_test_bus().await;
        assert!(bus.local_address().port() > 0);
        assert_eq!(bus.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_management() {
        let bus = bind_test_bus().await;
        let peer1 = loopback(9001);
        let peer2 = loopback(9002);

        bus.add_peer(peer1);
        bus.add_peer(peer2);
        assert_eq!(bus.peer_count(), 2);
        assert!(bus.has_peer(&peer1));

        bus.remove_peer(&peer1);
        assert_eq!(bus.peer_count(), 1);
        assert!(!bus.has_peer(&peer1));
        assert!(bus.has_peer(&peer2));
    }

    #[tokio::test]
    async fn test_heartbeats_cross_between_buses() {
        let sender = bind_test_bus().await;
        let receiver = bind_test_bus().await;
        sender.add_peer(receiver.local_address());

        let mut sub = receiver.subscribe(&SemaphoreId::from("jobs")).unwrap();
        let hb = Heartbeat::acquire(SemaphoreId::from("jobs"), PeerId::random(), Utc::now());
        sender.publish(&hb, NO_EXPIRY).await.unwrap();

        let got = timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("heartbeat should arrive over loopback")
            .unwrap();
        assert_eq!(got, hb);
    }

    #[tokio::test]
    async fn test_publisher_hears_itself_without_a_network_round_trip() {
        let bus = bind_test_bus().await;

        let mut sub = bus.subscribe(&SemaphoreId::from("jobs")).unwrap();
        let hb = Heartbeat::acquire(SemaphoreId::from("jobs"), PeerId::random(), Utc::now());
        bus.publish(&hb, NO_EXPIRY).await.unwrap();

        let got = timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("loopback heartbeat should arrive")
            .unwrap();
        assert_eq!(got, hb);
    }

    #[tokio::test]
    async fn test_malformed_datagrams_are_skipped() {
        let sender = bind_test_bus().await;
        let receiver = bind_test_bus().await;
        sender.add_peer(receiver.local_address());
        let mut sub = receiver.subscribe(&SemaphoreId::from("jobs")).unwrap();

        // Raw garbage straight at the receiver's socket.
        let prober = UdpSocket::bind(loopback(0)).await.unwrap();
        prober
            .send_to(b"definitely not a heartbeat", receiver.local_address())
            .await
            .unwrap();

        // A valid heartbeat sent over the wire afterwards still comes
        // through, proving the receive loop shrugged the garbage off.
        let hb = Heartbeat::acquire(SemaphoreId::from("jobs"), PeerId::random(), Utc::now());
        sender.publish(&hb, NO_EXPIRY).await.unwrap();

        let got = timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("valid heartbeat should still arrive")
            .unwrap();
        assert_eq!(got, hb);
    }

    #[tokio::test]
    async fn test_unreachable_peers_do_not_fail_publish() {
        let bus = bind_test_bus().await;
        // Nothing listens here; the datagram just vanishes.
        bus.add_peer(loopback(1));

        let hb = Heartbeat::acquire(SemaphoreId::from("jobs"), PeerId::random(), Utc::now());
        assert!(bus.publish(&hb, NO_EXPIRY).await.is_ok());
    }
}
