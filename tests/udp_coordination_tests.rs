//! End-to-end coordination between two processes' worth of state over real
//! UDP sockets on the loopback interface.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use usher::bus::{Bus, UdpBus};
use usher::semaphore::{Semaphore, SemaphoreId};
use usher::settings::SemaphoreSettings;

fn fast_settings() -> SemaphoreSettings {
    SemaphoreSettings::with_heartbeat_interval(Duration::from_millis(50))
}

fn any_port() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
}

/// Two buses on OS-assigned ports, each configured with the other as its
/// only peer.
async fn udp_pair() -> (Arc<UdpBus>, Arc<UdpBus>) {
    let a = UdpBus::bind(any_port(), vec![]).await.expect("bind bus a");
    let b = UdpBus::bind(any_port(), vec![]).await.expect("bind bus b");
    a.add_peer(b.local_address());
    b.add_peer(a.local_address());
    (Arc::new(a), Arc::new(b))
}

fn join_peer(bus: &Arc<UdpBus>, resources: u32) -> Semaphore {
    Semaphore::new(
        SemaphoreId::from("udp-jobs"),
        resources,
        Arc::clone(bus) as Arc<dyn Bus>,
        fast_settings(),
    )
    .expect("semaphore should construct")
}

#[tokio::test]
async fn test_single_slot_contention_across_sockets() {
    let (bus_a, bus_b) = udp_pair().await;
    let first = join_peer(&bus_a, 1);
    sleep(Duration::from_millis(5)).await;
    let second = join_peer(&bus_b, 1);

    first.acquire().unwrap();
    second.acquire().unwrap();
    sleep(Duration::from_millis(600)).await;

    assert!(first.is_acquired());
    assert!(!second.is_acquired());
    assert_eq!(first.peers(), 2);
    assert_eq!(second.peers(), 2);
    assert_eq!(second.consumed(), 1);
}

#[tokio::test]
async fn test_release_datagram_hands_the_slot_over() {
    let (bus_a, bus_b) = udp_pair().await;
    let first = join_peer(&bus_a, 1);
    sleep(Duration::from_millis(5)).await;
    let second = join_peer(&bus_b, 1);

    first.acquire().unwrap();
    second.acquire().unwrap();
    sleep(Duration::from_millis(600)).await;
    assert!(first.is_acquired());

    first.release().unwrap();
    sleep(Duration::from_millis(600)).await;

    assert!(!first.is_acquired());
    assert!(second.is_acquired());
    assert_eq!(second.peers(), 1);
}

#[tokio::test]
async fn test_remote_crash_is_noticed_through_staleness() {
    let (bus_a, bus_b) = udp_pair().await;
    let first = join_peer(&bus_a, 1);
    sleep(Duration::from_millis(5)).await;
    let second = join_peer(&bus_b, 1);

    first.acquire().unwrap();
    second.acquire().unwrap();
    sleep(Duration::from_millis(600)).await;
    assert!(first.is_acquired());
    assert!(!second.is_acquired());

    // The holder vanishes without a Release datagram. Its last heartbeat
    // ages past the 150ms staleness window and the survivor moves in.
    drop(first);
    sleep(Duration::from_millis(800)).await;

    assert!(second.is_acquired());
    assert_eq!(second.peers(), 1);
}
