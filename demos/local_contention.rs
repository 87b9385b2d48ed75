//! Local contention walkthrough.
//!
//! Three semaphore instances in one process contend for two slots of the
//! same resource over the in-process bus; the first holder then releases
//! and the waiting peer takes its place.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use usher::bus::{Bus, MemoryBus};
use usher::semaphore::{Semaphore, SemaphoreId};
use usher::settings::SemaphoreSettings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Usher local contention example");

    let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
    let settings = SemaphoreSettings::with_heartbeat_interval(Duration::from_millis(200));

    // Three peers, two slots. Creation order fixes admission rank.
    let mut peers = Vec::new();
    for name in ["first", "second", "third"] {
        let semaphore = Semaphore::new(
            SemaphoreId::from("report-generation"),
            2,
            Arc::clone(&bus),
            settings.clone(),
        )?;
        println!("✓ Created peer '{}' with id {}", name, semaphore.peer_id());
        peers.push((name, semaphore));
        sleep(Duration::from_millis(10)).await;
    }

    for (name, semaphore) in &peers {
        semaphore.acquire()?;
        println!("✓ Peer '{}' is seeking", name);
    }

    // Let a few heartbeat rounds go by.
    sleep(Duration::from_secs(1)).await;
    print_holders(&peers);

    println!("\nReleasing peer 'first'...");
    peers[0].1.release()?;
    sleep(Duration::from_secs(1)).await;
    print_holders(&peers);

    Ok(())
}

fn print_holders(peers: &[(&str, Semaphore)]) {
    for (name, semaphore) in peers {
        let marker = if semaphore.is_acquired() {
            "holding"
        } else {
            "waiting"
        };
        println!(
            "  '{}': {} ({} peers in view, {}/{} slots consumed)",
            name,
            marker,
            semaphore.peers(),
            semaphore.consumed(),
            semaphore.resources()
        );
    }
}
