//! Usher: a gossip-based distributed counting semaphore.
//!
//! Up to `resources` peers at a time may hold a named resource, coordinated
//! over nothing but a lossy broadcast bus. Each peer periodically announces
//! itself with a heartbeat, folds every heartbeat it hears into its own view
//! of the contenders, and independently admits the `resources`
//! longest-standing of them. Peers that have seen the same heartbeats agree
//! on who holds the slots; peers that crash silently age out of everyone
//! else's view and their slots free up on their own.
//!
//! The admission it provides is advisory and eventually consistent. While
//! heartbeats are still propagating, or across a partition, more than
//! `resources` peers can briefly believe they hold a slot, so callers who
//! need hard mutual exclusion must fence the protected work themselves.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use usher::bus::MemoryBus;
//! use usher::semaphore::{Semaphore, SemaphoreId};
//! use usher::settings::SemaphoreSettings;
//!
//! # async fn example() -> usher::Result<()> {
//! let bus = Arc::new(MemoryBus::new());
//! let semaphore = Semaphore::new(
//!     SemaphoreId::from("nightly-compaction"),
//!     1,
//!     bus,
//!     SemaphoreSettings::default(),
//! )?;
//!
//! let mut events = semaphore.events();
//! semaphore.acquire()?;
//! if let Ok(event) = events.recv().await {
//!     println!("admission changed: {:?}", event);
//! }
//! semaphore.release()?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod bus;
pub mod cli;
pub mod error;
pub mod semaphore;
pub mod settings;

pub use bus::{Bus, BusSubscription, MemoryBus, UdpBus};
pub use error::{Result, SemaphoreError, UsherError};
pub use semaphore::{
    Heartbeat, HeartbeatStatus, PeerId, Semaphore, SemaphoreEvent, SemaphoreId, SemaphoreStatus,
};
pub use settings::{SemaphoreSettings, Settings};
