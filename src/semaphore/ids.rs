//! Identity types for semaphores and the peers contending for them.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of one logical resource class.
///
/// Every peer contending for the same resource uses the same id; it is also
/// the routing key heartbeats are filtered on at the bus boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemaphoreId(String);

impl SemaphoreId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SemaphoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SemaphoreId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SemaphoreId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity of one running peer process.
///
/// Generated once per semaphore instance and reused across every
/// acquire/release cycle of that instance, so a peer keeps the same identity
/// for its whole lifetime. The derived `Ord` (lexicographic on the underlying
/// string) is what breaks admission ties between peers that joined at the
/// same instant, so every peer ranks ties identically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Random process-unique id.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_id_round_trip() {
        let id = SemaphoreId::from("report-generation");
        assert_eq!(id.as_str(), "report-generation");
        assert_eq!(id.to_string(), "report-generation");
        assert_eq!(id, SemaphoreId::new(String::from("report-generation")));
    }

    #[test]
    fn test_peer_ids_are_unique() {
        let a = PeerId::random();
        let b = PeerId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn test_peer_id_ordering_is_lexicographic() {
        let a = PeerId::from("aaa");
        let b = PeerId::from("bbb");
        assert!(a < b);
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = SemaphoreId::from("nightly-batch");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"nightly-batch\"");

        let peer: PeerId = serde_json::from_str("\"peer-1\"").unwrap();
        assert_eq!(peer, PeerId::from("peer-1"));
    }
}
