// Shared peer and activity types

//! Shared data structures
//!
//! This module defines the records built from each peer snapshot, the
//! activity map kept across polls, and the transition events handed to
//! the event sink.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Display name used when a peer cannot be linked to a human name
pub const UNKNOWN_NAME: &str = "unknown";

/// One peer as observed in a single snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerRecord {
    /// WireGuard interface, e.g. `wg0`
    pub interface: String,
    /// Base64 public key
    pub public_key: String,
    /// Last known endpoint, `(none)` if never seen
    pub endpoint: String,
    /// Comma-separated allowed IPs
    pub allowed_ips: String,
    /// Unix timestamp in seconds, 0 when no handshake ever happened
    pub latest_handshake: f64,
    /// wg-gen-web name, or `unknown`
    pub display_name: String,
}

impl PeerRecord {
    /// Identity of this peer in the activity map
    pub fn key(&self) -> PeerKey {
        PeerKey {
            public_key: self.public_key.clone(),
            interface: self.interface.clone(),
        }
    }
}

/// Activity map key: the same public key may appear on several interfaces
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerKey {
    /// Base64 public key
    pub public_key: String,
    /// Interface the peer belongs to
    pub interface: String,
}

/// Per-peer "is active" flags, kept for the process lifetime
///
/// Peers missing from the map are inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityState {
    active: HashMap<PeerKey, bool>,
}

impl ActivityState {
    /// Create an empty state (every peer inactive)
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the peer is currently considered active
    pub fn is_active(&self, key: &PeerKey) -> bool {
        self.active.get(key).copied().unwrap_or(false)
    }

    /// Record the new activity flag of a peer
    pub fn set(&mut self, key: PeerKey, active: bool) {
        self.active.insert(key, active);
    }

    /// Number of peers observed so far
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// True if no peer has been observed yet
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Direction of a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Handshake became recent
    Active,
    /// Handshake aged past the timeout
    Inactive,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Active => write!(f, "active"),
            Transition::Inactive => write!(f, "inactive"),
        }
    }
}

/// A peer changed from active to inactive or back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    /// Display name of the peer
    pub name: String,
    /// Base64 public key
    pub public_key: String,
    /// Endpoint at the time of the change
    pub endpoint: String,
    /// Comma-separated allowed IPs
    pub allowed_ips: String,
    /// Interface the peer belongs to
    pub interface: String,
    /// New state
    pub transition: Transition,
}

impl TransitionEvent {
    /// Build the event for a peer entering the given state
    pub fn new(peer: &PeerRecord, transition: Transition) -> Self {
        Self {
            name: peer.display_name.clone(),
            public_key: peer.public_key.clone(),
            endpoint: peer.endpoint.clone(),
            allowed_ips: peer.allowed_ips.clone(),
            interface: peer.interface.clone(),
            transition,
        }
    }
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {} - {} - {}",
            self.name,
            self.public_key,
            self.endpoint,
            self.allowed_ips,
            self.interface,
            self.transition
        )
    }
}
