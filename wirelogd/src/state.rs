// Peer activity state machine

//! Activity state tracking
//!
//! Each peer is either active or inactive, inferred from how long ago its
//! latest handshake happened. Events are edge triggered: a peer produces an
//! event only when it crosses from one state to the other, never while it
//! stays put.

use crate::types::{ActivityState, PeerRecord, Transition, TransitionEvent};
use std::borrow::Borrow;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix seconds
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Return true if the handshake is strictly older than `timeout` seconds
pub fn check_timeout(latest_handshake: f64, timeout: u64, now: f64) -> bool {
    now - latest_handshake > timeout as f64
}

/// Run one poll cycle through the state machine
///
/// Returns the updated state and the transitions it produced, in peer order.
/// The map is only written when a peer changes state.
pub fn step<I>(
    peers: I,
    mut state: ActivityState,
    timeout: u64,
    now: f64,
) -> (ActivityState, Vec<TransitionEvent>)
where
    I: IntoIterator,
    I::Item: Borrow<PeerRecord>,
{
    let mut events = Vec::new();

    for peer in peers {
        let peer: &PeerRecord = peer.borrow();
        let key = peer.key();
        let was_active = state.is_active(&key);
        let expired = check_timeout(peer.latest_handshake, timeout, now);

        let transition = match (was_active, expired) {
            (true, true) => Transition::Inactive,
            (false, false) => Transition::Active,
            // Stable state, nothing to report
            _ => continue,
        };

        log::debug!(
            "Peer {} on {}: {} (handshake {:.0}s ago)",
            peer.public_key,
            peer.interface,
            transition,
            now - peer.latest_handshake
        );
        state.set(key, transition == Transition::Active);
        events.push(TransitionEvent::new(peer, transition));
    }

    (state, events)
}

/// Owner of the activity map across poll cycles
#[derive(Debug)]
pub struct ActivityTracker {
    state: ActivityState,
    timeout: u64,
}

impl ActivityTracker {
    /// Create a tracker where every peer starts inactive
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            state: ActivityState::new(),
            timeout: timeout_secs,
        }
    }

    /// Feed one snapshot observed at `now` and return its transitions
    pub fn observe<I>(&mut self, peers: I, now: f64) -> Vec<TransitionEvent>
    where
        I: IntoIterator,
        I::Item: Borrow<PeerRecord>,
    {
        let prior = std::mem::take(&mut self.state);
        let (state, events) = step(peers, prior, self.timeout, now);
        self.state = state;
        events
    }

    /// Get current activity map
    pub fn state(&self) -> &ActivityState {
        &self.state
    }

    /// Get handshake timeout in seconds
    pub fn timeout(&self) -> u64 {
        self.timeout
    }
}
