// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - PEER SINK
//
// The outbound half of the transport as seen by spork and payment handling:
// direct replies, inventory relay, misbehavior scoring, masternode lookups.
// Implementations must not call back into a ledger.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::messages::{Inventory, NetMessage};
use bee_consensus::validator::PeerAction;
use bee_core::interfaces::safe_lock;
use bee_core::Outpoint;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Mutex;

pub type PeerId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub protocol_version: u32,
    pub addr: String,
}

impl PeerInfo {
    pub fn new(id: PeerId, protocol_version: u32, addr: impl Into<String>) -> Self {
        PeerInfo {
            id,
            protocol_version,
            addr: addr.into(),
        }
    }
}

pub trait PeerSink: Send + Sync {
    fn push_message(&self, peer: PeerId, msg: NetMessage);
    /// Announce to every peer at or above `min_proto`.
    fn relay_inventory(&self, inv: Inventory, min_proto: u32);
    fn misbehaving(&self, peer: PeerId, score: u32, reason: &str);
    fn ask_for_masternode(&self, peer: PeerId, outpoint: Outpoint);
}

/// Carry out `action` against `peer`.
pub fn apply_action(sink: &dyn PeerSink, peer: PeerId, action: &PeerAction, reason: &str) {
    if action.penalty > 0 {
        warn!(target: "net", "peer={} misbehaving +{}: {}", peer, action.penalty, reason);
        sink.misbehaving(peer, action.penalty, reason);
    }
    if let Some(outpoint) = action.ask_for {
        debug!(target: "net", "asking peer={} for masternode {}", peer, outpoint);
        sink.ask_for_masternode(peer, outpoint);
    }
}

// ─────────────────────────────────────────────────────────────────

/// Records everything it is asked to send; stands in for the transport.
#[derive(Default)]
pub struct MemorySink {
    log: Mutex<SinkLog>,
}

#[derive(Default, Clone)]
pub struct SinkLog {
    pub pushed: Vec<(PeerId, NetMessage)>,
    pub relayed: Vec<(Inventory, u32)>,
    pub penalties: Vec<(PeerId, u32)>,
    pub asked: Vec<(PeerId, Outpoint)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SinkLog {
        safe_lock(&self.log).clone()
    }

    pub fn pushed_to(&self, peer: PeerId) -> Vec<NetMessage> {
        safe_lock(&self.log)
            .pushed
            .iter()
            .filter(|(p, _)| *p == peer)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn penalty_of(&self, peer: PeerId) -> u32 {
        safe_lock(&self.log)
            .penalties
            .iter()
            .filter(|(p, _)| *p == peer)
            .map(|(_, s)| s)
            .sum()
    }

    pub fn take(&self) -> SinkLog {
        std::mem::take(&mut *safe_lock(&self.log))
    }
}

impl PeerSink for MemorySink {
    fn push_message(&self, peer: PeerId, msg: NetMessage) {
        safe_lock(&self.log).pushed.push((peer, msg));
    }

    fn relay_inventory(&self, inv: Inventory, min_proto: u32) {
        safe_lock(&self.log).relayed.push((inv, min_proto));
    }

    fn misbehaving(&self, peer: PeerId, score: u32, _reason: &str) {
        safe_lock(&self.log).penalties.push((peer, score));
    }

    fn ask_for_masternode(&self, peer: PeerId, outpoint: Outpoint) {
        safe_lock(&self.log).asked.push((peer, outpoint));
    }
}

// ─────────────────────────────────────────────────────────────────

/// Per-session record of requests already served to a peer.
#[derive(Default)]
pub struct FulfilledRequests {
    done: Mutex<HashSet<(PeerId, &'static str)>>,
}

impl FulfilledRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_fulfilled(&self, peer: PeerId, request: &'static str) -> bool {
        safe_lock(&self.done).contains(&(peer, request))
    }

    /// Returns false if it was already recorded.
    pub fn add_fulfilled(&self, peer: PeerId, request: &'static str) -> bool {
        safe_lock(&self.done).insert((peer, request))
    }

    /// Called on disconnect; the next session starts clean.
    pub fn forget_peer(&self, peer: PeerId) {
        safe_lock(&self.done).retain(|(p, _)| *p != peer);
    }

    pub fn len(&self) -> usize {
        safe_lock(&self.done).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
