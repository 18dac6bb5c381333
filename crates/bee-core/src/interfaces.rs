// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - COLLABORATOR INTERFACES
//
// What the spork and payment subsystems need from the rest of the node.
// - ChainView: active chain heights and block hashes
// - MasternodeDirectory: masternode registry lookups
// - SyncStatus: blockchain / masternode list / winners sync stages
//
// The in-memory implementations back the standalone binary and tests.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::{Outpoint, Script};
use bee_crypto::Hash256;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the inner value if a previous holder panicked.
pub fn safe_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("recovering state from a poisoned lock");
        poisoned.into_inner()
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeInfo {
    pub outpoint: Outpoint,
    pub protocol_version: u32,
    /// Key that signs this masternode's payment votes.
    pub operator_pubkey: Vec<u8>,
    /// Where this masternode's reward is paid.
    pub payout_script: Script,
}

pub trait ChainView: Send + Sync {
    fn tip_height(&self) -> Option<u32>;
    fn block_hash(&self, height: u32) -> Option<Hash256>;
    fn height_of(&self, hash: &Hash256) -> Option<u32>;
}

pub trait MasternodeDirectory: Send + Sync {
    fn masternode_info(&self, outpoint: &Outpoint) -> Option<MasternodeInfo>;
    fn count(&self) -> usize;
    /// Locally computed winner for `height`, used when no votes exist.
    fn next_in_queue(&self, height: u32) -> Option<MasternodeInfo>;
}

pub trait SyncStatus: Send + Sync {
    fn is_blockchain_synced(&self) -> bool;
    fn is_masternode_list_synced(&self) -> bool;
    fn is_winners_list_synced(&self) -> bool;
    fn is_synced(&self) -> bool;
}

// ─────────────────────────────────────────────────────────────────
// IN-MEMORY IMPLEMENTATIONS
// ─────────────────────────────────────────────────────────────────

/// Active chain as a height -> hash map.
#[derive(Default)]
pub struct MemoryChain {
    blocks: Mutex<BTreeMap<u32, Hash256>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain of `tip + 1` blocks whose hashes are derived from their heights.
    pub fn with_height(tip: u32) -> Self {
        let chain = Self::new();
        for height in 0..=tip {
            chain.push(height, synthetic_block_hash(height));
        }
        chain
    }

    pub fn push(&self, height: u32, hash: Hash256) {
        safe_lock(&self.blocks).insert(height, hash);
    }

    /// Extend by one synthetic block and return the new tip.
    pub fn advance(&self) -> u32 {
        let mut blocks = safe_lock(&self.blocks);
        let next = blocks.keys().next_back().map(|h| h + 1).unwrap_or(0);
        blocks.insert(next, synthetic_block_hash(next));
        next
    }
}

pub fn synthetic_block_hash(height: u32) -> Hash256 {
    bee_crypto::hash_fields(&[b"block", &height.to_le_bytes()])
}

impl ChainView for MemoryChain {
    fn tip_height(&self) -> Option<u32> {
        safe_lock(&self.blocks).keys().next_back().copied()
    }

    fn block_hash(&self, height: u32) -> Option<Hash256> {
        safe_lock(&self.blocks).get(&height).copied()
    }

    fn height_of(&self, hash: &Hash256) -> Option<u32> {
        safe_lock(&self.blocks)
            .iter()
            .find(|(_, h)| *h == hash)
            .map(|(height, _)| *height)
    }
}

/// Masternode registry keyed by collateral outpoint; queue order is the
/// sorted outpoint order, rotated by height.
#[derive(Default)]
pub struct MemoryMasternodes {
    nodes: Mutex<BTreeMap<Outpoint, MasternodeInfo>>,
}

impl MemoryMasternodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, info: MasternodeInfo) {
        safe_lock(&self.nodes).insert(info.outpoint, info);
    }

    pub fn remove(&self, outpoint: &Outpoint) -> Option<MasternodeInfo> {
        safe_lock(&self.nodes).remove(outpoint)
    }
}

impl MasternodeDirectory for MemoryMasternodes {
    fn masternode_info(&self, outpoint: &Outpoint) -> Option<MasternodeInfo> {
        safe_lock(&self.nodes).get(outpoint).cloned()
    }

    fn count(&self) -> usize {
        safe_lock(&self.nodes).len()
    }

    fn next_in_queue(&self, height: u32) -> Option<MasternodeInfo> {
        let nodes = safe_lock(&self.nodes);
        if nodes.is_empty() {
            return None;
        }
        let idx = height as usize % nodes.len();
        nodes.values().nth(idx).cloned()
    }
}

/// Sync stages as plain flags, flipped by whoever drives the sync process.
pub struct FlagSyncStatus {
    blockchain: AtomicBool,
    masternode_list: AtomicBool,
    winners: AtomicBool,
}

impl FlagSyncStatus {
    pub fn new(synced: bool) -> Self {
        Self {
            blockchain: AtomicBool::new(synced),
            masternode_list: AtomicBool::new(synced),
            winners: AtomicBool::new(synced),
        }
    }

    pub fn set_blockchain_synced(&self, value: bool) {
        self.blockchain.store(value, Ordering::SeqCst);
    }

    pub fn set_masternode_list_synced(&self, value: bool) {
        self.masternode_list.store(value, Ordering::SeqCst);
    }

    pub fn set_winners_synced(&self, value: bool) {
        self.winners.store(value, Ordering::SeqCst);
    }
}

impl SyncStatus for FlagSyncStatus {
    fn is_blockchain_synced(&self) -> bool {
        self.blockchain.load(Ordering::SeqCst)
    }

    fn is_masternode_list_synced(&self) -> bool {
        self.masternode_list.load(Ordering::SeqCst)
    }

    fn is_winners_list_synced(&self) -> bool {
        self.winners.load(Ordering::SeqCst)
    }

    fn is_synced(&self) -> bool {
        self.is_blockchain_synced() && self.is_masternode_list_synced() && self.is_winners_list_synced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(n: u8) -> MasternodeInfo {
        MasternodeInfo {
            outpoint: Outpoint::new([n; 32], 0),
            protocol_version: 70_213,
            operator_pubkey: vec![n; 32],
            payout_script: Script::pay_to_key_id(&[n; 20]),
        }
    }

    #[test]
    fn test_memory_chain_lookup() {
        let chain = MemoryChain::with_height(10);
        assert_eq!(chain.tip_height(), Some(10));
        let hash = chain.block_hash(7).unwrap();
        assert_eq!(chain.height_of(&hash), Some(7));
        assert_eq!(chain.block_hash(11), None);
        assert_eq!(chain.advance(), 11);
        assert_eq!(chain.tip_height(), Some(11));
    }

    #[test]
    fn test_empty_chain_has_no_tip() {
        assert_eq!(MemoryChain::new().tip_height(), None);
        assert_eq!(MemoryChain::new().advance(), 0);
    }

    #[test]
    fn test_masternode_queue_rotates() {
        let mns = MemoryMasternodes::new();
        assert!(mns.next_in_queue(5).is_none());
        mns.insert(info(1));
        mns.insert(info(2));
        assert_eq!(mns.count(), 2);
        let a = mns.next_in_queue(100).unwrap();
        let b = mns.next_in_queue(101).unwrap();
        assert_ne!(a.outpoint, b.outpoint);
        assert_eq!(mns.next_in_queue(102).unwrap().outpoint, a.outpoint);
    }

    #[test]
    fn test_sync_flags() {
        let status = FlagSyncStatus::new(false);
        assert!(!status.is_synced());
        status.set_blockchain_synced(true);
        status.set_masternode_list_synced(true);
        assert!(!status.is_synced());
        status.set_winners_synced(true);
        assert!(status.is_synced());
    }

    #[test]
    fn test_safe_lock_recovers_from_poison() {
        let m = std::sync::Arc::new(Mutex::new(5));
        let m2 = m.clone();
        let _ = std::thread::spawn(move || {
            let _guard = m2.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(m.lock().is_err());
        assert_eq!(*safe_lock(&m), 5);
    }
}
