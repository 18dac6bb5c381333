// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - MASTERNODE PAYMENT LEDGER
//
// Per-height tally of masternode payment votes.
// - One admitted vote per masternode per height
// - Heights kept inside [tip - W, tip + 20], W grows with the masternode count
// - Payee selection and coinbase validation delegated to a PayeeSelector,
//   picked from a PayeeSelectionMode snapshot taken once per call
//
// Everything lives behind a single mutex so a vote's tally entry and its
// vote-map entry are always inserted and pruned together.
//
// Votes from masternodes the directory does not know yet are parked in a
// bounded pending set under the same window, and handed back by outpoint
// once the masternode shows up.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::selector::selector;
use crate::validator::PeerAction;
use bee_core::config::PaymentConfig;
use bee_core::interfaces::safe_lock;
use bee_core::{masternode_payment, Amount, Outpoint, Script, Transaction, TxOut};
use bee_crypto::{sign_message, verify_signature, CryptoError, Hash256};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Mutex;
use thiserror::Error;

/// How far ahead of the tip `is_scheduled` looks.
pub const SCHEDULE_LOOKAHEAD: u32 = 8;

/// Upper bound on votes parked for unknown masternodes.
pub const MAX_PENDING_VOTES: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayeeSelectionMode {
    /// Weighted gossip vote; the most-voted payee wins.
    Legacy,
    /// The masternode list fixes one payee per height; the first vote is authoritative.
    DeterministicOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("vote for height {height} outside window [{first}, {last}]")]
    OutOfRange { height: u32, first: u32, last: u32 },
    #[error("masternode {outpoint} already voted for height {height}")]
    AlreadyVoted { outpoint: Outpoint, height: u32 },
    #[error("height {0} already has an authoritative payee")]
    DuplicateHeight(u32),
    #[error("vote already seen and verified")]
    AlreadySeen,
    #[error("unknown masternode {0}")]
    UnknownMasternode(Outpoint),
    #[error("masternode protocol {version} below required {required}")]
    ObsoleteProtocol { version: u32, required: u32 },
    #[error("invalid vote signature from masternode {outpoint}")]
    InvalidSignature { outpoint: Outpoint, dos: u32 },
}

impl VoteError {
    pub fn peer_action(&self) -> PeerAction {
        match self {
            VoteError::UnknownMasternode(outpoint) => PeerAction::ask_for(*outpoint),
            VoteError::InvalidSignature { outpoint, dos } => PeerAction {
                penalty: *dos,
                ask_for: Some(*outpoint),
            },
            _ => PeerAction::none(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// VOTES AND TALLIES
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVote {
    pub masternode_outpoint: Outpoint,
    pub block_height: u32,
    pub payee: Script,
    pub signature: Vec<u8>,
}

impl PaymentVote {
    pub fn new(masternode_outpoint: Outpoint, block_height: u32, payee: Script) -> Self {
        PaymentVote {
            masternode_outpoint,
            block_height,
            payee,
            signature: Vec::new(),
        }
    }

    /// Signed vote for `height`, created by a local masternode.
    pub fn create(
        masternode_outpoint: Outpoint,
        block_height: u32,
        payee: Script,
        secret_key: &[u8],
    ) -> Result<Self, CryptoError> {
        let mut vote = Self::new(masternode_outpoint, block_height, payee);
        vote.sign(secret_key)?;
        Ok(vote)
    }

    /// Identity hash. The signature is excluded, so re-signed copies of one
    /// vote collide and only the first is kept.
    pub fn hash(&self) -> Hash256 {
        let mut hasher = Sha3_256::new();
        hasher.update((self.payee.0.len() as u32).to_le_bytes());
        hasher.update(&self.payee.0);
        hasher.update(self.block_height.to_le_bytes());
        hasher.update(self.masternode_outpoint.to_bytes());
        hasher.finalize().into()
    }

    pub fn signing_message(&self) -> String {
        format!(
            "{}{}{}",
            self.masternode_outpoint.to_string_short(),
            self.block_height,
            self.payee.to_asm()
        )
    }

    pub fn sign(&mut self, secret_key: &[u8]) -> Result<(), CryptoError> {
        self.signature = sign_message(self.signing_message().as_bytes(), secret_key)?;
        Ok(())
    }

    pub fn check_signature(&self, public_key: &[u8]) -> bool {
        verify_signature(self.signing_message().as_bytes(), &self.signature, public_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayeeTally {
    payee: Script,
    vote_hashes: BTreeSet<Hash256>,
}

impl PayeeTally {
    pub fn payee(&self) -> &Script {
        &self.payee
    }

    pub fn vote_count(&self) -> usize {
        self.vote_hashes.len()
    }

    pub fn vote_hashes(&self) -> impl Iterator<Item = &Hash256> {
        self.vote_hashes.iter()
    }
}

/// Payees voted for one height, in first-insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPayees {
    height: u32,
    payees: Vec<PayeeTally>,
    voters: HashSet<Outpoint>,
}

impl BlockPayees {
    fn new(height: u32) -> Self {
        BlockPayees {
            height,
            payees: Vec::new(),
            voters: HashSet::new(),
        }
    }

    fn add_vote(&mut self, vote: &PaymentVote, hash: Hash256) {
        self.voters.insert(vote.masternode_outpoint);
        match self.payees.iter_mut().find(|t| t.payee == vote.payee) {
            Some(tally) => {
                tally.vote_hashes.insert(hash);
            }
            None => {
                let mut vote_hashes = BTreeSet::new();
                vote_hashes.insert(hash);
                self.payees.push(PayeeTally {
                    payee: vote.payee.clone(),
                    vote_hashes,
                });
            }
        }
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn payees(&self) -> &[PayeeTally] {
        &self.payees
    }

    pub fn is_empty(&self) -> bool {
        self.payees.is_empty()
    }

    pub fn has_voter(&self, outpoint: &Outpoint) -> bool {
        self.voters.contains(outpoint)
    }

    pub fn total_votes(&self) -> usize {
        self.payees.iter().map(PayeeTally::vote_count).sum()
    }

    pub fn max_votes(&self) -> usize {
        self.payees.iter().map(PayeeTally::vote_count).max().unwrap_or(0)
    }

    /// `"address:votes, address:votes"`, or `"Unknown"` with no votes.
    pub fn required_payments_string(&self) -> String {
        if self.payees.is_empty() {
            return "Unknown".to_string();
        }
        self.payees
            .iter()
            .map(|t| format!("{}:{}", t.payee, t.vote_count()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ─────────────────────────────────────────────────────────────────
// LEDGER
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub votes: usize,
    pub heights: usize,
    pub tip: u32,
    pub storage_window: u32,
    pub pending: usize,
}

#[derive(Default)]
struct LedgerState {
    blocks: BTreeMap<u32, BlockPayees>,
    votes: HashMap<Hash256, PaymentVote>,
    last_votes: HashMap<Outpoint, u32>,
    pending: BTreeMap<Outpoint, BTreeMap<Hash256, PaymentVote>>,
    pending_count: usize,
    tip: u32,
    masternode_count: usize,
}

pub struct PaymentLedger {
    config: PaymentConfig,
    state: Mutex<LedgerState>,
}

impl PaymentLedger {
    pub fn new(config: PaymentConfig) -> Self {
        PaymentLedger {
            config,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    fn window_for(&self, masternode_count: usize) -> u32 {
        let scaled = masternode_count as u64 * self.config.storage_coeff_bps as u64 / 10_000;
        let scaled = u32::try_from(scaled).unwrap_or(u32::MAX);
        scaled.max(self.config.min_blocks_to_store)
    }

    /// `W = max(masternode_count * coeff, min_blocks)`.
    pub fn storage_window(&self) -> u32 {
        let count = safe_lock(&self.state).masternode_count;
        self.window_for(count)
    }

    fn accepted_range(&self, state: &LedgerState) -> RangeInclusive<u32> {
        let first = state.tip.saturating_sub(self.window_for(state.masternode_count));
        let last = state.tip.saturating_add(self.config.future_votes_limit);
        first..=last
    }

    pub fn tip(&self) -> u32 {
        safe_lock(&self.state).tip
    }

    pub fn update_tip(&self, height: u32) {
        safe_lock(&self.state).tip = height;
    }

    pub fn set_masternode_count(&self, count: usize) {
        safe_lock(&self.state).masternode_count = count;
    }

    /// Cheap checks before signature verification; never mutates.
    pub fn precheck(&self, vote: &PaymentVote) -> Result<Hash256, VoteError> {
        let hash = vote.hash();
        let state = safe_lock(&self.state);
        if state.votes.contains_key(&hash) {
            return Err(VoteError::AlreadySeen);
        }
        let range = self.accepted_range(&state);
        if !range.contains(&vote.block_height) {
            return Err(VoteError::OutOfRange {
                height: vote.block_height,
                first: *range.start(),
                last: *range.end(),
            });
        }
        Ok(hash)
    }

    /// Tally a vote that already passed signature checks. All-or-nothing.
    pub fn record_vote(&self, vote: PaymentVote, mode: PayeeSelectionMode) -> Result<Hash256, VoteError> {
        let hash = vote.hash();
        let height = vote.block_height;
        let outpoint = vote.masternode_outpoint;
        let mut state = safe_lock(&self.state);

        let range = self.accepted_range(&state);
        if !range.contains(&height) {
            return Err(VoteError::OutOfRange {
                height,
                first: *range.start(),
                last: *range.end(),
            });
        }
        if state.votes.contains_key(&hash) {
            return Err(VoteError::AlreadySeen);
        }

        let existing = state.blocks.get(&height);
        if state.last_votes.get(&outpoint) == Some(&height)
            || existing.is_some_and(|b| b.has_voter(&outpoint))
        {
            debug!(target: "mnpayments", "masternode {} already voted at height {}", outpoint, height);
            return Err(VoteError::AlreadyVoted { outpoint, height });
        }
        if !selector(mode).aggregates_votes() && existing.is_some_and(|b| !b.is_empty()) {
            return Err(VoteError::DuplicateHeight(height));
        }

        state.last_votes.insert(outpoint, height);
        state
            .blocks
            .entry(height)
            .or_insert_with(|| BlockPayees::new(height))
            .add_vote(&vote, hash);
        state.votes.insert(hash, vote);
        Ok(hash)
    }

    /// Drop every height and vote below `tip - W`, and adopt `tip`.
    pub fn prune(&self, tip: u32) -> usize {
        let mut state = safe_lock(&self.state);
        state.tip = tip;
        let first = tip.saturating_sub(self.window_for(state.masternode_count));

        let kept = state.blocks.split_off(&first);
        let removed = std::mem::replace(&mut state.blocks, kept).len();
        state.votes.retain(|_, v| v.block_height >= first);
        state.last_votes.retain(|_, h| *h >= first);
        for votes in state.pending.values_mut() {
            votes.retain(|_, v| v.block_height >= first);
        }
        state.pending.retain(|_, votes| !votes.is_empty());
        state.pending_count = state.pending.values().map(BTreeMap::len).sum();

        if removed > 0 {
            debug!(target: "mnpayments", "pruned {} heights below {}", removed, first);
        }
        removed
    }

    /// Park a vote whose masternode is not known yet. Returns false when the
    /// vote is out of window, already tallied or parked, or the set is full.
    pub fn hold_pending(&self, vote: PaymentVote) -> bool {
        let hash = vote.hash();
        let mut state = safe_lock(&self.state);
        if !self.accepted_range(&state).contains(&vote.block_height) || state.votes.contains_key(&hash) {
            return false;
        }
        if state.pending_count >= MAX_PENDING_VOTES {
            debug!(target: "mnpayments", "pending vote set full, dropping vote from {}", vote.masternode_outpoint);
            return false;
        }
        let held = state
            .pending
            .entry(vote.masternode_outpoint)
            .or_default()
            .insert(hash, vote)
            .is_none();
        if held {
            state.pending_count += 1;
        }
        held
    }

    /// Masternodes with parked votes.
    pub fn pending_outpoints(&self) -> Vec<Outpoint> {
        safe_lock(&self.state).pending.keys().copied().collect()
    }

    /// Remove and return every parked vote from `outpoint`, lowest height first.
    pub fn take_pending(&self, outpoint: &Outpoint) -> Vec<PaymentVote> {
        let mut state = safe_lock(&self.state);
        let Some(votes) = state.pending.remove(outpoint) else {
            return Vec::new();
        };
        state.pending_count -= votes.len();
        let mut votes: Vec<PaymentVote> = votes.into_values().collect();
        votes.sort_by_key(|v| v.block_height);
        votes
    }

    pub fn best_payee(&self, height: u32, mode: PayeeSelectionMode) -> Option<Script> {
        let state = safe_lock(&self.state);
        state.blocks.get(&height).and_then(|b| selector(mode).best_payee(b))
    }

    /// Masternode share of `reward`; `reward` already excludes any evolution carve-out.
    pub fn required_payment(&self, reward: Amount) -> Amount {
        masternode_payment(reward, self.config.masternode_share_bps)
    }

    pub fn is_transaction_valid(
        &self,
        tx: &Transaction,
        height: u32,
        reward: Amount,
        mode: PayeeSelectionMode,
    ) -> bool {
        let amount = self.required_payment(reward);
        let state = safe_lock(&self.state);
        match state.blocks.get(&height) {
            Some(block) => selector(mode).is_transaction_valid(block, tx, amount, &self.config),
            None => {
                debug!(target: "mnpayments", "no payee votes for height {}, accepting", height);
                true
            }
        }
    }

    /// The output a miner must add to pay the winning masternode.
    pub fn block_tx_outs(&self, height: u32, reward: Amount, mode: PayeeSelectionMode) -> Option<TxOut> {
        let payee = self.best_payee(height, mode)?;
        let out = TxOut::new(self.required_payment(reward), payee);
        info!(target: "mnpayments", "masternode payment {} at height {}", out, height);
        Some(out)
    }

    pub fn required_payments_string(&self, height: u32) -> String {
        let state = safe_lock(&self.state);
        state
            .blocks
            .get(&height)
            .map(BlockPayees::required_payments_string)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Whether `payee` wins any of the next few blocks other than `not_height`.
    pub fn is_scheduled(&self, payee: &Script, not_height: u32, mode: PayeeSelectionMode) -> bool {
        let state = safe_lock(&self.state);
        let tip = state.tip;
        (tip..=tip.saturating_add(SCHEDULE_LOOKAHEAD))
            .filter(|h| *h != not_height)
            .filter_map(|h| state.blocks.get(&h))
            .any(|b| selector(mode).best_payee(b).as_ref() == Some(payee))
    }

    pub fn is_enough_data(&self, mode: PayeeSelectionMode) -> bool {
        let state = safe_lock(&self.state);
        let window = self.window_for(state.masternode_count);
        selector(mode).has_enough_data(state.blocks.len(), state.votes.len(), window, &self.config)
    }

    /// Recorded heights whose tally cannot be trusted yet.
    pub fn low_data_heights(&self, mode: PayeeSelectionMode) -> Vec<u32> {
        let state = safe_lock(&self.state);
        state
            .blocks
            .values()
            .filter(|b| !selector(mode).is_conclusive(b, &self.config))
            .map(BlockPayees::height)
            .collect()
    }

    pub fn has_height(&self, height: u32) -> bool {
        safe_lock(&self.state).blocks.contains_key(&height)
    }

    pub fn has_verified_vote(&self, hash: &Hash256) -> bool {
        safe_lock(&self.state).votes.contains_key(hash)
    }

    pub fn vote(&self, hash: &Hash256) -> Option<PaymentVote> {
        safe_lock(&self.state).votes.get(hash).cloned()
    }

    pub fn votes_at(&self, height: u32) -> Vec<PaymentVote> {
        let state = safe_lock(&self.state);
        let Some(block) = state.blocks.get(&height) else {
            return Vec::new();
        };
        block
            .payees()
            .iter()
            .flat_map(PayeeTally::vote_hashes)
            .filter_map(|h| state.votes.get(h).cloned())
            .collect()
    }

    /// Hashes of stored votes for heights in `range`, ordered by height.
    pub fn vote_hashes_in(&self, range: std::ops::Range<u32>) -> Vec<Hash256> {
        let state = safe_lock(&self.state);
        state
            .blocks
            .range(range)
            .flat_map(|(_, b)| b.payees().iter().flat_map(PayeeTally::vote_hashes))
            .filter(|h| state.votes.contains_key(*h))
            .copied()
            .collect()
    }

    pub fn block_payees(&self, height: u32) -> Option<BlockPayees> {
        safe_lock(&self.state).blocks.get(&height).cloned()
    }

    pub fn stats(&self) -> LedgerStats {
        let state = safe_lock(&self.state);
        LedgerStats {
            votes: state.votes.len(),
            heights: state.blocks.len(),
            tip: state.tip,
            storage_window: self.window_for(state.masternode_count),
            pending: state.pending_count,
        }
    }

    pub fn clear(&self) {
        let mut state = safe_lock(&self.state);
        state.blocks.clear();
        state.votes.clear();
        state.last_votes.clear();
        state.pending.clear();
        state.pending_count = 0;
        warn!(target: "mnpayments", "payment ledger cleared");
    }
}
