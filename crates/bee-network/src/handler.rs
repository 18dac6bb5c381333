// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - MESSAGE HANDLER
//
// Admission of inbound spork and payment messages.
//
// Payment vote path:
//   received -> range/seen check -> signature check -> dedup + tally -> relay
// A vote that fails any step leaves the ledger untouched. A vote from a
// masternode the directory does not know is parked in the ledger's pending
// set and re-admitted by `admit_pending` once the masternode is known.
//
// The payee selection mode and the protocol floor are read from the spork
// registry once per message, before the ledger lock is taken.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::messages::{InvKind, Inventory, NetMessage, REJECT_OBSOLETE};
use crate::peer::{apply_action, FulfilledRequests, PeerInfo, PeerSink};
use crate::sync::SyncCoordinator;
use bee_consensus::payments::{PayeeSelectionMode, PaymentLedger, PaymentVote, VoteError};
use bee_consensus::registry::{SporkAdmission, SporkError, SporkRegistry};
use bee_consensus::spork::SporkMessage;
use bee_consensus::validator::{PeerAction, VoteValidator, PENALTY_REPEATED_SYNC};
use bee_core::config::SyncConfig;
use bee_core::interfaces::{ChainView, MasternodeDirectory, SyncStatus};
use bee_core::Outpoint;
use bee_crypto::Hash256;
use log::{debug, info, warn};
use std::sync::Arc;

const PAYMENT_SYNC: &str = "mnpaymentsync";

/// Everything the handler reads or writes, injected by the node runtime.
#[derive(Clone)]
pub struct Subsystems {
    pub sporks: Arc<SporkRegistry>,
    pub ledger: Arc<PaymentLedger>,
    pub validator: VoteValidator,
    pub masternodes: Arc<dyn MasternodeDirectory>,
    pub chain: Arc<dyn ChainView>,
    pub status: Arc<dyn SyncStatus>,
    pub sink: Arc<dyn PeerSink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    SporkAdmitted(SporkAdmission),
    VoteAdmitted(Hash256),
    /// Signer unknown; vote parked and the masternode requested from the peer.
    VotePending(Outpoint),
    /// Replied with this many messages.
    Answered(usize),
    /// Dropped without consequence: duplicate, stale, out of window, unsynced.
    Ignored,
    Rejected { reason: String, action: PeerAction },
}

pub struct MessageHandler {
    s: Subsystems,
    sync: SyncCoordinator,
    fulfilled: FulfilledRequests,
}

impl MessageHandler {
    pub fn new(s: Subsystems, config: &SyncConfig) -> Self {
        let sync = SyncCoordinator::new(
            s.ledger.clone(),
            s.sporks.clone(),
            s.chain.clone(),
            s.sink.clone(),
            config,
        );
        MessageHandler {
            s,
            sync,
            fulfilled: FulfilledRequests::new(),
        }
    }

    pub fn sync_coordinator(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn peer_disconnected(&self, peer: &PeerInfo) {
        self.fulfilled.forget_peer(peer.id);
    }

    /// Ask a freshly connected peer for missing payment blocks while the
    /// ledger does not hold enough data. Returns the blocks requested.
    pub fn backfill(&self, peer: &PeerInfo) -> usize {
        if peer.protocol_version < self.s.validator.min_payment_proto(&self.s.sporks) {
            return 0;
        }
        let mode = self.s.sporks.payee_selection_mode();
        if self.s.ledger.is_enough_data(mode) {
            return 0;
        }
        self.sync.request_missing(peer.id)
    }

    /// Re-run admission for parked votes of every masternode now known.
    pub fn admit_pending(&self) -> usize {
        self.s
            .ledger
            .pending_outpoints()
            .iter()
            .map(|outpoint| self.admit_pending_for(outpoint))
            .sum()
    }

    /// Re-run admission for the parked votes of `outpoint`. Votes stay parked
    /// while the masternode is still unknown or the list is unsynced.
    pub fn admit_pending_for(&self, outpoint: &Outpoint) -> usize {
        if !self.s.status.is_masternode_list_synced() || self.s.masternodes.masternode_info(outpoint).is_none() {
            return 0;
        }
        let Some(validation_height) = self.s.chain.tip_height() else {
            return 0;
        };
        let min_proto = self.s.validator.min_payment_proto(&self.s.sporks);
        let mode = self.s.sporks.payee_selection_mode();

        let mut admitted = 0;
        for vote in self.s.ledger.take_pending(outpoint) {
            let checked = self.s.ledger.precheck(&vote).and_then(|_| {
                self.s
                    .validator
                    .check_vote(&vote, self.s.masternodes.as_ref(), min_proto, validation_height, true)
            });
            let result = checked.and_then(|_| self.tally(vote, mode, min_proto));
            match result {
                Ok(_) => admitted += 1,
                Err(e) => debug!(target: "mnpayments", "pending vote from {} dropped: {}", outpoint, e),
            }
        }
        if admitted > 0 {
            info!(target: "mnpayments", "admitted {} pending votes from masternode {}", admitted, outpoint);
        }
        admitted
    }

    pub fn handle(&self, peer: &PeerInfo, msg: NetMessage) -> HandleOutcome {
        match msg {
            NetMessage::Spork(spork) => self.on_spork(peer, spork),
            NetMessage::GetSporks => {
                let messages = self.s.sporks.active_messages();
                let count = messages.len();
                for m in messages {
                    self.s.sink.push_message(peer.id, NetMessage::Spork(m));
                }
                HandleOutcome::Answered(count)
            }
            NetMessage::PaymentVote(vote) | NetMessage::LegacyPaymentVote(vote) => self.on_payment_vote(peer, vote),
            NetMessage::PaymentSync => self.on_payment_sync(peer),
            NetMessage::GetData(inventory) => HandleOutcome::Answered(self.sync.answer_getdata(peer.id, &inventory)),
            NetMessage::Inv(inventory) => self.on_inv(peer, inventory),
            NetMessage::SyncStatusCount { asset, count } => {
                debug!(target: "net", "peer={} reports {} items for asset {}", peer.id, count, asset);
                HandleOutcome::Ignored
            }
            NetMessage::Reject { command, code, reason } => {
                warn!(target: "net", "peer={} rejected {} (code {:#x}): {}", peer.id, command, code, reason);
                HandleOutcome::Ignored
            }
        }
    }

    fn reject(&self, peer: &PeerInfo, reason: String, action: PeerAction) -> HandleOutcome {
        apply_action(self.s.sink.as_ref(), peer.id, &action, &reason);
        HandleOutcome::Rejected { reason, action }
    }

    fn reject_obsolete(&self, peer: &PeerInfo, command: &str, min_proto: u32) {
        self.s.sink.push_message(
            peer.id,
            NetMessage::Reject {
                command: command.to_string(),
                code: REJECT_OBSOLETE,
                reason: format!("Version must be {} or greater", min_proto),
            },
        );
    }

    fn on_spork(&self, peer: &PeerInfo, spork: SporkMessage) -> HandleOutcome {
        let hash = spork.hash();
        if self.s.chain.tip_height().is_none() {
            return HandleOutcome::Ignored;
        }
        if self.s.sporks.has(&hash) {
            debug!(target: "spork", "spork {} already seen from peer={}", hex::encode(hash), peer.id);
            return HandleOutcome::Ignored;
        }

        match self.s.sporks.submit(spork) {
            Ok(admission) => {
                self.s.sink.relay_inventory(Inventory::new(InvKind::Spork, hash), 0);
                HandleOutcome::SporkAdmitted(admission)
            }
            Err(SporkError::Stale { spork_id }) => {
                debug!(target: "spork", "stale spork {} from peer={}", spork_id, peer.id);
                HandleOutcome::Ignored
            }
            Err(e) => {
                let action = e.peer_action();
                self.reject(peer, e.to_string(), action)
            }
        }
    }

    fn on_payment_vote(&self, peer: &PeerInfo, vote: PaymentVote) -> HandleOutcome {
        let min_proto = self.s.validator.min_payment_proto(&self.s.sporks);
        if peer.protocol_version < min_proto {
            debug!(target: "mnpayments", "peer={} using obsolete version {}", peer.id, peer.protocol_version);
            self.reject_obsolete(peer, "mnpaymentvote", min_proto);
            return HandleOutcome::Answered(1);
        }
        if !self.s.status.is_masternode_list_synced() {
            return HandleOutcome::Ignored;
        }
        let Some(validation_height) = self.s.chain.tip_height() else {
            return HandleOutcome::Ignored;
        };
        let mode = self.s.sporks.payee_selection_mode();

        if let Err(e) = self.s.ledger.precheck(&vote) {
            debug!(target: "mnpayments", "vote from peer={} dropped: {}", peer.id, e);
            return HandleOutcome::Ignored;
        }

        match self
            .s
            .validator
            .check_vote(&vote, self.s.masternodes.as_ref(), min_proto, validation_height, true)
        {
            Ok(_) => {}
            Err(VoteError::UnknownMasternode(outpoint)) => {
                let reason = format!("unknown masternode {}", outpoint);
                apply_action(self.s.sink.as_ref(), peer.id, &PeerAction::ask_for(outpoint), &reason);
                if !self.s.ledger.hold_pending(vote) {
                    debug!(target: "mnpayments", "vote from unknown masternode {} not held", outpoint);
                    return HandleOutcome::Ignored;
                }
                return HandleOutcome::VotePending(outpoint);
            }
            Err(e) => return self.reject(peer, e.to_string(), e.peer_action()),
        }

        match self.tally(vote, mode, min_proto) {
            Ok(hash) => HandleOutcome::VoteAdmitted(hash),
            Err(e @ VoteError::AlreadyVoted { .. }) | Err(e @ VoteError::DuplicateHeight(_)) => {
                info!(target: "mnpayments", "vote from peer={} not counted: {}", peer.id, e);
                HandleOutcome::Ignored
            }
            Err(e) => {
                debug!(target: "mnpayments", "vote from peer={} dropped: {}", peer.id, e);
                HandleOutcome::Ignored
            }
        }
    }

    /// Record a verified vote and announce it once fully synced.
    fn tally(&self, vote: PaymentVote, mode: PayeeSelectionMode, min_proto: u32) -> Result<Hash256, VoteError> {
        let hash = self.s.ledger.record_vote(vote, mode)?;
        if self.s.status.is_synced() {
            self.s.sink.relay_inventory(Inventory::new(InvKind::PaymentVote, hash), min_proto);
        }
        Ok(hash)
    }

    fn on_payment_sync(&self, peer: &PeerInfo) -> HandleOutcome {
        let min_proto = self.s.validator.min_payment_proto(&self.s.sporks);
        if peer.protocol_version < min_proto {
            self.reject_obsolete(peer, PAYMENT_SYNC, min_proto);
            return HandleOutcome::Answered(1);
        }
        if !self.s.status.is_synced() {
            return HandleOutcome::Ignored;
        }
        if !self.fulfilled.add_fulfilled(peer.id, PAYMENT_SYNC) {
            return self.reject(
                peer,
                format!("peer={} already asked for payment sync", peer.id),
                PeerAction::penalize(PENALTY_REPEATED_SYNC),
            );
        }
        HandleOutcome::Answered(self.sync.sync(peer.id))
    }

    fn on_inv(&self, peer: &PeerInfo, inventory: Vec<Inventory>) -> HandleOutcome {
        let wanted: Vec<Inventory> = inventory
            .into_iter()
            .filter(|inv| match inv.kind {
                InvKind::Spork => !self.s.sporks.has(&inv.hash),
                InvKind::PaymentVote => !self.s.ledger.has_verified_vote(&inv.hash),
                InvKind::PaymentBlock => false,
            })
            .collect();
        if wanted.is_empty() {
            return HandleOutcome::Ignored;
        }
        self.s.sink.push_message(peer.id, NetMessage::GetData(wanted));
        HandleOutcome::Answered(1)
    }
}
