// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - PAYMENT SYNC
//
// Serving and requesting payment-vote history.
// - sync: announce verified votes for [tip, tip + future limit)
// - request_missing: ask for heights we have no tally for, or a weak one
// - answer_getdata: full spork / vote / block-vote payloads
//
// Inventory is batched; no message carries more than max_inv_size entries.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::messages::{InvKind, Inventory, NetMessage, MASTERNODE_SYNC_MNW};
use crate::peer::{PeerId, PeerSink};
use bee_consensus::payments::PaymentLedger;
use bee_consensus::registry::SporkRegistry;
use bee_core::config::SyncConfig;
use bee_core::interfaces::ChainView;
use log::{debug, info};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct SyncCoordinator {
    ledger: Arc<PaymentLedger>,
    sporks: Arc<SporkRegistry>,
    chain: Arc<dyn ChainView>,
    sink: Arc<dyn PeerSink>,
    max_inv_size: usize,
}

impl SyncCoordinator {
    pub fn new(
        ledger: Arc<PaymentLedger>,
        sporks: Arc<SporkRegistry>,
        chain: Arc<dyn ChainView>,
        sink: Arc<dyn PeerSink>,
        config: &SyncConfig,
    ) -> Self {
        SyncCoordinator {
            ledger,
            sporks,
            chain,
            sink,
            max_inv_size: config.max_inv_size.max(1),
        }
    }

    fn push_batched(&self, peer: PeerId, inventory: Vec<Inventory>, wrap: fn(Vec<Inventory>) -> NetMessage) {
        for chunk in inventory.chunks(self.max_inv_size) {
            self.sink.push_message(peer, wrap(chunk.to_vec()));
        }
    }

    /// Announce every stored vote for upcoming heights; returns how many.
    pub fn sync(&self, peer: PeerId) -> usize {
        let tip = self.ledger.tip();
        let end = tip.saturating_add(self.ledger.config().future_votes_limit);
        let inventory: Vec<Inventory> = self
            .ledger
            .vote_hashes_in(tip..end)
            .into_iter()
            .map(|h| Inventory::new(InvKind::PaymentVote, h))
            .collect();
        let count = inventory.len();

        self.push_batched(peer, inventory, NetMessage::Inv);
        self.sink.push_message(
            peer,
            NetMessage::SyncStatusCount {
                asset: MASTERNODE_SYNC_MNW,
                count: count as u32,
            },
        );
        info!(target: "mnpayments", "sent {} payment votes to peer={}", count, peer);
        count
    }

    /// Request block-vote data for unknown and low-data heights in the window.
    pub fn request_missing(&self, peer: PeerId) -> usize {
        let Some(tip) = self.chain.tip_height() else {
            return 0;
        };
        let mode = self.sporks.payee_selection_mode();
        let window = self.ledger.storage_window();
        let first = tip.saturating_sub(window).saturating_add(1);

        let mut wanted: BTreeSet<u32> = (first..=tip).rev().filter(|h| !self.ledger.has_height(*h)).collect();
        let unknown = wanted.len();
        wanted.extend(
            self.ledger
                .low_data_heights(mode)
                .into_iter()
                .filter(|h| (first..=tip).contains(h)),
        );

        let inventory: Vec<Inventory> = wanted
            .iter()
            .rev()
            .filter_map(|h| self.chain.block_hash(*h))
            .map(|hash| Inventory::new(InvKind::PaymentBlock, hash))
            .collect();
        let count = inventory.len();

        if count > 0 {
            debug!(
                target: "mnpayments",
                "requesting {} payment blocks from peer={} ({} unknown)",
                count,
                peer,
                unknown
            );
            self.push_batched(peer, inventory, NetMessage::GetData);
        }
        count
    }

    /// Answer a GETDATA; returns the number of messages pushed.
    pub fn answer_getdata(&self, peer: PeerId, inventory: &[Inventory]) -> usize {
        let mut pushed = 0;
        for inv in inventory {
            match inv.kind {
                InvKind::Spork => {
                    if let Some(msg) = self.sporks.get_by_hash(&inv.hash) {
                        self.sink.push_message(peer, NetMessage::Spork(msg));
                        pushed += 1;
                    }
                }
                InvKind::PaymentVote => {
                    if let Some(vote) = self.ledger.vote(&inv.hash) {
                        self.sink.push_message(peer, NetMessage::PaymentVote(vote));
                        pushed += 1;
                    }
                }
                InvKind::PaymentBlock => {
                    let Some(height) = self.chain.height_of(&inv.hash) else {
                        continue;
                    };
                    for vote in self.ledger.votes_at(height) {
                        self.sink.push_message(peer, NetMessage::PaymentVote(vote));
                        pushed += 1;
                    }
                }
            }
        }
        pushed
    }
}
