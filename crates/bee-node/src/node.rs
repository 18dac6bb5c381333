// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - NODE RUNTIME
//
// Owns the spork registry, the payment ledger and everything wired to
// them. The chain, masternode list, sync state and peer transport are
// injected; this crate never implements them.
//
// Maintenance runs on a tokio interval: sweep sporks, refresh the
// masternode count, prune the ledger, admit votes whose masternode has
// since become known, then persist the spork snapshot.
// Each step takes its own lock; none is held across steps.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::block_payments::BlockPayments;
use crate::error::NodeError;
use crate::metrics::BeeMetrics;
use bee_consensus::payments::{PayeeSelectionMode, PaymentLedger, PaymentVote};
use bee_consensus::registry::SporkRegistry;
use bee_consensus::spork::{SporkId, SporkMessage};
use bee_consensus::validator::VoteValidator;
use bee_consensus::SporkCache;
use bee_core::config::NodeConfig;
use bee_core::interfaces::{ChainView, MasternodeDirectory, SyncStatus};
use bee_core::Outpoint;
use bee_crypto::{keypair_from_secret, CryptoError, Hash256};
use bee_network::{
    HandleOutcome, InvKind, Inventory, MessageHandler, Observer, PeerInfo, PeerSink, Subsystems, WorkerPool,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use zeroize::Zeroizing;

/// External collaborators the node consults but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainView>,
    pub masternodes: Arc<dyn MasternodeDirectory>,
    pub status: Arc<dyn SyncStatus>,
    pub sink: Arc<dyn PeerSink>,
}

struct LocalMasternode {
    outpoint: Outpoint,
    secret: Zeroizing<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub swept_sporks: usize,
    pub pruned_heights: usize,
    pub admitted_pending: usize,
    pub saved_sporks: usize,
}

pub struct BeeNode {
    config: NodeConfig,
    sporks: Arc<SporkRegistry>,
    ledger: Arc<PaymentLedger>,
    validator: VoteValidator,
    handler: Arc<MessageHandler>,
    payments: BlockPayments,
    metrics: Arc<BeeMetrics>,
    cache: Option<SporkCache>,
    local: Option<LocalMasternode>,
    collab: Collaborators,
}

impl BeeNode {
    /// Build every subsystem from `config`. A configured spork cache is
    /// opened and its records re-admitted under the current trust set.
    pub fn new(config: NodeConfig, collab: Collaborators) -> Result<Self, NodeError> {
        config.validate()?;

        let sporks = Arc::new(SporkRegistry::from_config(&config.sporks)?);
        let ledger = Arc::new(PaymentLedger::new(config.payments.clone()));
        if let Some(tip) = collab.chain.tip_height() {
            ledger.update_tip(tip);
        }
        ledger.set_masternode_count(collab.masternodes.count());

        let cache = match &config.node.spork_cache_path {
            Some(path) => {
                let cache = SporkCache::open(path)?;
                if let Some(snapshot) = cache.load()? {
                    let cached = snapshot.len();
                    let restored = sporks.restore(snapshot);
                    info!(target: "spork", "restored {} of {} cached sporks", restored, cached);
                }
                Some(cache)
            }
            None => None,
        };

        let validator = VoteValidator::new(&config.validator);
        let handler = Arc::new(MessageHandler::new(
            Subsystems {
                sporks: Arc::clone(&sporks),
                ledger: Arc::clone(&ledger),
                validator,
                masternodes: Arc::clone(&collab.masternodes),
                chain: Arc::clone(&collab.chain),
                status: Arc::clone(&collab.status),
                sink: Arc::clone(&collab.sink),
            },
            &config.sync,
        ));
        let payments = BlockPayments::new(
            Arc::clone(&sporks),
            Arc::clone(&ledger),
            Arc::clone(&collab.masternodes),
            Arc::clone(&collab.status),
        );
        let metrics = BeeMetrics::new()?;

        Ok(BeeNode {
            config,
            sporks,
            ledger,
            validator,
            handler,
            payments,
            metrics,
            cache,
            local: None,
            collab,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn sporks(&self) -> &Arc<SporkRegistry> {
        &self.sporks
    }

    pub fn ledger(&self) -> &Arc<PaymentLedger> {
        &self.ledger
    }

    pub fn handler(&self) -> &Arc<MessageHandler> {
        &self.handler
    }

    pub fn payments(&self) -> &BlockPayments {
        &self.payments
    }

    pub fn metrics(&self) -> &Arc<BeeMetrics> {
        &self.metrics
    }

    /// Enable `update_spork`. The key must belong to a trusted signer.
    pub fn set_spork_key(&self, secret: &[u8]) -> Result<(), NodeError> {
        self.sporks.set_signing_key(secret)?;
        info!(target: "spork", "spork signing key accepted");
        Ok(())
    }

    /// Vote as the masternode at `outpoint`. The secret must match the
    /// operator key the masternode list holds for it.
    pub fn set_local_masternode(&mut self, outpoint: Outpoint, secret: Zeroizing<Vec<u8>>) -> Result<(), NodeError> {
        let keypair = keypair_from_secret(&secret)?;
        let info = self
            .collab
            .masternodes
            .masternode_info(&outpoint)
            .ok_or_else(|| NodeError::UnknownMasternode(outpoint.to_string()))?;
        if info.operator_pubkey != keypair.public_key {
            return Err(NodeError::Crypto(CryptoError::InvalidKey));
        }
        info!(target: "mnpayments", "voting as masternode {}", outpoint);
        self.local = Some(LocalMasternode { outpoint, secret });
        Ok(())
    }

    /// Sign a new spork value, admit it locally and announce it.
    pub fn update_spork(&self, spork_id: SporkId, value: i64, payload: &str) -> Result<SporkMessage, NodeError> {
        let msg = self.sporks.update_spork(spork_id, value, payload)?;
        self.collab
            .sink
            .relay_inventory(Inventory::new(InvKind::Spork, msg.hash()), 0);
        self.metrics.sporks_admitted_total.inc();
        Ok(msg)
    }

    pub fn observer(&self) -> Observer {
        let metrics = Arc::clone(&self.metrics);
        Arc::new(move |_peer: &PeerInfo, command: &str, outcome: &HandleOutcome| {
            metrics.observe(command, outcome)
        })
    }

    /// The masternode list learned `outpoint`; admit votes parked for it.
    pub fn on_masternode_added(&self, outpoint: &Outpoint) -> usize {
        let admitted = self.handler.admit_pending_for(outpoint);
        self.metrics.votes_admitted_total.inc_by(admitted as u64);
        self.metrics.update_ledger(&self.ledger.stats());
        admitted
    }

    /// A peer connected: request payment blocks the ledger is missing.
    pub fn on_peer_connected(&self, peer: &PeerInfo) -> usize {
        let requested = self.handler.backfill(peer);
        if requested > 0 {
            debug!(target: "mnpayments", "requested {} payment blocks from peer={}", requested, peer.id);
        }
        requested
    }

    pub fn spawn_workers(&self) -> WorkerPool {
        WorkerPool::spawn(
            Arc::clone(&self.handler),
            Arc::clone(&self.collab.sink),
            self.config.node.workers,
            self.config.node.queue_depth,
            Some(self.observer()),
        )
    }

    /// A block was connected at `height`: move the window and cast the
    /// local masternode's vote for `height + vote_ahead`.
    pub fn on_new_tip(&self, height: u32) -> Option<Hash256> {
        self.ledger.update_tip(height);
        let pruned = self.ledger.prune(height);
        self.metrics.pruned_heights_total.inc_by(pruned as u64);
        self.metrics.update_ledger(&self.ledger.stats());
        self.cast_local_vote(height.saturating_add(self.config.node.vote_ahead))
    }

    fn cast_local_vote(&self, height: u32) -> Option<Hash256> {
        let local = self.local.as_ref()?;
        if self.sporks.payee_selection_mode() == PayeeSelectionMode::DeterministicOrder {
            return None;
        }
        if !self.collab.status.is_masternode_list_synced() {
            debug!(target: "mnpayments", "masternode list not synced, not voting for height {}", height);
            return None;
        }

        let Some(winner) = self.collab.masternodes.next_in_queue(height) else {
            warn!(target: "mnpayments", "no masternode to vote for at height {}", height);
            return None;
        };
        if self
            .ledger
            .is_scheduled(&winner.payout_script, height, PayeeSelectionMode::Legacy)
        {
            debug!(
                target: "mnpayments",
                "{} already scheduled near height {}, not voting",
                winner.outpoint,
                height
            );
            return None;
        }
        let vote = match PaymentVote::create(local.outpoint, height, winner.payout_script, &local.secret) {
            Ok(vote) => vote,
            Err(e) => {
                error!(target: "mnpayments", "cannot sign payment vote: {}", e);
                return None;
            }
        };
        info!(target: "mnpayments", "voting for {} at height {}", vote.payee, height);

        match self.ledger.record_vote(vote, PayeeSelectionMode::Legacy) {
            Ok(hash) => {
                self.metrics.votes_admitted_total.inc();
                if self.collab.status.is_synced() {
                    let min_proto = self.validator.min_payment_proto(&self.sporks);
                    self.collab
                        .sink
                        .relay_inventory(Inventory::new(InvKind::PaymentVote, hash), min_proto);
                }
                Some(hash)
            }
            Err(e) => {
                debug!(target: "mnpayments", "local vote for height {} not recorded: {}", height, e);
                None
            }
        }
    }

    /// One maintenance pass.
    pub fn maintenance(&self) -> Result<MaintenanceReport, NodeError> {
        let timer = self.metrics.maintenance_duration_seconds.start_timer();
        let mut report = MaintenanceReport {
            swept_sporks: self.sporks.sweep(),
            ..MaintenanceReport::default()
        };

        self.ledger.set_masternode_count(self.collab.masternodes.count());
        if let Some(tip) = self.collab.chain.tip_height() {
            self.ledger.update_tip(tip);
            report.pruned_heights = self.ledger.prune(tip);
        }
        self.metrics.pruned_heights_total.inc_by(report.pruned_heights as u64);
        report.admitted_pending = self.handler.admit_pending();
        self.metrics.votes_admitted_total.inc_by(report.admitted_pending as u64);
        self.metrics.update_ledger(&self.ledger.stats());

        let snapshot = self.sporks.snapshot();
        self.metrics.sporks_active.set(snapshot.len() as i64);
        if let Some(cache) = &self.cache {
            report.saved_sporks = snapshot.len();
            cache.save(&snapshot)?;
        }

        timer.observe_duration();
        debug!(
            target: "mnpayments",
            "maintenance: swept={} pruned={} pending admitted={} saved={}",
            report.swept_sporks,
            report.pruned_heights,
            report.admitted_pending,
            report.saved_sporks
        );
        Ok(report)
    }

    /// Run `maintenance` every `maintenance_interval_secs` until `shutdown`
    /// flips to true, then persist one last time.
    pub fn spawn_maintenance(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        let period = Duration::from_secs(self.config.node.maintenance_interval_secs);
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = node.maintenance() {
                            error!(target: "mnpayments", "maintenance failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            if let Err(e) = node.maintenance() {
                error!(target: "mnpayments", "final maintenance failed: {}", e);
            }
            info!(target: "mnpayments", "maintenance task stopped");
        })
    }
}
