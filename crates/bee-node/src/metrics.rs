// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - METRICS MODULE
//
// Prometheus counters and gauges for the spork and payment subsystems,
// exported in the text exposition format.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::NodeError;
use bee_consensus::LedgerStats;
use bee_network::HandleOutcome;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

pub struct BeeMetrics {
    registry: Registry,

    // Sporks
    pub sporks_admitted_total: IntCounter,
    pub sporks_rejected_total: IntCounter,
    pub sporks_active: IntGauge,

    // Payment votes
    pub votes_admitted_total: IntCounter,
    pub votes_rejected_total: IntCounter,
    pub votes_stored: IntGauge,
    pub vote_heights_stored: IntGauge,
    pub votes_pending: IntGauge,
    pub pruned_heights_total: IntCounter,

    // Peers
    pub messages_total: IntCounterVec,
    pub penalties_total: IntCounter,
    pub penalty_score_total: IntCounter,

    // Maintenance
    pub maintenance_duration_seconds: Histogram,
}

impl BeeMetrics {
    pub fn new() -> Result<Arc<Self>, NodeError> {
        let registry = Registry::new();

        let sporks_admitted_total = IntCounter::with_opts(Opts::new(
            "bee_sporks_admitted_total",
            "Spork messages admitted into the registry",
        ))?;
        registry.register(Box::new(sporks_admitted_total.clone()))?;

        let sporks_rejected_total = IntCounter::with_opts(Opts::new(
            "bee_sporks_rejected_total",
            "Spork messages rejected with a peer penalty",
        ))?;
        registry.register(Box::new(sporks_rejected_total.clone()))?;

        let sporks_active =
            IntGauge::with_opts(Opts::new("bee_sporks_active", "Spork records currently stored"))?;
        registry.register(Box::new(sporks_active.clone()))?;

        let votes_admitted_total = IntCounter::with_opts(Opts::new(
            "bee_payment_votes_admitted_total",
            "Payment votes counted in the ledger",
        ))?;
        registry.register(Box::new(votes_admitted_total.clone()))?;

        let votes_rejected_total = IntCounter::with_opts(Opts::new(
            "bee_payment_votes_rejected_total",
            "Payment votes refused by validation",
        ))?;
        registry.register(Box::new(votes_rejected_total.clone()))?;

        let votes_stored =
            IntGauge::with_opts(Opts::new("bee_payment_votes_stored", "Payment votes held in the ledger"))?;
        registry.register(Box::new(votes_stored.clone()))?;

        let vote_heights_stored = IntGauge::with_opts(Opts::new(
            "bee_payment_vote_heights_stored",
            "Block heights with at least one payment vote",
        ))?;
        registry.register(Box::new(vote_heights_stored.clone()))?;

        let votes_pending = IntGauge::with_opts(Opts::new(
            "bee_payment_votes_pending",
            "Votes held until their masternode is known",
        ))?;
        registry.register(Box::new(votes_pending.clone()))?;

        let pruned_heights_total = IntCounter::with_opts(Opts::new(
            "bee_payment_pruned_heights_total",
            "Block heights dropped by the storage window",
        ))?;
        registry.register(Box::new(pruned_heights_total.clone()))?;

        let messages_total = IntCounterVec::new(
            Opts::new("bee_messages_total", "Inbound messages by command"),
            &["command"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        let penalties_total =
            IntCounter::with_opts(Opts::new("bee_peer_penalties_total", "Misbehavior reports issued"))?;
        registry.register(Box::new(penalties_total.clone()))?;

        let penalty_score_total = IntCounter::with_opts(Opts::new(
            "bee_peer_penalty_score_total",
            "Sum of misbehavior scores issued",
        ))?;
        registry.register(Box::new(penalty_score_total.clone()))?;

        let maintenance_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("bee_maintenance_duration_seconds", "Sweep, prune and snapshot latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(maintenance_duration_seconds.clone()))?;

        Ok(Arc::new(BeeMetrics {
            registry,
            sporks_admitted_total,
            sporks_rejected_total,
            sporks_active,
            votes_admitted_total,
            votes_rejected_total,
            votes_stored,
            vote_heights_stored,
            votes_pending,
            pruned_heights_total,
            messages_total,
            penalties_total,
            penalty_score_total,
            maintenance_duration_seconds,
        }))
    }

    pub fn export(&self) -> Result<String, NodeError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| NodeError::Metrics(prometheus::Error::Msg(e.to_string())))
    }

    /// Account for one handled message.
    pub fn observe(&self, command: &str, outcome: &HandleOutcome) {
        self.messages_total.with_label_values(&[command]).inc();
        match outcome {
            HandleOutcome::SporkAdmitted(_) => self.sporks_admitted_total.inc(),
            HandleOutcome::VoteAdmitted(_) => self.votes_admitted_total.inc(),
            HandleOutcome::Rejected { action, .. } => {
                match command {
                    "spork" => self.sporks_rejected_total.inc(),
                    "mnpaymentvote" | "masternodepaymentvote" => self.votes_rejected_total.inc(),
                    _ => {}
                }
                if action.penalty > 0 {
                    self.penalties_total.inc();
                    self.penalty_score_total.inc_by(action.penalty as u64);
                }
            }
            HandleOutcome::VotePending(_) | HandleOutcome::Answered(_) | HandleOutcome::Ignored => {}
        }
    }

    pub fn update_ledger(&self, stats: &LedgerStats) {
        self.votes_stored.set(stats.votes as i64);
        self.vote_heights_stored.set(stats.heights as i64);
        self.votes_pending.set(stats.pending as i64);
    }
}
