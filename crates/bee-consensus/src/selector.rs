//! Payee selection regimes. The ledger picks one per call from a
//! [`PayeeSelectionMode`] snapshot and never re-reads the mode mid-call.

use crate::payments::{BlockPayees, PayeeSelectionMode};
use bee_core::config::{AmountMatch, PaymentConfig};
use bee_core::{Amount, Script, Transaction};
use log::{debug, warn};

pub trait PayeeSelector: Sync {
    fn mode(&self) -> PayeeSelectionMode;

    /// Whether several votes for one height are tallied together.
    fn aggregates_votes(&self) -> bool;

    fn best_payee(&self, block: &BlockPayees) -> Option<Script>;

    /// Does `tx` pay the masternode `amount` as this height's tally demands?
    fn is_transaction_valid(
        &self,
        block: &BlockPayees,
        tx: &Transaction,
        amount: Amount,
        config: &PaymentConfig,
    ) -> bool;

    /// A tally that needs no further backfill from peers.
    fn is_conclusive(&self, block: &BlockPayees, config: &PaymentConfig) -> bool;

    fn has_enough_data(&self, heights: usize, votes: usize, window: u32, config: &PaymentConfig) -> bool;
}

pub struct LegacyMajority;
pub struct DeterministicOrder;

pub fn selector(mode: PayeeSelectionMode) -> &'static dyn PayeeSelector {
    match mode {
        PayeeSelectionMode::Legacy => &LegacyMajority,
        PayeeSelectionMode::DeterministicOrder => &DeterministicOrder,
    }
}

fn average_votes(config: &PaymentConfig) -> usize {
    (config.signatures_total + config.signatures_required) / 2
}

impl PayeeSelector for LegacyMajority {
    fn mode(&self) -> PayeeSelectionMode {
        PayeeSelectionMode::Legacy
    }

    fn aggregates_votes(&self) -> bool {
        true
    }

    /// Strictly highest count wins; on a tie the earlier-inserted payee stays.
    fn best_payee(&self, block: &BlockPayees) -> Option<Script> {
        let mut best: Option<(&Script, usize)> = None;
        for tally in block.payees() {
            if best.map_or(true, |(_, votes)| tally.vote_count() > votes) {
                best = Some((tally.payee(), tally.vote_count()));
            }
        }
        best.map(|(payee, _)| payee.clone())
    }

    fn is_transaction_valid(
        &self,
        block: &BlockPayees,
        tx: &Transaction,
        amount: Amount,
        config: &PaymentConfig,
    ) -> bool {
        let required = config.signatures_required;
        if block.max_votes() < required {
            debug!(
                target: "mnpayments",
                "height {} has fewer than {} votes for any payee, accepting",
                block.height(),
                required
            );
            return true;
        }

        let candidates: Vec<&Script> = block
            .payees()
            .iter()
            .filter(|t| t.vote_count() >= required)
            .map(|t| t.payee())
            .collect();
        if candidates.iter().any(|payee| tx.pays(payee, amount)) {
            return true;
        }

        let possible: Vec<String> = candidates.iter().map(|p| p.to_string()).collect();
        warn!(
            target: "mnpayments",
            "missing required payment at height {}, possible payees: '{}', amount: {}",
            block.height(),
            possible.join(","),
            amount
        );
        false
    }

    fn is_conclusive(&self, block: &BlockPayees, config: &PaymentConfig) -> bool {
        block.max_votes() >= config.signatures_required || block.total_votes() >= average_votes(config)
    }

    fn has_enough_data(&self, heights: usize, votes: usize, window: u32, config: &PaymentConfig) -> bool {
        let window = window as usize;
        heights > window && votes > window.saturating_mul(average_votes(config))
    }
}

/// `actual` vs `expected` under the configured tolerance.
pub fn amount_matches(policy: AmountMatch, expected: Amount, actual: Amount, skim: Option<Amount>) -> bool {
    if expected == actual {
        return true;
    }
    match policy {
        AmountMatch::Exact => false,
        AmountMatch::LowestOutputSkim { max_skim } => match skim {
            Some(s) if actual > 0 && s <= max_skim => actual.checked_add(s) == Some(expected),
            _ => false,
        },
    }
}

impl PayeeSelector for DeterministicOrder {
    fn mode(&self) -> PayeeSelectionMode {
        PayeeSelectionMode::DeterministicOrder
    }

    fn aggregates_votes(&self) -> bool {
        false
    }

    fn best_payee(&self, block: &BlockPayees) -> Option<Script> {
        block.payees().first().map(|t| t.payee().clone())
    }

    fn is_transaction_valid(
        &self,
        block: &BlockPayees,
        tx: &Transaction,
        amount: Amount,
        config: &PaymentConfig,
    ) -> bool {
        let Some(payee) = self.best_payee(block) else {
            return true;
        };
        let skim = tx.lowest_positive_output();
        let paid = tx
            .outputs
            .iter()
            .any(|o| o.script_pubkey == payee && amount_matches(config.amount_match, amount, o.value, skim));
        if !paid {
            warn!(
                target: "mnpayments",
                "height {} does not pay {} the expected {}",
                block.height(),
                payee,
                amount
            );
        }
        paid
    }

    fn is_conclusive(&self, block: &BlockPayees, _config: &PaymentConfig) -> bool {
        !block.is_empty()
    }

    fn has_enough_data(&self, heights: usize, _votes: usize, window: u32, _config: &PaymentConfig) -> bool {
        heights > window as usize
    }
}
