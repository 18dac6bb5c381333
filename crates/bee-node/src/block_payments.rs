// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - BLOCK PAYMENT RULES
//
// What block validation and block assembly ask of the payment subsystem.
// - Coinbase value bound
// - Masternode payee check (enforced by SPORK_8, or always in deterministic mode)
// - Evolution carve-out (created with SPORK_18, enforced with SPORK_19)
// - Miner-side filling of the coinbase
//
// Callers get booleans and strings; nothing here fails the node.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bee_consensus::payments::{PayeeSelectionMode, PaymentLedger};
use bee_consensus::registry::SporkRegistry;
use bee_consensus::spork::{
    SPORK_18_EVOLUTION_PAYMENTS, SPORK_19_EVOLUTION_PAYMENTS_ENFORCEMENT, SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT,
};
use bee_core::interfaces::{MasternodeDirectory, SyncStatus};
use bee_core::{masternode_payment, Amount, Transaction, TxOut};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a block reward is divided before the masternode share is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardSplit {
    pub evolution: Option<TxOut>,
    /// Reward left after the evolution carve-out.
    pub masternode_base: Amount,
}

pub struct BlockPayments {
    sporks: Arc<SporkRegistry>,
    ledger: Arc<PaymentLedger>,
    masternodes: Arc<dyn MasternodeDirectory>,
    status: Arc<dyn SyncStatus>,
}

impl BlockPayments {
    pub fn new(
        sporks: Arc<SporkRegistry>,
        ledger: Arc<PaymentLedger>,
        masternodes: Arc<dyn MasternodeDirectory>,
        status: Arc<dyn SyncStatus>,
    ) -> Self {
        BlockPayments {
            sporks,
            ledger,
            masternodes,
            status,
        }
    }

    pub fn reward_split(&self, height: u32, reward: Amount) -> RewardSplit {
        let evolution = if self.sporks.is_flag_enabled(SPORK_18_EVOLUTION_PAYMENTS) {
            self.sporks.evolution_payee(height).map(|script| {
                let amount = masternode_payment(reward, self.ledger.config().evolution_share_bps);
                TxOut::new(amount, script)
            })
        } else {
            None
        };
        let carved = evolution.as_ref().map_or(0, |o| o.value);
        RewardSplit {
            evolution,
            masternode_base: reward - carved,
        }
    }

    /// Coinbase may not create more than `reward`. Once synced an overpay is
    /// only logged: with superblocks disabled every block is a regular block.
    /// A coinbase with a negative output or an overflowing total is never valid.
    pub fn is_block_value_valid(&self, coinbase: &Transaction, height: u32, reward: Amount) -> bool {
        let Some(value_out) = coinbase.value_out() else {
            warn!(target: "mnpayments", "coinbase at height {} has a negative or overflowing output total", height);
            return false;
        };
        let met = value_out <= reward;
        if !self.status.is_synced() {
            if !met {
                warn!(
                    target: "mnpayments",
                    "coinbase pays too much at height {} (actual={} vs limit={})",
                    height,
                    value_out,
                    reward
                );
            }
            return met;
        }
        if !met {
            warn!(
                target: "mnpayments",
                "coinbase pays too much at height {} (actual={} vs limit={}), superblocks are disabled",
                height,
                value_out,
                reward
            );
        }
        true
    }

    pub fn is_block_payee_valid(&self, coinbase: &Transaction, height: u32, reward: Amount) -> bool {
        if !self.status.is_synced() {
            debug!(target: "mnpayments", "not synced, skipping payee checks at height {}", height);
            return true;
        }
        let mode = self.sporks.payee_selection_mode();
        let split = self.reward_split(height, reward);

        if let Some(evolution) = &split.evolution {
            if self.sporks.is_active(SPORK_19_EVOLUTION_PAYMENTS_ENFORCEMENT)
                && !coinbase.pays(&evolution.script_pubkey, evolution.value)
            {
                warn!(target: "mnpayments", "missing evolution payment {} at height {}", evolution, height);
                return false;
            }
        }

        if self
            .ledger
            .is_transaction_valid(coinbase, height, split.masternode_base, mode)
        {
            debug!(target: "mnpayments", "valid masternode payment at height {}", height);
            return true;
        }

        if mode == PayeeSelectionMode::DeterministicOrder || self.sporks.is_active(SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT) {
            warn!(target: "mnpayments", "invalid masternode payment at height {}", height);
            return false;
        }
        warn!(target: "mnpayments", "masternode payment enforcement is disabled, accepting any payee");
        true
    }

    /// Append the evolution and masternode outputs to `coinbase`, taking
    /// both out of output 0. Returns the outputs added; nothing is added when
    /// output 0 cannot cover them.
    pub fn fill_block_payment(&self, coinbase: &mut Transaction, height: u32, reward: Amount) -> Vec<TxOut> {
        let mode = self.sporks.payee_selection_mode();
        let split = self.reward_split(height, reward);
        let mut added = Vec::new();

        if let Some(evolution) = split.evolution {
            added.push(evolution);
        }

        let masternode = self
            .ledger
            .block_tx_outs(height, split.masternode_base, mode)
            .or_else(|| match mode {
                PayeeSelectionMode::Legacy => self.masternodes.next_in_queue(height).map(|info| {
                    info!(target: "mnpayments", "no votes at height {}, paying queue winner {}", height, info.outpoint);
                    TxOut::new(self.ledger.required_payment(split.masternode_base), info.payout_script)
                }),
                PayeeSelectionMode::DeterministicOrder => {
                    warn!(target: "mnpayments", "deterministic order active and no payee at height {}", height);
                    None
                }
            });
        match masternode {
            Some(out) => added.push(out),
            None => debug!(target: "mnpayments", "no masternode to pay at height {}", height),
        }

        if let Some(first) = coinbase.outputs.first_mut() {
            let remaining = added
                .iter()
                .try_fold(first.value, |left, out| left.checked_sub(out.value))
                .filter(|left| *left >= 0);
            let Some(remaining) = remaining else {
                warn!(
                    target: "mnpayments",
                    "coinbase output {} cannot cover the payments at height {}, not filling",
                    first.value,
                    height
                );
                return Vec::new();
            };
            first.value = remaining;
        }
        coinbase.outputs.extend(added.iter().cloned());
        added
    }

    /// Human-readable payees for `height`, for diagnostics.
    pub fn required_payee_description(&self, height: u32) -> String {
        let mut description = self.ledger.required_payments_string(height);
        if self.sporks.is_flag_enabled(SPORK_18_EVOLUTION_PAYMENTS) {
            if let Some(address) = self.sporks.evolution().payee_address(height) {
                description.push_str(&format!(", evolution: {}", address));
            }
        }
        description
    }

    pub fn required_payments_strings(&self, start: u32, end: u32) -> BTreeMap<u32, String> {
        (start..end)
            .map(|h| (h, self.required_payee_description(h)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bee_consensus::payments::PaymentVote;
    use bee_consensus::registry::MultiSignerSporks;
    use bee_consensus::spork::{SporkMessage, SPORK_21_MASTERNODE_ORDER_ENABLE};
    use bee_core::config::PaymentConfig;
    use bee_core::interfaces::{FlagSyncStatus, MasternodeInfo, MemoryMasternodes};
    use bee_core::{unix_time, Outpoint, Script, COIN};
    use bee_crypto::{generate_keypair, key_id_to_address, KeyPair};

    const REWARD: Amount = 10 * COIN;

    struct Fixture {
        payments: BlockPayments,
        sporks: Arc<SporkRegistry>,
        ledger: Arc<PaymentLedger>,
        status: Arc<FlagSyncStatus>,
        masternodes: Arc<MemoryMasternodes>,
        key: KeyPair,
    }

    fn fixture() -> Fixture {
        let key = generate_keypair();
        let sporks = Arc::new(SporkRegistry::new(
            Box::new(MultiSignerSporks::new(vec![key.public_key.clone()], 1).unwrap()),
            7_200,
        ));
        let ledger = Arc::new(PaymentLedger::new(PaymentConfig::default()));
        ledger.update_tip(100);
        let masternodes = Arc::new(MemoryMasternodes::new());
        let status = Arc::new(FlagSyncStatus::new(true));
        let payments = BlockPayments::new(sporks.clone(), ledger.clone(), masternodes.clone(), status.clone());
        Fixture {
            payments,
            sporks,
            ledger,
            status,
            masternodes,
            key,
        }
    }

    fn set_spork(f: &Fixture, id: i32, value: i64, payload: &str) {
        let mut msg = SporkMessage::new(id, value, payload, unix_time());
        msg.sign(&f.key.secret_key).unwrap();
        f.sporks.submit(msg).unwrap();
    }

    fn payee(n: u8) -> Script {
        Script::pay_to_key_id(&[n; 20])
    }

    fn vote_for(f: &Fixture, height: u32, to: u8, voters: u8) {
        for mn in 0..voters {
            f.ledger
                .record_vote(
                    PaymentVote::new(Outpoint::new([mn; 32], 0), height, payee(to)),
                    PayeeSelectionMode::Legacy,
                )
                .unwrap();
        }
    }

    #[test]
    fn test_block_value_bound() {
        let f = fixture();
        let over = Transaction::new(vec![TxOut::new(REWARD + 1, payee(1))]);
        let exact = Transaction::new(vec![TxOut::new(REWARD, payee(1))]);
        assert!(f.payments.is_block_value_valid(&over, 101, REWARD));

        f.status.set_blockchain_synced(false);
        assert!(!f.payments.is_block_value_valid(&over, 101, REWARD));
        assert!(f.payments.is_block_value_valid(&exact, 101, REWARD));
    }

    #[test]
    fn test_block_value_rejects_overflow_and_negative_outputs() {
        let f = fixture();
        let overflow = Transaction::new(vec![
            TxOut::new(Amount::MAX, payee(1)),
            TxOut::new(Amount::MAX, payee(2)),
            TxOut::new(2, payee(3)),
        ]);
        let negative = Transaction::new(vec![TxOut::new(REWARD * 3, payee(1)), TxOut::new(-REWARD * 2, payee(2))]);
        for synced in [false, true] {
            f.status.set_blockchain_synced(synced);
            assert!(!f.payments.is_block_value_valid(&overflow, 101, REWARD));
            assert!(!f.payments.is_block_value_valid(&negative, 101, REWARD));
        }
    }

    #[test]
    fn test_fill_skipped_when_first_output_too_small() {
        let f = fixture();
        vote_for(&f, 101, 1, 6);
        let mut coinbase = Transaction::new(vec![TxOut::new(COIN, payee(7))]);
        assert!(f.payments.fill_block_payment(&mut coinbase, 101, REWARD).is_empty());
        assert_eq!(coinbase, Transaction::new(vec![TxOut::new(COIN, payee(7))]));
    }

    #[test]
    fn test_payee_enforcement_follows_spork_8() {
        let f = fixture();
        vote_for(&f, 101, 1, 6);
        let wrong = Transaction::new(vec![TxOut::new(REWARD / 2, payee(9))]);
        let right = Transaction::new(vec![TxOut::new(REWARD / 2, payee(1))]);

        assert!(f.payments.is_block_payee_valid(&right, 101, REWARD));
        assert!(f.payments.is_block_payee_valid(&wrong, 101, REWARD));

        set_spork(&f, SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT, 0, "");
        assert!(!f.payments.is_block_payee_valid(&wrong, 101, REWARD));
        assert!(f.payments.is_block_payee_valid(&right, 101, REWARD));

        f.status.set_winners_synced(false);
        assert!(f.payments.is_block_payee_valid(&wrong, 101, REWARD));
    }

    #[test]
    fn test_deterministic_mode_always_enforced() {
        let f = fixture();
        set_spork(&f, SPORK_21_MASTERNODE_ORDER_ENABLE, 0, "");
        f.ledger
            .record_vote(
                PaymentVote::new(Outpoint::new([1; 32], 0), 101, payee(1)),
                PayeeSelectionMode::DeterministicOrder,
            )
            .unwrap();
        let wrong = Transaction::new(vec![TxOut::new(REWARD / 2, payee(9))]);
        assert!(!f.payments.is_block_payee_valid(&wrong, 101, REWARD));
    }

    #[test]
    fn test_fill_and_validate_with_evolution() {
        let f = fixture();
        let evo_address = key_id_to_address(&[0x42; 20]);
        set_spork(&f, SPORK_18_EVOLUTION_PAYMENTS, 1, &format!("[{}]", evo_address));
        set_spork(&f, SPORK_19_EVOLUTION_PAYMENTS_ENFORCEMENT, 0, "");
        set_spork(&f, SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT, 0, "");
        vote_for(&f, 101, 1, 6);

        let split = f.payments.reward_split(101, REWARD);
        assert_eq!(split.evolution.as_ref().map(|o| o.value), Some(COIN));
        assert_eq!(split.masternode_base, 9 * COIN);

        let mut coinbase = Transaction::new(vec![TxOut::new(REWARD, payee(7))]);
        let added = f.payments.fill_block_payment(&mut coinbase, 101, REWARD);
        assert_eq!(added.len(), 2);
        assert_eq!(coinbase.value_out(), Some(REWARD));
        assert!(coinbase.pays(&payee(1), f.ledger.required_payment(9 * COIN)));
        assert!(f.payments.is_block_payee_valid(&coinbase, 101, REWARD));
        assert!(f.payments.is_block_value_valid(&coinbase, 101, REWARD));

        let mut without_evolution = coinbase.clone();
        without_evolution.outputs.retain(|o| o.script_pubkey != added[0].script_pubkey);
        assert!(!f.payments.is_block_payee_valid(&without_evolution, 101, REWARD));

        assert!(f.payments.required_payee_description(101).contains(&evo_address));
    }

    #[test]
    fn test_fill_falls_back_to_queue_in_legacy_mode() {
        let f = fixture();
        f.masternodes.insert(MasternodeInfo {
            outpoint: Outpoint::new([3; 32], 0),
            protocol_version: 70_213,
            operator_pubkey: generate_keypair().public_key.clone(),
            payout_script: payee(3),
        });
        let mut coinbase = Transaction::new(vec![TxOut::new(REWARD, payee(7))]);
        let added = f.payments.fill_block_payment(&mut coinbase, 105, REWARD);
        assert_eq!(added, vec![TxOut::new(REWARD / 2, payee(3))]);
        assert_eq!(coinbase.outputs[0].value, REWARD / 2);

        set_spork(&f, SPORK_21_MASTERNODE_ORDER_ENABLE, 0, "");
        let mut coinbase = Transaction::new(vec![TxOut::new(REWARD, payee(7))]);
        assert!(f.payments.fill_block_payment(&mut coinbase, 106, REWARD).is_empty());
    }

    #[test]
    fn test_required_payments_strings() {
        let f = fixture();
        vote_for(&f, 101, 1, 2);
        let strings = f.payments.required_payments_strings(100, 102);
        assert_eq!(strings[&100], "Unknown");
        assert_eq!(strings[&101], format!("{}:2", payee(1)));
    }
}
