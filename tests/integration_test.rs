// ========================================
// INTEGRATION TESTS FOR BEENODE
// ========================================
//
// Test Scenarios:
// 1. Multi-signer spork quorum over the worker pool
// 2. Payment votes from the wire into block validation
// 3. Spork cache survives a restart, untrusted records do not
// 4. Misbehaving peers are penalized end to end
//
// Usage:
//   cargo test --test integration_test -- --nocapture
//
// ========================================

use bee_consensus::payments::PaymentVote;
use bee_consensus::spork::{
    SporkMessage, SPORK_18_EVOLUTION_PAYMENTS, SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT,
};
use bee_core::config::NodeConfig;
use bee_core::interfaces::{FlagSyncStatus, MasternodeInfo, MemoryChain, MemoryMasternodes};
use bee_core::{unix_time, Outpoint, Script, Transaction, TxOut, COIN};
use bee_crypto::{generate_keypair, key_id_to_address, KeyPair};
use bee_network::{Envelope, MemorySink, NetMessage, PeerInfo};
use bee_node::{BeeNode, Collaborators};
use std::sync::Arc;

const PROTO: u32 = 70_213;
const REWARD: i64 = 10 * COIN;

struct Network {
    chain: Arc<MemoryChain>,
    masternodes: Arc<MemoryMasternodes>,
    status: Arc<FlagSyncStatus>,
    sink: Arc<MemorySink>,
    signers: Vec<KeyPair>,
    operators: Vec<(Outpoint, KeyPair)>,
}

impl Network {
    fn new(signers: usize, masternodes: u8) -> Self {
        let directory = Arc::new(MemoryMasternodes::new());
        let operators = (1..=masternodes)
            .map(|n| {
                let key = generate_keypair();
                let outpoint = Outpoint::new([n; 32], 0);
                directory.insert(MasternodeInfo {
                    outpoint,
                    protocol_version: PROTO,
                    operator_pubkey: key.public_key.clone(),
                    payout_script: Script::pay_to_key_id(&[n; 20]),
                });
                (outpoint, key)
            })
            .collect();

        Network {
            chain: Arc::new(MemoryChain::with_height(100)),
            masternodes: directory,
            status: Arc::new(FlagSyncStatus::new(true)),
            sink: Arc::new(MemorySink::new()),
            signers: (0..signers).map(|_| generate_keypair()).collect(),
            operators,
        }
    }

    fn config(&self, min_signatures: usize) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.sporks.signers = self
            .signers
            .iter()
            .map(|k| hex::encode(&k.public_key))
            .collect();
        config.sporks.min_signatures = min_signatures;
        config.payments.min_blocks_to_store = 50;
        config.node.workers = 3;
        config.node.queue_depth = 64;
        config
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators {
            chain: self.chain.clone(),
            masternodes: self.masternodes.clone(),
            status: self.status.clone(),
            sink: self.sink.clone(),
        }
    }

    fn spork(&self, signer: usize, id: i32, value: i64, payload: &str) -> Vec<u8> {
        let mut msg = SporkMessage::new(id, value, payload, unix_time());
        msg.sign(&self.signers[signer].secret_key).unwrap();
        NetMessage::Spork(msg).encode().unwrap()
    }

    fn vote(&self, operator: usize, height: u32, payee: u8) -> Vec<u8> {
        let (outpoint, key) = &self.operators[operator];
        let vote = PaymentVote::create(*outpoint, height, Script::pay_to_key_id(&[payee; 20]), &key.secret_key)
            .unwrap();
        NetMessage::PaymentVote(vote).encode().unwrap()
    }
}

fn envelope(peer: u64, payload: Vec<u8>) -> Envelope {
    Envelope::new(PeerInfo::new(peer, PROTO, format!("10.0.0.{}:9999", peer)), payload)
}

// ========================================
// TEST 1: MULTI-SIGNER SPORK QUORUM
// ========================================
#[tokio::test]
async fn test_spork_quorum_through_workers() {
    let net = Network::new(3, 0);
    let node = BeeNode::new(net.config(2), net.collaborators()).unwrap();

    let pool = node.spawn_workers();
    assert!(pool.submit(envelope(1, net.spork(0, SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT, 0, ""))).await);
    pool.shutdown().await;
    assert!(!node.sporks().is_active(SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT));

    let pool = node.spawn_workers();
    assert!(pool.submit(envelope(2, net.spork(2, SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT, 0, ""))).await);
    pool.shutdown().await;

    let pool = node.spawn_workers();
    assert!(pool.submit(envelope(3, NetMessage::GetSporks.encode().unwrap())).await);
    pool.shutdown().await;

    assert!(node.sporks().is_active(SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT));
    assert_eq!(net.sink.pushed_to(3).len(), 2);
    assert_eq!(node.metrics().sporks_admitted_total.get(), 2);
}

// ========================================
// TEST 2: VOTES INTO BLOCK VALIDATION
// ========================================
#[tokio::test]
async fn test_votes_drive_block_payee_checks() {
    let net = Network::new(1, 8);
    let node = BeeNode::new(net.config(1), net.collaborators()).unwrap();
    let height = 105;

    let evo_address = key_id_to_address(&[0xee; 20]);
    let pool = node.spawn_workers();
    assert!(pool.submit(envelope(1, net.spork(0, SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT, 0, ""))).await);
    assert!(pool.submit(envelope(1, net.spork(0, SPORK_18_EVOLUTION_PAYMENTS, 1, &format!("[{}]", evo_address)))).await);
    for operator in 0..7 {
        assert!(pool.submit(envelope(10 + operator as u64, net.vote(operator, height, 3))).await);
    }
    pool.shutdown().await;

    assert_eq!(node.ledger().votes_at(height).len(), 7);
    assert_eq!(node.metrics().votes_admitted_total.get(), 7);
    assert!(node.ledger().required_payments_string(height).ends_with(":7"));

    let payments = node.payments();
    let mut coinbase = Transaction::new(vec![TxOut::new(REWARD, Script::pay_to_key_id(&[0x99; 20]))]);
    let added = payments.fill_block_payment(&mut coinbase, height, REWARD);
    assert_eq!(added.len(), 2);
    assert_eq!(coinbase.value_out(), Some(REWARD));
    assert!(payments.is_block_value_valid(&coinbase, height, REWARD));
    assert!(payments.is_block_payee_valid(&coinbase, height, REWARD));

    let wrong = Transaction::new(vec![
        TxOut::new(REWARD / 2, Script::pay_to_key_id(&[0x99; 20])),
        TxOut::new(REWARD / 2, Script::pay_to_key_id(&[4; 20])),
    ]);
    assert!(!payments.is_block_payee_valid(&wrong, height, REWARD));

    let strings = payments.required_payments_strings(height, height + 2);
    assert!(strings[&height].contains(&evo_address));
    assert!(strings[&(height + 1)].starts_with("Unknown"));
}

// ========================================
// TEST 3: SPORK CACHE ACROSS RESTARTS
// ========================================
#[tokio::test]
async fn test_spork_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let net = Network::new(3, 0);
    let mut config = net.config(2);
    config.node.spork_cache_path = Some(dir.path().join("sporks").to_string_lossy().into_owned());

    {
        let node = BeeNode::new(config.clone(), net.collaborators()).unwrap();
        let pool = node.spawn_workers();
        for signer in 0..3 {
            assert!(pool.submit(envelope(1, net.spork(signer, SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT, 0, ""))).await);
        }
        pool.shutdown().await;
        assert_eq!(node.maintenance().unwrap().saved_sporks, 3);
    }

    let restarted = BeeNode::new(config.clone(), net.collaborators()).unwrap();
    assert!(restarted.sporks().is_active(SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT));
    drop(restarted);

    // Cached records from signers no longer trusted are discarded on load.
    let mut narrowed = config;
    narrowed.sporks.signers.truncate(1);
    narrowed.sporks.min_signatures = 1;
    let restarted = BeeNode::new(narrowed, net.collaborators()).unwrap();
    assert_eq!(restarted.sporks().snapshot().len(), 1);
}

// ========================================
// TEST 4: MISBEHAVING PEERS
// ========================================
#[tokio::test]
async fn test_misbehaving_peers_penalized() {
    let net = Network::new(1, 2);
    let node = BeeNode::new(net.config(1), net.collaborators()).unwrap();
    let outsider = generate_keypair();

    let mut forged = SporkMessage::new(SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT, 0, "", unix_time());
    forged.sign(&outsider.secret_key).unwrap();

    let (outpoint, _) = &net.operators[0];
    let bad_vote = PaymentVote::create(*outpoint, 110, Script::pay_to_key_id(&[1; 20]), &outsider.secret_key).unwrap();

    let pool = node.spawn_workers();
    assert!(pool.submit(envelope(1, NetMessage::Spork(forged).encode().unwrap())).await);
    assert!(pool.submit(envelope(2, NetMessage::PaymentVote(bad_vote).encode().unwrap())).await);
    assert!(pool.submit(envelope(3, vec![0xde, 0xad])).await);
    assert!(pool.submit(envelope(4, NetMessage::PaymentSync.encode().unwrap())).await);
    pool.shutdown().await;

    let pool = node.spawn_workers();
    assert!(pool.submit(envelope(4, NetMessage::PaymentSync.encode().unwrap())).await);
    pool.shutdown().await;

    assert_eq!(net.sink.penalty_of(1), 100);
    assert_eq!(net.sink.penalty_of(2), 20);
    assert_eq!(net.sink.penalty_of(3), 10);
    assert_eq!(net.sink.penalty_of(4), 20);
    assert!(!node.sporks().is_active(SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT));
    assert_eq!(node.metrics().penalties_total.get(), 4);
}
