// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - SPORK REGISTRY
//
// Admission, storage and resolution of signed spork messages.
//
// Two regimes, chosen once at startup:
// 1. SingleKeySporks   - one trusted key, one active record per spork id
// 2. MultiSignerSporks - n trusted keys, one record per (spork id, signer),
//                        a value takes effect once k > n/2 signers agree
//
// Because k is a strict majority, two different values can never both
// reach k signers for the same spork id.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::cache::SporkSnapshot;
use crate::evolution::EvolutionSchedule;
use crate::payments::PayeeSelectionMode;
use crate::spork::{
    default_value, spork_name_by_id, SporkId, SporkMessage, SPORK_12_RECONSIDER_BLOCKS,
    SPORK_18_EVOLUTION_PAYMENTS, SPORK_20_EVOLUTION_DISABLE_NODE, SPORK_21_MASTERNODE_ORDER_ENABLE,
    SPORK_OFF,
};
use crate::validator::{check_spork_envelope, PeerAction, PENALTY_BAD_SPORK};
use bee_core::config::{SporkBackendKind, SporkConfig};
use bee_core::interfaces::safe_lock;
use bee_core::{unix_time, Amount, Script, Transaction};
use bee_crypto::{
    key_id, keypair_from_secret, public_key_from_hex, sign_message, verify_signature, CryptoError,
    Hash256, KeyId, KeyPair,
};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use thiserror::Error;

/// Deepest reorg SPORK_12 may request.
pub const MAX_RECONSIDER_BLOCKS: i64 = 576;
/// Minimum spacing between two SPORK_12 executions.
pub const RECONSIDER_COOLDOWN_SECS: i64 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SporkError {
    #[error("spork {spork_id} is not newer than the stored record from this signer")]
    Stale { spork_id: SporkId },
    #[error("spork signature does not match any trusted signer")]
    Unauthorized,
    #[error("spork signed {drift}s in the future")]
    FutureTimestamp { drift: i64 },
    #[error("malformed spork: {0}")]
    Malformed(String),
    #[error("invalid quorum: k={k} with {signers} trusted signers")]
    InvalidQuorum { k: usize, signers: usize },
    #[error("no spork signing key configured")]
    NoSigningKey,
    #[error("signing key is not a trusted spork signer")]
    UntrustedKey,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl SporkError {
    pub fn peer_action(&self) -> PeerAction {
        match self {
            SporkError::Unauthorized | SporkError::FutureTimestamp { .. } | SporkError::Malformed(_) => {
                PeerAction::penalize(PENALTY_BAD_SPORK)
            }
            _ => PeerAction::none(),
        }
    }
}

/// Side effect the chain layer must carry out after an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SporkAction {
    ReconsiderBlocks(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SporkAdmission {
    pub hash: Hash256,
    pub spork_id: SporkId,
    pub signer: KeyId,
    /// Value now in force for `spork_id`, if any reached quorum.
    pub resolved: Option<i64>,
    pub action: Option<SporkAction>,
}

// ─────────────────────────────────────────────────────────────────
// BACKENDS
// ─────────────────────────────────────────────────────────────────

/// Storage and trust rules of one spork regime.
pub trait SporkBackend: Send {
    fn kind(&self) -> SporkBackendKind;

    /// Check signer and staleness, then store. Returns the signer's key id.
    fn submit(&mut self, msg: SporkMessage) -> Result<KeyId, SporkError>;

    fn resolve(&self, spork_id: SporkId) -> Option<i64>;

    /// Payload carried by the resolved value, when enough signers agree on it too.
    fn resolve_payload(&self, spork_id: SporkId) -> Option<String>;

    /// Every stored record, keyed by spork id then signer.
    fn records(&self) -> Vec<(SporkId, KeyId, SporkMessage)>;

    fn by_hash(&self, hash: &Hash256) -> Option<SporkMessage>;

    /// Drop records whose signer is untrusted or whose signature fails.
    fn sweep(&mut self) -> usize;

    fn replace_signers(&mut self, signers: Vec<Vec<u8>>, min_signatures: usize) -> Result<(), SporkError>;

    fn is_trusted(&self, public_key: &[u8]) -> bool;
}

pub struct SingleKeySporks {
    public_key: Vec<u8>,
    signer: KeyId,
    active: BTreeMap<SporkId, SporkMessage>,
    hashes: HashMap<Hash256, SporkId>,
}

impl SingleKeySporks {
    pub fn new(public_key: Vec<u8>) -> Self {
        SingleKeySporks {
            signer: key_id(&public_key),
            public_key,
            active: BTreeMap::new(),
            hashes: HashMap::new(),
        }
    }

    fn reindex(&mut self) {
        self.hashes = self.active.iter().map(|(id, m)| (m.hash(), *id)).collect();
    }
}

impl SporkBackend for SingleKeySporks {
    fn kind(&self) -> SporkBackendKind {
        SporkBackendKind::SingleKey
    }

    fn submit(&mut self, msg: SporkMessage) -> Result<KeyId, SporkError> {
        if !msg.check_signature(&self.public_key) {
            return Err(SporkError::Unauthorized);
        }
        if let Some(existing) = self.active.get(&msg.spork_id) {
            if existing.time_signed >= msg.time_signed {
                return Err(SporkError::Stale { spork_id: msg.spork_id });
            }
            let old = existing.hash();
            self.hashes.remove(&old);
        }
        self.hashes.insert(msg.hash(), msg.spork_id);
        self.active.insert(msg.spork_id, msg);
        Ok(self.signer)
    }

    fn resolve(&self, spork_id: SporkId) -> Option<i64> {
        self.active.get(&spork_id).map(|m| m.value)
    }

    fn resolve_payload(&self, spork_id: SporkId) -> Option<String> {
        self.active.get(&spork_id).map(|m| m.payload.clone())
    }

    fn records(&self) -> Vec<(SporkId, KeyId, SporkMessage)> {
        self.active
            .iter()
            .map(|(id, m)| (*id, self.signer, m.clone()))
            .collect()
    }

    fn by_hash(&self, hash: &Hash256) -> Option<SporkMessage> {
        let id = self.hashes.get(hash)?;
        self.active.get(id).cloned()
    }

    fn sweep(&mut self) -> usize {
        let before = self.active.len();
        let key = self.public_key.clone();
        self.active.retain(|_, m| m.check_signature(&key));
        let removed = before - self.active.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    fn replace_signers(&mut self, signers: Vec<Vec<u8>>, min_signatures: usize) -> Result<(), SporkError> {
        if signers.len() != 1 || min_signatures != 1 {
            return Err(SporkError::InvalidQuorum {
                k: min_signatures,
                signers: signers.len(),
            });
        }
        self.public_key = signers.into_iter().next().unwrap_or_default();
        self.signer = key_id(&self.public_key);
        Ok(())
    }

    fn is_trusted(&self, public_key: &[u8]) -> bool {
        self.public_key == public_key
    }
}

pub struct MultiSignerSporks {
    signers: BTreeMap<KeyId, Vec<u8>>,
    min_signatures: usize,
    records: BTreeMap<SporkId, BTreeMap<KeyId, SporkMessage>>,
    hashes: HashMap<Hash256, (SporkId, KeyId)>,
}

fn check_quorum(signers: usize, k: usize) -> Result<(), SporkError> {
    if signers == 0 || k > signers || 2 * k <= signers {
        return Err(SporkError::InvalidQuorum { k, signers });
    }
    Ok(())
}

fn signer_map(keys: Vec<Vec<u8>>) -> BTreeMap<KeyId, Vec<u8>> {
    keys.into_iter().map(|pk| (key_id(&pk), pk)).collect()
}

impl MultiSignerSporks {
    /// Fails unless `min_signatures` is a strict majority of the distinct signers.
    pub fn new(signers: Vec<Vec<u8>>, min_signatures: usize) -> Result<Self, SporkError> {
        let signers = signer_map(signers);
        check_quorum(signers.len(), min_signatures)?;
        Ok(MultiSignerSporks {
            signers,
            min_signatures,
            records: BTreeMap::new(),
            hashes: HashMap::new(),
        })
    }

    pub fn min_signatures(&self) -> usize {
        self.min_signatures
    }

    fn find_signer(&self, msg: &SporkMessage) -> Option<KeyId> {
        self.signers
            .iter()
            .find(|(_, pk)| msg.check_signature(pk))
            .map(|(id, _)| *id)
    }

    fn reindex(&mut self) {
        self.hashes = self
            .records
            .iter()
            .flat_map(|(id, by_signer)| {
                by_signer
                    .iter()
                    .map(move |(signer, m)| (m.hash(), (*id, *signer)))
            })
            .collect();
    }

    /// First key to gather `min_signatures` distinct signers, in signer order.
    fn first_to_quorum<K: PartialEq + Clone>(
        &self,
        spork_id: SporkId,
        key_of: impl Fn(&SporkMessage) -> K,
    ) -> Option<K> {
        let by_signer = self.records.get(&spork_id)?;
        let mut tally: Vec<(K, usize)> = Vec::new();
        for msg in by_signer.values() {
            let key = key_of(msg);
            let count = match tally.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => {
                    entry.1 += 1;
                    entry.1
                }
                None => {
                    tally.push((key.clone(), 1));
                    1
                }
            };
            if count >= self.min_signatures {
                return Some(key);
            }
        }
        None
    }
}

impl SporkBackend for MultiSignerSporks {
    fn kind(&self) -> SporkBackendKind {
        SporkBackendKind::MultiSigner
    }

    fn submit(&mut self, msg: SporkMessage) -> Result<KeyId, SporkError> {
        let signer = self.find_signer(&msg).ok_or(SporkError::Unauthorized)?;
        let by_signer = self.records.entry(msg.spork_id).or_default();

        if let Some(existing) = by_signer.get(&signer) {
            if existing.time_signed >= msg.time_signed {
                return Err(SporkError::Stale { spork_id: msg.spork_id });
            }
            self.hashes.remove(&existing.hash());
        }

        self.hashes.insert(msg.hash(), (msg.spork_id, signer));
        by_signer.insert(signer, msg);
        Ok(signer)
    }

    fn resolve(&self, spork_id: SporkId) -> Option<i64> {
        self.first_to_quorum(spork_id, |m| m.value)
    }

    fn resolve_payload(&self, spork_id: SporkId) -> Option<String> {
        self.first_to_quorum(spork_id, |m| (m.value, m.payload.clone()))
            .map(|(_, payload)| payload)
    }

    fn records(&self) -> Vec<(SporkId, KeyId, SporkMessage)> {
        self.records
            .iter()
            .flat_map(|(id, by_signer)| {
                by_signer
                    .iter()
                    .map(move |(signer, m)| (*id, *signer, m.clone()))
            })
            .collect()
    }

    fn by_hash(&self, hash: &Hash256) -> Option<SporkMessage> {
        let (id, signer) = self.hashes.get(hash)?;
        self.records.get(id)?.get(signer).cloned()
    }

    fn sweep(&mut self) -> usize {
        let signers = &self.signers;
        let mut removed = 0;
        for by_signer in self.records.values_mut() {
            let before = by_signer.len();
            by_signer.retain(|signer, m| {
                signers
                    .get(signer)
                    .is_some_and(|pk| m.check_signature(pk))
            });
            removed += before - by_signer.len();
        }
        self.records.retain(|_, by_signer| !by_signer.is_empty());
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    fn replace_signers(&mut self, signers: Vec<Vec<u8>>, min_signatures: usize) -> Result<(), SporkError> {
        let signers = signer_map(signers);
        check_quorum(signers.len(), min_signatures)?;
        self.signers = signers;
        self.min_signatures = min_signatures;
        Ok(())
    }

    fn is_trusted(&self, public_key: &[u8]) -> bool {
        self.signers.values().any(|pk| pk == public_key)
    }
}

// ─────────────────────────────────────────────────────────────────
// REGISTRY
// ─────────────────────────────────────────────────────────────────

struct RegistryState {
    backend: Box<dyn SporkBackend>,
    evolution: EvolutionSchedule,
    signing_key: Option<KeyPair>,
    last_reconsider: Option<i64>,
}

pub struct SporkRegistry {
    state: Mutex<RegistryState>,
    max_future_drift: i64,
}

impl SporkRegistry {
    pub fn new(backend: Box<dyn SporkBackend>, max_future_drift: i64) -> Self {
        SporkRegistry {
            state: Mutex::new(RegistryState {
                backend,
                evolution: EvolutionSchedule::new(),
                signing_key: None,
                last_reconsider: None,
            }),
            max_future_drift,
        }
    }

    pub fn from_config(config: &SporkConfig) -> Result<Self, SporkError> {
        let backend: Box<dyn SporkBackend> = match config.backend {
            SporkBackendKind::SingleKey => {
                let key = config
                    .legacy_key
                    .as_deref()
                    .ok_or(SporkError::InvalidQuorum { k: 1, signers: 0 })?;
                Box::new(SingleKeySporks::new(public_key_from_hex(key)?))
            }
            SporkBackendKind::MultiSigner => {
                let keys = config
                    .signers
                    .iter()
                    .map(|k| public_key_from_hex(k))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(MultiSignerSporks::new(keys, config.min_signatures)?)
            }
        };
        info!(target: "spork", "spork registry using {:?} backend", config.backend);
        Ok(Self::new(backend, config.max_future_drift_secs))
    }

    pub fn backend_kind(&self) -> SporkBackendKind {
        safe_lock(&self.state).backend.kind()
    }

    pub fn submit(&self, msg: SporkMessage) -> Result<SporkAdmission, SporkError> {
        self.submit_at(msg, unix_time())
    }

    /// Admit `msg` as of `now`. Nothing is mutated on failure.
    pub fn submit_at(&self, msg: SporkMessage, now: i64) -> Result<SporkAdmission, SporkError> {
        check_spork_envelope(&msg, now, self.max_future_drift)?;

        let hash = msg.hash();
        let spork_id = msg.spork_id;
        let value = msg.value;
        let time_signed = msg.time_signed;

        let mut state = safe_lock(&self.state);
        let signer = state.backend.submit(msg)?;
        let resolved = state.backend.resolve(spork_id);

        info!(
            target: "spork",
            "SPORK -- hash: {} id: {} ({}) value: {:>10} signed: {} signer: {}",
            hex::encode(hash),
            spork_id,
            spork_name_by_id(spork_id),
            value,
            time_signed,
            hex::encode(signer)
        );

        if spork_id == SPORK_18_EVOLUTION_PAYMENTS || spork_id == SPORK_20_EVOLUTION_DISABLE_NODE {
            if let Some(payload) = state.backend.resolve_payload(spork_id) {
                if !payload.is_empty() {
                    if spork_id == SPORK_18_EVOLUTION_PAYMENTS {
                        state.evolution.set_payees(&payload);
                    } else {
                        state.evolution.set_disabled_nodes(&payload);
                    }
                    debug!(target: "spork", "evolution rotation updated from spork {}", spork_id);
                }
            }
        }

        let mut action = None;
        if spork_id == SPORK_12_RECONSIDER_BLOCKS {
            if let Some(blocks) = resolved.filter(|v| *v > 0) {
                action = Self::reconsider(&mut state, blocks, now);
            }
        }

        Ok(SporkAdmission {
            hash,
            spork_id,
            signer,
            resolved,
            action,
        })
    }

    fn reconsider(state: &mut RegistryState, blocks: i64, now: i64) -> Option<SporkAction> {
        if blocks > MAX_RECONSIDER_BLOCKS {
            warn!(target: "spork", "SPORK_12 asks to reconsider {} blocks, limit is {}", blocks, MAX_RECONSIDER_BLOCKS);
            return None;
        }
        if let Some(last) = state.last_reconsider {
            if now - last < RECONSIDER_COOLDOWN_SECS {
                warn!(target: "spork", "SPORK_12 executed {}s ago, skipping", now - last);
                return None;
            }
        }
        state.last_reconsider = Some(now);
        info!(target: "spork", "SPORK_12 -- reconsidering last {} blocks", blocks);
        Some(SporkAction::ReconsiderBlocks(blocks))
    }

    pub fn resolve(&self, spork_id: SporkId) -> Option<i64> {
        safe_lock(&self.state).backend.resolve(spork_id)
    }

    /// Resolved value, else the compiled default, else `SPORK_OFF`.
    pub fn value_or_default(&self, spork_id: SporkId) -> i64 {
        if let Some(value) = self.resolve(spork_id) {
            return value;
        }
        default_value(spork_id).unwrap_or_else(|| {
            debug!(target: "spork", "unknown spork id {}, treating as off", spork_id);
            SPORK_OFF
        })
    }

    pub fn is_active(&self, spork_id: SporkId) -> bool {
        self.is_active_at(spork_id, unix_time())
    }

    pub fn is_active_at(&self, spork_id: SporkId, now: i64) -> bool {
        self.value_or_default(spork_id) < now
    }

    /// Flag-type sporks: any positive value enables the feature.
    pub fn is_flag_enabled(&self, spork_id: SporkId) -> bool {
        self.value_or_default(spork_id) > 0
    }

    pub fn payee_selection_mode(&self) -> PayeeSelectionMode {
        self.payee_selection_mode_at(unix_time())
    }

    pub fn payee_selection_mode_at(&self, now: i64) -> PayeeSelectionMode {
        if self.is_active_at(SPORK_21_MASTERNODE_ORDER_ENABLE, now) {
            PayeeSelectionMode::DeterministicOrder
        } else {
            PayeeSelectionMode::Legacy
        }
    }

    pub fn sweep(&self) -> usize {
        let removed = safe_lock(&self.state).backend.sweep();
        if removed > 0 {
            info!(target: "spork", "sweep removed {} spork records", removed);
        }
        removed
    }

    /// Install a new trusted set, then purge records it no longer covers.
    pub fn set_trusted_signers(&self, signers: Vec<Vec<u8>>, min_signatures: usize) -> Result<usize, SporkError> {
        let mut state = safe_lock(&self.state);
        state.backend.replace_signers(signers, min_signatures)?;
        if let Some(kp) = &state.signing_key {
            if !state.backend.is_trusted(&kp.public_key) {
                state.signing_key = None;
            }
        }
        Ok(state.backend.sweep())
    }

    /// All current records, every signer included; the GETSPORKS answer.
    pub fn active_messages(&self) -> Vec<SporkMessage> {
        safe_lock(&self.state)
            .backend
            .records()
            .into_iter()
            .map(|(_, _, m)| m)
            .collect()
    }

    pub fn get_by_hash(&self, hash: &Hash256) -> Option<SporkMessage> {
        safe_lock(&self.state).backend.by_hash(hash)
    }

    pub fn has(&self, hash: &Hash256) -> bool {
        self.get_by_hash(hash).is_some()
    }

    /// Accept a local signing key; it must produce signatures a trusted signer would.
    pub fn set_signing_key(&self, secret: &[u8]) -> Result<(), SporkError> {
        let kp = keypair_from_secret(secret)?;
        let challenge = b"bee spork key check";
        let sig = sign_message(challenge, &kp.secret_key)?;
        if !verify_signature(challenge, &sig, &kp.public_key) {
            return Err(SporkError::Crypto(CryptoError::VerificationFailed));
        }

        let mut state = safe_lock(&self.state);
        if !state.backend.is_trusted(&kp.public_key) {
            return Err(SporkError::UntrustedKey);
        }
        state.signing_key = Some(kp);
        Ok(())
    }

    /// Sign, admit locally and return the message for relay.
    pub fn update_spork(&self, spork_id: SporkId, value: i64, payload: &str) -> Result<SporkMessage, SporkError> {
        let now = unix_time();
        let mut msg = SporkMessage::new(spork_id, value, payload, now);
        {
            let state = safe_lock(&self.state);
            let kp = state.signing_key.as_ref().ok_or(SporkError::NoSigningKey)?;
            msg.sign(&kp.secret_key)?;
        }
        self.submit_at(msg.clone(), now)?;
        Ok(msg)
    }

    pub fn evolution(&self) -> EvolutionSchedule {
        safe_lock(&self.state).evolution.clone()
    }

    pub fn evolution_payee(&self, height: u32) -> Option<Script> {
        safe_lock(&self.state).evolution.payee_script(height)
    }

    pub fn is_evolution_valid(&self, tx: &Transaction, height: u32, amount: Amount) -> bool {
        safe_lock(&self.state).evolution.is_transaction_valid(tx, height, amount)
    }

    pub fn snapshot(&self) -> SporkSnapshot {
        let records = safe_lock(&self.state).backend.records();
        SporkSnapshot::from_records(records)
    }

    /// Re-admit cached records; anything the current trust set rejects is dropped.
    pub fn restore(&self, snapshot: SporkSnapshot) -> usize {
        let now = unix_time();
        let mut messages: Vec<SporkMessage> = snapshot.into_messages();
        messages.sort_by_key(|m| m.time_signed);

        let mut admitted = 0;
        for msg in messages {
            match self.submit_at(msg, now) {
                Ok(_) => admitted += 1,
                Err(e) => debug!(target: "spork", "cached spork discarded: {}", e),
            }
        }
        admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spork::{SPORK_10_MASTERNODE_PAY_UPDATED_NODES, SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT};
    use bee_core::{TxOut, COIN};
    use bee_crypto::{generate_keypair_from_seed, key_id_to_address};

    const X: SporkId = SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT;
    const NOW: i64 = 1_700_000_000;

    fn keys(n: u8) -> Vec<KeyPair> {
        (1..=n)
            .map(|i| generate_keypair_from_seed(&[i; 32]).unwrap())
            .collect()
    }

    fn multi(keys: &[KeyPair], k: usize) -> SporkRegistry {
        let pubs = keys.iter().map(|kp| kp.public_key.clone()).collect();
        SporkRegistry::new(Box::new(MultiSignerSporks::new(pubs, k).unwrap()), 7_200)
    }

    fn signed(kp: &KeyPair, id: SporkId, value: i64, payload: &str, time: i64) -> SporkMessage {
        let mut msg = SporkMessage::new(id, value, payload, time);
        msg.sign(&kp.secret_key).unwrap();
        msg
    }

    #[test]
    fn test_quorum_scenario() {
        let s = keys(3);
        let registry = multi(&s, 2);

        registry.submit_at(signed(&s[0], X, 100, "", NOW), NOW).unwrap();
        assert_eq!(registry.resolve(X), None);
        registry.submit_at(signed(&s[1], X, 100, "", NOW), NOW).unwrap();
        registry.submit_at(signed(&s[2], X, 200, "", NOW), NOW).unwrap();
        assert_eq!(registry.resolve(X), Some(100));

        registry.submit_at(signed(&s[0], X, 300, "", NOW + 1), NOW + 1).unwrap();
        assert_eq!(registry.resolve(X), None);

        registry.submit_at(signed(&s[2], X, 300, "", NOW + 2), NOW + 2).unwrap();
        assert_eq!(registry.resolve(X), Some(300));
    }

    #[test]
    fn test_quorum_must_be_majority() {
        let s = keys(4);
        let pubs: Vec<Vec<u8>> = s.iter().map(|kp| kp.public_key.clone()).collect();
        assert_eq!(
            MultiSignerSporks::new(pubs.clone(), 2).err(),
            Some(SporkError::InvalidQuorum { k: 2, signers: 4 })
        );
        assert!(MultiSignerSporks::new(pubs.clone(), 5).is_err());
        assert!(MultiSignerSporks::new(pubs, 3).is_ok());
        assert!(MultiSignerSporks::new(Vec::new(), 0).is_err());
    }

    #[test]
    fn test_stale_and_replayed_records() {
        let s = keys(1);
        let registry = multi(&s, 1);
        let msg = signed(&s[0], X, 1, "", NOW);
        registry.submit_at(msg.clone(), NOW).unwrap();

        assert_eq!(registry.submit_at(msg, NOW), Err(SporkError::Stale { spork_id: X }));
        let older = signed(&s[0], X, 5, "", NOW - 10);
        assert_eq!(registry.submit_at(older, NOW), Err(SporkError::Stale { spork_id: X }));
        assert_eq!(registry.resolve(X), Some(1));
    }

    #[test]
    fn test_unauthorized_and_future_penalized() {
        let s = keys(2);
        let registry = multi(&s[..1], 1);

        let err = registry.submit_at(signed(&s[1], X, 1, "", NOW), NOW).unwrap_err();
        assert_eq!(err, SporkError::Unauthorized);
        assert_eq!(err.peer_action().penalty, PENALTY_BAD_SPORK);

        let err = registry
            .submit_at(signed(&s[0], X, 1, "", NOW + 7_201), NOW)
            .unwrap_err();
        assert!(matches!(err, SporkError::FutureTimestamp { drift: 7_201 }));
        assert_eq!(err.peer_action().penalty, PENALTY_BAD_SPORK);

        assert_eq!(SporkError::Stale { spork_id: X }.peer_action(), PeerAction::none());
        assert!(registry.active_messages().is_empty());
    }

    #[test]
    fn test_defaults_and_activity() {
        let s = keys(1);
        let registry = multi(&s, 1);
        assert_eq!(registry.value_or_default(X), SPORK_OFF);
        assert!(!registry.is_active_at(X, NOW));
        assert_eq!(registry.value_or_default(99), SPORK_OFF);
        assert!(!registry.is_active_at(99, NOW));
        assert_eq!(registry.payee_selection_mode_at(NOW), PayeeSelectionMode::Legacy);

        registry
            .submit_at(signed(&s[0], SPORK_21_MASTERNODE_ORDER_ENABLE, NOW - 1, "", NOW), NOW)
            .unwrap();
        assert_eq!(
            registry.payee_selection_mode_at(NOW),
            PayeeSelectionMode::DeterministicOrder
        );
        assert!(!registry.is_active_at(SPORK_10_MASTERNODE_PAY_UPDATED_NODES, NOW));
    }

    #[test]
    fn test_sweep_after_signer_removed() {
        let s = keys(3);
        let registry = multi(&s, 2);
        for kp in &s {
            registry.submit_at(signed(kp, X, 7, "", NOW), NOW).unwrap();
        }
        assert_eq!(registry.active_messages().len(), 3);

        let remaining = vec![s[0].public_key.clone()];
        assert_eq!(registry.set_trusted_signers(remaining, 1).unwrap(), 2);
        assert_eq!(registry.active_messages().len(), 1);
        assert_eq!(registry.resolve(X), Some(7));

        assert!(registry.set_trusted_signers(vec![], 1).is_err());
    }

    #[test]
    fn test_lookup_by_hash() {
        let s = keys(1);
        let registry = multi(&s, 1);
        let first = signed(&s[0], X, 1, "", NOW);
        let admission = registry.submit_at(first.clone(), NOW).unwrap();
        assert_eq!(registry.get_by_hash(&admission.hash), Some(first.clone()));

        let second = signed(&s[0], X, 2, "", NOW + 5);
        registry.submit_at(second.clone(), NOW + 5).unwrap();
        assert!(!registry.has(&first.hash()));
        assert_eq!(registry.get_by_hash(&second.hash()), Some(second));
    }

    #[test]
    fn test_single_key_backend() {
        let s = keys(2);
        let registry = SporkRegistry::new(Box::new(SingleKeySporks::new(s[0].public_key.clone())), 7_200);
        assert_eq!(registry.backend_kind(), SporkBackendKind::SingleKey);

        registry.submit_at(signed(&s[0], X, 10, "", NOW), NOW).unwrap();
        assert_eq!(registry.resolve(X), Some(10));
        assert_eq!(
            registry.submit_at(signed(&s[1], X, 11, "", NOW + 1), NOW + 1),
            Err(SporkError::Unauthorized)
        );
        assert_eq!(
            registry.submit_at(signed(&s[0], X, 11, "", NOW - 1), NOW),
            Err(SporkError::Stale { spork_id: X })
        );
    }

    #[test]
    fn test_evolution_payload_needs_quorum() {
        let s = keys(3);
        let registry = multi(&s, 2);
        let a = key_id_to_address(&[1u8; 20]);
        let b = key_id_to_address(&[2u8; 20]);
        let rotation = format!("[{},{}]", a, b);

        registry
            .submit_at(signed(&s[0], SPORK_18_EVOLUTION_PAYMENTS, 1, &rotation, NOW), NOW)
            .unwrap();
        assert!(registry.evolution().is_empty());

        registry
            .submit_at(signed(&s[1], SPORK_18_EVOLUTION_PAYMENTS, 1, &rotation, NOW), NOW)
            .unwrap();
        assert!(registry.is_flag_enabled(SPORK_18_EVOLUTION_PAYMENTS));
        assert_eq!(registry.evolution().payees().len(), 2);

        let payee = registry.evolution_payee(11).unwrap();
        assert_eq!(payee, Script::from_address(&b).unwrap());
        let tx = Transaction::new(vec![TxOut::new(COIN, payee)]);
        assert!(registry.is_evolution_valid(&tx, 11, COIN));
        assert!(!registry.is_evolution_valid(&tx, 10, COIN));
    }

    #[test]
    fn test_reconsider_blocks_limits() {
        let s = keys(1);
        let registry = multi(&s, 1);

        let too_deep = signed(&s[0], SPORK_12_RECONSIDER_BLOCKS, 1_000, "", NOW);
        assert_eq!(registry.submit_at(too_deep, NOW).unwrap().action, None);

        let ok = signed(&s[0], SPORK_12_RECONSIDER_BLOCKS, 50, "", NOW + 1);
        assert_eq!(
            registry.submit_at(ok, NOW + 1).unwrap().action,
            Some(SporkAction::ReconsiderBlocks(50))
        );

        let soon = signed(&s[0], SPORK_12_RECONSIDER_BLOCKS, 60, "", NOW + 2);
        assert_eq!(registry.submit_at(soon, NOW + 2).unwrap().action, None);

        let later = signed(&s[0], SPORK_12_RECONSIDER_BLOCKS, 70, "", NOW + 700);
        assert_eq!(
            registry.submit_at(later, NOW + 700).unwrap().action,
            Some(SporkAction::ReconsiderBlocks(70))
        );
    }

    #[test]
    fn test_signing_side() {
        let s = keys(3);
        let registry = multi(&s, 2);
        assert_eq!(
            registry.update_spork(X, 0, "").unwrap_err(),
            SporkError::NoSigningKey
        );

        let outsider = generate_keypair_from_seed(&[42u8; 32]).unwrap();
        assert_eq!(
            registry.set_signing_key(&outsider.secret_key),
            Err(SporkError::UntrustedKey)
        );

        registry.set_signing_key(&s[0].secret_key).unwrap();
        let msg = registry.update_spork(X, 0, "").unwrap();
        assert!(msg.check_signature(&s[0].public_key));
        assert_eq!(registry.active_messages(), vec![msg]);
    }

    #[test]
    fn test_snapshot_restore_respects_trust() {
        let s = keys(3);
        let source = multi(&s, 2);
        source.submit_at(signed(&s[0], X, 5, "", NOW), NOW).unwrap();
        source.submit_at(signed(&s[1], X, 5, "", NOW), NOW).unwrap();
        let snapshot = source.snapshot();

        let same_trust = multi(&s, 2);
        assert_eq!(same_trust.restore(snapshot.clone()), 2);
        assert_eq!(same_trust.resolve(X), Some(5));

        let narrower = multi(&s[1..], 2);
        assert_eq!(narrower.restore(snapshot), 1);
        assert_eq!(narrower.resolve(X), None);
    }
}
