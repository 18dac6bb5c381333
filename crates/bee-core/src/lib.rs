// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - CORE TYPES
//
// Chain primitives the spork and payment subsystems reason about.
// - Amounts in satoshi-style base units (1 BEE = 100_000_000)
// - Payout scripts, collateral outpoints, coinbase outputs
// - Reward split between miner and masternode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
use bee_crypto::{address_to_key_id, key_id_to_address, CryptoError, Hash256, KeyId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod interfaces;

pub type Amount = i64;

pub const COIN: Amount = 100_000_000;

/// Basis-point denominator for reward splits.
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Seconds since the Unix epoch; the node's notion of adjusted network time.
pub fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Share of `base` owed to the masternode, `share_bps` out of 10_000.
///
/// Intermediate math runs in i128 so large rewards cannot overflow.
pub fn masternode_payment(base: Amount, share_bps: u32) -> Amount {
    if base <= 0 {
        return 0;
    }
    (base as i128 * share_bps as i128 / BPS_DENOMINATOR as i128) as Amount
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SCRIPTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const PUSH_20: u8 = 0x14;

/// Locking script of an output. Payees are compared byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    /// Standard pay-to-key-hash script for a 160-bit key id.
    pub fn pay_to_key_id(id: &KeyId) -> Self {
        let mut bytes = Vec::with_capacity(25);
        bytes.extend_from_slice(&[OP_DUP, OP_HASH160, PUSH_20]);
        bytes.extend_from_slice(id);
        bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(bytes)
    }

    pub fn from_address(address: &str) -> Result<Self, CryptoError> {
        Ok(Self::pay_to_key_id(&address_to_key_id(address)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key id of a pay-to-key-hash script, `None` for any other shape.
    pub fn key_id(&self) -> Option<KeyId> {
        let b = &self.0;
        if b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == PUSH_20
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
        {
            let mut id = [0u8; 20];
            id.copy_from_slice(&b[3..23]);
            Some(id)
        } else {
            None
        }
    }

    pub fn to_address(&self) -> Option<String> {
        self.key_id().map(|id| key_id_to_address(&id))
    }

    /// Human-readable opcode form; part of the payment vote signing message.
    pub fn to_asm(&self) -> String {
        match self.key_id() {
            Some(id) => format!(
                "OP_DUP OP_HASH160 {} OP_EQUALVERIFY OP_CHECKSIG",
                hex::encode(id)
            ),
            None => hex::encode(&self.0),
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_address() {
            Some(address) => write!(f, "{}", address),
            None => write!(f, "{}", hex::encode(&self.0)),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OUTPOINTS AND TRANSACTIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Masternode collateral reference; the masternode's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: Hash256,
    pub index: u32,
}

impl Outpoint {
    pub fn new(txid: Hash256, index: u32) -> Self {
        Outpoint { txid, index }
    }

    pub fn to_string_short(&self) -> String {
        format!("{}-{}", hex::encode(self.txid), self.index)
    }

    /// Inverse of `to_string_short`: `<txid hex>-<index>`.
    pub fn parse(s: &str) -> Option<Self> {
        let (txid_hex, index) = s.trim().rsplit_once('-')?;
        let bytes = hex::decode(txid_hex).ok()?;
        let txid: Hash256 = bytes.try_into().ok()?;
        Some(Outpoint::new(txid, index.parse().ok()?))
    }

    pub fn to_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(&self.txid);
        out[32..].copy_from_slice(&self.index.to_le_bytes());
        out
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_short())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(value: Amount, script_pubkey: Script) -> Self {
        TxOut {
            value,
            script_pubkey,
        }
    }
}

impl fmt::Display for TxOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:08} -> {}",
            self.value / COIN,
            (self.value % COIN).abs(),
            self.script_pubkey
        )
    }
}

/// Coinbase transaction as seen by the payment rules: only outputs matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    pub fn new(outputs: Vec<TxOut>) -> Self {
        Transaction { outputs }
    }

    /// Total output value; `None` on a negative output or on overflow.
    pub fn value_out(&self) -> Option<Amount> {
        self.outputs.iter().try_fold(0 as Amount, |total, o| {
            if o.value < 0 {
                return None;
            }
            total.checked_add(o.value)
        })
    }

    /// True if some output pays `script` exactly `amount`.
    pub fn pays(&self, script: &Script, amount: Amount) -> bool {
        self.outputs
            .iter()
            .any(|o| &o.script_pubkey == script && o.value == amount)
    }

    /// Smallest strictly positive output value.
    pub fn lowest_positive_output(&self) -> Option<Amount> {
        self.outputs.iter().map(|o| o.value).filter(|v| *v > 0).min()
    }
}
