// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - SPORK MESSAGES
//
// Signed, gossiped network parameters.
// - Catalogue of known spork IDs and their compiled-in defaults
// - SporkMessage wire record, signing data and identity hash
//
// Time-type sporks carry a Unix timestamp: the spork is "active" once that
// moment has passed. Sporks left at SPORK_OFF stay off until 2099.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bee_crypto::{sign_message, verify_signature, CryptoError, Hash256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

pub type SporkId = i32;

/// 2099-01-01 00:00:00 UTC.
pub const SPORK_OFF: i64 = 4_070_908_800;

pub const SPORK_2_INSTANTSEND_ENABLED: SporkId = 10001;
pub const SPORK_3_INSTANTSEND_BLOCK_FILTERING: SporkId = 10002;
pub const SPORK_5_INSTANTSEND_MAX_VALUE: SporkId = 10004;
pub const SPORK_6_NEW_SIGS: SporkId = 10005;
pub const SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT: SporkId = 10007;
pub const SPORK_9_SUPERBLOCKS_ENABLED: SporkId = 10008;
pub const SPORK_10_MASTERNODE_PAY_UPDATED_NODES: SporkId = 10009;
pub const SPORK_12_RECONSIDER_BLOCKS: SporkId = 10011;
pub const SPORK_14_REQUIRE_SENTINEL_FLAG: SporkId = 10013;
pub const SPORK_18_EVOLUTION_PAYMENTS: SporkId = 10017;
pub const SPORK_19_EVOLUTION_PAYMENTS_ENFORCEMENT: SporkId = 10018;
pub const SPORK_20_EVOLUTION_DISABLE_NODE: SporkId = 10019;
pub const SPORK_21_MASTERNODE_ORDER_ENABLE: SporkId = 10020;
pub const SPORK_22_MASTERNODE_UPDATE_PROTO: SporkId = 10021;

/// (id, name, default value)
const CATALOGUE: [(SporkId, &str, i64); 14] = [
    (SPORK_2_INSTANTSEND_ENABLED, "SPORK_2_INSTANTSEND_ENABLED", 0),
    (SPORK_3_INSTANTSEND_BLOCK_FILTERING, "SPORK_3_INSTANTSEND_BLOCK_FILTERING", 0),
    (SPORK_5_INSTANTSEND_MAX_VALUE, "SPORK_5_INSTANTSEND_MAX_VALUE", 1000),
    (SPORK_6_NEW_SIGS, "SPORK_6_NEW_SIGS", SPORK_OFF),
    (SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT, "SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT", SPORK_OFF),
    (SPORK_9_SUPERBLOCKS_ENABLED, "SPORK_9_SUPERBLOCKS_ENABLED", SPORK_OFF),
    (SPORK_10_MASTERNODE_PAY_UPDATED_NODES, "SPORK_10_MASTERNODE_PAY_UPDATED_NODES", SPORK_OFF),
    (SPORK_12_RECONSIDER_BLOCKS, "SPORK_12_RECONSIDER_BLOCKS", 0),
    (SPORK_14_REQUIRE_SENTINEL_FLAG, "SPORK_14_REQUIRE_SENTINEL_FLAG", SPORK_OFF),
    (SPORK_18_EVOLUTION_PAYMENTS, "SPORK_18_EVOLUTION_PAYMENTS", 0),
    (SPORK_19_EVOLUTION_PAYMENTS_ENFORCEMENT, "SPORK_19_EVOLUTION_PAYMENTS_ENFORCEMENT", 0x7FFF_FFFF),
    (SPORK_20_EVOLUTION_DISABLE_NODE, "SPORK_20_EVOLUTION_DISABLE_NODE", 0x7FFF_FFFF),
    (SPORK_21_MASTERNODE_ORDER_ENABLE, "SPORK_21_MASTERNODE_ORDER_ENABLE", SPORK_OFF),
    (SPORK_22_MASTERNODE_UPDATE_PROTO, "SPORK_22_MASTERNODE_UPDATE_PROTO", SPORK_OFF),
];

pub fn default_value(id: SporkId) -> Option<i64> {
    CATALOGUE.iter().find(|(i, _, _)| *i == id).map(|(_, _, v)| *v)
}

pub fn spork_id_by_name(name: &str) -> Option<SporkId> {
    CATALOGUE.iter().find(|(_, n, _)| *n == name).map(|(i, _, _)| *i)
}

pub fn spork_name_by_id(id: SporkId) -> &'static str {
    CATALOGUE
        .iter()
        .find(|(i, _, _)| *i == id)
        .map(|(_, n, _)| *n)
        .unwrap_or("Unknown")
}

pub fn known_spork_ids() -> impl Iterator<Item = SporkId> {
    CATALOGUE.iter().map(|(i, _, _)| *i)
}

/// Sporks whose payload carries a `[a,b,c]` rotation list.
pub fn carries_rotation(id: SporkId) -> bool {
    id == SPORK_18_EVOLUTION_PAYMENTS || id == SPORK_20_EVOLUTION_DISABLE_NODE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SporkMessage {
    pub spork_id: SporkId,
    pub value: i64,
    pub time_signed: i64,
    pub payload: String,
    pub signature: Vec<u8>,
}

impl SporkMessage {
    pub fn new(spork_id: SporkId, value: i64, payload: impl Into<String>, time_signed: i64) -> Self {
        SporkMessage {
            spork_id,
            value,
            time_signed,
            payload: payload.into(),
            signature: Vec::new(),
        }
    }

    /// Canonical bytes covered by the signature.
    pub fn signing_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(24 + self.payload.len());
        data.extend_from_slice(&self.spork_id.to_le_bytes());
        data.extend_from_slice(&self.value.to_le_bytes());
        data.extend_from_slice(&self.time_signed.to_le_bytes());
        data.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        data.extend_from_slice(self.payload.as_bytes());
        data
    }

    /// Inventory hash. Unlike payment votes, the signature is part of the
    /// identity: two signers publishing the same value are distinct records.
    pub fn hash(&self) -> Hash256 {
        let mut hasher = Sha3_256::new();
        hasher.update(b"BEE_SPORK");
        hasher.update(self.signing_data());
        hasher.update(&self.signature);
        hasher.finalize().into()
    }

    pub fn sign(&mut self, secret_key: &[u8]) -> Result<(), CryptoError> {
        self.signature = sign_message(&self.signing_data(), secret_key)?;
        Ok(())
    }

    pub fn check_signature(&self, public_key: &[u8]) -> bool {
        verify_signature(&self.signing_data(), &self.signature, public_key)
    }
}
