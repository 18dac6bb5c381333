// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - WIRE MESSAGES
//
// Spork and payment-vote gossip plus the inventory messages used to sync
// them. Framing and transport belong to the surrounding node; this module
// only fixes the payload encoding (bincode, size-bounded on decode).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bee_consensus::payments::PaymentVote;
use bee_consensus::spork::SporkMessage;
use bee_crypto::Hash256;
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest payload accepted from a peer.
pub const MAX_MESSAGE_SIZE: u64 = 4 * 1024 * 1024;
/// Default cap on inventory entries per INV / GETDATA message.
pub const MAX_INV_SZ: usize = 50_000;
/// Sync asset id reported in SYNCSTATUSCOUNT after a payment sync.
pub const MASTERNODE_SYNC_MNW: i32 = 3;
/// Reject code for peers below the required protocol.
pub const REJECT_OBSOLETE: u8 = 0x11;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("message codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("message of {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvKind {
    Spork,
    PaymentVote,
    /// All votes for the block with this hash.
    PaymentBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Inventory {
    pub kind: InvKind,
    pub hash: Hash256,
}

impl Inventory {
    pub fn new(kind: InvKind, hash: Hash256) -> Self {
        Inventory { kind, hash }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, hex::encode(self.hash))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetMessage {
    Spork(SporkMessage),
    GetSporks,
    PaymentVote(PaymentVote),
    /// Same payload under the pre-rename command.
    LegacyPaymentVote(PaymentVote),
    PaymentSync,
    GetData(Vec<Inventory>),
    Inv(Vec<Inventory>),
    SyncStatusCount { asset: i32, count: u32 },
    Reject { command: String, code: u8, reason: String },
}

impl NetMessage {
    pub fn command(&self) -> &'static str {
        match self {
            NetMessage::Spork(_) => "spork",
            NetMessage::GetSporks => "getsporks",
            NetMessage::PaymentVote(_) => "mnpaymentvote",
            NetMessage::LegacyPaymentVote(_) => "masternodepaymentvote",
            NetMessage::PaymentSync => "mnpaymentsync",
            NetMessage::GetData(_) => "getdata",
            NetMessage::Inv(_) => "inv",
            NetMessage::SyncStatusCount { .. } => "ssc",
            NetMessage::Reject { .. } => "reject",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(wire_options().serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() as u64 > MAX_MESSAGE_SIZE {
            return Err(WireError::TooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(wire_options().deserialize(bytes)?)
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_MESSAGE_SIZE)
        .reject_trailing_bytes()
}
