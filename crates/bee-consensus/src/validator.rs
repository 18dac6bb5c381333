// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - ADMISSION GATE
//
// Stateless checks run before a spork or payment vote reaches its ledger.
// - Spork envelope: timestamp drift, rotation payload syntax
// - Payment vote: known masternode, protocol floor, operator signature
// - Translation of every rejection into a PeerAction for the transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::evolution::is_valid_rotation;
use crate::payments::{PaymentVote, VoteError};
use crate::registry::{SporkError, SporkRegistry};
use crate::spork::{carries_rotation, SporkMessage, SPORK_10_MASTERNODE_PAY_UPDATED_NODES};
use bee_core::config::ValidatorConfig;
use bee_core::interfaces::{MasternodeDirectory, MasternodeInfo};
use bee_core::Outpoint;
use log::debug;

/// Unauthorized, forged or clock-abusing spork.
pub const PENALTY_BAD_SPORK: u32 = 100;
/// Known masternode, bad signature, vote for a future block while synced.
pub const PENALTY_BAD_VOTE_SIGNATURE: u32 = 20;
/// Second payment sync request in one session.
pub const PENALTY_REPEATED_SYNC: u32 = 20;

/// What the transport should do to the peer that relayed a rejected message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerAction {
    pub penalty: u32,
    /// Ask the peer for this masternode's announcement.
    pub ask_for: Option<Outpoint>,
}

impl PeerAction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn penalize(score: u32) -> Self {
        PeerAction {
            penalty: score,
            ask_for: None,
        }
    }

    pub fn ask_for(outpoint: Outpoint) -> Self {
        PeerAction {
            penalty: 0,
            ask_for: Some(outpoint),
        }
    }

    pub fn is_none(&self) -> bool {
        self.penalty == 0 && self.ask_for.is_none()
    }
}

/// Checks that need no registry state: drift and payload syntax.
pub fn check_spork_envelope(msg: &SporkMessage, now: i64, max_drift: i64) -> Result<(), SporkError> {
    let drift = msg.time_signed.saturating_sub(now);
    if drift > max_drift {
        return Err(SporkError::FutureTimestamp { drift });
    }
    if carries_rotation(msg.spork_id) && !msg.payload.is_empty() && !is_valid_rotation(&msg.payload) {
        return Err(SporkError::Malformed(format!(
            "spork {} payload {:?} is not a [..] list",
            msg.spork_id, msg.payload
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteValidator {
    min_proto_v1: u32,
    min_proto_v2: u32,
}

impl VoteValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        VoteValidator {
            min_proto_v1: config.min_payment_proto_v1,
            min_proto_v2: config.min_payment_proto_v2,
        }
    }

    /// Current vote protocol floor; SPORK_10 raises it without a software upgrade.
    pub fn min_payment_proto(&self, sporks: &SporkRegistry) -> u32 {
        if sporks.is_active(SPORK_10_MASTERNODE_PAY_UPDATED_NODES) {
            self.min_proto_v2
        } else {
            self.min_proto_v1
        }
    }

    pub fn base_proto(&self) -> u32 {
        self.min_proto_v1
    }

    /// Verify `vote` against the masternode registry.
    ///
    /// `min_proto` is the snapshot of [`Self::min_payment_proto`]; it applies
    /// to votes at or above `validation_height`, older votes only need v1.
    pub fn check_vote(
        &self,
        vote: &PaymentVote,
        directory: &dyn MasternodeDirectory,
        min_proto: u32,
        validation_height: u32,
        list_synced: bool,
    ) -> Result<MasternodeInfo, VoteError> {
        let outpoint = vote.masternode_outpoint;
        let info = directory
            .masternode_info(&outpoint)
            .ok_or(VoteError::UnknownMasternode(outpoint))?;

        let required = if vote.block_height >= validation_height {
            min_proto
        } else {
            self.min_proto_v1
        };
        if info.protocol_version < required {
            return Err(VoteError::ObsoleteProtocol {
                version: info.protocol_version,
                required,
            });
        }

        if !vote.check_signature(&info.operator_pubkey) {
            // Only votes for blocks we have not seen yet can be judged with
            // confidence; older ones may be signed with a since-rotated key.
            let dos = if list_synced && vote.block_height > validation_height {
                PENALTY_BAD_VOTE_SIGNATURE
            } else {
                0
            };
            debug!(target: "mnpayments", "bad vote signature from {} at height {}", outpoint, vote.block_height);
            return Err(VoteError::InvalidSignature { outpoint, dos });
        }

        Ok(info)
    }
}
