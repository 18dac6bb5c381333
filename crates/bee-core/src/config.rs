//! Node configuration: TOML file, `BEE_*` environment overrides, validation.

use crate::{Amount, COIN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("environment variable {name}: {reason}")]
    Env { name: String, reason: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which spork regime the node runs. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SporkBackendKind {
    SingleKey,
    MultiSigner,
}

/// How a deterministic-mode payout amount is compared against the expected one.
///
/// `LowestOutputSkim` accepts `actual + lowest_positive_output == expected`
/// when the skim does not exceed `max_skim`. This tolerance has not been
/// confirmed by the protocol owners; set `Exact` to disable it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AmountMatch {
    Exact,
    LowestOutputSkim { max_skim: Amount },
}

impl Default for AmountMatch {
    fn default() -> Self {
        AmountMatch::LowestOutputSkim { max_skim: COIN }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SporkConfig {
    pub backend: SporkBackendKind,
    /// Hex-encoded Ed25519 public keys of the trusted multi-signer set.
    pub signers: Vec<String>,
    /// Quorum `k`; must be a strict majority of `signers`.
    pub min_signatures: usize,
    /// Hex-encoded public key for the single-key regime.
    pub legacy_key: Option<String>,
    pub max_future_drift_secs: i64,
}

impl Default for SporkConfig {
    fn default() -> Self {
        Self {
            backend: SporkBackendKind::MultiSigner,
            signers: Vec::new(),
            min_signatures: 1,
            legacy_key: None,
            max_future_drift_secs: 2 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Window growth per masternode, in basis points (12_500 = 1.25 blocks).
    pub storage_coeff_bps: u32,
    pub min_blocks_to_store: u32,
    pub signatures_required: usize,
    pub signatures_total: usize,
    pub masternode_share_bps: u32,
    /// Evolution carve-out taken off the reward before the masternode split.
    pub evolution_share_bps: u32,
    pub future_votes_limit: u32,
    pub amount_match: AmountMatch,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            storage_coeff_bps: 12_500,
            min_blocks_to_store: 6_000,
            signatures_required: 6,
            signatures_total: 10,
            masternode_share_bps: 5_000,
            evolution_share_bps: 1_000,
            future_votes_limit: 20,
            amount_match: AmountMatch::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub min_payment_proto_v1: u32,
    pub min_payment_proto_v2: u32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_payment_proto_v1: 70_210,
            min_payment_proto_v2: 70_213,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_inv_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_inv_size: 50_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub workers: usize,
    pub queue_depth: usize,
    pub maintenance_interval_secs: u64,
    pub spork_cache_path: Option<String>,
    /// Collateral of the masternode this node operates, `<txid hex>-<index>`.
    /// Its operator secret comes from `BEE_MASTERNODE_SECRET`, never the file.
    pub masternode_outpoint: Option<String>,
    /// Local votes are cast for `tip + vote_ahead`.
    pub vote_ahead: u32,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 1_024,
            maintenance_interval_secs: 60,
            spork_cache_path: None,
            masternode_outpoint: None,
            vote_ahead: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub sporks: SporkConfig,
    pub payments: PaymentConfig,
    pub validator: ValidatorConfig,
    pub sync: SyncConfig,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::Env {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

impl NodeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config: NodeConfig = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for containerized deployments.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = NodeConfig::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw) = std::env::var("BEE_SPORK_SIGNERS") {
            self.sporks.signers = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            self.sporks.backend = SporkBackendKind::MultiSigner;
        }
        if let Some(k) = env_parse("BEE_SPORK_MIN_SIGNATURES")? {
            self.sporks.min_signatures = k;
        }
        if let Ok(key) = std::env::var("BEE_SPORK_LEGACY_KEY") {
            self.sporks.legacy_key = Some(key.trim().to_string());
        }
        if let Some(workers) = env_parse("BEE_WORKERS")? {
            self.node.workers = workers;
        }
        if let Some(depth) = env_parse("BEE_QUEUE_DEPTH")? {
            self.node.queue_depth = depth;
        }
        if let Ok(path) = std::env::var("BEE_SPORK_CACHE") {
            self.node.spork_cache_path = Some(path);
        }
        if let Ok(outpoint) = std::env::var("BEE_MASTERNODE_OUTPOINT") {
            self.node.masternode_outpoint = Some(outpoint.trim().to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        match self.sporks.backend {
            SporkBackendKind::MultiSigner => {
                let n = self.sporks.signers.len();
                let k = self.sporks.min_signatures;
                if n == 0 {
                    return invalid("multi-signer sporks need at least one signer".to_string());
                }
                if k > n {
                    return invalid(format!("min_signatures {} exceeds {} signers", k, n));
                }
                if 2 * k <= n {
                    return invalid(format!(
                        "min_signatures {} is not a strict majority of {} signers",
                        k, n
                    ));
                }
                for key in &self.sporks.signers {
                    if bee_crypto::public_key_from_hex(key).is_err() {
                        return invalid(format!("signer key {} is not a valid public key", key));
                    }
                }
            }
            SporkBackendKind::SingleKey => match &self.sporks.legacy_key {
                Some(key) if bee_crypto::public_key_from_hex(key).is_ok() => {}
                Some(key) => {
                    return invalid(format!("legacy key {} is not a valid public key", key))
                }
                None => return invalid("single-key sporks need legacy_key".to_string()),
            },
        }

        if self.sporks.max_future_drift_secs < 0 {
            return invalid("max_future_drift_secs cannot be negative".to_string());
        }

        let p = &self.payments;
        if p.storage_coeff_bps == 0 || p.min_blocks_to_store == 0 {
            return invalid("storage window parameters must be non-zero".to_string());
        }
        if p.signatures_required == 0 || p.signatures_required > p.signatures_total {
            return invalid(format!(
                "signatures_required {} must be within 1..={}",
                p.signatures_required, p.signatures_total
            ));
        }
        if p.masternode_share_bps as i64 > crate::BPS_DENOMINATOR
            || p.evolution_share_bps as i64 > crate::BPS_DENOMINATOR
        {
            return invalid("reward shares cannot exceed 10000 bps".to_string());
        }
        if let AmountMatch::LowestOutputSkim { max_skim } = p.amount_match {
            if max_skim < 0 {
                return invalid("max_skim cannot be negative".to_string());
            }
        }

        if self.validator.min_payment_proto_v2 < self.validator.min_payment_proto_v1 {
            return invalid("min_payment_proto_v2 must not be below v1".to_string());
        }
        if self.sync.max_inv_size == 0 {
            return invalid("max_inv_size must be positive".to_string());
        }
        if self.node.workers == 0 || self.node.queue_depth == 0 {
            return invalid("workers and queue_depth must be positive".to_string());
        }
        if self.node.maintenance_interval_secs == 0 {
            return invalid("maintenance_interval_secs must be positive".to_string());
        }
        if let Some(outpoint) = &self.node.masternode_outpoint {
            if crate::Outpoint::parse(outpoint).is_none() {
                return invalid(format!("masternode_outpoint {} is not <txid hex>-<index>", outpoint));
            }
        }
        if self.node.vote_ahead == 0 || self.node.vote_ahead > self.payments.future_votes_limit {
            return invalid(format!(
                "vote_ahead {} must be within 1..={}",
                self.node.vote_ahead, self.payments.future_votes_limit
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bee_crypto::generate_keypair;

    fn signer_hex() -> String {
        hex::encode(&generate_keypair().public_key)
    }

    fn multi(n: usize, k: usize) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.sporks.signers = (0..n).map(|_| signer_hex()).collect();
        config.sporks.min_signatures = k;
        config
    }

    #[test]
    fn test_quorum_must_be_strict_majority() {
        assert!(multi(3, 2).validate().is_ok());
        assert!(multi(3, 3).validate().is_ok());
        assert!(multi(1, 1).validate().is_ok());
        assert!(matches!(multi(4, 2).validate(), Err(ConfigError::Invalid(_))));
        assert!(matches!(multi(3, 4).validate(), Err(ConfigError::Invalid(_))));
        assert!(multi(0, 0).validate().is_err());
    }

    #[test]
    fn test_single_key_needs_valid_key() {
        let mut config = NodeConfig::default();
        config.sporks.backend = SporkBackendKind::SingleKey;
        assert!(config.validate().is_err());
        config.sporks.legacy_key = Some("00ff".to_string());
        assert!(config.validate().is_err());
        config.sporks.legacy_key = Some(signer_hex());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_payment_bounds() {
        let mut config = multi(1, 1);
        config.payments.signatures_required = 11;
        assert!(config.validate().is_err());

        let mut config = multi(1, 1);
        config.payments.masternode_share_bps = 10_001;
        assert!(config.validate().is_err());

        let mut config = multi(1, 1);
        config.node.workers = 0;
        assert!(config.validate().is_err());

        let mut config = multi(1, 1);
        config.node.masternode_outpoint = Some("not-an-outpoint".to_string());
        assert!(config.validate().is_err());
        config.node.masternode_outpoint = Some(format!("{}-1", "ab".repeat(32)));
        assert!(config.validate().is_ok());
        config.node.vote_ahead = 21;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");

        let mut config = multi(3, 2);
        config.payments.amount_match = AmountMatch::Exact;
        config.node.spork_cache_path = Some("/var/lib/bee/sporks".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = NodeConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.sporks, config.sporks);
        assert_eq!(loaded.payments, config.payments);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[payments]\nmin_blocks_to_store = 50\n\n[payments.amount_match]\npolicy = \"lowest_output_skim\"\nmax_skim = 2500\n",
        )
        .unwrap();

        let loaded = NodeConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.payments.min_blocks_to_store, 50);
        assert_eq!(loaded.payments.signatures_required, 6);
        assert_eq!(
            loaded.payments.amount_match,
            AmountMatch::LowestOutputSkim { max_skim: 2500 }
        );
        assert_eq!(loaded.sync.max_inv_size, 50_000);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[payments\nnot toml").unwrap();
        assert!(matches!(
            NodeConfig::load_from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
