use bee_consensus::{CacheError, SporkError};
use bee_core::config::ConfigError;
use bee_crypto::CryptoError;
use thiserror::Error;

/// Startup and maintenance failures of the node runtime. Message handling
/// never produces one of these; it answers with a `HandleOutcome` instead.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("spork registry: {0}")]
    Spork(#[from] SporkError),
    #[error("spork cache: {0}")]
    Cache(#[from] CacheError),
    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("key material: {0}")]
    Crypto(#[from] CryptoError),
    #[error("masternode {0} is not in the masternode list")]
    UnknownMasternode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
