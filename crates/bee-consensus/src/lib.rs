// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - CONSENSUS PARAMETERS
//
// Network-wide switches and masternode payee agreement.
// - spork / registry: signed runtime parameters, single key or k-of-n quorum
// - payments / selector: per-height payee votes and coinbase checks
// - validator: admission checks and peer penalties
// - evolution: developer-fund rotation carried in spork payloads
// - cache: optional sled snapshot of admitted sporks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod cache;
pub mod evolution;
pub mod payments;
pub mod registry;
pub mod selector;
pub mod spork;
pub mod validator;

pub use cache::{CacheError, SporkCache, SporkSnapshot};
pub use evolution::EvolutionSchedule;
pub use payments::{BlockPayees, LedgerStats, PayeeSelectionMode, PaymentLedger, PaymentVote, VoteError};
pub use registry::{
    MultiSignerSporks, SingleKeySporks, SporkAction, SporkAdmission, SporkBackend, SporkError, SporkRegistry,
};
pub use spork::{SporkId, SporkMessage};
pub use validator::{PeerAction, VoteValidator};
