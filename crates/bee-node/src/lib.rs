// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - NODE CRATE
//
// Top-level runtime: wires sporks, payment ledger and message handling to
// the injected chain, masternode list, sync state and peer transport.
// - block_payments: coinbase checks and filling for block validation/mining
// - metrics: prometheus registry
// - node: subsystem ownership, local voting, maintenance loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod block_payments;
pub mod error;
pub mod metrics;
pub mod node;

pub use block_payments::{BlockPayments, RewardSplit};
pub use error::NodeError;
pub use metrics::BeeMetrics;
pub use node::{BeeNode, Collaborators, MaintenanceReport};
