// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - NETWORK MODULE
//
// Gossip plumbing for sporks and masternode payment votes.
// - messages: wire payloads and inventory
// - peer: outbound sink, misbehavior, per-session request tracking
// - handler: admission of inbound messages
// - sync: payment-vote sync and backfill
// - worker: bounded tokio worker pool feeding the handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod handler;
pub mod messages;
pub mod peer;
pub mod sync;
pub mod worker;

pub use handler::{HandleOutcome, MessageHandler, Subsystems};
pub use messages::{InvKind, Inventory, NetMessage, WireError};
pub use peer::{MemorySink, PeerId, PeerInfo, PeerSink};
pub use sync::SyncCoordinator;
pub use worker::{Envelope, Observer, WorkerPool};
