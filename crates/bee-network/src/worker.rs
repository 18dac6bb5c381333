// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - MESSAGE WORKERS
//
// Bounded queue of raw inbound payloads drained by a fixed set of tokio
// tasks. Each payload is decoded and handled to completion inside one
// worker; handling never awaits, so no ledger lock is held across a
// suspension point.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::handler::{HandleOutcome, MessageHandler};
use crate::messages::NetMessage;
use crate::peer::{apply_action, PeerInfo, PeerSink};
use bee_consensus::validator::PeerAction;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Penalty for a payload that does not decode.
pub const PENALTY_UNDECODABLE: u32 = 10;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub peer: PeerInfo,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(peer: PeerInfo, payload: Vec<u8>) -> Self {
        Envelope { peer, payload }
    }
}

/// Called after every message with its command (`"?"` when undecodable).
pub type Observer = Arc<dyn Fn(&PeerInfo, &str, &HandleOutcome) + Send + Sync>;

pub struct WorkerPool {
    tx: mpsc::Sender<Envelope>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        handler: Arc<MessageHandler>,
        sink: Arc<dyn PeerSink>,
        workers: usize,
        queue_depth: usize,
        observer: Option<Observer>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let handler = Arc::clone(&handler);
                let sink = Arc::clone(&sink);
                let observer = observer.clone();
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(envelope) = next else {
                            break;
                        };
                        process(&handler, sink.as_ref(), envelope, observer.as_ref());
                    }
                    debug!(target: "net", "message worker {} stopped", id);
                })
            })
            .collect::<Vec<_>>();

        info!(target: "net", "started {} message workers, queue depth {}", workers.len(), queue_depth);
        WorkerPool { tx, workers }
    }

    pub fn sender(&self) -> mpsc::Sender<Envelope> {
        self.tx.clone()
    }

    /// Wait for queue space. Returns false once the pool is shut down.
    pub async fn submit(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).await.is_ok()
    }

    /// Enqueue without waiting; a full queue drops the message.
    pub fn try_submit(&self, envelope: Envelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(env)) => {
                warn!(target: "net", "message queue full, dropping message from peer={}", env.peer.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Close the queue and wait for queued messages to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(target: "net", "message worker exited with error: {}", e);
            }
        }
    }
}

fn process(handler: &MessageHandler, sink: &dyn PeerSink, envelope: Envelope, observer: Option<&Observer>) {
    let Envelope { peer, payload } = envelope;
    let (command, outcome) = match NetMessage::decode(&payload) {
        Ok(msg) => {
            let command = msg.command();
            (command, handler.handle(&peer, msg))
        }
        Err(e) => {
            let reason = format!("undecodable message: {}", e);
            let action = PeerAction::penalize(PENALTY_UNDECODABLE);
            apply_action(sink, peer.id, &action, &reason);
            ("?", HandleOutcome::Rejected { reason, action })
        }
    };
    if let Some(observe) = observer {
        observe(&peer, command, &outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Subsystems;
    use crate::peer::MemorySink;
    use bee_consensus::payments::PaymentLedger;
    use bee_consensus::registry::{SingleKeySporks, SporkRegistry};
    use bee_consensus::validator::VoteValidator;
    use bee_core::config::{PaymentConfig, SyncConfig, ValidatorConfig};
    use bee_core::interfaces::{FlagSyncStatus, MemoryChain, MemoryMasternodes};
    use bee_crypto::generate_keypair;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(sink: Arc<MemorySink>, observer: Option<Observer>) -> WorkerPool {
        let handler = MessageHandler::new(
            Subsystems {
                sporks: Arc::new(SporkRegistry::new(
                    Box::new(SingleKeySporks::new(generate_keypair().public_key.clone())),
                    7_200,
                )),
                ledger: Arc::new(PaymentLedger::new(PaymentConfig::default())),
                validator: VoteValidator::new(&ValidatorConfig::default()),
                masternodes: Arc::new(MemoryMasternodes::new()),
                chain: Arc::new(MemoryChain::with_height(10)),
                status: Arc::new(FlagSyncStatus::new(true)),
                sink: sink.clone(),
            },
            &SyncConfig::default(),
        );
        WorkerPool::spawn(Arc::new(handler), sink, 2, 8, observer)
    }

    #[tokio::test]
    async fn test_messages_drained_before_shutdown() {
        let sink = Arc::new(MemorySink::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let observer: Observer = Arc::new(move |_: &PeerInfo, command: &str, _: &HandleOutcome| {
            assert_eq!(command, "getsporks");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let pool = pool(sink, Some(observer));

        for id in 0..5 {
            let envelope = Envelope::new(PeerInfo::new(id, 70_213, "peer"), NetMessage::GetSporks.encode().unwrap());
            assert!(pool.submit(envelope).await);
        }
        pool.shutdown().await;
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_undecodable_payload_penalized() {
        let sink = Arc::new(MemorySink::new());
        let pool = pool(sink.clone(), None);
        assert!(pool.submit(Envelope::new(PeerInfo::new(3, 70_213, "peer"), vec![0xff; 9])).await);
        pool.shutdown().await;
        assert_eq!(sink.penalty_of(3), PENALTY_UNDECODABLE);
    }
}
