// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - Spork & Masternode Payment Node
//
// Standalone runtime around in-memory chain and masternode collaborators.
// Inbound messages are read from stdin as `<peer id> <protocol> <hex payload>`
// lines and fed through the worker pool; peer actions are logged. The first
// line from a peer counts as its connection.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bee_consensus::spork::{default_value, known_spork_ids, spork_name_by_id};
use bee_core::config::NodeConfig;
use bee_core::interfaces::{FlagSyncStatus, MemoryChain, MemoryMasternodes};
use bee_core::Outpoint;
use bee_crypto::{generate_keypair, public_key_to_address};
use bee_network::{Envelope, Inventory, NetMessage, PeerId, PeerInfo, PeerSink};
use bee_node::{BeeNode, Collaborators, NodeError};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "beenode")]
#[command(about = "Spork registry and masternode payment node", long_about = None)]
#[command(version)]
struct Cli {
    /// Node configuration file (TOML). Without one, defaults plus BEE_* overrides.
    #[arg(short, long, env = "BEE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node, reading inbound messages from stdin
    Run {
        /// Treat the chain, masternode list and winners list as synced
        #[arg(long)]
        synced: bool,
    },
    /// Validate the configuration and print a summary
    CheckConfig,
    /// Write the default configuration to a file
    InitConfig {
        #[arg(short, long)]
        out: PathBuf,
    },
    /// List known sporks with their ids and defaults
    Sporks,
    /// Generate a signer key pair
    Keygen,
}

/// Peer transport stand-in: every action is logged under the "net" target.
struct LoggingSink;

impl PeerSink for LoggingSink {
    fn push_message(&self, peer: PeerId, msg: NetMessage) {
        info!(target: "net", "-> peer={} {}", peer, msg.command());
    }

    fn relay_inventory(&self, inv: Inventory, min_proto: u32) {
        info!(target: "net", "relay {} (min proto {})", inv, min_proto);
    }

    fn misbehaving(&self, peer: PeerId, score: u32, reason: &str) {
        warn!(target: "net", "peer={} misbehaving +{}: {}", peer, score, reason);
    }

    fn ask_for_masternode(&self, peer: PeerId, outpoint: Outpoint) {
        info!(target: "net", "ask peer={} for masternode {}", peer, outpoint);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<NodeConfig, NodeError> {
    let config = match path {
        Some(path) => NodeConfig::load_from_file(path)?,
        None => NodeConfig::load_from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn secret_from_env(name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, NodeError> {
    match std::env::var(name) {
        Ok(raw) => {
            let raw = Zeroizing::new(raw);
            let bytes = hex::decode(raw.trim()).map_err(|_| NodeError::Crypto(bee_crypto::CryptoError::InvalidKey))?;
            Ok(Some(Zeroizing::new(bytes)))
        }
        Err(_) => Ok(None),
    }
}

fn parse_line(line: &str) -> Option<Envelope> {
    let mut parts = line.split_whitespace();
    let id: PeerId = parts.next()?.parse().ok()?;
    let proto: u32 = parts.next()?.parse().ok()?;
    let payload = hex::decode(parts.next()?).ok()?;
    Some(Envelope::new(PeerInfo::new(id, proto, format!("stdin-{}", id)), payload))
}

async fn run(config: NodeConfig, synced: bool) -> Result<(), NodeError> {
    let collab = Collaborators {
        chain: Arc::new(MemoryChain::with_height(0)),
        masternodes: Arc::new(MemoryMasternodes::new()),
        status: Arc::new(FlagSyncStatus::new(synced)),
        sink: Arc::new(LoggingSink),
    };
    let outpoint = config.node.masternode_outpoint.as_deref().and_then(Outpoint::parse);
    let mut node = BeeNode::new(config, collab)?;

    if let Some(secret) = secret_from_env("BEE_SPORK_SECRET")? {
        node.set_spork_key(&secret)?;
    }
    if let (Some(outpoint), Some(secret)) = (outpoint, secret_from_env("BEE_MASTERNODE_SECRET")?) {
        node.set_local_masternode(outpoint, secret)?;
    }

    let node = Arc::new(node);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = node.spawn_maintenance(shutdown_rx);
    let pool = node.spawn_workers();

    info!("beenode running; reading messages from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut connected = HashSet::new();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match parse_line(&line) {
                    Some(envelope) => {
                        if connected.insert(envelope.peer.id) {
                            node.on_peer_connected(&envelope.peer);
                        }
                        if !pool.submit(envelope).await {
                            break;
                        }
                    }
                    None => warn!(target: "net", "unreadable input line: {}", line),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    pool.shutdown().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = maintenance.await {
        warn!("maintenance task ended abnormally: {}", e);
    }
    info!("final metrics:\n{}", node.metrics().export()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { synced } => {
            let config = load_config(cli.config.as_ref())?;
            run(config, synced).await?;
        }
        Commands::CheckConfig => {
            let config = load_config(cli.config.as_ref())?;
            println!("spork backend:      {:?}", config.sporks.backend);
            println!("trusted signers:    {}", config.sporks.signers.len());
            println!("min signatures:     {}", config.sporks.min_signatures);
            println!("storage minimum:    {} blocks", config.payments.min_blocks_to_store);
            println!("workers/queue:      {}/{}", config.node.workers, config.node.queue_depth);
            println!(
                "spork cache:        {}",
                config.node.spork_cache_path.as_deref().unwrap_or("disabled")
            );
        }
        Commands::InitConfig { out } => {
            NodeConfig::default().save_to_file(&out)?;
            println!("wrote {}", out.display());
        }
        Commands::Sporks => {
            for id in known_spork_ids() {
                println!(
                    "{:<6} {:<42} {}",
                    id,
                    spork_name_by_id(id),
                    default_value(id).unwrap_or_default()
                );
            }
        }
        Commands::Keygen => {
            let keypair = generate_keypair();
            let secret = Zeroizing::new(hex::encode(&keypair.secret_key));
            println!("public key: {}", hex::encode(&keypair.public_key));
            println!("address:    {}", public_key_to_address(&keypair.public_key));
            println!("secret key: {}", secret.as_str());
        }
    }
    Ok(())
}
