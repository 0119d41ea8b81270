//! Preconfirmation node
//!
//! Main entry point for the based-rollup preconfirmation node.
//! Supports publisher mode (runs the gossip server, accepts commitments over
//! RPC) and follower mode (subscribes to a publisher and verifies).
//! The tentative chain is persisted to disk and survives restarts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use l1_bridge::{
    CollateralLedger, EnforcementContract, InMemoryAnchors, InMemoryBeacon, InProcessBridge,
    PenaltyConfig, RelayConfig, SettledStore, SlashingRelay,
};
use l2_execution::{DeterministicEngine, PersistentStore, TrackerPersistence};
use preconf_consensus::{
    ChainDriver, ChainStateTracker, CommitmentVerifier, EvidenceLog, FallbackPolicy, FaultMonitor,
    GossipClient, GossipServer, Lookahead, Overseer, OverseerConfig, ReorgReconciler, RetryPolicy,
    SlotTiming, VerifierConfig, WhitelistEntry,
};
use protocol_types::{Address, ParentState, RawTxList};
use rpc_server::{HttpRpcServer, RpcContext};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::NodeConfig;

/// Node mode
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Publisher mode - accepts commitments over RPC and fans them out
    Publisher,
    /// Follower mode - subscribes to a publisher and verifies
    Follower,
}

/// Based-rollup preconfirmation node
#[derive(Parser, Debug)]
#[command(name = "preconf-node")]
#[command(about = "Preconfirmation node for a based rollup", long_about = None)]
struct Args {
    /// Node mode (publisher or follower)
    #[arg(long, value_enum, default_value = "follower")]
    mode: Mode,

    /// HTTP RPC bind address
    #[arg(long, default_value = "127.0.0.1:8547")]
    rpc_addr: String,

    /// Gossip bind address (publisher mode)
    #[arg(long, default_value = "0.0.0.0:9200")]
    gossip_addr: String,

    /// Publisher address to connect to (follower mode)
    #[arg(long, default_value = "127.0.0.1:9200")]
    publisher_addr: String,

    /// Canonical preconf-slasher address, hex
    #[arg(long)]
    slasher_address: Option<String>,

    /// Max commitment timestamp drift in seconds
    #[arg(long, default_value = "12")]
    max_timestamp_drift: u64,

    /// L2 genesis timestamp (unix seconds)
    #[arg(long, default_value = "0")]
    genesis_timestamp: u64,

    /// Submission window length in seconds
    #[arg(long, default_value = "12")]
    slot_duration: u64,

    /// Slots per epoch
    #[arg(long, default_value = "32")]
    slots_per_epoch: u64,

    /// Fallback whitelist operators, comma-separated hex addresses
    #[arg(long, value_delimiter = ',')]
    whitelist: Vec<String>,

    /// Data directory for persistent state
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Save state every N seconds (0 = only on shutdown)
    #[arg(long, default_value = "300")]
    save_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_address(hex_str: &str) -> Result<Address> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("address must be 32 bytes"))?;
    Ok(Address(bytes))
}

fn build_config(args: &Args) -> Result<NodeConfig> {
    let mut config = NodeConfig {
        rpc_addr: args.rpc_addr.clone(),
        gossip_addr: args.gossip_addr.clone(),
        publisher_addr: args.publisher_addr.clone(),
        max_timestamp_drift: args.max_timestamp_drift,
        genesis_timestamp: args.genesis_timestamp,
        slot_duration: args.slot_duration,
        slots_per_epoch: args.slots_per_epoch,
        ..Default::default()
    };
    if let Some(slasher) = &args.slasher_address {
        config.slasher_address = parse_address(slasher)?;
    }
    config.whitelist = args
        .whitelist
        .iter()
        .map(|s| parse_address(s))
        .collect::<Result<_>>()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = build_config(&args)?;
    run_node(args, config).await
}

async fn run_node(args: Args, config: NodeConfig) -> Result<()> {
    tracing::info!("Starting preconfirmation node - {:?} mode", args.mode);
    tracing::info!("  HTTP RPC: {}", config.rpc_addr);
    tracing::info!("  Data directory: {:?}", args.data_dir);
    tracing::info!("  Slasher address: {}", config.slasher_address);
    tracing::info!("  Timestamp drift bound: {}s", config.max_timestamp_drift);

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(&args.data_dir)?;

    // Open persistent store and resume from the saved head if present
    let store = Arc::new(PersistentStore::open(&args.data_dir)?);
    let tracker = match ChainStateTracker::load_from_disk(&store)? {
        Some(tracker) => Arc::new(tracker),
        None => Arc::new(ChainStateTracker::new(ParentState::genesis(
            config.genesis_timestamp,
            config.genesis_gas_limit,
        ))),
    };
    tracing::info!("Tentative head at block {}", tracker.head_block_number());

    // Lookahead schedule with whitelist fallback
    let timing = SlotTiming {
        genesis_timestamp: config.genesis_timestamp,
        slot_duration: config.slot_duration,
        slots_per_epoch: config.slots_per_epoch,
    };
    let whitelist = config
        .whitelist
        .iter()
        .map(|address| WhitelistEntry {
            address: *address,
            registration_root: address.0,
        })
        .collect();
    let lookahead = Arc::new(Lookahead::new(
        timing,
        FallbackPolicy::WhitelistRotation,
        whitelist,
    ));

    // L1 fact providers; fed by the L1 watcher in a real deployment
    let anchors = Arc::new(InMemoryAnchors::default());
    let beacon = Arc::new(InMemoryBeacon::default());
    let settled = Arc::new(SettledStore::default());

    // Verification and reconciliation share one engine and one queue
    let engine = Arc::new(DeterministicEngine::default());
    let verifier = CommitmentVerifier::new(
        VerifierConfig {
            slasher_address: config.slasher_address,
            max_timestamp_drift: config.max_timestamp_drift,
        },
        lookahead.clone(),
        engine.clone(),
    );
    let reconciler = ReorgReconciler::new(engine, anchors.clone(), RetryPolicy::default());
    let driver = ChainDriver::new(tracker.clone(), verifier, reconciler, anchors);
    let commitment_sender = driver.commitment_sender();
    let mut head_rx = driver.subscribe_head();

    // Slashing pipeline: monitor -> relay -> enforcement
    let evidence_log = Arc::new(EvidenceLog::default());
    let (evidence_tx, evidence_rx) = tokio::sync::mpsc::channel(256);
    let monitor = FaultMonitor::new(
        tracker.clone(),
        settled,
        beacon,
        evidence_log.clone(),
        evidence_tx,
        Duration::from_secs(config.slot_duration.max(1)),
    );
    tokio::spawn(monitor.run());

    let ledger = Arc::new(CollateralLedger::default());
    let contract = Arc::new(EnforcementContract::new(
        config.slasher_address,
        PenaltyConfig::default(),
        ledger,
    ));
    let relay = SlashingRelay::new(
        Arc::new(InProcessBridge::new(contract)),
        RelayConfig {
            sender: config.slasher_address,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_attempts: None,
        },
    );
    tokio::spawn(relay.run(evidence_rx));

    // Fair-exchange overseer; thresholds stay disabled until configured
    let overseer = Arc::new(Overseer::new(OverseerConfig::default(), lookahead.clone()));
    {
        let overseer = overseer.clone();
        let tick = config.slot_duration.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(tick));
            loop {
                ticker.tick().await;
                overseer.tick(preconf_consensus::unix_now());
            }
        });
    }

    // Gossip wiring per mode
    match args.mode {
        Mode::Publisher => {
            let gossip = Arc::new(GossipServer::new());
            gossip.start(&config.gossip_addr).await?;

            // Fan accepted commitments out to followers
            let gossip_out = gossip.clone();
            let tracker_out = tracker.clone();
            tokio::spawn(async move {
                while let Ok(head) = head_rx.recv().await {
                    if let Some(block) = tracker_out.applied_block(head.header.number) {
                        if block.post_state.preconfirmation_hash == head.preconfirmation_hash {
                            gossip_out.broadcast_commitment(&block.commitment, &block.tx_list);
                        } else if let Some(eop) = tracker_out.eop_commitment(head.header.number) {
                            // The head advanced on a bare handover signal
                            gossip_out.broadcast_commitment(&eop, &RawTxList::default());
                        }
                    }
                    gossip_out.broadcast_heartbeat(head.header.number);
                }
            });
        }
        Mode::Follower => {
            let mut client = GossipClient::connect(&config.publisher_addr).await?;
            let sender = commitment_sender.clone();
            tokio::spawn(async move {
                while let Some((commitment, tx_list)) = client.recv_commitment().await {
                    if !sender.send(commitment, tx_list).await {
                        break;
                    }
                }
                tracing::warn!("Gossip intake stopped");
            });
        }
    }

    // Periodic saves
    if args.save_interval > 0 {
        let tracker_save = tracker.clone();
        let store_save = store.clone();
        let interval = args.save_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval));
            loop {
                ticker.tick().await;
                if let Err(e) = tracker_save.save_to_disk(&store_save) {
                    tracing::error!("Periodic save failed: {}", e);
                }
            }
        });
    }

    // HTTP RPC
    let rpc_context = Arc::new(RpcContext {
        tracker: tracker.clone(),
        lookahead,
        evidence_log,
        commitment_sender,
    });
    let rpc_addr = config.rpc_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = HttpRpcServer::new(rpc_context).run(&rpc_addr).await {
            tracing::error!("RPC server failed: {}", e);
        }
    });

    // The driver owns the application queue until shutdown
    tokio::spawn(driver.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down, saving state");
    tracker.save_to_disk(&store)?;

    Ok(())
}
