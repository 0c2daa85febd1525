//! Protocol Node
//!
//! Entry point: opens the databases, restores the last checkpoint and
//! processes host blocks. Without a host node attached, blocks are replayed
//! from an export file (`--import`), which exercises the full pipeline:
//! payload extraction, interpretation, consensus hashing and checkpointing.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info};

use lib_omni::{
    ConsensusParams, CoreContext, CoreOptions, HostBlock, HostEvent, MemoryChain, Network,
};
use lib_store::Store;

/// Parsed command line.
struct CliArgs {
    data_dir: PathBuf,
    network: Network,
    import: Option<PathBuf>,
    print_consensus_hash: bool,
    core_args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_cli_args()?;

    let options = CoreOptions::defaults(args.network).apply_args(&args.core_args);
    let params = ConsensusParams::for_network(args.network);

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("creating data directory {}", args.data_dir.display()))?;
    let store = Store::open(args.data_dir.join("db"), options.start_clean)
        .context("opening the keyed store")?;

    let mut core = CoreContext::open(&store, &args.data_dir.join("persist"), params, options)
        .context("opening the protocol databases")?;

    match core.restore_from_disk() {
        Ok(Some(height)) => info!(height, "resuming from checkpoint"),
        Ok(None) => info!("starting from genesis"),
        Err(e) => {
            error!(error = %e, "state restore failed, rescanning");
            // restore already reset to a clean slate
        }
    }

    // stop at the next block boundary on ctrl-c
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    if let Some(path) = &args.import {
        if let Err(e) = import_blocks(&mut core, path, &shutdown) {
            // a fatal inconsistency invalidates the persisted state; remove
            // it so the next start is forced to rescan
            if !core.options.override_forced_shutdown {
                error!(error = %e, "fatal error, removing persisted state");
                let _ = std::fs::remove_dir_all(args.data_dir.join("persist"));
            }
            return Err(e);
        }
    } else {
        info!("no host attached and no --import file; nothing to do");
    }

    if args.print_consensus_hash {
        let hash = core
            .current_consensus_hash()
            .context("computing the consensus hash")?;
        println!("{}", hex::encode(hash));
    }

    if let Err(e) = core.persist_on_shutdown() {
        error!(error = %e, "failed to persist state on shutdown");
    }
    store.flush().context("flushing the keyed store")?;
    Ok(())
}

/// Replay a block-export file through the pipeline.
fn import_blocks(
    core: &mut CoreContext,
    path: &PathBuf,
    shutdown: &Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading block file {}", path.display()))?;
    let blocks: Vec<HostBlock> =
        bincode::deserialize(&bytes).context("decoding the block file")?;
    if blocks.is_empty() {
        bail!("block file {} contains no blocks", path.display());
    }
    info!(
        blocks = blocks.len(),
        first = blocks.first().map(|b| b.height).unwrap_or(0),
        last = blocks.last().map(|b| b.height).unwrap_or(0),
        "importing blocks"
    );

    let mut chain = MemoryChain::new();
    for block in &blocks {
        chain.push_block(block.clone());
    }

    for block in &blocks {
        if shutdown.load(Ordering::SeqCst) {
            core.request_shutdown();
        }
        if core.shutdown_requested() {
            info!(height = block.height, "import stopped");
            break;
        }
        if let Some(tip) = core.tip() {
            if block.height <= tip {
                continue; // already processed via checkpoint restore
            }
        }
        core.handle_event(HostEvent::BlockConnected(block.clone()), &chain)
            .with_context(|| format!("processing block {}", block.height))?;
    }

    info!(tip = core.tip().unwrap_or(0), "import finished");
    Ok(())
}

/// Parse command-line arguments; options the core recognizes pass through
/// verbatim.
fn parse_cli_args() -> anyhow::Result<CliArgs> {
    let args: Vec<String> = env::args().collect();

    let mut data_dir = dirs::home_dir()
        .map(|d| d.join(".omnid"))
        .unwrap_or_else(|| PathBuf::from(".omnid"));
    let mut network = Network::Main;
    let mut import = None;
    let mut print_consensus_hash = false;
    let mut core_args = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--datadir" | "-d" => {
                if i + 1 < args.len() {
                    data_dir = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    bail!("--datadir requires a path");
                }
            }
            "--testnet" => {
                network = Network::Test;
                i += 1;
            }
            "--regtest" => {
                network = Network::Regtest;
                i += 1;
            }
            "--import" => {
                if i + 1 < args.len() {
                    import = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    bail!("--import requires a file");
                }
            }
            "--consensushash" => {
                print_consensus_hash = true;
                i += 1;
            }
            other if other.starts_with('-') => {
                core_args.push(other.to_string());
                i += 1;
            }
            other => {
                bail!("unrecognized argument: {}", other);
            }
        }
    }

    Ok(CliArgs {
        data_dir,
        network,
        import,
        print_consensus_hash,
        core_args,
    })
}
