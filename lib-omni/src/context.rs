//! Core Context
//!
//! All protocol state threaded through the entry points: the in-memory
//! state, the persistent databases, the consensus parameters and the
//! operator options. No global mutable state exists anywhere in the crate.

use thiserror::Error;

use lib_store::{Store, StoreError};

use crate::activation::ActivationState;
use crate::codec::MarkerCache;
use crate::config::CoreOptions;
use crate::crowdsale::CrowdsaleMap;
use crate::dbs::{StoList, TradeList, TxList};
use crate::dex::DexState;
use crate::fees::{FeeCache, FeeError, FeeHistory};
use crate::freeze::FreezeState;
use crate::metadex::MetaDexBook;
use crate::nft::{NftError, NftStore};
use crate::registry::{PropertyRegistry, RegistryError};
use crate::rules::ConsensusParams;
use crate::snapshot::{SnapshotError, SnapshotStore};
use crate::tally::TallyMap;
use crate::types::{Amount, BlockHash, BlockHeight};

/// Fatal core error: the node must stop (and, unless overridden, wipe its
/// persisted state so the next start rescans).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Nft(#[from] NftError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("state inconsistency: {0}")]
    Inconsistency(String),

    #[error("consensus hash mismatch against checkpoint at block {height}")]
    CheckpointMismatch { height: BlockHeight },
}

pub type CoreResult<T> = Result<T, CoreError>;

/// The in-memory portion of the state; exactly what checkpoint snapshots
/// serialize.
#[derive(Debug, Default)]
pub struct OmniState {
    pub tally: TallyMap,
    pub dex: DexState,
    pub metadex: MetaDexBook,
    pub crowdsales: CrowdsaleMap,
    pub freeze: FreezeState,
    pub activations: ActivationState,
    /// Developer reward credited to the exodus address so far.
    pub exodus_reward_paid: Amount,
}

/// Handles to the persistent databases.
pub struct OmniDbs {
    pub registry: PropertyRegistry,
    pub nft: NftStore,
    pub txlist: TxList,
    pub tradelist: TradeList,
    pub stolist: StoList,
    pub fee_cache: FeeCache,
    pub fee_history: FeeHistory,
}

/// Everything the pipeline needs, owned in one place.
pub struct CoreContext {
    pub params: ConsensusParams,
    pub options: CoreOptions,
    pub state: OmniState,
    pub dbs: OmniDbs,
    pub snapshots: SnapshotStore,
    pub marker_cache: MarkerCache,

    /// Last fully processed block.
    pub(crate) tip: Option<BlockHeight>,
    /// Lowest height seen in the current disconnect sequence.
    pub(crate) pending_disconnect: Option<BlockHeight>,
    pub(crate) shutdown_requested: bool,
    pub(crate) last_block_hash: BlockHash,
    /// Host is still in initial block download (changes persistence cadence).
    pub(crate) initial_sync: bool,
    /// Progress-reporter state for long replays.
    pub(crate) last_progress: Option<std::time::Instant>,
    pub(crate) txs_scanned: u64,
    pub(crate) meta_txs_found: u64,
}

impl CoreContext {
    /// Open all databases and assemble the context. `store` is the keyed
    /// store backing every table; `snapshot_dir` holds the checkpoint files.
    pub fn open(
        store: &Store,
        snapshot_dir: &std::path::Path,
        params: ConsensusParams,
        options: CoreOptions,
    ) -> CoreResult<Self> {
        if options.start_clean {
            store.clear_all()?;
        }
        let snapshots = SnapshotStore::open(snapshot_dir)?;
        if options.start_clean {
            snapshots.clear()?;
        }

        let registry =
            PropertyRegistry::open(store.table("properties")?, params.exodus_address.clone())?;
        let dbs = OmniDbs {
            registry,
            nft: NftStore::open(store.table("nft")?),
            txlist: TxList::open(store.table("txlist")?),
            tradelist: TradeList::open(store.table("tradelist")?),
            stolist: StoList::open(store.table("stolist")?),
            fee_cache: FeeCache::open(store.table("feecache")?),
            fee_history: FeeHistory::open(store.table("feehistory")?),
        };

        let mut state = OmniState::default();
        state.activations = ActivationState::with_defaults(&params);

        Ok(CoreContext {
            params,
            options,
            state,
            dbs,
            snapshots,
            marker_cache: MarkerCache::new(),
            tip: None,
            pending_disconnect: None,
            shutdown_requested: false,
            last_block_hash: BlockHash::default(),
            initial_sync: false,
            last_progress: None,
            txs_scanned: 0,
            meta_txs_found: 0,
        })
    }

    /// Tell the pipeline whether the host is in initial block download.
    pub fn set_initial_sync(&mut self, initial_sync: bool) {
        self.initial_sync = initial_sync;
    }

    /// Last fully processed block height.
    pub fn tip(&self) -> Option<BlockHeight> {
        self.tip
    }

    /// Ask the pipeline to stop at the next transaction boundary.
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Total tokens of a property across every address and bucket.
    pub fn total_tokens(&self, property: crate::types::PropertyId) -> Amount {
        self.state.tally.total(property)
    }
}
