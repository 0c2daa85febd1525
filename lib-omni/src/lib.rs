//! Meta-Token Protocol Core
//!
//! A meta-token protocol layered on a host UTXO chain: scans confirmed
//! blocks for embedded payloads, interprets them deterministically and
//! maintains reproducible off-chain state — per-address balances, the
//! smart-property registry, exchange order books, non-fungible token
//! ranges, crowdsales and fee distribution — with consensus hashing for
//! cross-node verification and checkpoint-based reorganization handling.
//!
//! The host node is out of scope: it is modelled by the [`host`] traits and
//! an event stream consumed by the [`pipeline`].

pub mod activation;
pub mod codec;
pub mod config;
pub mod consensus_hash;
pub mod context;
pub mod crowdsale;
pub mod dbs;
pub mod dex;
pub mod fees;
pub mod freeze;
pub mod host;
pub mod interpreter;
pub mod metadex;
pub mod nft;
pub mod parser;
pub mod payload;
pub mod pipeline;
pub mod reason;
pub mod registry;
mod reorg;
pub mod rules;
pub mod seedblocks;
pub mod snapshot;
pub mod sto;
pub mod tally;
pub mod types;

// Re-export the types most callers need
pub use activation::{ActivationState, Alert, PendingActivation};
pub use codec::{EncodingClass, ExtractedPayload, MarkerCache};
pub use config::{CoreOptions, DebugCategory};
pub use context::{CoreContext, CoreError, CoreResult, OmniDbs, OmniState};
pub use crowdsale::{calculate_fundraiser, Crowdsale, CrowdsaleMap};
pub use dex::{AcceptedOffer, DexState, SellOffer};
pub use fees::{distribution_threshold, Distribution, FeeCache, FeeHistory, FEE_THRESHOLD};
pub use freeze::FreezeState;
pub use host::{
    ChainView, Coin, CoinView, HostBlock, HostEvent, HostTransaction, MemoryChain, OutPoint,
    Script, TxInput, TxOutput,
};
pub use interpreter::{Outcome, ValidOutcome};
pub use metadex::{MetaDexBook, Order};
pub use nft::{NftDataKind, NftStore};
pub use parser::{parse, MetaTx, ParseError};
pub use payload::{Payload, PayloadError, PKT_V0, PKT_V1};
pub use reason::Reject;
pub use registry::{PropertyEntry, PropertyRegistry};
pub use rules::{ConsensusParams, Network};
pub use snapshot::{Snapshot, SnapshotStore};
pub use tally::{TallyMap, TokenTally};
pub use types::{
    Address, Amount, BlockHash, BlockHeight, Bucket, Ecosystem, PropertyId, PropertyKind,
    TransactionType, TxHash,
};
