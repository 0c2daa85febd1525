//! Append-Only Record Stores
//!
//! Per-transaction records written while processing blocks: the tx-list
//! (outcome of every meta-transaction), the trade-list (orders and matched
//! trades) and the STO-list (send-to-owners receivers). All keys embed the
//! block complement-encoded so per-block enumeration and reorg deletion are
//! prefix scans.

pub mod stolist;
pub mod tradelist;
pub mod txlist;

pub use stolist::StoList;
pub use tradelist::TradeList;
pub use txlist::{TxList, TxRecord};
