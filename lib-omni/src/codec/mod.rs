//! Payload Location and Extraction
//!
//! The classifier picks the encoding class of a host transaction: Class C
//! (data-only output with the protocol marker) is preferred; Class B (bare
//! multisig packets) is the fallback; everything else is not a protocol
//! transaction.
//!
//! The marker cache tracks mempool transactions whose marker was detected,
//! so pending protocol transactions can be surfaced before confirmation.

pub mod class_b;
pub mod class_c;

use std::collections::HashSet;

use crate::host::{HostTransaction, Script};
use crate::types::{Address, TxHash};

/// How a payload was embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingClass {
    ClassB,
    ClassC,
}

/// A located payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPayload {
    pub class: EncodingClass,
    pub payload: Vec<u8>,
    /// Index of the (first) payload-carrying output.
    pub payload_output: u32,
}

/// Extract the payload from a host transaction, Class C first.
///
/// `sender` drives the Class-B deobfuscation and must already be resolved.
/// Returns `None` for transactions that carry no coherent payload; those are
/// simply not protocol transactions.
pub fn extract_payload(tx: &HostTransaction, sender: &Address) -> Option<ExtractedPayload> {
    if let Some((payload, payload_output)) = class_c::extract(tx) {
        return Some(ExtractedPayload {
            class: EncodingClass::ClassC,
            payload,
            payload_output,
        });
    }
    if let Some((payload, payload_output)) = class_b::extract(tx, sender) {
        return Some(ExtractedPayload {
            class: EncodingClass::ClassB,
            payload,
            payload_output,
        });
    }
    None
}

/// Cheap pre-check, usable without a resolved sender: does the transaction
/// look like it might carry a payload at all?
pub fn has_payload_marker(tx: &HostTransaction) -> bool {
    tx.outputs.iter().any(|output| match &output.script {
        Script::NullData(data) => data.starts_with(&class_c::MARKER),
        Script::Multisig { .. } => true,
        _ => false,
    })
}

// =============================================================================
// MARKER CACHE
// =============================================================================

/// Tx-ids of pending (mempool) transactions carrying the payload marker.
#[derive(Debug, Default)]
pub struct MarkerCache {
    txids: HashSet<TxHash>,
}

impl MarkerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// On mempool add: remember the tx when the marker is detected.
    pub fn try_add(&mut self, tx: &HostTransaction) {
        if has_payload_marker(tx) {
            self.txids.insert(tx.txid);
        }
    }

    /// On mempool removal or block inclusion.
    pub fn remove(&mut self, txid: &TxHash) {
        self.txids.remove(txid);
    }

    pub fn contains(&self, txid: &TxHash) -> bool {
        self.txids.contains(txid)
    }

    pub fn len(&self) -> usize {
        self.txids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txids.is_empty()
    }

    pub fn clear(&mut self) {
        self.txids.clear();
    }
}
