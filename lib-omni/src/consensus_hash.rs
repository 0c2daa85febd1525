//! Consensus Hashing
//!
//! A double SHA-256 over the canonical serialization of all core state,
//! computed at end-of-block. Nodes replaying the same chain must agree
//! bit-for-bit, so the serialization order is fixed: tally tuples, property
//! records, resting orders, accepted offers, frozen pairs — each section
//! sorted lexicographically on its tuple.

use sha2::{Digest, Sha256};

use crate::dex::DexState;
use crate::freeze::FreezeState;
use crate::metadex::MetaDexBook;
use crate::registry::{PropertyRegistry, RegistryError};
use crate::tally::TallyMap;
use crate::types::{BlockHeight, Bucket};

/// The canonical state serialization. Exposed for diagnostics; the hash is
/// what nodes compare.
pub fn consensus_view(
    tally: &TallyMap,
    registry: &PropertyRegistry,
    book: &MetaDexBook,
    dex: &DexState,
    freeze: &FreezeState,
) -> Result<String, RegistryError> {
    let mut view = String::new();

    // balance tuples: (property, address, bucket, amount), non-zero only
    let mut balances: Vec<String> = Vec::new();
    for (address, property, tokens) in tally.iter() {
        for bucket in Bucket::ALL {
            let amount = tokens.get(bucket);
            if amount != 0 {
                balances.push(format!(
                    "{}|{}|{}|{}\n",
                    property,
                    address,
                    bucket.label(),
                    amount
                ));
            }
        }
    }
    balances.sort();
    for line in balances {
        view.push_str(&line);
    }

    // property records, ascending id
    for id in registry.stored_ids()? {
        if let Some(entry) = registry.get(id)? {
            view.push_str(&format!(
                "{}|{}|{}|{}|{}|{}\n",
                id,
                entry.issuer,
                entry.kind.code(),
                entry.num_tokens,
                entry.update_block,
                entry.creation_txid,
            ));
        }
    }

    // resting orders, pair-major then best-price-first
    for order in book.iter() {
        view.push_str(&format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
            order.address,
            order.property_for_sale,
            order.property_desired,
            order.amount_for_sale,
            order.amount_desired,
            order.amount_remaining,
            order.block,
            order.idx,
            order.txid,
        ));
    }

    // accepted native-coin offers, key order
    for accept in dex.accepts_iter() {
        view.push_str(&format!(
            "{}|{}|{}|{}|{}\n",
            accept.seller, accept.property, accept.buyer, accept.amount_remaining, accept.expiry_block,
        ));
    }

    // frozen pairs, key order
    for (property, address) in freeze.frozen_pairs() {
        view.push_str(&format!("{}|{}\n", property, address));
    }

    Ok(view)
}

/// Double SHA-256 of the canonical serialization.
pub fn consensus_hash(
    tally: &TallyMap,
    registry: &PropertyRegistry,
    book: &MetaDexBook,
    dex: &DexState,
    freeze: &FreezeState,
) -> Result<[u8; 32], RegistryError> {
    let view = consensus_view(tally, registry, book, dex, freeze)?;
    let first: [u8; 32] = Sha256::digest(view.as_bytes()).into();
    Ok(Sha256::digest(first).into())
}

/// Check a computed hash against a baked-in checkpoint, if one exists at
/// this height. `false` means the node has diverged and must not continue.
pub fn verify_checkpoint(
    params: &crate::rules::ConsensusParams,
    height: BlockHeight,
    hash: &[u8; 32],
) -> bool {
    match params.checkpoint_at(height) {
        Some(expected) => hex::encode(hash) == expected,
        None => true,
    }
}
