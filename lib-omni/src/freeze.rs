//! Freezing State
//!
//! Tracks which managed properties have freezing enabled (and since which
//! block) and which (property, address) pairs are currently frozen.
//! Transfers from a frozen address fail. This state is rebuilt from the
//! tx-list store after a reorg that touches any freeze-related transaction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{Address, BlockHeight, PropertyId};

/// In-memory freezing state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreezeState {
    /// property → block at which freezing became enabled
    enabled: BTreeMap<PropertyId, BlockHeight>,
    /// frozen (property, address) pairs
    frozen: BTreeSet<(PropertyId, Address)>,
}

impl FreezeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable freezing for a property from `live_block` on.
    pub fn enable(&mut self, property: PropertyId, live_block: BlockHeight) {
        self.enabled.insert(property, live_block);
    }

    /// Disable freezing; existing frozen flags for the property are cleared.
    pub fn disable(&mut self, property: PropertyId) {
        self.enabled.remove(&property);
        self.frozen.retain(|(p, _)| *p != property);
    }

    /// Whether freezing is enabled for the property as of `block`.
    pub fn is_enabled(&self, property: PropertyId, block: BlockHeight) -> bool {
        match self.enabled.get(&property) {
            Some(live_block) => block >= *live_block,
            None => false,
        }
    }

    /// Whether enabling was ever recorded (regardless of live block).
    pub fn has_enabled_entry(&self, property: PropertyId) -> bool {
        self.enabled.contains_key(&property)
    }

    pub fn freeze(&mut self, property: PropertyId, address: Address) {
        self.frozen.insert((property, address));
    }

    pub fn unfreeze(&mut self, property: PropertyId, address: &Address) {
        self.frozen.remove(&(property, address.clone()));
    }

    /// Whether the address is frozen for the property.
    pub fn is_frozen(&self, property: PropertyId, address: &Address) -> bool {
        self.frozen.contains(&(property, address.clone()))
    }

    /// All frozen pairs in canonical order (consensus-hash input).
    pub fn frozen_pairs(&self) -> impl Iterator<Item = &(PropertyId, Address)> {
        self.frozen.iter()
    }

    /// Drop all state (full rescan).
    pub fn clear(&mut self) {
        self.enabled.clear();
        self.frozen.clear();
    }
}
