//! Smart-Property Registry
//!
//! Persistent registry of every smart property: the authoritative current
//! snapshot, a historical series of pre-mutation snapshots keyed newest-first
//! by update block, a creation-tx lookup, the unique (non-fungible) flag
//! cache and the delegate records.
//!
//! Property ids `1` and `2` are protocol constants: they are fabricated on
//! read and never stored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lib_store::{keys, StoreError, Table, WriteBatch};

use crate::types::{
    Address, Amount, BlockHeight, Ecosystem, PropertyId, PropertyKind, TxHash,
    FIRST_MAIN_PROPERTY, FIRST_TEST_PROPERTY, PROPERTY_OMNI, PROPERTY_TOMNI,
};

// Table prefixes. Changing any of these forces a DB_VERSION bump.
const PREFIX_CURRENT: u8 = b's';
const PREFIX_HISTORY: u8 = b'b';
const PREFIX_TX_LOOKUP: u8 = b't';
const PREFIX_UNIQUE: u8 = b'u';
const PREFIX_DELEGATE: u8 = b'd';
const PREFIX_WATERMARK: u8 = b'w';

/// Registry error
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("property {0} not found")]
    NotFound(PropertyId),

    #[error("property {0} is a protocol constant and cannot be updated")]
    Immutable(PropertyId),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

// =============================================================================
// PROPERTY ENTRY
// =============================================================================

/// One smart property, as stored (current or historical snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub issuer: Address,
    pub kind: PropertyKind,
    pub prev_property_id: PropertyId,
    pub category: String,
    pub subcategory: String,
    pub name: String,
    pub url: String,
    pub data: String,

    // crowdsale parameters (variable-supply creations only)
    pub desired_property: PropertyId,
    pub tokens_per_unit: Amount,
    pub deadline: u64,
    pub early_bird_bonus: u8,
    pub issuer_percentage: u8,

    // crowdsale outcome
    pub close_early: bool,
    pub max_tokens_reached: bool,
    pub missed_tokens: Amount,
    pub time_closed: u64,

    // issuance model flags
    pub fixed: bool,
    pub manual: bool,
    pub unique: bool,

    pub num_tokens: Amount,

    pub creation_txid: TxHash,
    pub creation_block: BlockHeight,
    pub update_block: BlockHeight,

    /// Issuer changes keyed by (block, index-within-block).
    pub historical_issuers: BTreeMap<(BlockHeight, u32), Address>,
    /// Current delegate; empty history and `None` when never delegated.
    pub delegate: Option<Address>,
    /// Delegate changes keyed by (block, index-within-block); `None` records
    /// a removal.
    pub historical_delegates: BTreeMap<(BlockHeight, u32), Option<Address>>,
}

impl PropertyEntry {
    /// A blank entry; callers fill in what the creating transaction carries.
    pub fn new(issuer: Address, kind: PropertyKind) -> Self {
        PropertyEntry {
            issuer,
            kind,
            prev_property_id: 0,
            category: String::new(),
            subcategory: String::new(),
            name: String::new(),
            url: String::new(),
            data: String::new(),
            desired_property: 0,
            tokens_per_unit: 0,
            deadline: 0,
            early_bird_bonus: 0,
            issuer_percentage: 0,
            close_early: false,
            max_tokens_reached: false,
            missed_tokens: 0,
            time_closed: 0,
            fixed: false,
            manual: false,
            unique: false,
            num_tokens: 0,
            creation_txid: TxHash::default(),
            creation_block: 0,
            update_block: 0,
            historical_issuers: BTreeMap::new(),
            delegate: None,
            historical_delegates: BTreeMap::new(),
        }
    }

    pub fn is_divisible(&self) -> bool {
        self.kind.is_divisible()
    }

    /// Record an issuer change at (block, idx).
    pub fn update_issuer(&mut self, block: BlockHeight, idx: u32, new_issuer: Address) {
        self.historical_issuers.insert((block, idx), new_issuer);
    }

    /// The issuer as of `block`: the greatest historical entry with key
    /// ≤ (block, +∞), falling back to the current issuer.
    pub fn issuer_at(&self, block: BlockHeight) -> &Address {
        self.historical_issuers
            .range(..=(block, u32::MAX))
            .next_back()
            .map(|(_, issuer)| issuer)
            .unwrap_or(&self.issuer)
    }

    /// Record a delegate change at (block, idx).
    pub fn add_delegate(&mut self, block: BlockHeight, idx: u32, delegate: Address) {
        self.historical_delegates.insert((block, idx), Some(delegate));
    }

    /// Record a delegate removal at (block, idx).
    pub fn remove_delegate(&mut self, block: BlockHeight, idx: u32) {
        self.historical_delegates.insert((block, idx), None);
    }

    /// The delegate as of `block`, if one was set.
    pub fn delegate_at(&self, block: BlockHeight) -> Option<&Address> {
        match self
            .historical_delegates
            .range(..=(block, u32::MAX))
            .next_back()
        {
            Some((_, delegate)) => delegate.as_ref(),
            None => self.delegate.as_ref(),
        }
    }

    /// The address authorized to manage the property at `block`: the
    /// delegate when one is set, the issuer otherwise.
    pub fn manager_at(&self, block: BlockHeight) -> &Address {
        self.delegate_at(block).unwrap_or_else(|| self.issuer_at(block))
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// The persistent property registry.
pub struct PropertyRegistry {
    table: Table,
    next_main: PropertyId,
    next_test: PropertyId,
    implied_omni: PropertyEntry,
    implied_tomni: PropertyEntry,
}

impl PropertyRegistry {
    /// Open the registry over its table. `exodus` is the constant issuer of
    /// the two implied protocol tokens.
    pub fn open(table: Table, exodus: Address) -> RegistryResult<Self> {
        let mut implied_omni = PropertyEntry::new(exodus.clone(), PropertyKind::Divisible);
        implied_omni.update_issuer(0, 0, exodus.clone());
        implied_omni.num_tokens = 700_000;
        implied_omni.category = "N/A".to_string();
        implied_omni.subcategory = "N/A".to_string();
        implied_omni.name = "Omni tokens".to_string();
        implied_omni.url = "http://www.omnilayer.org".to_string();
        implied_omni.data =
            "Omni tokens serve as the binding between the host chain and smart properties."
                .to_string();

        let mut implied_tomni = implied_omni.clone();
        implied_tomni.name = "Test Omni tokens".to_string();

        let mut registry = PropertyRegistry {
            table,
            next_main: FIRST_MAIN_PROPERTY,
            next_test: FIRST_TEST_PROPERTY,
            implied_omni,
            implied_tomni,
        };
        registry.restore_counters()?;
        Ok(registry)
    }

    /// Rebuild the two allocation counters from the stored current entries.
    fn restore_counters(&mut self) -> RegistryResult<()> {
        self.next_main = FIRST_MAIN_PROPERTY;
        self.next_test = FIRST_TEST_PROPERTY;
        for entry in self.table.scan_prefix(&[PREFIX_CURRENT]) {
            let (key, _) = entry?;
            if let Some(id) = keys::read_be_u32(&key, 1) {
                if Ecosystem::of(id) == Ecosystem::Test {
                    self.next_test = self.next_test.max(id + 1);
                } else {
                    self.next_main = self.next_main.max(id + 1);
                }
            }
        }
        Ok(())
    }

    fn current_key(property: PropertyId) -> Vec<u8> {
        let mut key = vec![PREFIX_CURRENT];
        key.extend_from_slice(&keys::be_u32(property));
        key
    }

    fn history_key(property: PropertyId, update_block: BlockHeight) -> Vec<u8> {
        let mut key = vec![PREFIX_HISTORY];
        key.extend_from_slice(&keys::be_u32(property));
        key.extend_from_slice(&keys::be_u32_desc(update_block));
        key
    }

    fn lookup_key(txid: &TxHash) -> Vec<u8> {
        let mut key = vec![PREFIX_TX_LOOKUP];
        key.extend_from_slice(txid.as_bytes());
        key
    }

    fn unique_key(property: PropertyId) -> Vec<u8> {
        let mut key = vec![PREFIX_UNIQUE];
        key.extend_from_slice(&keys::be_u32(property));
        key
    }

    fn delegate_key(property: PropertyId) -> Vec<u8> {
        let mut key = vec![PREFIX_DELEGATE];
        key.extend_from_slice(&keys::be_u32(property));
        key
    }

    /// The id the next `create` in this ecosystem will assign.
    pub fn peek_next_id(&self, ecosystem: Ecosystem) -> PropertyId {
        match ecosystem {
            Ecosystem::Main => self.next_main,
            Ecosystem::Test => self.next_test,
        }
    }

    /// Atomically assign the next id and write current + tx-lookup
    /// (+ unique flag when set).
    pub fn create(&mut self, ecosystem: Ecosystem, entry: &PropertyEntry) -> RegistryResult<PropertyId> {
        let property = match ecosystem {
            Ecosystem::Main => {
                let id = self.next_main;
                self.next_main += 1;
                id
            }
            Ecosystem::Test => {
                let id = self.next_test;
                self.next_test += 1;
                id
            }
        };

        let mut batch = WriteBatch::new();
        batch.put_value(&Self::current_key(property), entry)?;
        batch.put_value(&Self::lookup_key(&entry.creation_txid), &property)?;
        if entry.unique {
            batch.put_value(&Self::unique_key(property), &true)?;
        }
        self.table.apply(batch)?;

        tracing::debug!(property, name = %entry.name, "created property entry");
        Ok(property)
    }

    /// Overwrite the current snapshot, preserving the prior one in the
    /// history series keyed by the new entry's update block.
    pub fn update(&self, property: PropertyId, entry: &PropertyEntry) -> RegistryResult<()> {
        if property == PROPERTY_OMNI || property == PROPERTY_TOMNI {
            return Err(RegistryError::Immutable(property));
        }

        let mut batch = WriteBatch::new();
        if let Some(previous) = self.table.get(&Self::current_key(property))? {
            batch.put(&Self::history_key(property, entry.update_block), &previous);
        }
        batch.put_value(&Self::current_key(property), entry)?;
        if let Some(delegate) = &entry.delegate {
            batch.put_value(&Self::delegate_key(property), delegate)?;
        } else {
            batch.delete(&Self::delegate_key(property));
        }
        self.table.apply(batch)?;
        Ok(())
    }

    /// Read the current snapshot; ids 1 and 2 are fabricated constants.
    pub fn get(&self, property: PropertyId) -> RegistryResult<Option<PropertyEntry>> {
        match property {
            PROPERTY_OMNI => return Ok(Some(self.implied_omni.clone())),
            PROPERTY_TOMNI => return Ok(Some(self.implied_tomni.clone())),
            _ => {}
        }
        Ok(self.table.get_value(&Self::current_key(property))?)
    }

    /// `get`, erroring when the property does not exist.
    pub fn require(&self, property: PropertyId) -> RegistryResult<PropertyEntry> {
        self.get(property)?.ok_or(RegistryError::NotFound(property))
    }

    pub fn has(&self, property: PropertyId) -> RegistryResult<bool> {
        if property == PROPERTY_OMNI || property == PROPERTY_TOMNI {
            return Ok(true);
        }
        Ok(self.table.get(&Self::current_key(property))?.is_some())
    }

    /// Resolve a property id from its creation tx.
    pub fn find_by_tx(&self, txid: &TxHash) -> RegistryResult<Option<PropertyId>> {
        Ok(self.table.get_value(&Self::lookup_key(txid))?)
    }

    /// All stored property ids, ascending (excludes the implied 1 and 2).
    pub fn stored_ids(&self) -> RegistryResult<Vec<PropertyId>> {
        let mut ids = Vec::new();
        for entry in self.table.scan_prefix(&[PREFIX_CURRENT]) {
            let (key, _) = entry?;
            if let Some(id) = keys::read_be_u32(&key, 1) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Restore every property mutated at or above `block` to its newest
    /// snapshot older than `block`; properties created at or above `block`
    /// are deleted entirely.
    pub fn rollback_above(&mut self, block: BlockHeight) -> RegistryResult<()> {
        let mut batch = WriteBatch::new();

        for id in self.stored_ids()? {
            let entry: PropertyEntry = match self.table.get_value(&Self::current_key(id))? {
                Some(e) => e,
                None => continue,
            };
            if entry.update_block < block {
                continue;
            }

            // walk the history series newest-first for a snapshot < block
            let mut prefix = vec![PREFIX_HISTORY];
            prefix.extend_from_slice(&keys::be_u32(id));
            let mut restored = false;
            for hist in self.table.scan_prefix(&prefix) {
                let (key, value) = hist?;
                let update_block = keys::read_be_u32_desc(&key, 5).unwrap_or(0);
                if update_block >= block {
                    batch.delete(&key);
                    continue;
                }
                batch.put(&Self::current_key(id), &value);
                restored = true;
                break;
            }

            if !restored {
                batch.delete(&Self::current_key(id));
                batch.delete(&Self::lookup_key(&entry.creation_txid));
                batch.delete(&Self::unique_key(id));
                batch.delete(&Self::delegate_key(id));
                tracing::debug!(property = id, "rolled back property creation");
            } else {
                tracing::debug!(property = id, block, "restored historical property entry");
            }
        }

        self.table.apply(batch)?;
        self.restore_counters()?;
        Ok(())
    }

    /// Record the hash and height of the last fully processed block.
    pub fn set_watermark(&self, block: BlockHeight, hash: &crate::types::BlockHash) -> RegistryResult<()> {
        self.table
            .put_value(&[PREFIX_WATERMARK], &(block, *hash))?;
        Ok(())
    }

    pub fn watermark(&self) -> RegistryResult<Option<(BlockHeight, crate::types::BlockHash)>> {
        Ok(self.table.get_value(&[PREFIX_WATERMARK])?)
    }

    /// Wipe everything and reset the allocation counters.
    pub fn clear(&mut self) -> RegistryResult<()> {
        self.table.clear()?;
        self.next_main = FIRST_MAIN_PROPERTY;
        self.next_test = FIRST_TEST_PROPERTY;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lib_store::Store;

    fn test_registry() -> PropertyRegistry {
        let store = Store::open_temporary().unwrap();
        let table = store.table("properties").unwrap();
        PropertyRegistry::open(table, Address::new("1Exodus")).unwrap()
    }

    fn entry(name: &str, txid_byte: u8) -> PropertyEntry {
        let mut e = PropertyEntry::new(Address::new("1Issuer"), PropertyKind::Indivisible);
        e.name = name.to_string();
        e.creation_txid = TxHash::new([txid_byte; 32]);
        e
    }

    #[test]
    fn implied_properties_are_fabricated() {
        let registry = test_registry();
        let omni = registry.get(PROPERTY_OMNI).unwrap().unwrap();
        assert_eq!(omni.num_tokens, 700_000);
        assert!(omni.is_divisible());
        let tomni = registry.get(PROPERTY_TOMNI).unwrap().unwrap();
        assert_eq!(tomni.name, "Test Omni tokens");
        assert!(registry.has(PROPERTY_OMNI).unwrap());
        // never stored
        assert!(registry.stored_ids().unwrap().is_empty());
    }

    #[test]
    fn create_assigns_ids_per_ecosystem() {
        let mut registry = test_registry();
        let a = registry.create(Ecosystem::Main, &entry("A", 1)).unwrap();
        let b = registry.create(Ecosystem::Main, &entry("B", 2)).unwrap();
        let t = registry.create(Ecosystem::Test, &entry("T", 3)).unwrap();
        assert_eq!(a, 3);
        assert_eq!(b, 4);
        assert_eq!(t, FIRST_TEST_PROPERTY);
        assert_eq!(registry.peek_next_id(Ecosystem::Main), 5);
        assert_eq!(registry.peek_next_id(Ecosystem::Test), FIRST_TEST_PROPERTY + 1);
    }

    #[test]
    fn find_by_creation_tx() {
        let mut registry = test_registry();
        let id = registry.create(Ecosystem::Main, &entry("A", 9)).unwrap();
        let found = registry.find_by_tx(&TxHash::new([9; 32])).unwrap();
        assert_eq!(found, Some(id));
        assert_eq!(registry.find_by_tx(&TxHash::new([8; 32])).unwrap(), None);
    }

    #[test]
    fn counters_restored_from_disk() {
        let store = Store::open_temporary().unwrap();
        let table = store.table("properties").unwrap();
        {
            let mut registry =
                PropertyRegistry::open(table.clone(), Address::new("1Exodus")).unwrap();
            registry.create(Ecosystem::Main, &entry("A", 1)).unwrap();
            registry.create(Ecosystem::Main, &entry("B", 2)).unwrap();
        }
        let registry = PropertyRegistry::open(table, Address::new("1Exodus")).unwrap();
        assert_eq!(registry.peek_next_id(Ecosystem::Main), 5);
    }

    #[test]
    fn historical_issuer_lookup() {
        let mut e = entry("A", 1);
        e.update_issuer(100, 0, Address::new("1First"));
        e.update_issuer(200, 3, Address::new("1Second"));
        e.update_issuer(200, 7, Address::new("1Third"));
        e.issuer = Address::new("1Third");

        assert_eq!(e.issuer_at(99).as_str(), "1Third"); // before any entry: current
        assert_eq!(e.issuer_at(100).as_str(), "1First");
        assert_eq!(e.issuer_at(150).as_str(), "1First");
        assert_eq!(e.issuer_at(200).as_str(), "1Third"); // idx 7 wins within block
        assert_eq!(e.issuer_at(10_000).as_str(), "1Third");
    }

    #[test]
    fn delegate_lookup_and_removal() {
        let mut e = entry("A", 1);
        assert!(e.delegate_at(50).is_none());
        e.add_delegate(100, 0, Address::new("1Delegate"));
        e.delegate = Some(Address::new("1Delegate"));
        assert_eq!(e.delegate_at(100).unwrap().as_str(), "1Delegate");
        assert_eq!(e.manager_at(100).as_str(), "1Delegate");
        e.remove_delegate(150, 2);
        e.delegate = None;
        assert!(e.delegate_at(150).is_none());
        assert_eq!(e.delegate_at(120).unwrap().as_str(), "1Delegate");
    }

    #[test]
    fn update_preserves_history_and_rollback_restores() {
        let mut registry = test_registry();
        let mut e = entry("A", 1);
        e.creation_block = 100;
        e.update_block = 100;
        e.num_tokens = 1000;
        let id = registry.create(Ecosystem::Main, &e).unwrap();

        let mut updated = e.clone();
        updated.num_tokens = 1500;
        updated.update_block = 200;
        registry.update(id, &updated).unwrap();
        assert_eq!(registry.get(id).unwrap().unwrap().num_tokens, 1500);

        registry.rollback_above(150).unwrap();
        let restored = registry.get(id).unwrap().unwrap();
        assert_eq!(restored.num_tokens, 1000);
        assert_eq!(restored.update_block, 100);
    }

    #[test]
    fn rollback_deletes_properties_created_above() {
        let mut registry = test_registry();
        let mut e = entry("A", 1);
        e.creation_block = 300;
        e.update_block = 300;
        let id = registry.create(Ecosystem::Main, &e).unwrap();

        registry.rollback_above(300).unwrap();
        assert!(registry.get(id).unwrap().is_none());
        assert_eq!(registry.find_by_tx(&TxHash::new([1; 32])).unwrap(), None);
        // counter rewinds so the id is reassigned on replay
        assert_eq!(registry.peek_next_id(Ecosystem::Main), id);
    }

    #[test]
    fn implied_properties_reject_updates() {
        let registry = test_registry();
        let e = entry("A", 1);
        assert!(matches!(
            registry.update(PROPERTY_OMNI, &e),
            Err(RegistryError::Immutable(_))
        ));
    }

    #[test]
    fn watermark_roundtrip() {
        let registry = test_registry();
        assert!(registry.watermark().unwrap().is_none());
        let hash = crate::types::BlockHash::new([5; 32]);
        registry.set_watermark(123, &hash).unwrap();
        assert_eq!(registry.watermark().unwrap(), Some((123, hash)));
    }
}
