//! Fee Cache and Distribution History
//!
//! Trading fees accrue per property into a cumulative log keyed newest-first
//! by block. When a property's cached total reaches its distribution
//! threshold (total tokens / [`FEE_THRESHOLD`], floor 1), the cache is paid
//! out to holders of the ecosystem's protocol token and a history record is
//! appended.
//!
//! A fee-cache overflow can only mean corrupted state and is fatal.

use thiserror::Error;

use lib_store::{keys, StoreError, Table, WriteBatch};

use crate::types::{Address, Amount, BlockHeight, PropertyId, MAX_AMOUNT};

/// Denominator of the distribution threshold: a property distributes once
/// its cache reaches 1/100000 of its supply.
pub const FEE_THRESHOLD: i64 = 100_000;

const PREFIX_CACHE: u8 = b'c';
const PREFIX_DISTRIBUTION: u8 = b'd';
const PREFIX_PROPERTY_INDEX: u8 = b'p';

/// Fee subsystem error
#[derive(Debug, Error)]
pub enum FeeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Fatal: the cache cannot legitimately exceed the maximum token count.
    #[error("fee cache overflow (block {block}, property {property}, current {current}, amount {amount})")]
    Overflow {
        property: PropertyId,
        block: BlockHeight,
        current: Amount,
        amount: Amount,
    },
}

pub type FeeResult<T> = Result<T, FeeError>;

/// The distribution threshold for a property with the given supply.
pub fn distribution_threshold(total_tokens: Amount) -> Amount {
    let threshold = total_tokens / FEE_THRESHOLD;
    if threshold <= 0 {
        1
    } else {
        threshold
    }
}

// =============================================================================
// FEE CACHE
// =============================================================================

/// Per-property cumulative fee log.
pub struct FeeCache {
    table: Table,
}

impl FeeCache {
    pub fn open(table: Table) -> Self {
        FeeCache { table }
    }

    fn cache_key(property: PropertyId, block: BlockHeight) -> Vec<u8> {
        let mut key = vec![PREFIX_CACHE];
        keys::push_varint(&mut key, u64::from(property));
        key.extend_from_slice(&keys::be_u32_desc(block));
        key
    }

    fn property_prefix(property: PropertyId) -> Vec<u8> {
        let mut prefix = vec![PREFIX_CACHE];
        keys::push_varint(&mut prefix, u64::from(property));
        prefix
    }

    /// Current cached amount: the newest log entry, or zero.
    pub fn cached_amount(&self, property: PropertyId) -> FeeResult<Amount> {
        match self.table.first_with_prefix(&Self::property_prefix(property))? {
            Some((_, value)) => Ok(lib_store::from_value(&value)?),
            None => Ok(0),
        }
    }

    /// Add a fee at `block`; returns the new cumulative amount.
    ///
    /// Overflow against the 63-bit bound is fatal for the node; the caller
    /// must abort on [`FeeError::Overflow`].
    pub fn add_fee(
        &self,
        property: PropertyId,
        block: BlockHeight,
        amount: Amount,
    ) -> FeeResult<Amount> {
        let current = self.cached_amount(property)?;
        let updated = current
            .checked_add(amount)
            .filter(|v| *v <= MAX_AMOUNT)
            .ok_or(FeeError::Overflow {
                property,
                block,
                current,
                amount,
            })?;
        self.table
            .put_value(&Self::cache_key(property, block), &updated)?;
        tracing::debug!(property, block, amount, updated, "fee cache updated");
        Ok(updated)
    }

    /// Zero the cache for a property after a distribution at `block`.
    pub fn clear_cache(&self, property: PropertyId, block: BlockHeight) -> FeeResult<()> {
        let mut batch = WriteBatch::new();
        for entry in self.table.scan_prefix(&Self::property_prefix(property)) {
            let (key, _) = entry?;
            batch.delete(&key);
        }
        self.table.apply(batch)?;
        tracing::debug!(property, block, "fee cache cleared");
        Ok(())
    }

    /// Delete all cache rows at height ≥ `block` (reorg).
    pub fn rollback_above(&self, block: BlockHeight) -> FeeResult<()> {
        let mut batch = WriteBatch::new();
        for entry in self.table.scan_prefix(&[PREFIX_CACHE]) {
            let (key, _) = entry?;
            let (_, consumed) = keys::read_varint(&key, 1).ok_or_else(|| StoreError::Corrupted {
                table: self.table.name().to_string(),
                reason: "bad fee cache key".to_string(),
            })?;
            let entry_block =
                keys::read_be_u32_desc(&key, 1 + consumed).ok_or_else(|| StoreError::Corrupted {
                    table: self.table.name().to_string(),
                    reason: "bad fee cache key".to_string(),
                })?;
            if entry_block >= block {
                batch.delete(&key);
            }
        }
        self.table.apply(batch)?;
        Ok(())
    }

    /// The full (block, cumulative) log for a property, newest first.
    pub fn cache_history(&self, property: PropertyId) -> FeeResult<Vec<(BlockHeight, Amount)>> {
        let prefix = Self::property_prefix(property);
        let mut out = Vec::new();
        for entry in self.table.scan_prefix(&prefix) {
            let (key, value) = entry?;
            if let Some(block) = keys::read_be_u32_desc(&key, prefix.len()) {
                out.push((block, lib_store::from_value(&value)?));
            }
        }
        Ok(out)
    }

    pub fn clear(&self) -> FeeResult<()> {
        self.table.clear()?;
        Ok(())
    }
}

// =============================================================================
// FEE HISTORY
// =============================================================================

/// One completed distribution.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Distribution {
    pub id: u32,
    pub property: PropertyId,
    pub block: BlockHeight,
    pub total: Amount,
    pub recipients: Vec<(Address, Amount)>,
}

/// Append-only log of completed fee distributions.
pub struct FeeHistory {
    table: Table,
}

impl FeeHistory {
    pub fn open(table: Table) -> Self {
        FeeHistory { table }
    }

    fn distribution_key(id: u32, block: BlockHeight) -> Vec<u8> {
        let mut key = vec![PREFIX_DISTRIBUTION];
        key.extend_from_slice(&keys::be_u32_desc(id));
        key.extend_from_slice(&keys::be_u32_desc(block));
        key
    }

    fn property_index_key(property: PropertyId, id: u32) -> Vec<u8> {
        let mut key = vec![PREFIX_PROPERTY_INDEX];
        key.extend_from_slice(&keys::be_u32(property));
        key.extend_from_slice(&keys::be_u32(id));
        key
    }

    fn next_id(&self) -> FeeResult<u32> {
        match self.table.first_with_prefix(&[PREFIX_DISTRIBUTION])? {
            Some((key, _)) => {
                let newest = keys::read_be_u32_desc(&key, 1).unwrap_or(0);
                Ok(newest + 1)
            }
            None => Ok(1),
        }
    }

    /// Append a distribution record; returns its id.
    pub fn record_distribution(
        &self,
        property: PropertyId,
        block: BlockHeight,
        total: Amount,
        recipients: &[(Address, Amount)],
    ) -> FeeResult<u32> {
        let id = self.next_id()?;
        let record = Distribution {
            id,
            property,
            block,
            total,
            recipients: recipients.to_vec(),
        };
        self.table
            .put_value(&Self::distribution_key(id, block), &record)?;
        self.table.put(&Self::property_index_key(property, id), b"")?;
        tracing::info!(
            property,
            block,
            total,
            recipients = recipients.len(),
            "fee distribution recorded"
        );
        Ok(id)
    }

    /// Distribution ids recorded for a property, ascending.
    pub fn distributions_for(&self, property: PropertyId) -> FeeResult<Vec<u32>> {
        let mut prefix = vec![PREFIX_PROPERTY_INDEX];
        prefix.extend_from_slice(&keys::be_u32(property));
        let mut ids = Vec::new();
        for entry in self.table.scan_prefix(&prefix) {
            let (key, _) = entry?;
            if let Some(id) = keys::read_be_u32(&key, 5) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Load a distribution by id.
    pub fn distribution(&self, id: u32) -> FeeResult<Option<Distribution>> {
        let mut prefix = vec![PREFIX_DISTRIBUTION];
        prefix.extend_from_slice(&keys::be_u32_desc(id));
        match self.table.first_with_prefix(&prefix)? {
            Some((_, value)) => Ok(Some(lib_store::from_value(&value)?)),
            None => Ok(None),
        }
    }

    /// Delete every distribution recorded at height ≥ `block` (reorg).
    pub fn rollback_above(&self, block: BlockHeight) -> FeeResult<()> {
        let mut batch = WriteBatch::new();
        for entry in self.table.scan_prefix(&[PREFIX_DISTRIBUTION]) {
            let (key, value) = entry?;
            let record: Distribution = lib_store::from_value(&value)?;
            if record.block >= block {
                batch.delete(&key);
                batch.delete(&Self::property_index_key(record.property, record.id));
            }
        }
        self.table.apply(batch)?;
        Ok(())
    }

    pub fn clear(&self) -> FeeResult<()> {
        self.table.clear()?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
