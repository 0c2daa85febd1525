//! Non-Fungible Token Range Store
//!
//! Contiguous ranges of unique token ids per property, grouped by record
//! kind. Ownership moves split and coalesce ranges so that, per property and
//! kind, stored ranges stay disjoint and no two adjacent ranges carry the
//! same value.
//!
//! Every mutation records the key's pre-image into a per-block cache; the
//! cache is flushed under a rollback key at end-of-block so a reorg can
//! replay the pre-images in reverse.

use std::collections::BTreeMap;

use thiserror::Error;

use lib_store::{keys, StoreError, Table, WriteBatch};

use crate::types::{Address, Amount, BlockHeight, PropertyId};

const PREFIX_RANGE: u8 = b'r';
const PREFIX_ROLLBACK: u8 = b'H';

/// NFT store error
#[derive(Debug, Error)]
pub enum NftError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed range key")]
    BadKey,
}

pub type NftResult<T> = Result<T, NftError>;

/// Record kinds stored per (property, range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NftDataKind {
    /// Range → owning address.
    RangeIndex,
    /// Range → issuer-writable data.
    IssuerData,
    /// Range → holder-writable data.
    HolderData,
    /// Range → data attached at grant time.
    GrantData,
}

impl NftDataKind {
    fn byte(self) -> u8 {
        match self {
            NftDataKind::RangeIndex => 1,
            NftDataKind::IssuerData => 2,
            NftDataKind::HolderData => 3,
            NftDataKind::GrantData => 4,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(NftDataKind::RangeIndex),
            2 => Some(NftDataKind::IssuerData),
            3 => Some(NftDataKind::HolderData),
            4 => Some(NftDataKind::GrantData),
            _ => None,
        }
    }
}

/// A decoded range key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RangeKey {
    property: PropertyId,
    kind: NftDataKind,
    start: i64,
    end: i64,
}

impl RangeKey {
    fn encode(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + 4 + 1 + 8 + 8);
        key.push(PREFIX_RANGE);
        key.extend_from_slice(&keys::be_u32(self.property));
        key.push(self.kind.byte());
        key.extend_from_slice(&keys::be_i64(self.start));
        key.extend_from_slice(&keys::be_i64(self.end));
        key
    }

    fn decode(bytes: &[u8]) -> Option<RangeKey> {
        if bytes.len() != 22 || bytes[0] != PREFIX_RANGE {
            return None;
        }
        Some(RangeKey {
            property: keys::read_be_u32(bytes, 1)?,
            kind: NftDataKind::from_byte(bytes[5])?,
            start: keys::read_be_i64(bytes, 6)?,
            end: keys::read_be_i64(bytes, 14)?,
        })
    }
}

fn group_prefix(property: PropertyId, kind: NftDataKind) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(6);
    prefix.push(PREFIX_RANGE);
    prefix.extend_from_slice(&keys::be_u32(property));
    prefix.push(kind.byte());
    prefix
}

fn rollback_key(block: BlockHeight) -> Vec<u8> {
    let mut key = vec![PREFIX_ROLLBACK];
    key.extend_from_slice(&keys::be_u32_desc(block));
    key
}

// =============================================================================
// STORE
// =============================================================================

/// The NFT range store.
pub struct NftStore {
    table: Table,
    /// Pre-images of keys touched in the current block; first write wins.
    block_cache: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl NftStore {
    pub fn open(table: Table) -> Self {
        NftStore {
            table,
            block_cache: BTreeMap::new(),
        }
    }

    fn record_preimage(&mut self, key: &[u8]) -> NftResult<()> {
        if !self.block_cache.contains_key(key) {
            let old = self.table.get(key)?.map(|v| v.to_vec());
            self.block_cache.insert(key.to_vec(), old);
        }
        Ok(())
    }

    fn add_range(
        &mut self,
        property: PropertyId,
        start: i64,
        end: i64,
        value: &str,
        kind: NftDataKind,
    ) -> NftResult<()> {
        let key = RangeKey {
            property,
            kind,
            start,
            end,
        }
        .encode();
        self.record_preimage(&key)?;
        self.table.put(&key, value.as_bytes())?;
        Ok(())
    }

    fn delete_range(
        &mut self,
        property: PropertyId,
        start: i64,
        end: i64,
        kind: NftDataKind,
    ) -> NftResult<()> {
        let key = RangeKey {
            property,
            kind,
            start,
            end,
        }
        .encode();
        self.record_preimage(&key)?;
        self.table.delete(&key)?;
        Ok(())
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// The stored range containing `token`, if any.
    pub fn range_of(
        &self,
        property: PropertyId,
        token: i64,
        kind: NftDataKind,
    ) -> NftResult<Option<(i64, i64)>> {
        for entry in self.table.scan_prefix(&group_prefix(property, kind)) {
            let (key, _) = entry?;
            let range = RangeKey::decode(&key).ok_or(NftError::BadKey)?;
            if token >= range.start && token <= range.end {
                return Ok(Some((range.start, range.end)));
            }
        }
        Ok(None)
    }

    /// The value stored for the range containing `token`, if any.
    pub fn value_of(
        &self,
        property: PropertyId,
        token: i64,
        kind: NftDataKind,
    ) -> NftResult<Option<String>> {
        for entry in self.table.scan_prefix(&group_prefix(property, kind)) {
            let (key, value) = entry?;
            let range = RangeKey::decode(&key).ok_or(NftError::BadKey)?;
            if token >= range.start && token <= range.end {
                return Ok(Some(String::from_utf8_lossy(&value).into_owned()));
            }
        }
        Ok(None)
    }

    /// The value covering the whole `[start..end]` span, if one stored range
    /// contains it entirely.
    pub fn value_in_range(
        &self,
        property: PropertyId,
        start: i64,
        end: i64,
        kind: NftDataKind,
    ) -> NftResult<Option<String>> {
        for entry in self.table.scan_prefix(&group_prefix(property, kind)) {
            let (key, value) = entry?;
            let range = RangeKey::decode(&key).ok_or(NftError::BadKey)?;
            if start >= range.start && end <= range.end {
                return Ok(Some(String::from_utf8_lossy(&value).into_owned()));
            }
        }
        Ok(None)
    }

    /// Highest token id granted for a property (equals its token count).
    pub fn highest_range_end(&self, property: PropertyId) -> NftResult<i64> {
        let mut highest = 0i64;
        for entry in self
            .table
            .scan_prefix(&group_prefix(property, NftDataKind::RangeIndex))
        {
            let (key, _) = entry?;
            let range = RangeKey::decode(&key).ok_or(NftError::BadKey)?;
            highest = highest.max(range.start).max(range.end);
        }
        Ok(highest)
    }

    /// All (owner, start, end) ownership rows for a property, ascending.
    pub fn ranges(&self, property: PropertyId) -> NftResult<Vec<(String, i64, i64)>> {
        let mut out = Vec::new();
        for entry in self
            .table
            .scan_prefix(&group_prefix(property, NftDataKind::RangeIndex))
        {
            let (key, value) = entry?;
            let range = RangeKey::decode(&key).ok_or(NftError::BadKey)?;
            out.push((
                String::from_utf8_lossy(&value).into_owned(),
                range.start,
                range.end,
            ));
        }
        Ok(out)
    }

    /// Ownership ranges of one address for a property.
    pub fn ranges_of_owner(
        &self,
        property: PropertyId,
        owner: &Address,
    ) -> NftResult<Vec<(i64, i64)>> {
        Ok(self
            .ranges(property)?
            .into_iter()
            .filter(|(value, _, _)| value == owner.as_str())
            .map(|(_, start, end)| (start, end))
            .collect())
    }

    /// Per-property totals (highest range end) across the whole store.
    pub fn totals(&self) -> NftResult<BTreeMap<PropertyId, i64>> {
        let mut totals = BTreeMap::new();
        for entry in self.table.scan_prefix(&[PREFIX_RANGE]) {
            let (key, _) = entry?;
            let range = RangeKey::decode(&key).ok_or(NftError::BadKey)?;
            if range.kind != NftDataKind::RangeIndex {
                continue;
            }
            let total = totals.entry(range.property).or_insert(0i64);
            *total = (*total).max(range.end);
        }
        Ok(totals)
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Move `[start..end]` from `from` to `to`.
    ///
    /// Fails (returning `false`, no mutation) unless a single owning range
    /// covers the whole span with owner `from`. Residuals outside the span
    /// are re-inserted for `from`; ranges adjacent to the span already owned
    /// by `to` are merged in.
    pub fn move_tokens(
        &mut self,
        property: PropertyId,
        start: i64,
        end: i64,
        from: &Address,
        to: &Address,
    ) -> NftResult<bool> {
        let owner = self.value_in_range(property, start, end, NftDataKind::RangeIndex)?;
        if owner.as_deref() != Some(from.as_str()) {
            return Ok(false);
        }

        let (range_start, range_end) = match self.range_of(property, start, NftDataKind::RangeIndex)? {
            Some(range) => range,
            None => return Ok(false),
        };

        let left_owner = self.value_of(property, start - 1, NftDataKind::RangeIndex)?;
        let right_owner = self.value_of(property, end + 1, NftDataKind::RangeIndex)?;
        let merge_left = left_owner.as_deref() == Some(to.as_str());
        let merge_right = right_owner.as_deref() == Some(to.as_str());

        // carve the span out of the sender's range
        self.delete_range(property, range_start, range_end, NftDataKind::RangeIndex)?;
        if range_start < start {
            self.add_range(property, range_start, start - 1, from.as_str(), NftDataKind::RangeIndex)?;
        }
        if range_end > end {
            self.add_range(property, end + 1, range_end, from.as_str(), NftDataKind::RangeIndex)?;
        }

        // extend into the recipient's adjacent ranges
        let mut new_start = start;
        let mut new_end = end;
        if merge_left {
            if let Some((left_start, left_end)) =
                self.range_of(property, start - 1, NftDataKind::RangeIndex)?
            {
                self.delete_range(property, left_start, left_end, NftDataKind::RangeIndex)?;
                new_start = left_start;
            }
        }
        if merge_right {
            if let Some((right_start, right_end)) =
                self.range_of(property, end + 1, NftDataKind::RangeIndex)?
            {
                self.delete_range(property, right_start, right_end, NftDataKind::RangeIndex)?;
                new_end = right_end;
            }
        }
        self.add_range(property, new_start, new_end, to.as_str(), NftDataKind::RangeIndex)?;

        Ok(true)
    }

    /// Write `data` over `[start..end]`, preserving the pre-existing data of
    /// the left-most and right-most intersecting ranges on the segments
    /// outside the span.
    pub fn set_data(
        &mut self,
        property: PropertyId,
        start: i64,
        end: i64,
        data: &str,
        kind: NftDataKind,
    ) -> NftResult<()> {
        // collect every stored range intersecting the span
        let mut intersecting: Vec<(i64, i64)> = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            match self.range_of(property, cursor, kind)? {
                Some(range) => {
                    cursor = range.1 + 1;
                    intersecting.push(range);
                }
                None => break,
            }
        }

        if let (Some(&(first_start, _)), Some(&(_, last_end))) =
            (intersecting.first(), intersecting.last())
        {
            let before = self.value_of(property, first_start, kind)?.unwrap_or_default();
            let after = self.value_of(property, last_end, kind)?.unwrap_or_default();

            for (range_start, range_end) in &intersecting {
                self.delete_range(property, *range_start, *range_end, kind)?;
            }
            if first_start < start {
                self.add_range(property, first_start, start - 1, &before, kind)?;
            }
            if last_end > end {
                self.add_range(property, end + 1, last_end, &after, kind)?;
            }
        }

        self.add_range(property, start, end, data, kind)
    }

    /// Grant `amount` new tokens to `owner`, extending the id space from the
    /// current highest end; saturates at `i64::MAX`. Returns the new range.
    pub fn create_tokens(
        &mut self,
        property: PropertyId,
        amount: Amount,
        owner: &Address,
        grant_data: &str,
    ) -> NftResult<(i64, i64)> {
        debug_assert!(amount > 0);

        let highest = self.highest_range_end(property)?;
        let new_start = highest + 1;
        let new_end = if highest > i64::MAX - amount {
            i64::MAX
        } else {
            highest + amount
        };

        self.add_range(property, new_start, new_end, grant_data, NftDataKind::GrantData)?;

        let mut owned_start = new_start;
        if highest > 0 {
            let highest_owner = self.value_of(property, highest, NftDataKind::RangeIndex)?;
            if highest_owner.as_deref() == Some(owner.as_str()) {
                if let Some((old_start, old_end)) =
                    self.range_of(property, highest, NftDataKind::RangeIndex)?
                {
                    self.delete_range(property, old_start, old_end, NftDataKind::RangeIndex)?;
                    owned_start = old_start;
                }
            }
        }
        self.add_range(property, owned_start, new_end, owner.as_str(), NftDataKind::RangeIndex)?;

        Ok((new_start, new_end))
    }

    // =========================================================================
    // ROLLBACK LOG
    // =========================================================================

    /// Flush the per-block pre-image cache under the block's rollback key.
    pub fn write_block_cache(&mut self, block: BlockHeight) -> NftResult<()> {
        if self.block_cache.is_empty() {
            return Ok(());
        }
        let cache: Vec<(Vec<u8>, Option<Vec<u8>>)> =
            std::mem::take(&mut self.block_cache).into_iter().collect();
        self.table
            .put(&rollback_key(block), &lib_store::to_value(&cache)?)?;
        Ok(())
    }

    /// Discard the per-block cache (shutdown mid-block).
    pub fn discard_block_cache(&mut self) {
        self.block_cache.clear();
    }

    /// Replay pre-images of every block ≥ `block`, newest first, and drop
    /// the drained rollback rows.
    pub fn rollback_above(&mut self, block: BlockHeight) -> NftResult<()> {
        self.block_cache.clear();

        let mut batch = WriteBatch::new();
        for entry in self.table.scan_prefix(&[PREFIX_ROLLBACK]) {
            let (key, value) = entry?;
            let entry_block = keys::read_be_u32_desc(&key, 1).ok_or(NftError::BadKey)?;
            if entry_block < block {
                break; // newest-first: everything further is older
            }
            let cache: Vec<(Vec<u8>, Option<Vec<u8>>)> = lib_store::from_value(&value)?;
            for (db_key, old_value) in cache {
                match old_value {
                    Some(old) => batch.put(&db_key, &old),
                    None => batch.delete(&db_key),
                }
            }
            batch.delete(&key);
        }
        self.table.apply(batch)?;
        Ok(())
    }

    /// Wipe the store (full rescans).
    pub fn clear(&mut self) -> NftResult<()> {
        self.block_cache.clear();
        self.table.clear()?;
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

    fn test_store() -> NftStore {
        let store = Store::open_temporary().unwrap();
        NftStore::open(store.table("nft").unwrap())
    }

    fn alice() -> Address {
        Address::new("1Alice")
    }

    fn bob() -> Address {
        Address::new("1Bob")
    }

    #[test]
    fn create_extends_id_space() {
        let mut nft = test_store();
        let (start, end) = nft.create_tokens(42, 100, &alice(), "deed-1").unwrap();
        assert_eq!((start, end), (1, 100));
        assert_eq!(nft.highest_range_end(42).unwrap(), 100);

        let (start, end) = nft.create_tokens(42, 50, &bob(), "deed-2").unwrap();
        assert_eq!((start, end), (101, 150));
        assert_eq!(nft.highest_range_end(42).unwrap(), 150);
    }

    #[test]
    fn create_coalesces_same_owner() {
        let mut nft = test_store();
        nft.create_tokens(42, 100, &alice(), "a").unwrap();
        nft.create_tokens(42, 50, &alice(), "b").unwrap();
        assert_eq!(
            nft.ranges(42).unwrap(),
            vec![("1Alice".to_string(), 1, 150)]
        );
        // grant data rows stay distinct
        assert_eq!(
            nft.value_of(42, 100, NftDataKind::GrantData).unwrap().unwrap(),
            "a"
        );
        assert_eq!(
            nft.value_of(42, 101, NftDataKind::GrantData).unwrap().unwrap(),
            "b"
        );
    }

    #[test]
    fn create_saturates_at_i64_max() {
        let mut nft = test_store();
        nft.set_data(42, 1, i64::MAX - 10, "x", NftDataKind::RangeIndex)
            .unwrap();
        // direct range write to fake a huge supply, then grant past the bound
        let (start, end) = nft.create_tokens(42, 100, &alice(), "g").unwrap();
        assert_eq!(start, i64::MAX - 9);
        assert_eq!(end, i64::MAX);
    }

    #[test]
    fn move_splits_and_keeps_residuals() {
        // seed: [1..100]=Alice, [101..150]=Bob
        let mut nft = test_store();
        nft.create_tokens(42, 100, &alice(), "a").unwrap();
        nft.create_tokens(42, 50, &bob(), "b").unwrap();

        assert!(nft.move_tokens(42, 40, 60, &alice(), &bob()).unwrap());
        assert_eq!(
            nft.ranges(42).unwrap(),
            vec![
                ("1Alice".to_string(), 1, 39),
                ("1Bob".to_string(), 40, 60),
                ("1Alice".to_string(), 61, 100),
                ("1Bob".to_string(), 101, 150),
            ]
        );

        // adjacency triggers the merge
        assert!(nft.move_tokens(42, 61, 100, &alice(), &bob()).unwrap());
        assert_eq!(
            nft.ranges(42).unwrap(),
            vec![
                ("1Alice".to_string(), 1, 39),
                ("1Bob".to_string(), 40, 150),
            ]
        );
    }

    #[test]
    fn move_requires_contiguous_ownership() {
        let mut nft = test_store();
        nft.create_tokens(42, 50, &alice(), "a").unwrap();
        nft.create_tokens(42, 50, &bob(), "b").unwrap();
        // span crosses the ownership boundary
        assert!(!nft.move_tokens(42, 40, 60, &alice(), &bob()).unwrap());
        // wrong owner
        assert!(!nft.move_tokens(42, 1, 10, &bob(), &alice()).unwrap());
        // state unchanged
        assert_eq!(nft.ranges(42).unwrap().len(), 2);
    }

    #[test]
    fn no_adjacent_ranges_share_owner_after_moves() {
        let mut nft = test_store();
        nft.create_tokens(42, 100, &alice(), "a").unwrap();
        nft.move_tokens(42, 1, 30, &alice(), &bob()).unwrap();
        nft.move_tokens(42, 31, 60, &alice(), &bob()).unwrap();
        let ranges = nft.ranges(42).unwrap();
        assert_eq!(
            ranges,
            vec![
                ("1Bob".to_string(), 1, 60),
                ("1Alice".to_string(), 61, 100),
            ]
        );
        for pair in ranges.windows(2) {
            assert!(pair[0].2 + 1 == pair[1].1);
            assert_ne!(pair[0].0, pair[1].0);
        }
    }

    #[test]
    fn set_data_preserves_flanks() {
        let mut nft = test_store();
        nft.create_tokens(42, 100, &alice(), "original").unwrap();
        nft.set_data(42, 40, 60, "updated", NftDataKind::GrantData)
            .unwrap();

        assert_eq!(
            nft.value_of(42, 39, NftDataKind::GrantData).unwrap().unwrap(),
            "original"
        );
        assert_eq!(
            nft.value_of(42, 50, NftDataKind::GrantData).unwrap().unwrap(),
            "updated"
        );
        assert_eq!(
            nft.value_of(42, 61, NftDataKind::GrantData).unwrap().unwrap(),
            "original"
        );
    }

    #[test]
    fn set_data_over_empty_kind_writes_one_range() {
        let mut nft = test_store();
        nft.create_tokens(42, 100, &alice(), "g").unwrap();
        nft.set_data(42, 10, 20, "holder-note", NftDataKind::HolderData)
            .unwrap();
        assert_eq!(
            nft.value_of(42, 15, NftDataKind::HolderData).unwrap().unwrap(),
            "holder-note"
        );
        assert!(nft.value_of(42, 9, NftDataKind::HolderData).unwrap().is_none());
    }

    #[test]
    fn rollback_restores_preimages() {
        let mut nft = test_store();
        nft.create_tokens(42, 100, &alice(), "a").unwrap();
        nft.write_block_cache(100).unwrap();

        nft.move_tokens(42, 40, 60, &alice(), &bob()).unwrap();
        nft.write_block_cache(101).unwrap();

        nft.rollback_above(101).unwrap();
        assert_eq!(
            nft.ranges(42).unwrap(),
            vec![("1Alice".to_string(), 1, 100)]
        );

        nft.rollback_above(100).unwrap();
        assert!(nft.ranges(42).unwrap().is_empty());
        assert_eq!(nft.highest_range_end(42).unwrap(), 0);
    }

    #[test]
    fn totals_track_highest_end_per_property() {
        let mut nft = test_store();
        nft.create_tokens(42, 100, &alice(), "a").unwrap();
        nft.create_tokens(43, 7, &bob(), "b").unwrap();
        let totals = nft.totals().unwrap();
        assert_eq!(totals.get(&42), Some(&100));
        assert_eq!(totals.get(&43), Some(&7));
    }
}
