//! Keyed Store
//!
//! Ordered key→value persistence for the protocol databases. One `sled::Db`
//! backs a data directory; every logical database opens its own named
//! [`Table`] (a sled tree). Tables support point reads/writes, atomic
//! batches, forward prefix scans and newest-first scans via complemented key
//! encodings (see [`keys`]).
//!
//! The store carries a database-version guard: when the on-disk version does
//! not match the binary's `DB_VERSION`, every table is dropped so the node is
//! forced to rebuild from the chain.
//!
//! Writers and iterating readers never run concurrently: all mutation
//! happens on the block-pipeline thread, so a forward scan observes a
//! consistent view for its whole lifetime.

pub mod keys;

use std::path::Path;

use sled::IVec;
use thiserror::Error;

/// On-disk database format version. Changing any table prefix or key layout
/// requires bumping this value, which wipes the store on next open.
pub const DB_VERSION: u32 = 8;

const META_TREE: &str = "meta";
const META_DB_VERSION: &[u8] = b"db_version";

/// Storage error
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupted record in table {table}: {reason}")]
    Corrupted { table: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Serialize a value for storage.
pub fn to_value<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Deserialize a stored value.
pub fn from_value<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

// =============================================================================
// STORE
// =============================================================================

/// A store owning all tables under one data directory.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
}

impl Store {
    /// Open (or create) the store at the given path.
    ///
    /// If `wipe` is set, or the persisted `DB_VERSION` differs from this
    /// binary's, every table is dropped before returning.
    pub fn open<P: AsRef<Path>>(path: P, wipe: bool) -> StoreResult<Self> {
        let db = sled::open(path)?;
        let store = Store { db };
        let stored = store.stored_version()?;
        if wipe || stored != Some(DB_VERSION) {
            store.clear_all()?;
            store.write_version()?;
        }
        Ok(store)
    }

    /// Open a temporary in-memory store (tests only).
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let store = Store { db };
        store.write_version()?;
        Ok(store)
    }

    /// Open a named table.
    pub fn table(&self, name: &str) -> StoreResult<Table> {
        let tree = self.db.open_tree(name)?;
        Ok(Table {
            tree,
            name: name.to_string(),
        })
    }

    /// Drop every table and reset the version marker. Used on `-startclean`
    /// and on database-version mismatch.
    pub fn clear_all(&self) -> StoreResult<()> {
        let names: Vec<IVec> = self.db.tree_names();
        for name in names {
            if name.as_ref() == b"__sled__default" {
                continue;
            }
            self.db.drop_tree(&name)?;
        }
        self.db.clear()?;
        self.write_version()?;
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn stored_version(&self) -> StoreResult<Option<u32>> {
        let meta = self.db.open_tree(META_TREE)?;
        match meta.get(META_DB_VERSION)? {
            Some(bytes) if bytes.len() == 4 => {
                Ok(Some(u32::from_be_bytes(bytes.as_ref().try_into().unwrap())))
            }
            Some(_) => Ok(None),
            None => Ok(None),
        }
    }

    fn write_version(&self) -> StoreResult<()> {
        let meta = self.db.open_tree(META_TREE)?;
        meta.insert(META_DB_VERSION, &DB_VERSION.to_be_bytes())?;
        Ok(())
    }
}

// =============================================================================
// TABLE
// =============================================================================

/// A single logical database (sled tree) with ordered byte keys.
#[derive(Clone)]
pub struct Table {
    tree: sled::Tree,
    name: String,
}

impl Table {
    /// Table name, as opened.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point read.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<IVec>> {
        Ok(self.tree.get(key)?)
    }

    /// Point read with value deserialization.
    pub fn get_value<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> StoreResult<Option<T>> {
        match self.tree.get(key)? {
            Some(bytes) => {
                let value = from_value(&bytes).map_err(|e| StoreError::Corrupted {
                    table: self.name.clone(),
                    reason: e.to_string(),
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Point write.
    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    /// Point write with value serialization.
    pub fn put_value<T: serde::Serialize>(&self, key: &[u8], value: &T) -> StoreResult<()> {
        self.tree.insert(key, to_value(value)?)?;
        Ok(())
    }

    /// Point delete.
    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    /// Whether any key starts with the given prefix.
    pub fn contains_prefix(&self, prefix: &[u8]) -> StoreResult<bool> {
        Ok(self.first_with_prefix(prefix)?.is_some())
    }

    /// First entry (lowest key) whose key starts with the given prefix.
    ///
    /// With complement-encoded block fields this is the newest entry.
    pub fn first_with_prefix(&self, prefix: &[u8]) -> StoreResult<Option<(IVec, IVec)>> {
        match self.tree.scan_prefix(prefix).next() {
            Some(entry) => Ok(Some(entry?)),
            None => Ok(None),
        }
    }

    /// Forward scan over all entries whose key starts with the given prefix.
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
    ) -> impl Iterator<Item = StoreResult<(IVec, IVec)>> + '_ {
        self.tree
            .scan_prefix(prefix)
            .map(|entry| entry.map_err(StoreError::from))
    }

    /// Forward scan over the whole table.
    pub fn scan_all(&self) -> impl Iterator<Item = StoreResult<(IVec, IVec)>> + '_ {
        self.tree.iter().map(|entry| entry.map_err(StoreError::from))
    }

    /// Apply a batch atomically. On failure the table is unchanged.
    pub fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        self.tree.apply_batch(batch.inner)?;
        Ok(())
    }

    /// Delete every entry. Used on `-startclean`.
    pub fn clear(&self) -> StoreResult<()> {
        self.tree.clear()?;
        Ok(())
    }

    /// Number of entries (scans; diagnostics only).
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

// =============================================================================
// WRITE BATCH
// =============================================================================

/// A set of writes applied atomically to one table.
#[derive(Default)]
pub struct WriteBatch {
    inner: sled::Batch,
    ops: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.inner.insert(key, value);
        self.ops += 1;
    }

    pub fn put_value<T: serde::Serialize>(&mut self, key: &[u8], value: &T) -> StoreResult<()> {
        self.inner.insert(key, to_value(value)?);
        self.ops += 1;
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.inner.remove(key);
        self.ops += 1;
    }

    /// Number of buffered operations.
    pub fn len(&self) -> usize {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops == 0
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_temporary_and_roundtrip() {
        let store = Store::open_temporary().unwrap();
        let table = store.table("txlist").unwrap();

        table.put(b"a", b"1").unwrap();
        table.put_value(b"b", &42u64).unwrap();

        assert_eq!(table.get(b"a").unwrap().unwrap().as_ref(), b"1");
        assert_eq!(table.get_value::<u64>(b"b").unwrap(), Some(42));
        assert!(table.get(b"c").unwrap().is_none());
    }

    #[test]
    fn prefix_scan_stops_at_boundary() {
        let store = Store::open_temporary().unwrap();
        let table = store.table("t").unwrap();

        table.put(&[1, 0, 1], b"x").unwrap();
        table.put(&[1, 0, 2], b"y").unwrap();
        table.put(&[1, 1, 0], b"z").unwrap();
        table.put(&[2, 0, 0], b"w").unwrap();

        let hits: Vec<_> = table
            .scan_prefix(&[1, 0])
            .map(|e| e.unwrap().1.to_vec())
            .collect();
        assert_eq!(hits, vec![b"x".to_vec(), b"y".to_vec()]);
    }

    #[test]
    fn first_with_prefix_is_newest_under_complement_encoding() {
        let store = Store::open_temporary().unwrap();
        let table = store.table("fees").unwrap();

        let key = |block: u32| {
            let mut k = vec![b'c'];
            keys::push_varint(&mut k, 31);
            k.extend_from_slice(&keys::be_u32_desc(block));
            k
        };
        table.put_value(&key(100), &10i64).unwrap();
        table.put_value(&key(200), &25i64).unwrap();
        table.put_value(&key(150), &17i64).unwrap();

        let mut prefix = vec![b'c'];
        keys::push_varint(&mut prefix, 31);
        let (_, value) = table.first_with_prefix(&prefix).unwrap().unwrap();
        assert_eq!(from_value::<i64>(&value).unwrap(), 25);
    }

    #[test]
    fn batch_is_atomic() {
        let store = Store::open_temporary().unwrap();
        let table = store.table("t").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"k1", b"v1");
        batch.put(b"k2", b"v2");
        batch.delete(b"k3");
        assert_eq!(batch.len(), 3);
        table.apply(batch).unwrap();

        assert!(table.get(b"k1").unwrap().is_some());
        assert!(table.get(b"k2").unwrap().is_some());
    }

    #[test]
    fn clear_empties_table() {
        let store = Store::open_temporary().unwrap();
        let table = store.table("t").unwrap();
        table.put(b"a", b"1").unwrap();
        table.clear().unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn version_mismatch_wipes() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = Store::open(dir.path(), false).unwrap();
            let table = store.table("props").unwrap();
            table.put(b"key", b"value").unwrap();
            store.flush().unwrap();

            // fake an old on-disk version
            let meta = store.db.open_tree(META_TREE).unwrap();
            meta.insert(META_DB_VERSION, &(DB_VERSION - 1).to_be_bytes())
                .unwrap();
            store.flush().unwrap();
        }

        let store = Store::open(dir.path(), false).unwrap();
        let table = store.table("props").unwrap();
        assert!(table.get(b"key").unwrap().is_none());
    }

    #[test]
    fn startclean_wipes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path(), false).unwrap();
            store.table("t").unwrap().put(b"a", b"1").unwrap();
            store.flush().unwrap();
        }
        let store = Store::open(dir.path(), true).unwrap();
        assert!(store.table("t").unwrap().get(b"a").unwrap().is_none());
    }
}
