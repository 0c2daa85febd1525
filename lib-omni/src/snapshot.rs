//! Checkpoint Snapshots
//!
//! Periodic serialization of the in-memory state (tally, exchanges,
//! crowdsales, freezing, activations) so a restart or reorg restores from
//! the newest snapshot at or below the target height instead of rescanning
//! from genesis. Files are written to a temp name and renamed into place;
//! old snapshots are pruned.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activation::ActivationState;
use crate::crowdsale::CrowdsaleMap;
use crate::dex::DexState;
use crate::freeze::FreezeState;
use crate::metadex::MetaDexBook;
use crate::tally::TallyMap;
use crate::types::{Amount, BlockHash, BlockHeight};

/// Snapshot format version; bump on layout changes.
const SNAPSHOT_VERSION: u32 = 1;

/// Snapshots retained before pruning.
const MAX_SNAPSHOTS: usize = 50;

/// Snapshot error
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// The serialized in-memory state at a checkpoint block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub height: BlockHeight,
    pub block_hash: BlockHash,
    /// Consensus hash at this height, for integrity verification after
    /// restore.
    pub state_hash: [u8; 32],
    pub tally: TallyMap,
    pub dex: DexState,
    pub metadex: MetaDexBook,
    pub crowdsales: CrowdsaleMap,
    pub freeze: FreezeState,
    pub activations: ActivationState,
    /// Developer reward credited to the exodus address so far.
    pub exodus_reward_paid: Amount,
}

impl Snapshot {
    pub fn new(height: BlockHeight, block_hash: BlockHash, state_hash: [u8; 32]) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            height,
            block_hash,
            state_hash,
            tally: TallyMap::new(),
            dex: DexState::new(),
            metadex: MetaDexBook::new(),
            crowdsales: CrowdsaleMap::new(),
            freeze: FreezeState::new(),
            activations: ActivationState::new(),
            exodus_reward_paid: 0,
        }
    }
}

/// Directory of persisted snapshots.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (creating) the snapshot directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> SnapshotResult<Self> {
        fs::create_dir_all(&dir)?;
        Ok(SnapshotStore {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn file_name(height: BlockHeight) -> String {
        format!("state-{:010}.dat", height)
    }

    fn parse_height(name: &str) -> Option<BlockHeight> {
        name.strip_prefix("state-")?
            .strip_suffix(".dat")?
            .parse()
            .ok()
    }

    /// Persist a snapshot atomically (temp-write then rename), then prune.
    pub fn write(&self, snapshot: &Snapshot) -> SnapshotResult<()> {
        let bytes = bincode::serialize(snapshot)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        let final_path = self.dir.join(Self::file_name(snapshot.height));
        let tmp_path = self.dir.join(format!(
            "{}.tmp",
            Self::file_name(snapshot.height)
        ));
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;

        tracing::debug!(
            height = snapshot.height,
            bytes = bytes.len(),
            "persisted state snapshot"
        );
        self.prune()?;
        Ok(())
    }

    /// Heights of all persisted snapshots, ascending.
    pub fn heights(&self) -> SnapshotResult<Vec<BlockHeight>> {
        let mut heights = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(height) = Self::parse_height(name) {
                    heights.push(height);
                }
            }
        }
        heights.sort_unstable();
        Ok(heights)
    }

    /// Load the newest snapshot with height ≤ `max_height`.
    pub fn load_newest_at_or_below(
        &self,
        max_height: BlockHeight,
    ) -> SnapshotResult<Option<Snapshot>> {
        let heights = self.heights()?;
        for height in heights.into_iter().rev() {
            if height > max_height {
                continue;
            }
            match self.load(height) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) => {
                    // an unreadable snapshot is skipped, older ones may work
                    tracing::warn!(height, error = %e, "skipping unreadable snapshot");
                }
            }
        }
        Ok(None)
    }

    /// Load the snapshot at exactly `height`.
    pub fn load(&self, height: BlockHeight) -> SnapshotResult<Snapshot> {
        let bytes = fs::read(self.dir.join(Self::file_name(height)))?;
        let snapshot: Snapshot = bincode::deserialize(&bytes)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }

    /// Delete snapshots above `height` (reorg) — the rewind target must not
    /// resurrect.
    pub fn delete_above(&self, height: BlockHeight) -> SnapshotResult<()> {
        for h in self.heights()? {
            if h > height {
                fs::remove_file(self.dir.join(Self::file_name(h)))?;
            }
        }
        Ok(())
    }

    /// Remove everything (forced rescans).
    pub fn clear(&self) -> SnapshotResult<()> {
        for h in self.heights()? {
            fs::remove_file(self.dir.join(Self::file_name(h)))?;
        }
        Ok(())
    }

    fn prune(&self) -> SnapshotResult<()> {
        let heights = self.heights()?;
        if heights.len() > MAX_SNAPSHOTS {
            for h in &heights[..heights.len() - MAX_SNAPSHOTS] {
                fs::remove_file(self.dir.join(Self::file_name(*h)))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, Bucket};

    fn snapshot(height: BlockHeight) -> Snapshot {
        let mut s = Snapshot::new(height, BlockHash::new([height as u8; 32]), [0; 32]);
        s.tally
            .credit(&Address::new("1A"), 31, 100, Bucket::Available)
            .unwrap();
        s
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        store.write(&snapshot(100)).unwrap();
        let loaded = store.load(100).unwrap();
        assert_eq!(loaded.height, 100);
        assert_eq!(loaded.tally.balance(&Address::new("1A"), 31, Bucket::Available), 100);
    }

    #[test]
    fn newest_at_or_below() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.write(&snapshot(100)).unwrap();
        store.write(&snapshot(200)).unwrap();
        store.write(&snapshot(300)).unwrap();

        assert_eq!(
            store.load_newest_at_or_below(250).unwrap().unwrap().height,
            200
        );
        assert_eq!(
            store.load_newest_at_or_below(99).unwrap().map(|s| s.height),
            None
        );
        assert_eq!(
            store.load_newest_at_or_below(1000).unwrap().unwrap().height,
            300
        );
    }

    #[test]
    fn delete_above_removes_newer() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.write(&snapshot(100)).unwrap();
        store.write(&snapshot(200)).unwrap();

        store.delete_above(150).unwrap();
        assert_eq!(store.heights().unwrap(), vec![100]);
    }

    #[test]
    fn prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        for h in 1..=(MAX_SNAPSHOTS as u32 + 5) {
            store.write(&snapshot(h)).unwrap();
        }
        let heights = store.heights().unwrap();
        assert_eq!(heights.len(), MAX_SNAPSHOTS);
        assert_eq!(*heights.first().unwrap(), 6);
    }
}
