//! Reorganization Controller
//!
//! When the host disconnects blocks, the controller decides between a
//! rewind to the newest usable checkpoint snapshot and a full rescan from
//! genesis. A reorganization that touches any freeze-related transaction
//! always forces the full rescan, because freeze state is not block-
//! reversible.
//!
//! The decision is deterministic given the disconnect heights and the set
//! of persisted snapshots.

use crate::activation::ActivationState;
use crate::context::{CoreContext, CoreResult, OmniState};
use crate::snapshot::Snapshot;
use crate::types::BlockHeight;

impl CoreContext {
    /// Resolve a pending disconnect: rewind or full rescan. The caller
    /// replays forward afterwards (the tip is left at the restored height,
    /// or `None` for a rescan from genesis).
    pub(crate) fn execute_rewind(&mut self) -> CoreResult<()> {
        let disconnect_height = match self.pending_disconnect.take() {
            Some(height) => height,
            None => return Ok(()),
        };
        let target = disconnect_height.saturating_sub(1);

        if self
            .dbs
            .txlist
            .contains_freeze_txs_at_or_above(disconnect_height)?
        {
            tracing::warn!(
                disconnect_height,
                "reorganization contains freeze transactions, forcing a rescan"
            );
            return self.clear_all_state();
        }

        match self.snapshots.load_newest_at_or_below(target)? {
            Some(snapshot) => {
                tracing::info!(
                    disconnect_height,
                    restored = snapshot.height,
                    "rewinding to checkpoint"
                );
                self.restore_from_snapshot(snapshot)
            }
            None => {
                tracing::warn!(
                    disconnect_height,
                    "no usable checkpoint below the reorganization, forcing a rescan"
                );
                self.clear_all_state()
            }
        }
    }

    /// Load a snapshot into memory and roll every database back to its
    /// height.
    pub(crate) fn restore_from_snapshot(&mut self, snapshot: Snapshot) -> CoreResult<()> {
        let height = snapshot.height;
        let cutoff: BlockHeight = height + 1;

        self.dbs.txlist.delete_above(cutoff)?;
        self.dbs.tradelist.delete_above(cutoff)?;
        self.dbs.stolist.delete_above(cutoff)?;
        self.dbs.registry.rollback_above(cutoff)?;
        self.dbs.nft.rollback_above(cutoff)?;
        self.dbs.fee_cache.rollback_above(cutoff)?;
        self.dbs.fee_history.rollback_above(cutoff)?;
        self.snapshots.delete_above(height)?;

        self.state = OmniState {
            tally: snapshot.tally,
            dex: snapshot.dex,
            metadex: snapshot.metadex,
            crowdsales: snapshot.crowdsales,
            freeze: snapshot.freeze,
            activations: snapshot.activations,
            exodus_reward_paid: snapshot.exodus_reward_paid,
        };
        self.dbs.registry.set_watermark(height, &snapshot.block_hash)?;
        self.tip = Some(height);
        self.last_block_hash = snapshot.block_hash;
        Ok(())
    }

    /// Drop everything; the next connect replays from genesis.
    pub(crate) fn clear_all_state(&mut self) -> CoreResult<()> {
        self.state = OmniState {
            activations: ActivationState::with_defaults(&self.params),
            ..OmniState::default()
        };
        self.dbs.txlist.clear()?;
        self.dbs.tradelist.clear()?;
        self.dbs.stolist.clear()?;
        self.dbs.registry.clear()?;
        self.dbs.nft.clear()?;
        self.dbs.fee_cache.clear()?;
        self.dbs.fee_history.clear()?;
        self.snapshots.clear()?;
        self.tip = None;
        self.last_block_hash = crate::types::BlockHash::default();
        tracing::info!("all protocol state cleared");
        Ok(())
    }

    /// Startup path: restore the newest snapshot consistent with the
    /// databases' watermark. Returns the restored tip, or `None` when a
    /// from-genesis scan is needed.
    pub fn restore_from_disk(&mut self) -> CoreResult<Option<BlockHeight>> {
        let watermark = match self.dbs.registry.watermark()? {
            Some((height, _)) => height,
            None => {
                tracing::info!("no watermark, starting from genesis");
                return Ok(None);
            }
        };
        match self.snapshots.load_newest_at_or_below(watermark)? {
            Some(snapshot) => {
                let height = snapshot.height;
                self.restore_from_snapshot(snapshot)?;
                tracing::info!(height, watermark, "state restored from checkpoint");
                Ok(Some(height))
            }
            None => {
                tracing::info!(watermark, "no usable checkpoint, rescanning");
                self.clear_all_state()?;
                Ok(None)
            }
        }
    }
}
