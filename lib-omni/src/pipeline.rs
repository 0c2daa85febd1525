//! Block Pipeline
//!
//! Drives the state machine block by block: begin (live activations,
//! crowdsale expiry), per-transaction parse + interpret + record, end
//! (accept expiry, developer reward, alert expiry, consensus hash, NFT
//! sanity check, checkpoint verification, periodic persistence).
//!
//! All mutation happens here, single-threaded, in host-block order.

use std::time::Instant;

use crate::consensus_hash::{consensus_hash, verify_checkpoint};
use crate::context::{CoreContext, CoreError, CoreResult};
use crate::dbs::txlist::TxRecord;
use crate::host::{ChainView, CoinView, HostBlock, HostEvent, HostTransaction};
use crate::parser::{self, ParseError};
use crate::reason::ERR_GENERAL;
use crate::seedblocks;
use crate::snapshot::Snapshot;
use crate::types::{Amount, BlockHeight, Bucket, PROPERTY_OMNI};

/// Persist the in-memory state every N blocks once synced.
pub const STORE_EVERY_N_BLOCK: BlockHeight = 100;
/// Persist every N blocks during initial block download.
pub const STORE_EVERY_N_BLOCK_IDB: BlockHeight = 10_000;
/// On mainnet, skip persisting below this height unless overridden.
pub const DONT_STORE_MAINNET_STATE_UNTIL: BlockHeight = 770_000;

/// Reason code recorded for payloads that failed to decode.
const PARSE_ERROR_CODE: i32 = ERR_GENERAL - 20;

/// Seconds per Julian year, the developer-reward vesting unit.
const SECONDS_PER_YEAR: f64 = 31_556_952.0;

impl CoreContext {
    /// Feed one host event. Connect events need the chain for catch-up
    /// replay after a rewind or a restart.
    pub fn handle_event<C: ChainView + CoinView>(
        &mut self,
        event: HostEvent,
        chain: &C,
    ) -> CoreResult<()> {
        match event {
            HostEvent::BlockConnected(block) => self.connect_block(&block, chain),
            HostEvent::BlockDisconnected(block) => {
                self.handle_disconnect(&block);
                Ok(())
            }
            HostEvent::TxAdded(tx) => {
                self.marker_cache.try_add(&tx);
                Ok(())
            }
            HostEvent::TxRemoved(txid) => {
                self.marker_cache.remove(&txid);
                Ok(())
            }
            HostEvent::ShutdownRequested => {
                self.request_shutdown();
                Ok(())
            }
        }
    }

    /// Record a host disconnect; the rewind happens lazily on the next
    /// connect so a multi-block disconnect sequence rewinds once.
    pub fn handle_disconnect(&mut self, block: &HostBlock) {
        tracing::info!(height = block.height, "host block disconnected");
        self.pending_disconnect = Some(
            self.pending_disconnect
                .map_or(block.height, |h| h.min(block.height)),
        );
    }

    /// Connect a block: resolve any pending rewind, replay forward to close
    /// a gap, then process the block itself.
    pub fn connect_block<C: ChainView + CoinView>(
        &mut self,
        block: &HostBlock,
        chain: &C,
    ) -> CoreResult<()> {
        if self.pending_disconnect.is_some() {
            self.execute_rewind()?;
        }
        self.initial_sync = chain.is_initial_sync();

        if let Some(tip) = self.tip {
            if block.height <= tip {
                tracing::warn!(height = block.height, tip, "ignoring stale block connect");
                return Ok(());
            }
        }

        let start = self
            .tip
            .map(|t| t + 1)
            .unwrap_or(self.params.genesis_block);
        if block.height > start {
            self.replay_range(chain, start, block.height - 1)?;
        }
        if self.shutdown_requested {
            return Ok(());
        }
        self.apply_block(block, chain)
    }

    /// Replay a range of blocks from the chain view (startup catch-up and
    /// post-rewind resync), honoring shutdown requests at block boundaries.
    pub fn replay_range<C: ChainView + CoinView>(
        &mut self,
        chain: &C,
        from: BlockHeight,
        to: BlockHeight,
    ) -> CoreResult<()> {
        if from > to {
            return Ok(());
        }
        tracing::info!(from, to, "scanning for transactions");
        for height in from..=to {
            if self.shutdown_requested {
                tracing::info!(height, to, "shutdown requested, stopping scan");
                break;
            }
            let block = match chain.block_at(height) {
                Some(block) => block,
                None => break,
            };
            self.report_progress(height, to);
            self.apply_block(&block, chain)?;
        }
        tracing::info!(
            txs = self.txs_scanned,
            meta_txs = self.meta_txs_found,
            "scan finished"
        );
        Ok(())
    }

    fn report_progress(&mut self, height: BlockHeight, last: BlockHeight) {
        let due = match self.last_progress {
            Some(at) => at.elapsed().as_secs() >= self.options.progress_frequency_secs,
            None => true,
        };
        if due {
            let progress = if last > 0 {
                100.0 * f64::from(height) / f64::from(last)
            } else {
                100.0
            };
            tracing::info!(
                "Still scanning.. at block {} of {}. Progress: {:.2} %",
                height,
                last,
                progress
            );
            self.last_progress = Some(Instant::now());
        }
    }

    /// Process one block through begin / transactions / end.
    fn apply_block<V: CoinView>(&mut self, block: &HostBlock, view: &V) -> CoreResult<()> {
        self.begin_block(block);

        let mut meta_txs = 0u32;
        let skip = self.options.seed_block_filter
            && seedblocks::skip_block(self.params.network, block.height);
        if !skip {
            for (idx, tx) in block.transactions.iter().enumerate() {
                if self.shutdown_requested {
                    self.dbs.nft.discard_block_cache();
                    return Ok(());
                }
                self.txs_scanned += 1;
                if self.process_transaction(tx, view, block.height, idx as u32, block.time)? {
                    meta_txs += 1;
                    self.meta_txs_found += 1;
                }
            }
        }

        self.end_block(block, meta_txs)
    }

    /// Block-begin: apply features going live and expire crowdsales.
    fn begin_block(&mut self, block: &HostBlock) {
        self.state.activations.check_live(block.height);

        let expired = self.state.crowdsales.expired(block.time);
        for property in expired {
            tracing::info!(property, "crowdsale deadline passed");
            if let Err(e) =
                self.close_crowdsale_internal(property, block.time, false, block.height)
            {
                tracing::error!(property, error = %e, "failed to close expired crowdsale");
            }
        }
    }

    /// Parse, interpret and record one transaction. Returns whether a
    /// protocol transaction (or DEx payment) was found.
    fn process_transaction<V: CoinView>(
        &mut self,
        tx: &HostTransaction,
        view: &V,
        height: BlockHeight,
        idx: u32,
        block_time: u64,
    ) -> CoreResult<bool> {
        self.marker_cache.remove(&tx.txid);

        let meta = match parser::parse(tx, view, &self.params, height, idx) {
            Ok(meta) => meta,
            Err(ParseError::NotProtocolTx) => {
                return self.handle_dex_payment(tx, view, height);
            }
            Err(ParseError::NoSender) => {
                tracing::debug!(txid = %tx.txid, "payload marker without resolvable sender");
                return Ok(false);
            }
            Err(ParseError::Malformed { ty, source }) => {
                tracing::debug!(txid = %tx.txid, error = %source, "malformed payload");
                if let Some(ty) = ty {
                    self.dbs.txlist.record_tx(
                        &tx.txid,
                        &TxRecord {
                            block: height,
                            idx,
                            valid: false,
                            type_code: ty,
                            amount: 0,
                            reason_code: PARSE_ERROR_CODE,
                            subsends: Vec::new(),
                        },
                    )?;
                }
                return Ok(true);
            }
        };

        let tx_type = meta.payload.transaction_type();
        let type_code = tx_type.code();
        let outcome = self.interpret(&meta, block_time)?;
        let record = match &outcome {
            Ok(valid) => TxRecord {
                block: height,
                idx,
                valid: true,
                type_code,
                amount: valid.amount,
                reason_code: 0,
                subsends: valid.subsends.clone(),
            },
            Err(reject) => {
                tracing::debug!(
                    txid = %tx.txid,
                    tx_type = tx_type.label(),
                    reason = reject.code(),
                    "transaction rejected"
                );
                TxRecord {
                    block: height,
                    idx,
                    valid: false,
                    type_code,
                    amount: 0,
                    reason_code: reject.code(),
                    subsends: Vec::new(),
                }
            }
        };
        self.dbs.txlist.record_tx(&tx.txid, &record)?;
        Ok(true)
    }

    /// Block-end: expiries, developer reward, consensus hash, sanity and
    /// checkpoint checks, periodic persistence.
    fn end_block(&mut self, block: &HostBlock, meta_txs: u32) -> CoreResult<()> {
        let height = block.height;

        let erased = self.expire_dex_accepts(height)?;
        if erased > 0 {
            tracing::info!(height, erased, "expired unpaid accepts");
        }

        self.update_dev_reward(block.time)?;
        self.state.activations.check_expired_alerts(height);

        let hash = self.current_consensus_hash()?;
        if self
            .options
            .debug_enabled(crate::config::DebugCategory::ConsensusHash)
        {
            tracing::info!(height, hash = %hex::encode(hash), "consensus hash");
        }

        self.nft_sanity_check()?;
        self.dbs.nft.write_block_cache(height)?;

        if !verify_checkpoint(&self.params, height, &hash) {
            tracing::error!(
                height,
                hash = %hex::encode(hash),
                "consensus hash does not match the baked-in checkpoint; \
                 restart with -startclean"
            );
            return Err(CoreError::CheckpointMismatch { height });
        }

        self.dbs.registry.set_watermark(height, &block.hash)?;
        self.tip = Some(height);
        self.last_block_hash = block.hash;

        if meta_txs > 0 {
            tracing::info!(height, meta_txs, "block processed");
        }

        self.persist_if_due(block, hash)?;
        Ok(())
    }

    /// Compare NFT range totals against the tally; a mismatch means the two
    /// stores diverged and the node cannot be trusted.
    fn nft_sanity_check(&self) -> CoreResult<()> {
        for (property, total) in self.dbs.nft.totals()? {
            let tally_total = self.state.tally.total(property);
            if tally_total != total {
                return Err(CoreError::Inconsistency(format!(
                    "NFT sanity check failed on property {} ({} != {})",
                    property, tally_total, total
                )));
            }
        }
        Ok(())
    }

    /// Credit the time-vested developer reward to the exodus address.
    fn update_dev_reward(&mut self, block_time: u64) -> CoreResult<Amount> {
        if block_time <= self.params.exodus_reward_start {
            return Ok(0);
        }
        let years =
            (block_time - self.params.exodus_reward_start) as f64 / SECONDS_PER_YEAR;
        let vested =
            (self.params.exodus_reward_total as f64 * (1.0 - 0.5f64.powf(years))).round() as Amount;
        let delta = vested - self.state.exodus_reward_paid;
        if delta <= 0 {
            return Ok(0);
        }
        let exodus = self.params.exodus_address.clone();
        self.state
            .tally
            .credit(&exodus, PROPERTY_OMNI, delta, Bucket::Available)
            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
        self.state.exodus_reward_paid = vested;
        Ok(delta)
    }

    fn persist_if_due(&mut self, block: &HostBlock, state_hash: [u8; 32]) -> CoreResult<()> {
        let height = block.height;
        let interval = if self.initial_sync {
            STORE_EVERY_N_BLOCK_IDB
        } else {
            STORE_EVERY_N_BLOCK
        };
        if height % interval != 0 {
            return Ok(());
        }
        if self.params.is_main_net()
            && !self.options.skip_storing_state
            && height < DONT_STORE_MAINNET_STATE_UNTIL
        {
            return Ok(());
        }
        self.persist_state(block.hash, state_hash)
    }

    /// Serialize the in-memory state into a checkpoint snapshot.
    pub fn persist_state(
        &mut self,
        block_hash: crate::types::BlockHash,
        state_hash: [u8; 32],
    ) -> CoreResult<()> {
        let height = match self.tip {
            Some(height) => height,
            None => return Ok(()),
        };
        let mut snapshot = Snapshot::new(height, block_hash, state_hash);
        snapshot.tally = self.state.tally.clone();
        snapshot.dex = self.state.dex.clone();
        snapshot.metadex = self.state.metadex.clone();
        snapshot.crowdsales = self.state.crowdsales.clone();
        snapshot.freeze = self.state.freeze.clone();
        snapshot.activations = self.state.activations.clone();
        snapshot.exodus_reward_paid = self.state.exodus_reward_paid;
        self.snapshots.write(&snapshot)?;
        Ok(())
    }

    /// Persist on shutdown regardless of cadence.
    pub fn persist_on_shutdown(&mut self) -> CoreResult<()> {
        let hash = self.current_consensus_hash()?;
        self.persist_state(self.last_block_hash, hash)
    }

    /// The consensus hash over the current state.
    pub fn current_consensus_hash(&self) -> CoreResult<[u8; 32]> {
        Ok(consensus_hash(
            &self.state.tally,
            &self.dbs.registry,
            &self.state.metadex,
            &self.state.dex,
            &self.state.freeze,
        )?)
    }
}
