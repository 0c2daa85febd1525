//! Exchange handlers: MetaDEx trades and cancels, DEx-1 offers, accepts and
//! native-coin payments, and the trading-fee accrual.

use crate::context::{CoreContext, CoreError, CoreResult};
use crate::dbs::tradelist::{MatchRecord, OrderRecord};
use crate::dbs::txlist::PaymentRecord;
use crate::dex::{SellOffer, DEX_ACTION_CANCEL, DEX_ACTION_NEW, DEX_ACTION_UPDATE};
use crate::fees::distribution_threshold;
use crate::interpreter::{Outcome, ValidOutcome};
use crate::metadex::Order;
use crate::parser::MetaTx;
use crate::reason::Reject;
use crate::rules::FEATURE_FEES;
use crate::sto::distribution_receivers;
use crate::types::{
    Address, Amount, BlockHeight, Bucket, Ecosystem, PropertyId, PROPERTY_OMNI, PROPERTY_TOMNI,
};

/// Taker fee denominator: 0.05 % of the received amount.
const TAKER_FEE_DIVISOR: Amount = 2000;

impl CoreContext {
    // =========================================================================
    // METADEX
    // =========================================================================

    pub(crate) fn exec_metadex_trade(
        &mut self,
        tx: &MetaTx,
        property_for_sale: PropertyId,
        amount_for_sale: Amount,
        property_desired: PropertyId,
        amount_desired: Amount,
    ) -> CoreResult<Outcome> {
        if amount_for_sale <= 0 || amount_desired <= 0 {
            return Ok(Err(Reject::MetaDexAmountInvalid));
        }
        if property_for_sale == property_desired {
            return Ok(Err(Reject::MetaDexSameProperty));
        }
        if !self.dbs.registry.has(property_for_sale)? || !self.dbs.registry.has(property_desired)?
        {
            return Ok(Err(Reject::MetaDexPropertyNotFound));
        }
        if Ecosystem::of(property_for_sale) != Ecosystem::of(property_desired) {
            return Ok(Err(Reject::MetaDexCrossEcosystem));
        }
        if self.sender_frozen(&tx.sender, property_for_sale, tx.block) {
            return Ok(Err(Reject::SendFrozenSender));
        }
        if !self.state.tally.can_debit(
            &tx.sender,
            property_for_sale,
            amount_for_sale,
            Bucket::Available,
        ) {
            return Ok(Err(Reject::MetaDexInsufficientBalance));
        }

        // commit the full offer into the reserve, then match
        self.state
            .tally
            .move_between(
                &tx.sender,
                property_for_sale,
                amount_for_sale,
                Bucket::Available,
                Bucket::MetaDexReserve,
            )
            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;

        let taker = Order {
            address: tx.sender.clone(),
            block: tx.block,
            idx: tx.idx,
            txid: tx.txid,
            property_for_sale,
            property_desired,
            amount_for_sale,
            amount_desired,
            amount_remaining: amount_for_sale,
        };
        self.dbs.tradelist.record_order(
            &tx.txid,
            &OrderRecord {
                address: tx.sender.clone(),
                property_for_sale,
                property_desired,
                block: tx.block,
                idx: tx.idx,
            },
        )?;

        let (matches, remaining) = self.state.metadex.match_order(&taker);
        for m in &matches {
            if m.taker_paid > 0 {
                // maker receives the taker's property out of the taker's reserve
                self.state
                    .tally
                    .debit(&tx.sender, property_for_sale, m.taker_paid, Bucket::MetaDexReserve)
                    .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                self.state
                    .tally
                    .credit(&m.maker.address, property_for_sale, m.taker_paid, Bucket::Available)
                    .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
            }
            if m.taker_received > 0 {
                // taker receives the maker's property, minus the taker fee
                self.state
                    .tally
                    .debit(
                        &m.maker.address,
                        property_desired,
                        m.taker_received,
                        Bucket::MetaDexReserve,
                    )
                    .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                let fee = self.taker_fee(property_desired, m.taker_received, tx.block);
                let taker_gets = m.taker_received - fee;
                if taker_gets > 0 {
                    self.state
                        .tally
                        .credit(&tx.sender, property_desired, taker_gets, Bucket::Available)
                        .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                }
                if fee > 0 {
                    self.accrue_trading_fee(property_desired, tx.block, fee)?;
                }
                self.dbs.tradelist.record_match(
                    tx.block,
                    &m.maker.txid,
                    &tx.txid,
                    &MatchRecord {
                        amount_maker: m.taker_paid,
                        amount_taker: taker_gets,
                        fee,
                    },
                )?;
            }
            if m.maker_refund > 0 {
                self.state
                    .tally
                    .move_between(
                        &m.maker.address,
                        m.maker.property_for_sale,
                        m.maker_refund,
                        Bucket::MetaDexReserve,
                        Bucket::Available,
                    )
                    .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
            }
        }

        if remaining > 0 {
            let mut residual = taker;
            residual.amount_remaining = remaining;
            self.state.metadex.insert(residual);
        }

        tracing::info!(
            txid = %tx.txid,
            sender = %tx.sender,
            property_for_sale,
            amount_for_sale,
            property_desired,
            amount_desired,
            matches = matches.len(),
            remaining,
            "metadex trade"
        );
        Ok(Ok(ValidOutcome::amount(amount_for_sale)))
    }

    fn refund_cancelled_orders(&mut self, orders: &[Order]) -> CoreResult<()> {
        for order in orders {
            if order.amount_remaining > 0 {
                self.state
                    .tally
                    .move_between(
                        &order.address,
                        order.property_for_sale,
                        order.amount_remaining,
                        Bucket::MetaDexReserve,
                        Bucket::Available,
                    )
                    .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub(crate) fn exec_metadex_cancel_price(
        &mut self,
        tx: &MetaTx,
        property_for_sale: PropertyId,
        amount_for_sale: Amount,
        property_desired: PropertyId,
        amount_desired: Amount,
    ) -> CoreResult<Outcome> {
        if amount_for_sale <= 0 || amount_desired <= 0 {
            return Ok(Err(Reject::MetaDexAmountInvalid));
        }
        let removed = self.state.metadex.cancel_at_price(
            &tx.sender,
            property_for_sale,
            amount_for_sale,
            property_desired,
            amount_desired,
        );
        if removed.is_empty() {
            return Ok(Err(Reject::MetaDexNoMatchingOrders));
        }
        self.refund_cancelled_orders(&removed)?;
        tracing::info!(txid = %tx.txid, cancelled = removed.len(), "metadex cancel at price");
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_metadex_cancel_pair(
        &mut self,
        tx: &MetaTx,
        property_for_sale: PropertyId,
        property_desired: PropertyId,
    ) -> CoreResult<Outcome> {
        let removed =
            self.state
                .metadex
                .cancel_pair(&tx.sender, property_for_sale, property_desired);
        if removed.is_empty() {
            return Ok(Err(Reject::MetaDexNoMatchingOrders));
        }
        self.refund_cancelled_orders(&removed)?;
        tracing::info!(txid = %tx.txid, cancelled = removed.len(), "metadex cancel pair");
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_metadex_cancel_ecosystem(
        &mut self,
        tx: &MetaTx,
        ecosystem: u8,
    ) -> CoreResult<Outcome> {
        let ecosystem = match Ecosystem::from_byte(ecosystem) {
            Some(ecosystem) => ecosystem,
            None => return Ok(Err(Reject::InvalidEcosystem)),
        };
        let removed = self.state.metadex.cancel_ecosystem(&tx.sender, ecosystem);
        if removed.is_empty() {
            return Ok(Err(Reject::MetaDexNoMatchingOrders));
        }
        self.refund_cancelled_orders(&removed)?;
        tracing::info!(txid = %tx.txid, cancelled = removed.len(), "metadex cancel ecosystem");
        Ok(Ok(ValidOutcome::default()))
    }

    // =========================================================================
    // TRADING FEES
    // =========================================================================

    /// The taker fee for a fill, zero while the fee system is not live or on
    /// protocol-token pairs.
    fn taker_fee(&self, property: PropertyId, received: Amount, block: BlockHeight) -> Amount {
        if !self.state.activations.is_active(FEATURE_FEES, block) {
            return 0;
        }
        if property == PROPERTY_OMNI || property == PROPERTY_TOMNI {
            return 0;
        }
        received / TAKER_FEE_DIVISOR
    }

    /// Park the fee at the exodus address, accrue it in the fee cache and
    /// distribute when the property crosses its threshold.
    pub(crate) fn accrue_trading_fee(
        &mut self,
        property: PropertyId,
        block: BlockHeight,
        fee: Amount,
    ) -> CoreResult<()> {
        let exodus = self.params.exodus_address.clone();
        self.state
            .tally
            .credit(&exodus, property, fee, Bucket::Available)
            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;

        let cached = self.dbs.fee_cache.add_fee(property, block, fee)?;
        let threshold = distribution_threshold(self.state.tally.total(property));
        if cached >= threshold {
            self.distribute_fee_cache(property, block)?;
        }
        Ok(())
    }

    /// Pay the cached fees out to holders of the ecosystem's protocol token.
    pub(crate) fn distribute_fee_cache(
        &mut self,
        property: PropertyId,
        block: BlockHeight,
    ) -> CoreResult<()> {
        let cached = self.dbs.fee_cache.cached_amount(property)?;
        if cached <= 0 {
            return Ok(());
        }

        let protocol_token = Ecosystem::of(property).protocol_token();
        // the distributor is the fee pool itself, not any holder
        let pool = Address::new("");
        let receivers =
            distribution_receivers(&self.state.tally, protocol_token, &pool, cached);

        let exodus = self.params.exodus_address.clone();
        let mut distributed: Amount = 0;
        for (recipient, share) in &receivers {
            self.state
                .tally
                .debit(&exodus, property, *share, Bucket::Available)
                .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
            self.state
                .tally
                .credit(recipient, property, *share, Bucket::Available)
                .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
            distributed += share;
        }

        self.dbs
            .fee_history
            .record_distribution(property, block, distributed, &receivers)?;
        self.dbs.fee_cache.clear_cache(property, block)?;
        tracing::info!(
            property,
            block,
            distributed,
            recipients = receivers.len(),
            "fee cache distributed"
        );
        Ok(())
    }

    // =========================================================================
    // DEX-1
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn exec_trade_offer(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        amount: Amount,
        native_desired: Amount,
        payment_window: u8,
        min_fee: Amount,
        action: u8,
    ) -> CoreResult<Outcome> {
        if !self.dbs.registry.has(property)? {
            return Ok(Err(Reject::SendPropertyNotFound));
        }

        match action {
            DEX_ACTION_NEW => {
                if amount <= 0 || native_desired <= 0 || payment_window == 0 {
                    return Ok(Err(Reject::DexOfferAmountInvalid));
                }
                if self.state.dex.has_offer(&tx.sender, property) {
                    return Ok(Err(Reject::DexOfferExists));
                }
                if self.sender_frozen(&tx.sender, property, tx.block) {
                    return Ok(Err(Reject::SendFrozenSender));
                }
                if !self
                    .state
                    .tally
                    .can_debit(&tx.sender, property, amount, Bucket::Available)
                {
                    return Ok(Err(Reject::DexOfferInsufficientBalance));
                }

                self.state
                    .tally
                    .move_between(&tx.sender, property, amount, Bucket::Available, Bucket::SellOffer)
                    .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                self.state.dex.insert_offer(SellOffer {
                    seller: tx.sender.clone(),
                    property,
                    amount_original: amount,
                    amount_available: amount,
                    native_desired,
                    min_fee,
                    payment_window,
                    txid: tx.txid,
                    block: tx.block,
                });
                tracing::info!(txid = %tx.txid, seller = %tx.sender, property, amount, "sell offer published");
                Ok(Ok(ValidOutcome::amount(amount)))
            }
            DEX_ACTION_UPDATE => {
                let old = match self.state.dex.remove_offer(&tx.sender, property) {
                    Some(offer) => offer,
                    None => return Ok(Err(Reject::DexOfferNotFound)),
                };
                if amount <= 0 || native_desired <= 0 || payment_window == 0 {
                    self.state.dex.insert_offer(old);
                    return Ok(Err(Reject::DexOfferAmountInvalid));
                }
                // release what was still open, then reserve the new amount
                if old.amount_available > 0 {
                    self.state
                        .tally
                        .move_between(
                            &tx.sender,
                            property,
                            old.amount_available,
                            Bucket::SellOffer,
                            Bucket::Available,
                        )
                        .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                }
                if !self
                    .state
                    .tally
                    .can_debit(&tx.sender, property, amount, Bucket::Available)
                {
                    // roll the release back and reject
                    if old.amount_available > 0 {
                        self.state
                            .tally
                            .move_between(
                                &tx.sender,
                                property,
                                old.amount_available,
                                Bucket::Available,
                                Bucket::SellOffer,
                            )
                            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                    }
                    self.state.dex.insert_offer(old);
                    return Ok(Err(Reject::DexOfferInsufficientBalance));
                }
                self.state
                    .tally
                    .move_between(&tx.sender, property, amount, Bucket::Available, Bucket::SellOffer)
                    .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                self.state.dex.insert_offer(SellOffer {
                    seller: tx.sender.clone(),
                    property,
                    amount_original: amount,
                    amount_available: amount,
                    native_desired,
                    min_fee,
                    payment_window,
                    txid: tx.txid,
                    block: tx.block,
                });
                tracing::info!(txid = %tx.txid, seller = %tx.sender, property, amount, "sell offer updated");
                Ok(Ok(ValidOutcome::amount(amount)))
            }
            DEX_ACTION_CANCEL => {
                let offer = match self.state.dex.remove_offer(&tx.sender, property) {
                    Some(offer) => offer,
                    None => return Ok(Err(Reject::DexOfferNotFound)),
                };
                if offer.amount_available > 0 {
                    self.state
                        .tally
                        .move_between(
                            &tx.sender,
                            property,
                            offer.amount_available,
                            Bucket::SellOffer,
                            Bucket::Available,
                        )
                        .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                }
                tracing::info!(txid = %tx.txid, seller = %tx.sender, property, "sell offer cancelled");
                Ok(Ok(ValidOutcome::default()))
            }
            _ => Ok(Err(Reject::DexOfferAmountInvalid)),
        }
    }

    pub(crate) fn exec_accept_offer(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        amount: Amount,
    ) -> CoreResult<Outcome> {
        if amount <= 0 {
            return Ok(Err(Reject::DexOfferAmountInvalid));
        }
        let seller = match &tx.reference {
            Some(seller) => seller.clone(),
            None => return Ok(Err(Reject::MissingReference)),
        };
        if self.state.dex.offer(&seller, property).is_none() {
            return Ok(Err(Reject::DexAcceptOfferNotFound));
        }

        let granted =
            match self
                .state
                .dex
                .reserve_accept(&seller, property, &tx.sender, amount, tx.block, tx.txid)
            {
                Some(granted) => granted,
                None => return Ok(Err(Reject::DexAcceptNothingRemaining)),
            };

        self.state
            .tally
            .move_between(&seller, property, granted, Bucket::SellOffer, Bucket::AcceptReserve)
            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
        tracing::info!(
            txid = %tx.txid,
            buyer = %tx.sender,
            seller = %seller,
            property,
            granted,
            "offer accepted"
        );
        Ok(Ok(ValidOutcome::amount(granted)))
    }

    /// Scan a non-protocol transaction for native payments settling open
    /// accepts. Returns true when any payment was applied.
    pub(crate) fn handle_dex_payment<V: crate::host::CoinView>(
        &mut self,
        tx: &crate::host::HostTransaction,
        view: &V,
        block: BlockHeight,
    ) -> CoreResult<bool> {
        let buyer =
            match crate::parser::sender_by_contribution(tx, view, &self.params, block) {
                Some(buyer) => buyer,
                None => return Ok(false),
            };
        if !self.state.dex.buyer_has_accepts(&buyer) {
            return Ok(false);
        }

        let mut seq = 0u32;
        let mut any = false;
        for (vout, output) in tx.outputs.iter().enumerate() {
            let seller = match output.script.address() {
                Some(seller) if *seller != buyer => seller.clone(),
                _ => continue,
            };
            let released = self.state.dex.settle_payment(&seller, &buyer, output.value);
            for (property, tokens) in released {
                self.state
                    .tally
                    .debit(&seller, property, tokens, Bucket::AcceptReserve)
                    .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                self.state
                    .tally
                    .credit(&buyer, property, tokens, Bucket::Available)
                    .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
                seq += 1;
                self.dbs.txlist.record_payment(
                    &tx.txid,
                    block,
                    seq,
                    &PaymentRecord {
                        vout: vout as u32,
                        buyer: buyer.clone(),
                        seller: seller.clone(),
                        property,
                        amount: tokens,
                    },
                )?;
                tracing::info!(
                    txid = %tx.txid,
                    buyer = %buyer,
                    seller = %seller,
                    property,
                    tokens,
                    paid = output.value,
                    "native payment settled"
                );
                any = true;
            }
        }
        Ok(any)
    }

    /// Return expired accepts at end-of-block: back into the open offer, or
    /// straight to the seller when the offer is gone.
    pub(crate) fn expire_dex_accepts(&mut self, block: BlockHeight) -> CoreResult<usize> {
        let expired = self.state.dex.expire_accepts(block);
        for accept in &expired {
            if accept.amount_remaining <= 0 {
                continue;
            }
            let target = if self.state.dex.offer(&accept.seller, accept.property).is_some() {
                Bucket::SellOffer
            } else {
                Bucket::Available
            };
            self.state
                .tally
                .move_between(
                    &accept.seller,
                    accept.property,
                    accept.amount_remaining,
                    Bucket::AcceptReserve,
                    target,
                )
                .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
        }
        Ok(expired.len())
    }
}
