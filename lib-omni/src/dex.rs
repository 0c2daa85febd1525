//! Native-Coin Exchange (DEx-1)
//!
//! The legacy token-for-native-coin exchange. A seller publishes an offer
//! reserving tokens out of the available bucket; buyers accept a slice of
//! the offer, moving the slice into the seller's accept-reserve; the buyer
//! then pays native coin on-chain within the payment window, which releases
//! tokens pro-rata. Unpaid accepts expire at end-of-block and return to the
//! open offer.
//!
//! This module owns the offer/accept records; the interpreter performs the
//! matching tally moves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, BlockHeight, PropertyId, TxHash};

/// Offer update actions carried in the payload.
pub const DEX_ACTION_NEW: u8 = 1;
pub const DEX_ACTION_UPDATE: u8 = 2;
pub const DEX_ACTION_CANCEL: u8 = 3;

/// An open sell offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOffer {
    pub seller: Address,
    pub property: PropertyId,
    /// Tokens originally offered; the price basis together with
    /// `native_desired`.
    pub amount_original: Amount,
    /// Tokens still open for acceptance.
    pub amount_available: Amount,
    /// Native coin asked for the original amount.
    pub native_desired: Amount,
    /// Minimum native fee an accept must pay.
    pub min_fee: Amount,
    /// Number of blocks a buyer has to pay.
    pub payment_window: u8,
    pub txid: TxHash,
    pub block: BlockHeight,
}

/// An accepted slice of an offer, awaiting native-coin payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedOffer {
    pub seller: Address,
    pub buyer: Address,
    pub property: PropertyId,
    /// Tokens still deliverable under this accept.
    pub amount_remaining: Amount,
    /// Tokens accepted originally.
    pub amount_original: Amount,
    /// Price basis copied from the offer at accept time.
    pub offer_amount_original: Amount,
    pub offer_native_desired: Amount,
    /// Last block at which payment counts.
    pub expiry_block: BlockHeight,
    pub txid: TxHash,
}

impl AcceptedOffer {
    /// Tokens bought by a native payment of `paid`, at the offer's unit
    /// price, capped by what the accept still covers.
    pub fn tokens_for_payment(&self, paid: Amount) -> Amount {
        if self.offer_native_desired <= 0 {
            return 0;
        }
        let bought = (i128::from(paid) * i128::from(self.offer_amount_original)
            / i128::from(self.offer_native_desired)) as Amount;
        bought.min(self.amount_remaining)
    }
}

/// All open offers and accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DexState {
    /// (seller, property) → offer
    offers: BTreeMap<(Address, PropertyId), SellOffer>,
    /// (seller, property, buyer) → accept
    accepts: BTreeMap<(Address, PropertyId, Address), AcceptedOffer>,
}

impl DexState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, seller: &Address, property: PropertyId) -> Option<&SellOffer> {
        self.offers.get(&(seller.clone(), property))
    }

    pub fn has_offer(&self, seller: &Address, property: PropertyId) -> bool {
        self.offers.contains_key(&(seller.clone(), property))
    }

    pub fn insert_offer(&mut self, offer: SellOffer) {
        self.offers
            .insert((offer.seller.clone(), offer.property), offer);
    }

    /// Remove an offer; returns it so the caller can refund the reserve.
    pub fn remove_offer(&mut self, seller: &Address, property: PropertyId) -> Option<SellOffer> {
        self.offers.remove(&(seller.clone(), property))
    }

    pub fn accept(
        &mut self,
        seller: &Address,
        property: PropertyId,
        buyer: &Address,
    ) -> Option<&AcceptedOffer> {
        self.accepts
            .get(&(seller.clone(), property, buyer.clone()))
    }

    pub fn insert_accept(&mut self, accept: AcceptedOffer) {
        self.accepts.insert(
            (
                accept.seller.clone(),
                accept.property,
                accept.buyer.clone(),
            ),
            accept,
        );
    }

    /// Reserve `amount` out of an open offer for a buyer. Returns the
    /// granted amount (capped at what is available), or `None` when no offer
    /// exists or nothing is available.
    pub fn reserve_accept(
        &mut self,
        seller: &Address,
        property: PropertyId,
        buyer: &Address,
        amount: Amount,
        block: BlockHeight,
        txid: TxHash,
    ) -> Option<Amount> {
        let offer = self.offers.get_mut(&(seller.clone(), property))?;
        let granted = amount.min(offer.amount_available);
        if granted <= 0 {
            return None;
        }
        offer.amount_available -= granted;
        let expiry_block = block + offer.payment_window as BlockHeight;
        let (offer_amount_original, offer_native_desired) =
            (offer.amount_original, offer.native_desired);
        self.insert_accept(AcceptedOffer {
            seller: seller.clone(),
            buyer: buyer.clone(),
            property,
            amount_remaining: granted,
            amount_original: granted,
            offer_amount_original,
            offer_native_desired,
            expiry_block,
            txid,
        });
        Some(granted)
    }

    /// Apply a native payment of `paid` from `buyer` to `seller`. Returns
    /// the tokens released; the accept shrinks and disappears when drained.
    pub fn settle_payment(
        &mut self,
        seller: &Address,
        buyer: &Address,
        paid: Amount,
    ) -> Vec<(PropertyId, Amount)> {
        let keys: Vec<(Address, PropertyId, Address)> = self
            .accepts
            .keys()
            .filter(|(s, _, b)| s == seller && b == buyer)
            .cloned()
            .collect();

        let mut released = Vec::new();
        for key in keys {
            let drained = {
                let accept = match self.accepts.get_mut(&key) {
                    Some(a) => a,
                    None => continue,
                };
                let tokens = accept.tokens_for_payment(paid);
                if tokens <= 0 {
                    continue;
                }
                accept.amount_remaining -= tokens;
                released.push((accept.property, tokens));
                accept.amount_remaining == 0
            };
            if drained {
                self.accepts.remove(&key);
            }
        }
        released
    }

    /// Remove every accept whose expiry is below `block`; returns them so
    /// the caller can restore the reserves into the open offers.
    pub fn expire_accepts(&mut self, block: BlockHeight) -> Vec<AcceptedOffer> {
        let expired_keys: Vec<(Address, PropertyId, Address)> = self
            .accepts
            .iter()
            .filter(|(_, a)| a.expiry_block < block)
            .map(|(k, _)| k.clone())
            .collect();

        let mut expired = Vec::new();
        for key in expired_keys {
            if let Some(accept) = self.accepts.remove(&key) {
                // the unpaid remainder reopens on the offer, if it still exists
                if let Some(offer) = self
                    .offers
                    .get_mut(&(accept.seller.clone(), accept.property))
                {
                    offer.amount_available += accept.amount_remaining;
                }
                expired.push(accept);
            }
        }
        expired
    }

    /// Whether any accept exists with this buyer (payment scan gate).
    pub fn buyer_has_accepts(&self, buyer: &Address) -> bool {
        self.accepts.iter().any(|((_, _, b), _)| b == buyer)
    }

    pub fn offers(&self) -> impl Iterator<Item = &SellOffer> {
        self.offers.values()
    }

    pub fn accepts_iter(&self) -> impl Iterator<Item = &AcceptedOffer> {
        self.accepts.values()
    }

    pub fn clear(&mut self) {
        self.offers.clear();
        self.accepts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seller() -> Address {
        Address::new("1Seller")
    }

    fn buyer() -> Address {
        Address::new("1Buyer")
    }

    fn offer(amount: Amount, native: Amount, window: u8) -> SellOffer {
        SellOffer {
            seller: seller(),
            property: 1,
            amount_original: amount,
            amount_available: amount,
            native_desired: native,
            min_fee: 10,
            payment_window: window,
            txid: TxHash::new([1; 32]),
            block: 100,
        }
    }

    #[test]
    fn accept_reserves_slice() {
        let mut dex = DexState::new();
        dex.insert_offer(offer(1000, 5000, 10));

        let granted = dex
            .reserve_accept(&seller(), 1, &buyer(), 400, 105, TxHash::new([2; 32]))
            .unwrap();
        assert_eq!(granted, 400);
        assert_eq!(dex.offer(&seller(), 1).unwrap().amount_available, 600);
        let accept = dex.accept(&seller(), 1, &buyer()).unwrap();
        assert_eq!(accept.amount_remaining, 400);
        assert_eq!(accept.expiry_block, 115);
    }

    #[test]
    fn accept_caps_at_available() {
        let mut dex = DexState::new();
        dex.insert_offer(offer(1000, 5000, 10));
        let granted = dex
            .reserve_accept(&seller(), 1, &buyer(), 5000, 105, TxHash::new([2; 32]))
            .unwrap();
        assert_eq!(granted, 1000);
        assert!(dex
            .reserve_accept(&seller(), 1, &Address::new("1B2"), 10, 105, TxHash::new([3; 32]))
            .is_none());
    }

    #[test]
    fn payment_releases_pro_rata() {
        let mut dex = DexState::new();
        // 1000 tokens for 5000 native → 5 native per token
        dex.insert_offer(offer(1000, 5000, 10));
        dex.reserve_accept(&seller(), 1, &buyer(), 400, 105, TxHash::new([2; 32]))
            .unwrap();

        let released = dex.settle_payment(&seller(), &buyer(), 1000);
        assert_eq!(released, vec![(1, 200)]);
        assert_eq!(
            dex.accept(&seller(), 1, &buyer()).unwrap().amount_remaining,
            200
        );

        // full payment drains the accept
        let released = dex.settle_payment(&seller(), &buyer(), 1000);
        assert_eq!(released, vec![(1, 200)]);
        assert!(dex.accept(&seller(), 1, &buyer()).is_none());
    }

    #[test]
    fn overpayment_caps_at_remaining() {
        let mut dex = DexState::new();
        dex.insert_offer(offer(1000, 5000, 10));
        dex.reserve_accept(&seller(), 1, &buyer(), 100, 105, TxHash::new([2; 32]))
            .unwrap();
        let released = dex.settle_payment(&seller(), &buyer(), 1_000_000);
        assert_eq!(released, vec![(1, 100)]);
    }

    #[test]
    fn expiry_restores_offer() {
        let mut dex = DexState::new();
        dex.insert_offer(offer(1000, 5000, 10));
        dex.reserve_accept(&seller(), 1, &buyer(), 400, 105, TxHash::new([2; 32]))
            .unwrap();

        // expiry block is 115; block 115 still allows payment
        assert!(dex.expire_accepts(115).is_empty());
        let expired = dex.expire_accepts(116);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].amount_remaining, 400);
        assert_eq!(dex.offer(&seller(), 1).unwrap().amount_available, 1000);
    }

    #[test]
    fn cancel_returns_offer() {
        let mut dex = DexState::new();
        dex.insert_offer(offer(1000, 5000, 10));
        let removed = dex.remove_offer(&seller(), 1).unwrap();
        assert_eq!(removed.amount_available, 1000);
        assert!(!dex.has_offer(&seller(), 1));
    }
}
