//! Tally Ledger
//!
//! In-memory mapping address → (property → balance buckets). This is the
//! authoritative balance state; it is persisted only inside checkpoint
//! snapshots and rebuilt by replay otherwise.
//!
//! # Invariants
//!
//! - Every bucket is non-negative at all times.
//! - `credit` fails on 63-bit overflow, `debit` fails before going negative;
//!   neither ever partially applies.
//! - All mutations happen on the block-pipeline thread.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Amount, Bucket, PropertyId, MAX_AMOUNT};

/// Tally mutation error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TallyError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Amount),

    #[error("balance overflow: {current} + {amount} exceeds the 63-bit bound")]
    Overflow { current: Amount, amount: Amount },

    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Amount, need: Amount },
}

pub type TallyResult<T> = Result<T, TallyError>;

/// The four balance buckets of one (address, property) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTally {
    pub available: Amount,
    pub sell_offer: Amount,
    pub accept_reserve: Amount,
    pub metadex_reserve: Amount,
}

impl TokenTally {
    pub fn get(&self, bucket: Bucket) -> Amount {
        match bucket {
            Bucket::Available => self.available,
            Bucket::SellOffer => self.sell_offer,
            Bucket::AcceptReserve => self.accept_reserve,
            Bucket::MetaDexReserve => self.metadex_reserve,
        }
    }

    fn get_mut(&mut self, bucket: Bucket) -> &mut Amount {
        match bucket {
            Bucket::Available => &mut self.available,
            Bucket::SellOffer => &mut self.sell_offer,
            Bucket::AcceptReserve => &mut self.accept_reserve,
            Bucket::MetaDexReserve => &mut self.metadex_reserve,
        }
    }

    /// Sum of all buckets; the "tokens at this address" figure.
    pub fn total(&self) -> Amount {
        self.available + self.sell_offer + self.accept_reserve + self.metadex_reserve
    }

    /// True when every bucket is zero (entry may be pruned from snapshots).
    pub fn is_zero(&self) -> bool {
        *self == TokenTally::default()
    }
}

/// The whole ledger. Keys are ordered so iteration is deterministic, which
/// the consensus hash and STO distribution rely on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyMap {
    balances: BTreeMap<Address, BTreeMap<PropertyId, TokenTally>>,
}

impl TallyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of one bucket; zero when no entry exists.
    pub fn balance(&self, address: &Address, property: PropertyId, bucket: Bucket) -> Amount {
        self.balances
            .get(address)
            .and_then(|props| props.get(&property))
            .map(|t| t.get(bucket))
            .unwrap_or(0)
    }

    /// Full tally for one (address, property) pair.
    pub fn tally(&self, address: &Address, property: PropertyId) -> TokenTally {
        self.balances
            .get(address)
            .and_then(|props| props.get(&property))
            .copied()
            .unwrap_or_default()
    }

    /// Add `amount > 0` to a bucket.
    pub fn credit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        bucket: Bucket,
    ) -> TallyResult<()> {
        if amount <= 0 {
            return Err(TallyError::NonPositiveAmount(amount));
        }
        let tally = self
            .balances
            .entry(address.clone())
            .or_default()
            .entry(property)
            .or_default();
        let slot = tally.get_mut(bucket);
        let updated = slot
            .checked_add(amount)
            .filter(|v| *v <= MAX_AMOUNT)
            .ok_or(TallyError::Overflow {
                current: *slot,
                amount,
            })?;
        *slot = updated;
        Ok(())
    }

    /// Remove `amount > 0` from a bucket; never produces a negative value.
    pub fn debit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        bucket: Bucket,
    ) -> TallyResult<()> {
        if amount <= 0 {
            return Err(TallyError::NonPositiveAmount(amount));
        }
        let have = self.balance(address, property, bucket);
        if have < amount {
            return Err(TallyError::InsufficientBalance { have, need: amount });
        }
        let tally = self
            .balances
            .entry(address.clone())
            .or_default()
            .entry(property)
            .or_default();
        *tally.get_mut(bucket) -= amount;
        Ok(())
    }

    /// Atomic debit + credit between two buckets of the same pair.
    pub fn move_between(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        from: Bucket,
        to: Bucket,
    ) -> TallyResult<()> {
        self.debit(address, property, amount, from)?;
        // same pair, so the credit cannot overflow past what total() held
        self.credit(address, property, amount, to)
    }

    /// Whether the sender can cover `amount` from `bucket` (read-only check
    /// used by validate-before-commit handlers).
    pub fn can_debit(
        &self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        bucket: Bucket,
    ) -> bool {
        amount > 0 && self.balance(address, property, bucket) >= amount
    }

    /// Whether a credit of `amount` would stay within the 63-bit bound.
    pub fn can_credit(
        &self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        bucket: Bucket,
    ) -> bool {
        amount > 0
            && self
                .balance(address, property, bucket)
                .checked_add(amount)
                .is_some()
    }

    /// Sum of every bucket of every address for a property.
    ///
    /// Used by the consensus hash, the property-supply invariant and the fee
    /// distribution threshold.
    pub fn total(&self, property: PropertyId) -> Amount {
        let mut total: i64 = 0;
        for props in self.balances.values() {
            if let Some(t) = props.get(&property) {
                total = total.saturating_add(t.total());
            }
        }
        total
    }

    /// Number of addresses holding a positive total of the property.
    pub fn owner_count(&self, property: PropertyId) -> usize {
        self.balances
            .values()
            .filter(|props| props.get(&property).map(|t| t.total() > 0).unwrap_or(false))
            .count()
    }

    /// All (address, tally) pairs with a positive total for the property,
    /// in address order.
    pub fn holders(&self, property: PropertyId) -> Vec<(Address, TokenTally)> {
        self.balances
            .iter()
            .filter_map(|(addr, props)| {
                props
                    .get(&property)
                    .filter(|t| t.total() > 0)
                    .map(|t| (addr.clone(), *t))
            })
            .collect()
    }

    /// Every property id the address holds (any bucket non-zero), ascending.
    pub fn properties_of(&self, address: &Address) -> Vec<PropertyId> {
        self.balances
            .get(address)
            .map(|props| {
                props
                    .iter()
                    .filter(|(_, t)| !t.is_zero())
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deterministic iteration over all entries, address-major.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, PropertyId, &TokenTally)> {
        self.balances.iter().flat_map(|(addr, props)| {
            props.iter().map(move |(id, tally)| (addr, *id, tally))
        })
    }

    /// Drop all entries. Used by full rescans.
    pub fn clear(&mut self) {
        self.balances.clear();
    }
}
