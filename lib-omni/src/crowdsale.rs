//! Crowdsales
//!
//! Active crowdsale bookkeeping and the fundraiser arithmetic. A crowdsale
//! is opened by a variable-supply property creation; participants send units
//! of the desired property to the issuer and receive freshly minted tokens
//! at a deadline- and time-sensitive rate. Minting saturates at the 63-bit
//! bound, with the shortfall tracked as missed tokens.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, BlockHeight, PropertyId, TxHash, MAX_AMOUNT};

/// Seconds per week, the unit of the early-bird bonus.
const SECONDS_PER_WEEK: u64 = 604_800;

/// One active crowdsale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crowdsale {
    pub property: PropertyId,
    pub issuer: Address,
    /// Property participants pay with.
    pub desired_property: PropertyId,
    /// Tokens minted per unit of the desired property (before bonuses).
    pub tokens_per_unit: Amount,
    /// Unix deadline; participation at or after this time is rejected.
    pub deadline: u64,
    /// Percentage bonus per whole week remaining before the deadline.
    pub early_bird_bonus: u8,
    /// Percentage minted on top for the issuer.
    pub issuer_percentage: u8,
    pub start_block: BlockHeight,
    pub creation_txid: TxHash,
    /// Total user tokens minted so far.
    pub user_created: Amount,
    /// Total issuer tokens minted so far.
    pub issuer_created: Amount,
    /// Participant tx-id → (user tokens, issuer tokens) minted.
    pub participations: BTreeMap<TxHash, (Amount, Amount)>,
}

/// Outcome of one participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundraiserShare {
    pub user_tokens: Amount,
    pub issuer_tokens: Amount,
    /// Minting hit the 63-bit bound; the crowdsale must close.
    pub cap_hit: bool,
    /// Tokens that could not be minted because of the cap.
    pub missed_tokens: Amount,
}

/// Compute the tokens minted for one participating send.
///
/// `amount` is the units of the desired property transferred, `tx_time` the
/// participating block's timestamp. The early-bird bonus adds
/// `early_bird_bonus` percent per whole week remaining before the deadline;
/// the issuer share adds `issuer_percentage` percent on top of the user
/// tokens. Totals saturate at `i64::MAX` across the crowdsale's lifetime.
pub fn calculate_fundraiser(
    divisible: bool,
    amount: Amount,
    tokens_per_unit: Amount,
    deadline: u64,
    tx_time: u64,
    early_bird_bonus: u8,
    issuer_percentage: u8,
    tokens_created_so_far: Amount,
) -> FundraiserShare {
    debug_assert!(amount > 0);
    debug_assert!(tx_time < deadline);

    let weeks_remaining = (deadline - tx_time) / SECONDS_PER_WEEK;
    // bonus percentage, scaled by 100 to keep integer math
    let bonus_percentage: u128 = 100 + weeks_remaining as u128 * early_bird_bonus as u128;

    let units: u128 = if divisible {
        // amount counts 10^-8 units
        amount as u128 * tokens_per_unit as u128 / 100_000_000
    } else {
        amount as u128 * tokens_per_unit as u128
    };
    let user_raw = units * bonus_percentage / 100;
    let issuer_raw = user_raw * issuer_percentage as u128 / 100;

    let headroom = (MAX_AMOUNT - tokens_created_so_far) as u128;
    let wanted = user_raw + issuer_raw;

    if wanted <= headroom {
        FundraiserShare {
            user_tokens: user_raw as Amount,
            issuer_tokens: issuer_raw as Amount,
            cap_hit: false,
            missed_tokens: 0,
        }
    } else {
        // mint what fits, users first, and close the crowdsale
        let user_tokens = user_raw.min(headroom);
        let issuer_tokens = headroom - user_tokens;
        FundraiserShare {
            user_tokens: user_tokens as Amount,
            issuer_tokens: issuer_tokens as Amount,
            cap_hit: true,
            missed_tokens: (wanted - headroom).min(i64::MAX as u128) as Amount,
        }
    }
}

/// The set of active crowdsales, keyed by the crowdsale property.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrowdsaleMap {
    active: BTreeMap<PropertyId, Crowdsale>,
}

impl CrowdsaleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, crowdsale: Crowdsale) {
        self.active.insert(crowdsale.property, crowdsale);
    }

    pub fn remove(&mut self, property: PropertyId) -> Option<Crowdsale> {
        self.active.remove(&property)
    }

    pub fn get(&self, property: PropertyId) -> Option<&Crowdsale> {
        self.active.get(&property)
    }

    pub fn get_mut(&mut self, property: PropertyId) -> Option<&mut Crowdsale> {
        self.active.get_mut(&property)
    }

    /// The crowdsale whose issuer is `address` and which accepts
    /// `desired_property`, if one is active. Participation routes sends to
    /// the issuer into this crowdsale.
    pub fn accepting(
        &mut self,
        address: &Address,
        desired_property: PropertyId,
    ) -> Option<&mut Crowdsale> {
        self.active
            .values_mut()
            .find(|c| c.issuer == *address && c.desired_property == desired_property)
    }

    /// Whether the issuer already runs an active crowdsale (one per issuer).
    pub fn issuer_has_active(&self, issuer: &Address) -> bool {
        self.active.values().any(|c| c.issuer == *issuer)
    }

    /// Crowdsales whose deadline has passed at `block_time`.
    pub fn expired(&self, block_time: u64) -> Vec<PropertyId> {
        self.active
            .values()
            .filter(|c| c.deadline <= block_time)
            .map(|c| c.property)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Crowdsale> {
        self.active.values()
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indivisible_base_rate() {
        let share = calculate_fundraiser(false, 10, 100, 2_000_000, 1_999_999, 0, 0, 0);
        assert_eq!(share.user_tokens, 1000);
        assert_eq!(share.issuer_tokens, 0);
        assert!(!share.cap_hit);
    }

    #[test]
    fn divisible_base_rate() {
        // 2.00000000 units at 100 tokens per unit
        let share =
            calculate_fundraiser(true, 200_000_000, 100, 2_000_000, 1_999_999, 0, 0, 0);
        assert_eq!(share.user_tokens, 200);
    }

    #[test]
    fn early_bird_bonus_per_week() {
        // two whole weeks before the deadline, 10 % per week
        let deadline = 10_000_000;
        let tx_time = deadline - 2 * SECONDS_PER_WEEK;
        let share = calculate_fundraiser(false, 10, 100, deadline, tx_time, 10, 0, 0);
        assert_eq!(share.user_tokens, 1200);
    }

    #[test]
    fn issuer_percentage_on_top() {
        let share = calculate_fundraiser(false, 10, 100, 2_000_000, 1_999_999, 0, 10, 0);
        assert_eq!(share.user_tokens, 1000);
        assert_eq!(share.issuer_tokens, 100);
    }

    #[test]
    fn cap_closes_and_tracks_missed() {
        let so_far = MAX_AMOUNT - 500;
        let share = calculate_fundraiser(false, 10, 100, 2_000_000, 1_999_999, 0, 0, so_far);
        assert!(share.cap_hit);
        assert_eq!(share.user_tokens, 500);
        assert_eq!(share.issuer_tokens, 0);
        assert_eq!(share.missed_tokens, 500);
    }

    #[test]
    fn accepting_matches_issuer_and_currency() {
        let mut map = CrowdsaleMap::new();
        map.insert(Crowdsale {
            property: 7,
            issuer: Address::new("1Issuer"),
            desired_property: 1,
            tokens_per_unit: 100,
            deadline: 2_000_000,
            early_bird_bonus: 0,
            issuer_percentage: 0,
            start_block: 10,
            creation_txid: TxHash::default(),
            user_created: 0,
            issuer_created: 0,
            participations: BTreeMap::new(),
        });

        assert!(map.accepting(&Address::new("1Issuer"), 1).is_some());
        assert!(map.accepting(&Address::new("1Issuer"), 2).is_none());
        assert!(map.accepting(&Address::new("1Other"), 1).is_none());
        assert!(map.issuer_has_active(&Address::new("1Issuer")));
    }

    #[test]
    fn expiry_by_block_time() {
        let mut map = CrowdsaleMap::new();
        map.insert(Crowdsale {
            property: 7,
            issuer: Address::new("1I"),
            desired_property: 1,
            tokens_per_unit: 1,
            deadline: 1000,
            early_bird_bonus: 0,
            issuer_percentage: 0,
            start_block: 1,
            creation_txid: TxHash::default(),
            user_created: 0,
            issuer_created: 0,
            participations: BTreeMap::new(),
        });
        assert!(map.expired(999).is_empty());
        assert_eq!(map.expired(1000), vec![7]);
    }
}
