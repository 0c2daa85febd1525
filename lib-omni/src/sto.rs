//! Proportional Owner Distribution
//!
//! The receiver computation shared by Send To Owners and the fee
//! distribution: split an amount across all holders of a property in
//! proportion to their holdings, flooring each share; whatever the floors
//! leave over stays with the distributor.

use crate::tally::TallyMap;
use crate::types::{Address, Amount, PropertyId};

/// Compute the receivers of a proportional distribution.
///
/// Holders are every address with a positive total of `property` except the
/// sender. Each receives `floor(amount * balance / total_held)`; zero shares
/// are dropped. Output is address-ordered, which makes downstream records
/// and the consensus hash deterministic.
pub fn distribution_receivers(
    tally: &TallyMap,
    property: PropertyId,
    sender: &Address,
    amount: Amount,
) -> Vec<(Address, Amount)> {
    debug_assert!(amount > 0);

    let holders: Vec<(Address, Amount)> = tally
        .holders(property)
        .into_iter()
        .filter(|(addr, _)| addr != sender)
        .map(|(addr, t)| (addr, t.total()))
        .collect();

    let total_held: i128 = holders.iter().map(|(_, held)| i128::from(*held)).sum();
    if total_held == 0 {
        return Vec::new();
    }

    holders
        .into_iter()
        .filter_map(|(addr, held)| {
            let share = i128::from(amount) * i128::from(held) / total_held;
            if share > 0 {
                Some((addr, share as Amount))
            } else {
                None
            }
        })
        .collect()
}
