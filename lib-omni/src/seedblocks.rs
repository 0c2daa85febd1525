//! Seed-Block Filter
//!
//! Ranges of mainnet blocks known a priori to contain no protocol
//! transactions. Skipping them during the initial scan avoids reading and
//! classifying every transaction in the dead stretches of early history.

use crate::rules::Network;
use crate::types::BlockHeight;

/// Mainnet block ranges (inclusive) with no protocol transactions.
const MAIN_EMPTY_RANGES: &[(BlockHeight, BlockHeight)] = &[
    (250_329, 250_360),
    (250_470, 250_673),
    (250_724, 250_750),
    (251_130, 251_370),
    (251_420, 251_510),
    (251_750, 252_203),
    (252_320, 252_400),
    (252_750, 253_014),
    (253_541, 253_600),
];

/// Whether the scan may skip this block entirely.
pub fn skip_block(network: Network, height: BlockHeight) -> bool {
    if network != Network::Main {
        return false;
    }
    MAIN_EMPTY_RANGES
        .iter()
        .any(|(start, end)| height >= *start && height <= *end)
}
