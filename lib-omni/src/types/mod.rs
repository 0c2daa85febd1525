//! Core Protocol Types
//!
//! Shared identifiers and value types used across the state machine.
//! All amounts are signed 64-bit with the valid balance range [0, i64::MAX];
//! arithmetic on balances must be checked, never wrapping.

mod transaction_type;

pub use transaction_type::TransactionType;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Token amount; divisible properties count 10^-8 units.
pub type Amount = i64;

/// Property identifier. `0` is the host-chain native coin, `1` and `2` are
/// the protocol-reserved main/test tokens.
pub type PropertyId = u32;

/// Block height on the host chain.
pub type BlockHeight = u32;

/// Maximum representable token amount (63-bit bound).
pub const MAX_AMOUNT: Amount = i64::MAX;

/// Maximum length of property string fields (name, category, url, data).
pub const MAX_STRING_FIELD_LEN: usize = 256;

/// Native coin pseudo-property.
pub const PROPERTY_NATIVE: PropertyId = 0;
/// Main-ecosystem protocol token.
pub const PROPERTY_OMNI: PropertyId = 1;
/// Test-ecosystem protocol token.
pub const PROPERTY_TOMNI: PropertyId = 2;
/// First assignable test-ecosystem property id.
pub const FIRST_TEST_PROPERTY: PropertyId = 0x8000_0003;
/// First assignable main-ecosystem property id.
pub const FIRST_MAIN_PROPERTY: PropertyId = 3;
/// Highest main-ecosystem property id.
pub const MAX_MAIN_PROPERTY: PropertyId = 0x7fff_ffff;

// =============================================================================
// ADDRESS AND HASHES
// =============================================================================

/// A host-chain address in its native string encoding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Address(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction hash (host tx-id).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        TxHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Block hash on the host chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        BlockHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// =============================================================================
// ECOSYSTEM
// =============================================================================

/// One of the two disjoint property-id allocation ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ecosystem {
    Main,
    Test,
}

impl Ecosystem {
    /// Decode the wire ecosystem byte (1 = main, 2 = test).
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Ecosystem::Main),
            2 => Some(Ecosystem::Test),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Ecosystem::Main => 1,
            Ecosystem::Test => 2,
        }
    }

    /// The protocol token distributed to holders in this ecosystem.
    pub fn protocol_token(self) -> PropertyId {
        match self {
            Ecosystem::Main => PROPERTY_OMNI,
            Ecosystem::Test => PROPERTY_TOMNI,
        }
    }

    /// Ecosystem of an existing property id.
    pub fn of(property: PropertyId) -> Ecosystem {
        if property >= FIRST_TEST_PROPERTY || property == PROPERTY_TOMNI {
            Ecosystem::Test
        } else {
            Ecosystem::Main
        }
    }
}

/// Whether a property belongs to the test ecosystem.
pub fn is_test_ecosystem_property(property: PropertyId) -> bool {
    Ecosystem::of(property) == Ecosystem::Test
}

/// Whether a property belongs to the main ecosystem.
pub fn is_main_ecosystem_property(property: PropertyId) -> bool {
    property != PROPERTY_NATIVE && Ecosystem::of(property) == Ecosystem::Main
}

// =============================================================================
// PROPERTY KIND
// =============================================================================

/// The token model of a smart property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    Indivisible,
    Divisible,
    NonFungible,
    IndivisibleReplacing,
    DivisibleReplacing,
    IndivisibleAppending,
    DivisibleAppending,
}

impl PropertyKind {
    /// Wire code of the property type field.
    pub fn code(self) -> u16 {
        match self {
            PropertyKind::Indivisible => 1,
            PropertyKind::Divisible => 2,
            PropertyKind::NonFungible => 5,
            PropertyKind::IndivisibleReplacing => 65,
            PropertyKind::DivisibleReplacing => 66,
            PropertyKind::IndivisibleAppending => 129,
            PropertyKind::DivisibleAppending => 130,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(PropertyKind::Indivisible),
            2 => Some(PropertyKind::Divisible),
            5 => Some(PropertyKind::NonFungible),
            65 => Some(PropertyKind::IndivisibleReplacing),
            66 => Some(PropertyKind::DivisibleReplacing),
            129 => Some(PropertyKind::IndivisibleAppending),
            130 => Some(PropertyKind::DivisibleAppending),
            _ => None,
        }
    }

    /// Divisible tokens carry 8 fractional digits.
    pub fn is_divisible(self) -> bool {
        matches!(
            self,
            PropertyKind::Divisible
                | PropertyKind::DivisibleReplacing
                | PropertyKind::DivisibleAppending
        )
    }

    pub fn is_non_fungible(self) -> bool {
        matches!(self, PropertyKind::NonFungible)
    }
}

// =============================================================================
// BALANCE BUCKETS
// =============================================================================

/// The four balance buckets of a (address, property) tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    /// Freely spendable balance.
    Available,
    /// Committed to an open native-coin sell offer.
    SellOffer,
    /// Accepted by a buyer, awaiting native-coin payment.
    AcceptReserve,
    /// Committed to the token/token order book.
    MetaDexReserve,
}

impl Bucket {
    /// Canonical ordering used by the consensus hash.
    pub const ALL: [Bucket; 4] = [
        Bucket::Available,
        Bucket::SellOffer,
        Bucket::AcceptReserve,
        Bucket::MetaDexReserve,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Bucket::Available => "available",
            Bucket::SellOffer => "selloffer",
            Bucket::AcceptReserve => "acceptreserve",
            Bucket::MetaDexReserve => "metadexreserve",
        }
    }
}

// =============================================================================
// AMOUNT FORMATTING
// =============================================================================

/// Format an amount of a divisible property (8 fractional digits).
pub fn format_divisible(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:08}", sign, abs / 100_000_000, abs % 100_000_000)
}

/// Format an amount by property kind.
pub fn format_by_kind(amount: Amount, kind: PropertyKind) -> String {
    if kind.is_divisible() {
        format_divisible(amount)
    } else {
        amount.to_string()
    }
}
