//! Rejection Reasons
//!
//! Every invalid meta-transaction is recorded with a reason drawn from the
//! enumerated families below. Codes are negative integers grouped by family
//! base, mirrored in the tx-list store and in log lines.

use serde::{Deserialize, Serialize};

/// Family bases for rejection codes.
pub const ERR_GENERAL: i32 = -9000;
pub const ERR_DEX_OFFER: i32 = -10000;
pub const ERR_DEX_ACCEPT: i32 = -20000;
pub const ERR_DEX_PAYMENT: i32 = -30000;
pub const ERR_PROPERTY: i32 = -40000;
pub const ERR_CROWDSALE: i32 = -45000;
pub const ERR_STO: i32 = -50000;
pub const ERR_SEND: i32 = -60000;
pub const ERR_TRADE_OFFER: i32 = -70000;
pub const ERR_METADEX: i32 = -80000;
pub const ERR_TOKENS: i32 = -82000;
pub const ERR_SEND_ALL: i32 = -83000;
pub const ERR_NFT: i32 = -85000;
pub const ERR_SEND_MANY: i32 = -86000;

/// Reason a meta-transaction was rejected by the interpreter.
///
/// Rejection never mutates state; the reason is recorded in the tx-list
/// store next to the invalid flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reject {
    // general
    TypeNotAllowedYet,
    UnauthorizedSender,
    MissingReference,
    InvalidEcosystem,
    ActivationInvalid,
    AlertInvalid,

    // send
    SendPropertyNotFound,
    SendAmountInvalid,
    SendInsufficientBalance,
    SendFrozenSender,
    SendRequiresNonFungible,

    // send-all
    SendAllNoTokens,

    // send-to-many
    SendManyOutputUnresolved,
    SendManyInsufficientBalance,
    SendManyAmountInvalid,

    // STO
    StoPropertyNotFound,
    StoAmountInvalid,
    StoInsufficientBalance,
    StoNoOtherOwners,
    StoFrozenSender,

    // property management
    PropertyNotFound,
    PropertyStringTooLong,
    PropertyKindInvalid,
    PropertyNotIssuer,
    PropertyNotManual,
    PropertyAmountInvalid,
    PropertyHasDelegate,

    // crowdsale
    CrowdsaleAlreadyActive,
    CrowdsaleNotActive,
    CrowdsaleDeadlinePassed,
    CrowdsaleDesiredMissing,

    // managed tokens / freezing
    TokensSupplyOverflow,
    TokensRevokeInsufficient,
    FreezingNotEnabled,
    FreezingAlreadyEnabled,
    FreezingAddressFrozen,
    FreezingAddressNotFrozen,

    // MetaDEx
    MetaDexPropertyNotFound,
    MetaDexSameProperty,
    MetaDexCrossEcosystem,
    MetaDexAmountInvalid,
    MetaDexInsufficientBalance,
    MetaDexNoMatchingOrders,

    // DEx-1
    DexOfferExists,
    DexOfferNotFound,
    DexOfferInsufficientBalance,
    DexOfferAmountInvalid,
    DexAcceptOfferNotFound,
    DexAcceptNothingRemaining,

    // NFT
    NftRangeInvalid,
    NftRangeNotOwned,
    NftDataNotAuthorized,
}

impl Reject {
    /// Negative integer code by family.
    pub fn code(self) -> i32 {
        match self {
            Reject::TypeNotAllowedYet => ERR_GENERAL - 22,
            Reject::UnauthorizedSender => ERR_GENERAL - 51,
            Reject::MissingReference => ERR_GENERAL - 54,
            Reject::InvalidEcosystem => ERR_GENERAL - 55,
            Reject::ActivationInvalid => ERR_GENERAL - 56,
            Reject::AlertInvalid => ERR_GENERAL - 57,

            Reject::SendPropertyNotFound => ERR_SEND - 24,
            Reject::SendAmountInvalid => ERR_SEND - 23,
            Reject::SendInsufficientBalance => ERR_SEND - 25,
            Reject::SendFrozenSender => ERR_SEND - 26,
            Reject::SendRequiresNonFungible => ERR_SEND - 27,

            Reject::SendAllNoTokens => ERR_SEND_ALL - 2,

            Reject::SendManyOutputUnresolved => ERR_SEND_MANY - 2,
            Reject::SendManyInsufficientBalance => ERR_SEND_MANY - 3,
            Reject::SendManyAmountInvalid => ERR_SEND_MANY - 4,

            Reject::StoPropertyNotFound => ERR_STO - 24,
            Reject::StoAmountInvalid => ERR_STO - 23,
            Reject::StoInsufficientBalance => ERR_STO - 25,
            Reject::StoNoOtherOwners => ERR_STO - 26,
            Reject::StoFrozenSender => ERR_STO - 27,

            Reject::PropertyNotFound => ERR_PROPERTY - 24,
            Reject::PropertyStringTooLong => ERR_PROPERTY - 36,
            Reject::PropertyKindInvalid => ERR_PROPERTY - 37,
            Reject::PropertyNotIssuer => ERR_PROPERTY - 43,
            Reject::PropertyNotManual => ERR_PROPERTY - 42,
            Reject::PropertyAmountInvalid => ERR_PROPERTY - 23,
            Reject::PropertyHasDelegate => ERR_PROPERTY - 46,

            Reject::CrowdsaleAlreadyActive => ERR_CROWDSALE - 12,
            Reject::CrowdsaleNotActive => ERR_CROWDSALE - 13,
            Reject::CrowdsaleDeadlinePassed => ERR_CROWDSALE - 14,
            Reject::CrowdsaleDesiredMissing => ERR_CROWDSALE - 15,

            Reject::TokensSupplyOverflow => ERR_TOKENS - 3,
            Reject::TokensRevokeInsufficient => ERR_TOKENS - 4,
            Reject::FreezingNotEnabled => ERR_TOKENS - 47,
            Reject::FreezingAlreadyEnabled => ERR_TOKENS - 48,
            Reject::FreezingAddressFrozen => ERR_TOKENS - 49,
            Reject::FreezingAddressNotFrozen => ERR_TOKENS - 50,

            Reject::MetaDexPropertyNotFound => ERR_METADEX - 24,
            Reject::MetaDexSameProperty => ERR_METADEX - 31,
            Reject::MetaDexCrossEcosystem => ERR_METADEX - 32,
            Reject::MetaDexAmountInvalid => ERR_METADEX - 33,
            Reject::MetaDexInsufficientBalance => ERR_METADEX - 25,
            Reject::MetaDexNoMatchingOrders => ERR_METADEX - 35,

            Reject::DexOfferExists => ERR_DEX_OFFER - 10,
            Reject::DexOfferNotFound => ERR_DEX_OFFER - 11,
            Reject::DexOfferInsufficientBalance => ERR_DEX_OFFER - 25,
            Reject::DexOfferAmountInvalid => ERR_DEX_OFFER - 23,
            Reject::DexAcceptOfferNotFound => ERR_DEX_ACCEPT - 10,
            Reject::DexAcceptNothingRemaining => ERR_DEX_ACCEPT - 12,

            Reject::NftRangeInvalid => ERR_NFT - 20,
            Reject::NftRangeNotOwned => ERR_NFT - 21,
            Reject::NftDataNotAuthorized => ERR_NFT - 22,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_stay_in_family() {
        assert!(Reject::SendInsufficientBalance.code() < ERR_SEND);
        assert!(Reject::SendInsufficientBalance.code() > ERR_TRADE_OFFER);
        assert!(Reject::MetaDexSameProperty.code() < ERR_METADEX);
        assert!(Reject::MetaDexSameProperty.code() > ERR_TOKENS);
        assert!(Reject::NftRangeInvalid.code() < ERR_NFT);
        assert!(Reject::NftRangeInvalid.code() > ERR_SEND_MANY);
    }
}
