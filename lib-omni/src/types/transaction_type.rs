//! Protocol transaction type codes.

use serde::{Deserialize, Serialize};

/// Every known meta-transaction type, by wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    SimpleSend,
    SendToOwners,
    SendAll,
    SendNonFungible,
    SendToMany,
    TradeOffer,
    AcceptOffer,
    MetaDexTrade,
    MetaDexCancelPrice,
    MetaDexCancelPair,
    MetaDexCancelEcosystem,
    CreatePropertyFixed,
    CreatePropertyVariable,
    CloseCrowdsale,
    CreatePropertyManual,
    GrantTokens,
    RevokeTokens,
    ChangeIssuer,
    EnableFreezing,
    DisableFreezing,
    AddDelegate,
    RemoveDelegate,
    FreezeTokens,
    UnfreezeTokens,
    AnyData,
    NonFungibleData,
    Deactivation,
    Activation,
    Alert,
}

impl TransactionType {
    pub fn code(self) -> u16 {
        match self {
            TransactionType::SimpleSend => 0,
            TransactionType::SendToOwners => 3,
            TransactionType::SendAll => 4,
            TransactionType::SendNonFungible => 5,
            TransactionType::SendToMany => 7,
            TransactionType::TradeOffer => 20,
            TransactionType::AcceptOffer => 22,
            TransactionType::MetaDexTrade => 25,
            TransactionType::MetaDexCancelPrice => 26,
            TransactionType::MetaDexCancelPair => 27,
            TransactionType::MetaDexCancelEcosystem => 28,
            TransactionType::CreatePropertyFixed => 50,
            TransactionType::CreatePropertyVariable => 51,
            TransactionType::CloseCrowdsale => 53,
            TransactionType::CreatePropertyManual => 54,
            TransactionType::GrantTokens => 55,
            TransactionType::RevokeTokens => 56,
            TransactionType::ChangeIssuer => 70,
            TransactionType::EnableFreezing => 71,
            TransactionType::DisableFreezing => 72,
            TransactionType::AddDelegate => 73,
            TransactionType::RemoveDelegate => 74,
            TransactionType::FreezeTokens => 185,
            TransactionType::UnfreezeTokens => 186,
            TransactionType::AnyData => 200,
            TransactionType::NonFungibleData => 201,
            TransactionType::Deactivation => 65533,
            TransactionType::Activation => 65534,
            TransactionType::Alert => 65535,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(TransactionType::SimpleSend),
            3 => Some(TransactionType::SendToOwners),
            4 => Some(TransactionType::SendAll),
            5 => Some(TransactionType::SendNonFungible),
            7 => Some(TransactionType::SendToMany),
            20 => Some(TransactionType::TradeOffer),
            22 => Some(TransactionType::AcceptOffer),
            25 => Some(TransactionType::MetaDexTrade),
            26 => Some(TransactionType::MetaDexCancelPrice),
            27 => Some(TransactionType::MetaDexCancelPair),
            28 => Some(TransactionType::MetaDexCancelEcosystem),
            50 => Some(TransactionType::CreatePropertyFixed),
            51 => Some(TransactionType::CreatePropertyVariable),
            53 => Some(TransactionType::CloseCrowdsale),
            54 => Some(TransactionType::CreatePropertyManual),
            55 => Some(TransactionType::GrantTokens),
            56 => Some(TransactionType::RevokeTokens),
            70 => Some(TransactionType::ChangeIssuer),
            71 => Some(TransactionType::EnableFreezing),
            72 => Some(TransactionType::DisableFreezing),
            73 => Some(TransactionType::AddDelegate),
            74 => Some(TransactionType::RemoveDelegate),
            185 => Some(TransactionType::FreezeTokens),
            186 => Some(TransactionType::UnfreezeTokens),
            200 => Some(TransactionType::AnyData),
            201 => Some(TransactionType::NonFungibleData),
            65533 => Some(TransactionType::Deactivation),
            65534 => Some(TransactionType::Activation),
            65535 => Some(TransactionType::Alert),
            _ => None,
        }
    }

    /// Human-readable label for log lines.
    pub fn label(self) -> &'static str {
        match self {
            TransactionType::SimpleSend => "Simple Send",
            TransactionType::SendToOwners => "Send To Owners",
            TransactionType::SendAll => "Send All",
            TransactionType::SendNonFungible => "Unique Send",
            TransactionType::SendToMany => "Send To Many",
            TransactionType::TradeOffer => "DEx Sell Offer",
            TransactionType::AcceptOffer => "DEx Accept Offer",
            TransactionType::MetaDexTrade => "MetaDEx trade",
            TransactionType::MetaDexCancelPrice => "MetaDEx cancel-price",
            TransactionType::MetaDexCancelPair => "MetaDEx cancel-pair",
            TransactionType::MetaDexCancelEcosystem => "MetaDEx cancel-ecosystem",
            TransactionType::CreatePropertyFixed => "Create Property - Fixed",
            TransactionType::CreatePropertyVariable => "Create Property - Variable",
            TransactionType::CloseCrowdsale => "Close Crowdsale",
            TransactionType::CreatePropertyManual => "Create Property - Manual",
            TransactionType::GrantTokens => "Grant Property Tokens",
            TransactionType::RevokeTokens => "Revoke Property Tokens",
            TransactionType::ChangeIssuer => "Change Issuer Address",
            TransactionType::EnableFreezing => "Enable Freezing",
            TransactionType::DisableFreezing => "Disable Freezing",
            TransactionType::AddDelegate => "Add Delegate",
            TransactionType::RemoveDelegate => "Remove Delegate",
            TransactionType::FreezeTokens => "Freeze Property Tokens",
            TransactionType::UnfreezeTokens => "Unfreeze Property Tokens",
            TransactionType::AnyData => "Embed any data",
            TransactionType::NonFungibleData => "Set Non-Fungible Token Data",
            TransactionType::Deactivation => "Feature Deactivation",
            TransactionType::Activation => "Feature Activation",
            TransactionType::Alert => "Alert",
        }
    }

    /// Freeze-related types force a full rescan when caught in a reorg.
    pub fn is_freeze_related(self) -> bool {
        matches!(
            self,
            TransactionType::EnableFreezing
                | TransactionType::DisableFreezing
                | TransactionType::FreezeTokens
                | TransactionType::UnfreezeTokens
        )
    }
}
