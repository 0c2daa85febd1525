//! Transaction Interpreter
//!
//! Per-type semantics over the parsed meta-transaction. Every handler
//! validates first and mutates only once nothing can fail, so a rejected
//! transaction never leaves partial state behind. The outcome (valid, or a
//! rejection code) is returned to the pipeline, which records it in the
//! tx-list store.

mod admin;
mod property;
mod send;
mod sto;
mod trade;

use crate::context::{CoreContext, CoreResult};
use crate::parser::MetaTx;
use crate::payload::{Payload, PKT_V1};
use crate::reason::Reject;
use crate::rules::{
    FEATURE_FREEZING, FEATURE_METADEX, FEATURE_NONFUNGIBLE, FEATURE_SENDALL,
    FEATURE_SEND_TO_MANY, FEATURE_STO_V1,
};
use crate::types::{Address, Amount, PropertyId, TransactionType};

/// What a valid transaction did, for the tx-list record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidOutcome {
    /// Primary amount (zero when not applicable).
    pub amount: Amount,
    /// Per-property sub-amounts (send-all).
    pub subsends: Vec<(PropertyId, Amount)>,
}

impl ValidOutcome {
    pub fn amount(amount: Amount) -> Self {
        ValidOutcome {
            amount,
            subsends: Vec::new(),
        }
    }
}

/// Interpretation outcome: valid with its record data, or a rejection.
pub type Outcome = Result<ValidOutcome, Reject>;

impl CoreContext {
    /// Whether the transaction's type (and version) is live at its block.
    pub(crate) fn type_allowed(&self, tx: &MetaTx) -> bool {
        let live = |feature| self.state.activations.is_active(feature, tx.block);
        match tx.payload.transaction_type() {
            TransactionType::MetaDexTrade
            | TransactionType::MetaDexCancelPrice
            | TransactionType::MetaDexCancelPair
            | TransactionType::MetaDexCancelEcosystem => live(FEATURE_METADEX),
            TransactionType::SendAll => live(FEATURE_SENDALL),
            TransactionType::SendToMany => live(FEATURE_SEND_TO_MANY),
            TransactionType::SendNonFungible | TransactionType::NonFungibleData => {
                live(FEATURE_NONFUNGIBLE)
            }
            TransactionType::EnableFreezing
            | TransactionType::DisableFreezing
            | TransactionType::FreezeTokens
            | TransactionType::UnfreezeTokens => live(FEATURE_FREEZING),
            TransactionType::SendToOwners if tx.version >= PKT_V1 => live(FEATURE_STO_V1),
            _ => true,
        }
    }

    /// Whether transfers from `sender` are blocked for this property.
    pub(crate) fn sender_frozen(
        &self,
        sender: &Address,
        property: PropertyId,
        block: crate::types::BlockHeight,
    ) -> bool {
        self.state.freeze.is_enabled(property, block)
            && self.state.freeze.is_frozen(property, sender)
    }

    /// Interpret one parsed meta-transaction. `block_time` is the
    /// containing block's timestamp (crowdsale deadlines).
    pub fn interpret(&mut self, tx: &MetaTx, block_time: u64) -> CoreResult<Outcome> {
        if !self.type_allowed(tx) {
            return Ok(Err(Reject::TypeNotAllowedYet));
        }

        match tx.payload.clone() {
            Payload::SimpleSend { property, amount } => {
                self.exec_simple_send(tx, property, amount, block_time)
            }
            Payload::SendToOwners {
                property,
                amount,
                distribution_property,
            } => self.exec_send_to_owners(tx, property, amount, distribution_property),
            Payload::SendAll { ecosystem } => self.exec_send_all(tx, ecosystem),
            Payload::SendNonFungible {
                property,
                token_start,
                token_end,
            } => self.exec_send_nonfungible(tx, property, token_start, token_end),
            Payload::SendToMany { property, outputs } => {
                self.exec_send_to_many(tx, property, &outputs)
            }
            Payload::TradeOffer {
                property,
                amount,
                native_desired,
                payment_window,
                min_fee,
                action,
            } => self.exec_trade_offer(
                tx,
                property,
                amount,
                native_desired,
                payment_window,
                min_fee,
                action,
            ),
            Payload::AcceptOffer { property, amount } => {
                self.exec_accept_offer(tx, property, amount)
            }
            Payload::MetaDexTrade {
                property_for_sale,
                amount_for_sale,
                property_desired,
                amount_desired,
            } => self.exec_metadex_trade(
                tx,
                property_for_sale,
                amount_for_sale,
                property_desired,
                amount_desired,
            ),
            Payload::MetaDexCancelPrice {
                property_for_sale,
                amount_for_sale,
                property_desired,
                amount_desired,
            } => self.exec_metadex_cancel_price(
                tx,
                property_for_sale,
                amount_for_sale,
                property_desired,
                amount_desired,
            ),
            Payload::MetaDexCancelPair {
                property_for_sale,
                property_desired,
            } => self.exec_metadex_cancel_pair(tx, property_for_sale, property_desired),
            Payload::MetaDexCancelEcosystem { ecosystem } => {
                self.exec_metadex_cancel_ecosystem(tx, ecosystem)
            }
            Payload::CreatePropertyFixed {
                ecosystem,
                kind,
                prev_property_id,
                category,
                subcategory,
                name,
                url,
                data,
                amount,
            } => self.exec_create_fixed(
                tx,
                ecosystem,
                kind,
                prev_property_id,
                [category, subcategory, name, url, data],
                amount,
            ),
            Payload::CreatePropertyVariable {
                ecosystem,
                kind,
                prev_property_id,
                category,
                subcategory,
                name,
                url,
                data,
                desired_property,
                tokens_per_unit,
                deadline,
                early_bird_bonus,
                issuer_percentage,
            } => self.exec_create_variable(
                tx,
                ecosystem,
                kind,
                prev_property_id,
                [category, subcategory, name, url, data],
                desired_property,
                tokens_per_unit,
                deadline,
                early_bird_bonus,
                issuer_percentage,
                block_time,
            ),
            Payload::CloseCrowdsale { property } => {
                self.exec_close_crowdsale(tx, property, block_time)
            }
            Payload::CreatePropertyManual {
                ecosystem,
                kind,
                prev_property_id,
                category,
                subcategory,
                name,
                url,
                data,
            } => self.exec_create_manual(
                tx,
                ecosystem,
                kind,
                prev_property_id,
                [category, subcategory, name, url, data],
            ),
            Payload::GrantTokens {
                property,
                amount,
                memo,
            } => self.exec_grant(tx, property, amount, &memo),
            Payload::RevokeTokens {
                property,
                amount,
                memo,
            } => self.exec_revoke(tx, property, amount, &memo),
            Payload::ChangeIssuer { property } => self.exec_change_issuer(tx, property),
            Payload::EnableFreezing { property } => self.exec_enable_freezing(tx, property),
            Payload::DisableFreezing { property } => self.exec_disable_freezing(tx, property),
            Payload::AddDelegate { property } => self.exec_add_delegate(tx, property),
            Payload::RemoveDelegate { property } => self.exec_remove_delegate(tx, property),
            Payload::FreezeTokens {
                property, address, ..
            } => self.exec_freeze(tx, property, &Address::new(address)),
            Payload::UnfreezeTokens {
                property, address, ..
            } => self.exec_unfreeze(tx, property, &Address::new(address)),
            Payload::AnyData { .. } => Ok(Ok(ValidOutcome::default())),
            Payload::NonFungibleData {
                property,
                token_start,
                token_end,
                issuer_data,
                data,
            } => self.exec_nonfungible_data(tx, property, token_start, token_end, issuer_data, &data),
            Payload::Deactivation { feature_id } => self.exec_deactivation(tx, feature_id),
            Payload::Activation {
                feature_id,
                live_block,
                min_client_version,
            } => self.exec_activation(tx, feature_id, live_block, min_client_version),
            Payload::Alert {
                alert_type,
                expiry,
                message,
            } => self.exec_alert(tx, alert_type, expiry, message),
        }
    }
}
