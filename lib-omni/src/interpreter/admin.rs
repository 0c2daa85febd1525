//! Administrative handlers: freezing, feature activations, deactivations
//! and alerts.

use crate::activation::{
    activation_sender_authorized, alert_sender_authorized, Alert,
};
use crate::context::{CoreContext, CoreResult};
use crate::interpreter::{Outcome, ValidOutcome};
use crate::parser::MetaTx;
use crate::reason::Reject;
use crate::types::{Address, BlockHeight, PropertyId};

impl CoreContext {
    // =========================================================================
    // FREEZING
    // =========================================================================

    pub(crate) fn exec_enable_freezing(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
    ) -> CoreResult<Outcome> {
        let entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::PropertyNotFound)),
        };
        if !entry.manual {
            return Ok(Err(Reject::PropertyNotManual));
        }
        if entry.manager_at(tx.block) != &tx.sender {
            return Ok(Err(Reject::PropertyNotIssuer));
        }
        if self.state.freeze.has_enabled_entry(property) {
            return Ok(Err(Reject::FreezingAlreadyEnabled));
        }

        self.state.freeze.enable(property, tx.block);
        tracing::info!(txid = %tx.txid, property, block = tx.block, "freezing enabled");
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_disable_freezing(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
    ) -> CoreResult<Outcome> {
        let entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::PropertyNotFound)),
        };
        if entry.manager_at(tx.block) != &tx.sender {
            return Ok(Err(Reject::PropertyNotIssuer));
        }
        if !self.state.freeze.has_enabled_entry(property) {
            return Ok(Err(Reject::FreezingNotEnabled));
        }

        self.state.freeze.disable(property);
        tracing::info!(txid = %tx.txid, property, "freezing disabled");
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_freeze(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        target: &Address,
    ) -> CoreResult<Outcome> {
        let entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::PropertyNotFound)),
        };
        if entry.manager_at(tx.block) != &tx.sender {
            return Ok(Err(Reject::PropertyNotIssuer));
        }
        if !self.state.freeze.is_enabled(property, tx.block) {
            return Ok(Err(Reject::FreezingNotEnabled));
        }
        if self.state.freeze.is_frozen(property, target) {
            return Ok(Err(Reject::FreezingAddressFrozen));
        }

        self.state.freeze.freeze(property, target.clone());
        tracing::info!(txid = %tx.txid, property, target = %target, "address frozen");
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_unfreeze(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        target: &Address,
    ) -> CoreResult<Outcome> {
        let entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::PropertyNotFound)),
        };
        if entry.manager_at(tx.block) != &tx.sender {
            return Ok(Err(Reject::PropertyNotIssuer));
        }
        if !self.state.freeze.is_frozen(property, target) {
            return Ok(Err(Reject::FreezingAddressNotFrozen));
        }

        self.state.freeze.unfreeze(property, target);
        tracing::info!(txid = %tx.txid, property, target = %target, "address unfrozen");
        Ok(Ok(ValidOutcome::default()))
    }

    // =========================================================================
    // ACTIVATIONS AND ALERTS
    // =========================================================================

    fn activation_authorized(&self, sender: &Address) -> bool {
        activation_sender_authorized(
            &self.params,
            sender,
            &self.options.activation_allow_senders,
            &self.options.activation_ignore_senders,
        )
    }

    pub(crate) fn exec_activation(
        &mut self,
        tx: &MetaTx,
        feature_id: u16,
        live_block: BlockHeight,
        min_client_version: u32,
    ) -> CoreResult<Outcome> {
        if !self.activation_authorized(&tx.sender) {
            return Ok(Err(Reject::UnauthorizedSender));
        }
        if !self
            .state
            .activations
            .schedule(feature_id, live_block, min_client_version, tx.block)
        {
            return Ok(Err(Reject::ActivationInvalid));
        }
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_deactivation(
        &mut self,
        tx: &MetaTx,
        feature_id: u16,
    ) -> CoreResult<Outcome> {
        if !self.activation_authorized(&tx.sender) {
            return Ok(Err(Reject::UnauthorizedSender));
        }
        if !self.state.activations.deactivate(feature_id) {
            return Ok(Err(Reject::ActivationInvalid));
        }
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_alert(
        &mut self,
        tx: &MetaTx,
        alert_type: u16,
        expiry: u32,
        message: String,
    ) -> CoreResult<Outcome> {
        if !alert_sender_authorized(&self.params, &tx.sender) {
            return Ok(Err(Reject::UnauthorizedSender));
        }
        if message.is_empty() {
            return Ok(Err(Reject::AlertInvalid));
        }
        self.state.activations.add_alert(Alert {
            alert_type,
            expiry,
            message,
        });
        Ok(Ok(ValidOutcome::default()))
    }
}
