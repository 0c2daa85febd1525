//! Send To Owners: proportional broadcast distribution with the per-recipient
//! transfer fee paid in the ecosystem's protocol token.

use crate::context::{CoreContext, CoreError, CoreResult};
use crate::interpreter::{Outcome, ValidOutcome};
use crate::parser::MetaTx;
use crate::reason::Reject;
use crate::sto::distribution_receivers;
use crate::types::{Amount, Bucket, Ecosystem, PropertyId};

impl CoreContext {
    pub(crate) fn exec_send_to_owners(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        amount: Amount,
        distribution_property: PropertyId,
    ) -> CoreResult<Outcome> {
        if amount <= 0 {
            return Ok(Err(Reject::StoAmountInvalid));
        }
        if !self.dbs.registry.has(property)? {
            return Ok(Err(Reject::StoPropertyNotFound));
        }
        if !self.dbs.registry.has(distribution_property)? {
            return Ok(Err(Reject::StoPropertyNotFound));
        }
        if self.sender_frozen(&tx.sender, property, tx.block) {
            return Ok(Err(Reject::StoFrozenSender));
        }
        if !self
            .state
            .tally
            .can_debit(&tx.sender, property, amount, Bucket::Available)
        {
            return Ok(Err(Reject::StoInsufficientBalance));
        }

        // holders are snapshotted before any mutation of this transaction
        let receivers =
            distribution_receivers(&self.state.tally, distribution_property, &tx.sender, amount);
        if receivers.is_empty() {
            return Ok(Err(Reject::StoNoOtherOwners));
        }

        // transfer fee: one base unit of the protocol token per recipient
        let fee_token = Ecosystem::of(property).protocol_token();
        let fee = receivers.len() as Amount;
        if !self
            .state
            .tally
            .can_debit(&tx.sender, fee_token, fee, Bucket::Available)
        {
            return Ok(Err(Reject::StoInsufficientBalance));
        }

        let exodus = self.params.exodus_address.clone();
        self.transfer(&tx.sender, &exodus, fee_token, fee)?;

        let mut distributed: Amount = 0;
        for (recipient, share) in &receivers {
            self.state
                .tally
                .debit(&tx.sender, property, *share, Bucket::Available)
                .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
            self.state
                .tally
                .credit(recipient, property, *share, Bucket::Available)
                .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
            distributed += share;
            self.dbs
                .stolist
                .record_receive(&tx.txid, recipient, tx.block, property, *share)?;
        }

        tracing::info!(
            txid = %tx.txid,
            sender = %tx.sender,
            property,
            amount,
            distributed,
            recipients = receivers.len(),
            fee,
            "send to owners"
        );
        Ok(Ok(ValidOutcome::amount(amount)))
    }
}
