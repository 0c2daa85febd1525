//! Property management handlers: creations, crowdsale close, grant/revoke,
//! issuer and delegate changes.

use crate::context::{CoreContext, CoreError, CoreResult};
use crate::crowdsale::Crowdsale;
use crate::interpreter::{Outcome, ValidOutcome};
use crate::parser::MetaTx;
use crate::reason::Reject;
use crate::registry::PropertyEntry;
use crate::types::{
    Amount, Bucket, Ecosystem, PropertyId, PropertyKind, MAX_AMOUNT, MAX_STRING_FIELD_LEN,
};

/// [category, subcategory, name, url, data]
type InfoFields = [String; 5];

impl CoreContext {
    fn validate_creation(
        &self,
        ecosystem: u8,
        kind: u16,
        info: &InfoFields,
    ) -> Result<(Ecosystem, PropertyKind), Reject> {
        let ecosystem = Ecosystem::from_byte(ecosystem).ok_or(Reject::InvalidEcosystem)?;
        let kind = PropertyKind::from_code(kind).ok_or(Reject::PropertyKindInvalid)?;
        let [_, _, name, _, _] = info;
        if name.is_empty() {
            return Err(Reject::PropertyStringTooLong);
        }
        if info.iter().any(|s| s.len() >= MAX_STRING_FIELD_LEN) {
            return Err(Reject::PropertyStringTooLong);
        }
        Ok((ecosystem, kind))
    }

    fn fill_entry(
        &self,
        tx: &MetaTx,
        kind: PropertyKind,
        prev_property_id: PropertyId,
        info: InfoFields,
    ) -> PropertyEntry {
        let [category, subcategory, name, url, data] = info;
        let mut entry = PropertyEntry::new(tx.sender.clone(), kind);
        entry.prev_property_id = prev_property_id;
        entry.category = category;
        entry.subcategory = subcategory;
        entry.name = name;
        entry.url = url;
        entry.data = data;
        entry.creation_txid = tx.txid;
        entry.creation_block = tx.block;
        entry.update_block = tx.block;
        entry.update_issuer(tx.block, tx.idx, tx.sender.clone());
        entry
    }

    pub(crate) fn exec_create_fixed(
        &mut self,
        tx: &MetaTx,
        ecosystem: u8,
        kind: u16,
        prev_property_id: PropertyId,
        info: InfoFields,
        amount: Amount,
    ) -> CoreResult<Outcome> {
        let (ecosystem, kind) = match self.validate_creation(ecosystem, kind, &info) {
            Ok(validated) => validated,
            Err(reject) => return Ok(Err(reject)),
        };
        if amount <= 0 {
            return Ok(Err(Reject::PropertyAmountInvalid));
        }
        if kind.is_non_fungible() {
            // unique tokens are granted, never created with fixed supply
            return Ok(Err(Reject::PropertyKindInvalid));
        }

        let mut entry = self.fill_entry(tx, kind, prev_property_id, info);
        entry.fixed = true;
        entry.num_tokens = amount;

        let property = self.dbs.registry.create(ecosystem, &entry)?;
        self.state
            .tally
            .credit(&tx.sender, property, amount, Bucket::Available)
            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;

        tracing::info!(
            txid = %tx.txid,
            property,
            issuer = %tx.sender,
            name = %entry.name,
            amount,
            "fixed property created"
        );
        Ok(Ok(ValidOutcome::amount(amount)))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn exec_create_variable(
        &mut self,
        tx: &MetaTx,
        ecosystem: u8,
        kind: u16,
        prev_property_id: PropertyId,
        info: InfoFields,
        desired_property: PropertyId,
        tokens_per_unit: Amount,
        deadline: u64,
        early_bird_bonus: u8,
        issuer_percentage: u8,
        block_time: u64,
    ) -> CoreResult<Outcome> {
        let (ecosystem, kind) = match self.validate_creation(ecosystem, kind, &info) {
            Ok(validated) => validated,
            Err(reject) => return Ok(Err(reject)),
        };
        if kind.is_non_fungible() {
            return Ok(Err(Reject::PropertyKindInvalid));
        }
        if tokens_per_unit <= 0 {
            return Ok(Err(Reject::PropertyAmountInvalid));
        }
        if deadline <= block_time {
            return Ok(Err(Reject::CrowdsaleDeadlinePassed));
        }
        if !self.dbs.registry.has(desired_property)? {
            return Ok(Err(Reject::CrowdsaleDesiredMissing));
        }
        if Ecosystem::of(desired_property) != ecosystem {
            return Ok(Err(Reject::InvalidEcosystem));
        }
        if self.state.crowdsales.issuer_has_active(&tx.sender) {
            return Ok(Err(Reject::CrowdsaleAlreadyActive));
        }

        let mut entry = self.fill_entry(tx, kind, prev_property_id, info);
        entry.desired_property = desired_property;
        entry.tokens_per_unit = tokens_per_unit;
        entry.deadline = deadline;
        entry.early_bird_bonus = early_bird_bonus;
        entry.issuer_percentage = issuer_percentage;

        let property = self.dbs.registry.create(ecosystem, &entry)?;
        self.state.crowdsales.insert(Crowdsale {
            property,
            issuer: tx.sender.clone(),
            desired_property,
            tokens_per_unit,
            deadline,
            early_bird_bonus,
            issuer_percentage,
            start_block: tx.block,
            creation_txid: tx.txid,
            user_created: 0,
            issuer_created: 0,
            participations: Default::default(),
        });

        tracing::info!(
            txid = %tx.txid,
            property,
            issuer = %tx.sender,
            desired_property,
            deadline,
            "crowdsale opened"
        );
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_close_crowdsale(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        block_time: u64,
    ) -> CoreResult<Outcome> {
        let crowdsale = match self.state.crowdsales.get(property) {
            Some(crowdsale) => crowdsale,
            None => return Ok(Err(Reject::CrowdsaleNotActive)),
        };
        if crowdsale.issuer != tx.sender {
            return Ok(Err(Reject::PropertyNotIssuer));
        }

        self.close_crowdsale_internal(property, block_time, true, tx.block)?;
        tracing::info!(txid = %tx.txid, property, "crowdsale closed by issuer");
        Ok(Ok(ValidOutcome::default()))
    }

    /// Shared close path: issuer close (`early = true`) and deadline expiry.
    pub(crate) fn close_crowdsale_internal(
        &mut self,
        property: PropertyId,
        block_time: u64,
        early: bool,
        block: crate::types::BlockHeight,
    ) -> CoreResult<()> {
        if self.state.crowdsales.remove(property).is_none() {
            return Ok(());
        }
        let mut entry = self.dbs.registry.require(property)?;
        entry.close_early = early;
        entry.time_closed = block_time;
        entry.update_block = block;
        self.dbs.registry.update(property, &entry)?;
        Ok(())
    }

    pub(crate) fn exec_create_manual(
        &mut self,
        tx: &MetaTx,
        ecosystem: u8,
        kind: u16,
        prev_property_id: PropertyId,
        info: InfoFields,
    ) -> CoreResult<Outcome> {
        let (ecosystem, kind) = match self.validate_creation(ecosystem, kind, &info) {
            Ok(validated) => validated,
            Err(reject) => return Ok(Err(reject)),
        };

        let mut entry = self.fill_entry(tx, kind, prev_property_id, info);
        entry.manual = true;
        entry.unique = kind.is_non_fungible();

        let property = self.dbs.registry.create(ecosystem, &entry)?;
        tracing::info!(
            txid = %tx.txid,
            property,
            issuer = %tx.sender,
            name = %entry.name,
            unique = entry.unique,
            "managed property created"
        );
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_grant(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        amount: Amount,
        memo: &str,
    ) -> CoreResult<Outcome> {
        if amount <= 0 {
            return Ok(Err(Reject::PropertyAmountInvalid));
        }
        let mut entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::PropertyNotFound)),
        };
        if !entry.manual {
            return Ok(Err(Reject::PropertyNotManual));
        }
        if entry.manager_at(tx.block) != &tx.sender {
            return Ok(Err(Reject::PropertyNotIssuer));
        }
        if entry.num_tokens > MAX_AMOUNT - amount {
            return Ok(Err(Reject::TokensSupplyOverflow));
        }

        let recipient = tx.reference.clone().unwrap_or_else(|| tx.sender.clone());

        if entry.unique {
            let (start, end) = self
                .dbs
                .nft
                .create_tokens(property, amount, &recipient, memo)?;
            tracing::debug!(property, start, end, "unique tokens granted");
        }
        self.state
            .tally
            .credit(&recipient, property, amount, Bucket::Available)
            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;

        entry.num_tokens += amount;
        entry.update_block = tx.block;
        self.dbs.registry.update(property, &entry)?;

        tracing::info!(
            txid = %tx.txid,
            property,
            recipient = %recipient,
            amount,
            "tokens granted"
        );
        Ok(Ok(ValidOutcome::amount(amount)))
    }

    pub(crate) fn exec_revoke(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        amount: Amount,
        _memo: &str,
    ) -> CoreResult<Outcome> {
        if amount <= 0 {
            return Ok(Err(Reject::PropertyAmountInvalid));
        }
        let mut entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::PropertyNotFound)),
        };
        if !entry.manual {
            return Ok(Err(Reject::PropertyNotManual));
        }
        if entry.unique {
            // unique token ids are permanent once granted
            return Ok(Err(Reject::PropertyKindInvalid));
        }
        if entry.manager_at(tx.block) != &tx.sender {
            return Ok(Err(Reject::PropertyNotIssuer));
        }
        if !self
            .state
            .tally
            .can_debit(&tx.sender, property, amount, Bucket::Available)
        {
            return Ok(Err(Reject::TokensRevokeInsufficient));
        }

        self.state
            .tally
            .debit(&tx.sender, property, amount, Bucket::Available)
            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
        entry.num_tokens -= amount;
        entry.update_block = tx.block;
        self.dbs.registry.update(property, &entry)?;

        tracing::info!(txid = %tx.txid, property, amount, "tokens revoked");
        Ok(Ok(ValidOutcome::amount(amount)))
    }

    pub(crate) fn exec_change_issuer(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
    ) -> CoreResult<Outcome> {
        let mut entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::PropertyNotFound)),
        };
        if entry.issuer_at(tx.block) != &tx.sender {
            return Ok(Err(Reject::PropertyNotIssuer));
        }
        let new_issuer = match &tx.reference {
            Some(new_issuer) => new_issuer.clone(),
            None => return Ok(Err(Reject::MissingReference)),
        };

        entry.issuer = new_issuer.clone();
        entry.update_issuer(tx.block, tx.idx, new_issuer.clone());
        entry.update_block = tx.block;
        self.dbs.registry.update(property, &entry)?;

        tracing::info!(
            txid = %tx.txid,
            property,
            new_issuer = %new_issuer,
            "issuer changed"
        );
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_add_delegate(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
    ) -> CoreResult<Outcome> {
        let mut entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::PropertyNotFound)),
        };
        if entry.issuer_at(tx.block) != &tx.sender {
            return Ok(Err(Reject::PropertyNotIssuer));
        }
        let delegate = match &tx.reference {
            Some(delegate) => delegate.clone(),
            None => return Ok(Err(Reject::MissingReference)),
        };

        entry.delegate = Some(delegate.clone());
        entry.add_delegate(tx.block, tx.idx, delegate.clone());
        entry.update_block = tx.block;
        self.dbs.registry.update(property, &entry)?;

        tracing::info!(txid = %tx.txid, property, delegate = %delegate, "delegate added");
        Ok(Ok(ValidOutcome::default()))
    }

    pub(crate) fn exec_remove_delegate(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
    ) -> CoreResult<Outcome> {
        let mut entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::PropertyNotFound)),
        };
        // the issuer or the delegate itself may remove the delegation
        let authorized = entry.issuer_at(tx.block) == &tx.sender
            || entry.delegate_at(tx.block) == Some(&tx.sender);
        if !authorized {
            return Ok(Err(Reject::PropertyNotIssuer));
        }
        if entry.delegate_at(tx.block).is_none() {
            return Ok(Err(Reject::PropertyHasDelegate));
        }

        entry.delegate = None;
        entry.remove_delegate(tx.block, tx.idx);
        entry.update_block = tx.block;
        self.dbs.registry.update(property, &entry)?;

        tracing::info!(txid = %tx.txid, property, "delegate removed");
        Ok(Ok(ValidOutcome::default()))
    }
}
