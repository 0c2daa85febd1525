//! Send handlers: simple send, send-all, send-to-many, non-fungible sends
//! and crowdsale participation.

use crate::context::{CoreContext, CoreError, CoreResult};
use crate::crowdsale::calculate_fundraiser;
use crate::interpreter::{Outcome, ValidOutcome};
use crate::nft::NftDataKind;
use crate::parser::MetaTx;
use crate::reason::Reject;
use crate::types::{Address, Amount, Bucket, Ecosystem, PropertyId};

impl CoreContext {
    pub(crate) fn exec_simple_send(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        amount: Amount,
        block_time: u64,
    ) -> CoreResult<Outcome> {
        if amount <= 0 {
            return Ok(Err(Reject::SendAmountInvalid));
        }
        let entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::SendPropertyNotFound)),
        };
        if entry.kind.is_non_fungible() {
            return Ok(Err(Reject::SendRequiresNonFungible));
        }
        if self.sender_frozen(&tx.sender, property, tx.block) {
            return Ok(Err(Reject::SendFrozenSender));
        }
        let recipient = match &tx.reference {
            Some(recipient) => recipient.clone(),
            None => return Ok(Err(Reject::MissingReference)),
        };
        if !self
            .state
            .tally
            .can_debit(&tx.sender, property, amount, Bucket::Available)
        {
            return Ok(Err(Reject::SendInsufficientBalance));
        }

        self.transfer(&tx.sender, &recipient, property, amount)?;
        tracing::info!(
            txid = %tx.txid,
            sender = %tx.sender,
            recipient = %recipient,
            property,
            amount,
            "simple send"
        );

        self.maybe_participate_crowdsale(tx, &recipient, property, amount, block_time)?;

        Ok(Ok(ValidOutcome::amount(amount)))
    }

    /// Debit sender, credit recipient; preconditions already checked.
    pub(crate) fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        property: PropertyId,
        amount: Amount,
    ) -> CoreResult<()> {
        self.state
            .tally
            .debit(from, property, amount, Bucket::Available)
            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
        self.state
            .tally
            .credit(to, property, amount, Bucket::Available)
            .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
        Ok(())
    }

    /// A send of a crowdsale's desired property to its issuer mints tokens.
    fn maybe_participate_crowdsale(
        &mut self,
        tx: &MetaTx,
        recipient: &Address,
        property_sent: PropertyId,
        amount: Amount,
        block_time: u64,
    ) -> CoreResult<()> {
        let snapshot = match self.state.crowdsales.accepting(recipient, property_sent) {
            Some(crowdsale) => (
                crowdsale.property,
                crowdsale.deadline,
                crowdsale.tokens_per_unit,
                crowdsale.early_bird_bonus,
                crowdsale.issuer_percentage,
                crowdsale.issuer.clone(),
                crowdsale.user_created,
                crowdsale.issuer_created,
            ),
            None => return Ok(()),
        };
        let (
            cs_property,
            deadline,
            tokens_per_unit,
            early_bird_bonus,
            issuer_percentage,
            issuer,
            user_created,
            issuer_created,
        ) = snapshot;

        if block_time >= deadline {
            return Ok(()); // the expiry sweep at block-begin will close it
        }

        let sent_divisible = self
            .dbs
            .registry
            .get(property_sent)?
            .map(|e| e.is_divisible())
            .unwrap_or(false);

        let share = calculate_fundraiser(
            sent_divisible,
            amount,
            tokens_per_unit,
            deadline,
            block_time,
            early_bird_bonus,
            issuer_percentage,
            user_created.saturating_add(issuer_created),
        );

        if share.user_tokens > 0 {
            self.state
                .tally
                .credit(&tx.sender, cs_property, share.user_tokens, Bucket::Available)
                .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
        }
        if share.issuer_tokens > 0 {
            self.state
                .tally
                .credit(&issuer, cs_property, share.issuer_tokens, Bucket::Available)
                .map_err(|e| CoreError::Inconsistency(e.to_string()))?;
        }

        if let Some(crowdsale) = self.state.crowdsales.get_mut(cs_property) {
            crowdsale.user_created += share.user_tokens;
            crowdsale.issuer_created += share.issuer_tokens;
            crowdsale
                .participations
                .insert(tx.txid, (share.user_tokens, share.issuer_tokens));
        }

        let mut entry = self.dbs.registry.require(cs_property)?;
        entry.num_tokens = entry
            .num_tokens
            .saturating_add(share.user_tokens)
            .saturating_add(share.issuer_tokens);
        entry.update_block = tx.block;
        if share.cap_hit {
            entry.max_tokens_reached = true;
            entry.missed_tokens = entry.missed_tokens.saturating_add(share.missed_tokens);
            entry.time_closed = block_time;
        }
        self.dbs.registry.update(cs_property, &entry)?;

        if share.cap_hit {
            self.state.crowdsales.remove(cs_property);
            tracing::info!(property = cs_property, "crowdsale closed at token cap");
        }

        tracing::info!(
            txid = %tx.txid,
            property = cs_property,
            participant = %tx.sender,
            user_tokens = share.user_tokens,
            issuer_tokens = share.issuer_tokens,
            "crowdsale participation"
        );
        Ok(())
    }

    pub(crate) fn exec_send_all(&mut self, tx: &MetaTx, ecosystem: u8) -> CoreResult<Outcome> {
        let ecosystem = match Ecosystem::from_byte(ecosystem) {
            Some(ecosystem) => ecosystem,
            None => return Ok(Err(Reject::InvalidEcosystem)),
        };
        let recipient = match &tx.reference {
            Some(recipient) => recipient.clone(),
            None => return Ok(Err(Reject::MissingReference)),
        };

        let mut subsends = Vec::new();
        for property in self.state.tally.properties_of(&tx.sender) {
            if Ecosystem::of(property) != ecosystem {
                continue;
            }
            // only the available bucket moves; reserved amounts stay put
            let amount = self
                .state
                .tally
                .balance(&tx.sender, property, Bucket::Available);
            if amount <= 0 {
                continue;
            }
            // frozen holdings and unique tokens are skipped, not an error
            if self.sender_frozen(&tx.sender, property, tx.block) {
                continue;
            }
            if let Some(entry) = self.dbs.registry.get(property)? {
                if entry.kind.is_non_fungible() {
                    continue;
                }
            }
            subsends.push((property, amount));
        }

        if subsends.is_empty() {
            return Ok(Err(Reject::SendAllNoTokens));
        }

        for (property, amount) in &subsends {
            self.transfer(&tx.sender, &recipient, *property, *amount)?;
        }
        tracing::info!(
            txid = %tx.txid,
            sender = %tx.sender,
            recipient = %recipient,
            properties = subsends.len(),
            "send all"
        );
        Ok(Ok(ValidOutcome {
            amount: 0,
            subsends,
        }))
    }

    pub(crate) fn exec_send_to_many(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        outputs: &[(u8, Amount)],
    ) -> CoreResult<Outcome> {
        let entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::SendPropertyNotFound)),
        };
        if entry.kind.is_non_fungible() {
            return Ok(Err(Reject::SendRequiresNonFungible));
        }
        if self.sender_frozen(&tx.sender, property, tx.block) {
            return Ok(Err(Reject::SendFrozenSender));
        }
        if outputs.is_empty() {
            return Ok(Err(Reject::SendManyAmountInvalid));
        }

        // resolve every receiver first; any failure rejects the whole send
        let mut resolved: Vec<(Address, Amount)> = Vec::with_capacity(outputs.len());
        let mut total: Amount = 0;
        for (vout, amount) in outputs {
            if *amount <= 0 {
                return Ok(Err(Reject::SendManyAmountInvalid));
            }
            let recipient = tx
                .output_addresses
                .get(*vout as usize)
                .and_then(|a| a.clone());
            let recipient = match recipient {
                Some(recipient) => recipient,
                None => return Ok(Err(Reject::SendManyOutputUnresolved)),
            };
            total = match total.checked_add(*amount) {
                Some(total) => total,
                None => return Ok(Err(Reject::SendManyAmountInvalid)),
            };
            resolved.push((recipient, *amount));
        }

        if !self
            .state
            .tally
            .can_debit(&tx.sender, property, total, Bucket::Available)
        {
            return Ok(Err(Reject::SendManyInsufficientBalance));
        }

        for (recipient, amount) in &resolved {
            self.transfer(&tx.sender, recipient, property, *amount)?;
        }
        tracing::info!(
            txid = %tx.txid,
            sender = %tx.sender,
            property,
            total,
            recipients = resolved.len(),
            "send to many"
        );
        Ok(Ok(ValidOutcome::amount(total)))
    }

    pub(crate) fn exec_send_nonfungible(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        token_start: i64,
        token_end: i64,
    ) -> CoreResult<Outcome> {
        if token_start <= 0 || token_end < token_start {
            return Ok(Err(Reject::NftRangeInvalid));
        }
        let entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::SendPropertyNotFound)),
        };
        if !entry.kind.is_non_fungible() {
            return Ok(Err(Reject::SendRequiresNonFungible));
        }
        if self.sender_frozen(&tx.sender, property, tx.block) {
            return Ok(Err(Reject::SendFrozenSender));
        }
        let recipient = match &tx.reference {
            Some(recipient) => recipient.clone(),
            None => return Ok(Err(Reject::MissingReference)),
        };
        let amount = token_end - token_start + 1;
        if !self
            .state
            .tally
            .can_debit(&tx.sender, property, amount, Bucket::Available)
        {
            return Ok(Err(Reject::SendInsufficientBalance));
        }

        // the range store verifies contiguous ownership before mutating
        if !self
            .dbs
            .nft
            .move_tokens(property, token_start, token_end, &tx.sender, &recipient)?
        {
            return Ok(Err(Reject::NftRangeNotOwned));
        }
        self.transfer(&tx.sender, &recipient, property, amount)?;

        tracing::info!(
            txid = %tx.txid,
            sender = %tx.sender,
            recipient = %recipient,
            property,
            token_start,
            token_end,
            "unique send"
        );
        Ok(Ok(ValidOutcome::amount(amount)))
    }

    pub(crate) fn exec_nonfungible_data(
        &mut self,
        tx: &MetaTx,
        property: PropertyId,
        token_start: i64,
        token_end: i64,
        issuer_data: bool,
        data: &str,
    ) -> CoreResult<Outcome> {
        if token_start <= 0 || token_end < token_start {
            return Ok(Err(Reject::NftRangeInvalid));
        }
        let entry = match self.dbs.registry.get(property)? {
            Some(entry) => entry,
            None => return Ok(Err(Reject::SendPropertyNotFound)),
        };
        if !entry.kind.is_non_fungible() {
            return Ok(Err(Reject::SendRequiresNonFungible));
        }

        let kind = if issuer_data {
            if entry.manager_at(tx.block) != &tx.sender {
                return Ok(Err(Reject::NftDataNotAuthorized));
            }
            NftDataKind::IssuerData
        } else {
            let owner = self
                .dbs
                .nft
                .value_in_range(property, token_start, token_end, NftDataKind::RangeIndex)?;
            if owner.as_deref() != Some(tx.sender.as_str()) {
                return Ok(Err(Reject::NftDataNotAuthorized));
            }
            NftDataKind::HolderData
        };

        self.dbs
            .nft
            .set_data(property, token_start, token_end, data, kind)?;
        Ok(Ok(ValidOutcome::default()))
    }
}
