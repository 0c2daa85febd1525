//! Feature Activations and Alerts
//!
//! Administrative transactions from authorized senders: activations
//! schedule a feature to go live at a stated future block, deactivations
//! turn a feature off immediately, alerts carry an operator-visible message
//! with an expiry. Activations survive restarts through the checkpoint
//! snapshot and are re-applied at block-begin.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rules::{ConsensusParams, CLIENT_VERSION, KNOWN_FEATURES};
use crate::types::{Address, BlockHeight};

/// A scheduled (not yet live) feature activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingActivation {
    pub feature_id: u16,
    pub live_block: BlockHeight,
    pub min_client_version: u32,
}

/// A broadcast alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: u16,
    /// Block height after which the alert is dropped.
    pub expiry: u32,
    pub message: String,
}

/// Activation and alert state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivationState {
    pending: Vec<PendingActivation>,
    /// feature id → block since which it is live
    completed: BTreeMap<u16, BlockHeight>,
    alerts: Vec<Alert>,
}

impl ActivationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline state for a network: every known feature live from the
    /// protocol's first block. Activations shift features introduced later.
    pub fn with_defaults(params: &ConsensusParams) -> Self {
        let mut state = Self::default();
        for feature in KNOWN_FEATURES {
            state.completed.insert(feature, params.genesis_block);
        }
        state
    }

    /// Validate and schedule an activation. Returns false when the feature
    /// is unknown, the live block is not in the future, or this client is
    /// too old (the original also halts old clients; surfacing the alert is
    /// the binary's job).
    pub fn schedule(
        &mut self,
        feature_id: u16,
        live_block: BlockHeight,
        min_client_version: u32,
        current_block: BlockHeight,
    ) -> bool {
        if !KNOWN_FEATURES.contains(&feature_id) {
            return false;
        }
        if live_block <= current_block {
            return false;
        }
        if min_client_version > CLIENT_VERSION {
            tracing::warn!(
                feature_id,
                min_client_version,
                "activation requires a newer client version"
            );
            return false;
        }
        // a re-activation supersedes any earlier pending entry
        self.pending.retain(|p| p.feature_id != feature_id);
        self.pending.push(PendingActivation {
            feature_id,
            live_block,
            min_client_version,
        });
        tracing::info!(feature_id, live_block, "feature activation scheduled");
        true
    }

    /// Deactivate a live or pending feature.
    pub fn deactivate(&mut self, feature_id: u16) -> bool {
        let was_known = self.completed.remove(&feature_id).is_some()
            || self.pending.iter().any(|p| p.feature_id == feature_id);
        self.pending.retain(|p| p.feature_id != feature_id);
        if was_known {
            tracing::info!(feature_id, "feature deactivated");
        }
        was_known
    }

    /// Move every activation whose live block is `block` into the completed
    /// set. Called at block-begin.
    pub fn check_live(&mut self, block: BlockHeight) {
        let (live, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.live_block == block);
        self.pending = pending;
        for activation in live {
            tracing::info!(
                feature_id = activation.feature_id,
                block,
                "feature went live"
            );
            self.completed.insert(activation.feature_id, block);
        }
    }

    /// Whether a feature is live at `block`.
    pub fn is_active(&self, feature_id: u16, block: BlockHeight) -> bool {
        match self.completed.get(&feature_id) {
            Some(live_block) => block >= *live_block,
            None => false,
        }
    }

    pub fn pending(&self) -> &[PendingActivation] {
        &self.pending
    }

    pub fn completed(&self) -> &BTreeMap<u16, BlockHeight> {
        &self.completed
    }

    // =========================================================================
    // ALERTS
    // =========================================================================

    pub fn add_alert(&mut self, alert: Alert) {
        tracing::warn!(
            alert_type = alert.alert_type,
            expiry = alert.expiry,
            message = %alert.message,
            "protocol alert"
        );
        self.alerts.push(alert);
    }

    /// Drop alerts expired at this height. Called at block-end.
    pub fn check_expired_alerts(&mut self, block: BlockHeight) {
        self.alerts.retain(|a| u64::from(a.expiry) > u64::from(block));
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn clear_alerts(&mut self) {
        self.alerts.clear();
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.completed.clear();
        self.alerts.clear();
    }
}

/// Whether `sender` may issue activations, honoring the operator overrides.
pub fn activation_sender_authorized(
    params: &ConsensusParams,
    sender: &Address,
    allow_senders: &[Address],
    ignore_senders: &[Address],
) -> bool {
    if ignore_senders.contains(sender) {
        return false;
    }
    if allow_senders.contains(sender) {
        return true;
    }
    params.activation_authorizers.contains(sender)
}

/// Whether `sender` may issue alerts.
pub fn alert_sender_authorized(params: &ConsensusParams, sender: &Address) -> bool {
    params.alert_authorizers.contains(sender)
}
