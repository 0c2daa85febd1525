//! Runtime Options
//!
//! The recognized operator options and debug categories. Option names are
//! stable protocol surface; the node binary parses its argument list into
//! [`CoreOptions`].

use std::collections::BTreeSet;

use crate::rules::Network;
use crate::types::Address;

/// Debug log categories toggled by `-omnidebug=<cat>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugCategory {
    Parser,
    Interpreter,
    Tally,
    Nft,
    Fees,
    Dex,
    MetaDex,
    Sto,
    Persistence,
    ConsensusHash,
}

impl DebugCategory {
    pub const ALL: [DebugCategory; 10] = [
        DebugCategory::Parser,
        DebugCategory::Interpreter,
        DebugCategory::Tally,
        DebugCategory::Nft,
        DebugCategory::Fees,
        DebugCategory::Dex,
        DebugCategory::MetaDex,
        DebugCategory::Sto,
        DebugCategory::Persistence,
        DebugCategory::ConsensusHash,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "parser" => Some(DebugCategory::Parser),
            "interpreter" => Some(DebugCategory::Interpreter),
            "tally" => Some(DebugCategory::Tally),
            "nft" => Some(DebugCategory::Nft),
            "fees" => Some(DebugCategory::Fees),
            "dex" => Some(DebugCategory::Dex),
            "metadex" => Some(DebugCategory::MetaDex),
            "sto" => Some(DebugCategory::Sto),
            "persistence" => Some(DebugCategory::Persistence),
            "consensushash" => Some(DebugCategory::ConsensusHash),
            _ => None,
        }
    }
}

/// Operator options recognized by the core.
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Wipe all state and rebuild from genesis.
    pub start_clean: bool,
    /// Skip blocks known a priori to contain no protocol txs.
    pub seed_block_filter: bool,
    /// Bypass the mainnet checkpoint-suppression height.
    pub skip_storing_state: bool,
    /// Extra senders accepted for activations.
    pub activation_allow_senders: Vec<Address>,
    /// Senders ignored for activations even when otherwise authorized.
    pub activation_ignore_senders: Vec<Address>,
    /// Minimum seconds between progress log lines during initial scan.
    pub progress_frequency_secs: u64,
    /// Enabled debug categories.
    pub debug: BTreeSet<DebugCategory>,
    /// Keep the persisted state on fatal errors (skip forced rescan).
    pub override_forced_shutdown: bool,
}

impl CoreOptions {
    pub fn defaults(network: Network) -> Self {
        CoreOptions {
            start_clean: false,
            seed_block_filter: network == Network::Main,
            skip_storing_state: false,
            activation_allow_senders: Vec::new(),
            activation_ignore_senders: Vec::new(),
            progress_frequency_secs: 30,
            debug: BTreeSet::new(),
            override_forced_shutdown: false,
        }
    }

    pub fn debug_enabled(&self, category: DebugCategory) -> bool {
        self.debug.contains(&category)
    }

    /// Parse recognized `-option[=value]` arguments; unrecognized arguments
    /// are left to the host-side parser.
    pub fn apply_args<S: AsRef<str>>(mut self, args: &[S]) -> Self {
        for arg in args {
            let arg = arg.as_ref();
            let (name, value) = match arg.split_once('=') {
                Some((n, v)) => (n, Some(v)),
                None => (arg, None),
            };
            match name {
                "-startclean" => self.start_clean = true,
                "-omniseedblockfilter" => {
                    self.seed_block_filter = value.map(|v| v != "0").unwrap_or(true)
                }
                "-omniskipstoringstate" => self.skip_storing_state = true,
                "-omniactivationallowsender" => {
                    if let Some(addr) = value {
                        self.activation_allow_senders.push(Address::new(addr));
                    }
                }
                "-omniactivationignoresender" => {
                    if let Some(addr) = value {
                        self.activation_ignore_senders.push(Address::new(addr));
                    }
                }
                "-omniprogressfrequency" => {
                    if let Some(secs) = value.and_then(|v| v.parse().ok()) {
                        self.progress_frequency_secs = secs;
                    }
                }
                "-omnidebug" => match value {
                    Some("all") => self.debug.extend(DebugCategory::ALL),
                    Some("none") => self.debug.clear(),
                    Some(cat) => {
                        if let Some(category) = DebugCategory::from_name(cat) {
                            self.debug.insert(category);
                        }
                    }
                    None => {}
                },
                "-overrideforcedshutdown" => self.override_forced_shutdown = true,
                _ => {}
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_per_network() {
        assert!(CoreOptions::defaults(Network::Main).seed_block_filter);
        assert!(!CoreOptions::defaults(Network::Regtest).seed_block_filter);
        assert_eq!(CoreOptions::defaults(Network::Main).progress_frequency_secs, 30);
    }

    #[test]
    fn parses_recognized_args() {
        let options = CoreOptions::defaults(Network::Main).apply_args(&[
            "-startclean",
            "-omniseedblockfilter=0",
            "-omniprogressfrequency=5",
            "-omnidebug=fees",
            "-omnidebug=nft",
            "-omniactivationallowsender=1Allowed",
            "-overrideforcedshutdown",
        ]);
        assert!(options.start_clean);
        assert!(!options.seed_block_filter);
        assert_eq!(options.progress_frequency_secs, 5);
        assert!(options.debug_enabled(DebugCategory::Fees));
        assert!(options.debug_enabled(DebugCategory::Nft));
        assert!(!options.debug_enabled(DebugCategory::Parser));
        assert_eq!(options.activation_allow_senders.len(), 1);
        assert!(options.override_forced_shutdown);
    }

    #[test]
    fn debug_all_and_none() {
        let options = CoreOptions::defaults(Network::Main).apply_args(&["-omnidebug=all"]);
        assert!(options.debug_enabled(DebugCategory::ConsensusHash));

        let options = options.apply_args(&["-omnidebug=none"]);
        assert!(!options.debug_enabled(DebugCategory::ConsensusHash));
    }
}
