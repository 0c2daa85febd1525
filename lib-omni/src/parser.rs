//! Transaction Parser
//!
//! Turns a host transaction into a typed meta-transaction: resolves the
//! sender from the spent inputs, locates and decodes the payload, assigns
//! the reference recipient and resolves per-output addresses under the
//! height-dependent script-type gates.

use thiserror::Error;

use crate::codec::{self, EncodingClass};
use crate::host::{CoinView, HostTransaction, Script};
use crate::payload::{self, Payload, PayloadError};
use crate::rules::ConsensusParams;
use crate::types::{Address, Amount, BlockHeight, TxHash};

/// Parse failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The transaction carries no protocol payload; not an error in itself.
    #[error("no protocol payload")]
    NotProtocolTx,

    /// No input resolved to a permitted script type.
    #[error("unable to determine the sender")]
    NoSender,

    /// A payload was located but does not decode.
    #[error("malformed payload: {source}")]
    Malformed {
        /// Raw type code when the header was readable.
        ty: Option<u16>,
        source: PayloadError,
    },
}

/// A parsed meta-transaction, ready for interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTx {
    pub txid: TxHash,
    pub sender: Address,
    /// First qualifying output after the payload that is not the sender.
    pub reference: Option<Address>,
    pub block: BlockHeight,
    pub idx: u32,
    pub version: u16,
    pub payload: Payload,
    pub class: EncodingClass,
    /// Destination address per output, under the script gates; `None` for
    /// outputs the protocol cannot address.
    pub output_addresses: Vec<Option<Address>>,
    /// Native value paid to each output (send-to-many and DEx payments).
    pub output_values: Vec<Amount>,
}

/// Resolve the address of an output script, honoring the height gates.
fn gated_address(
    script: &Script,
    params: &ConsensusParams,
    height: BlockHeight,
) -> Option<Address> {
    match script {
        Script::PubKeyHash(addr) => Some(addr.clone()),
        Script::ScriptHash(addr) if params.script_hash_allowed(height) => Some(addr.clone()),
        _ => None,
    }
}

/// Determine the sender by contribution: sum the spent value per resolved
/// input address, pick the address with the highest total, break ties by
/// first appearance in input order.
pub fn sender_by_contribution<V: CoinView>(
    tx: &HostTransaction,
    view: &V,
    params: &ConsensusParams,
    height: BlockHeight,
) -> Option<Address> {
    struct Contribution {
        total: Amount,
        first_input: usize,
    }

    let mut contributions: Vec<(Address, Contribution)> = Vec::new();
    for (i, input) in tx.inputs.iter().enumerate() {
        let coin = view.get_output(&input.prevout)?;
        let address = gated_address(&coin.script, params, height)?;
        match contributions.iter_mut().find(|(a, _)| *a == address) {
            Some((_, c)) => c.total += coin.value,
            None => contributions.push((
                address,
                Contribution {
                    total: coin.value,
                    first_input: i,
                },
            )),
        }
    }

    contributions
        .into_iter()
        .max_by(|(_, a), (_, b)| {
            a.total
                .cmp(&b.total)
                .then(b.first_input.cmp(&a.first_input))
        })
        .map(|(address, _)| address)
}

/// Parse a host transaction at (height, idx) into a meta-transaction.
pub fn parse<V: CoinView>(
    tx: &HostTransaction,
    view: &V,
    params: &ConsensusParams,
    height: BlockHeight,
    idx: u32,
) -> Result<MetaTx, ParseError> {
    if tx.is_coinbase() {
        return Err(ParseError::NotProtocolTx);
    }
    if !codec::has_payload_marker(tx) {
        return Err(ParseError::NotProtocolTx);
    }

    let sender = sender_by_contribution(tx, view, params, height).ok_or(ParseError::NoSender)?;

    let extracted = codec::extract_payload(tx, &sender).ok_or(ParseError::NotProtocolTx)?;
    if extracted.class == EncodingClass::ClassC && !params.null_data_allowed(height) {
        return Err(ParseError::NotProtocolTx);
    }

    let (version, decoded) = payload::decode(&extracted.payload).map_err(|source| {
        let ty = (extracted.payload.len() >= 4)
            .then(|| u16::from_be_bytes([extracted.payload[2], extracted.payload[3]]));
        ParseError::Malformed { ty, source }
    })?;

    let output_addresses: Vec<Option<Address>> = tx
        .outputs
        .iter()
        .map(|o| gated_address(&o.script, params, height))
        .collect();
    let output_values: Vec<Amount> = tx.outputs.iter().map(|o| o.value).collect();

    let reference = output_addresses
        .iter()
        .enumerate()
        .skip(extracted.payload_output as usize + 1)
        .find_map(|(_, addr)| addr.clone().filter(|a| *a != sender));

    Ok(MetaTx {
        txid: tx.txid,
        sender,
        reference,
        block: height,
        idx,
        version,
        payload: decoded,
        class: extracted.class,
        output_addresses,
        output_values,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::class_c;
    use crate::host::{Coin, HostTransaction, MemoryChain, OutPoint, TxInput, TxOutput};
    use crate::rules::Network;

    fn params() -> ConsensusParams {
        ConsensusParams::for_network(Network::Regtest)
    }

    fn coin(value: Amount, addr: &str) -> Coin {
        Coin {
            value,
            script: Script::PubKeyHash(Address::new(addr)),
            height: 1,
            coinbase: false,
        }
    }

    fn outpoint(byte: u8, vout: u32) -> OutPoint {
        OutPoint {
            txid: TxHash::new([byte; 32]),
            vout,
        }
    }

    fn simple_send_tx(chain: &mut MemoryChain, reference: Option<&str>) -> HostTransaction {
        chain.add_coin(outpoint(9, 0), coin(10_000, "1Alice"));
        let payload = Payload::SimpleSend {
            property: 31,
            amount: 2_000_000_000,
        }
        .encode(0);
        let mut outputs = vec![class_c::encode(&payload)];
        if let Some(addr) = reference {
            outputs.push(TxOutput {
                value: 546,
                script: Script::PubKeyHash(Address::new(addr)),
            });
        }
        HostTransaction {
            txid: TxHash::new([1; 32]),
            inputs: vec![TxInput {
                prevout: outpoint(9, 0),
            }],
            outputs,
        }
    }

    #[test]
    fn parses_simple_send() {
        let mut chain = MemoryChain::new();
        let tx = simple_send_tx(&mut chain, Some("1Bob"));
        let meta = parse(&tx, &chain, &params(), 200, 3).unwrap();

        assert_eq!(meta.sender.as_str(), "1Alice");
        assert_eq!(meta.reference.as_ref().unwrap().as_str(), "1Bob");
        assert_eq!(meta.block, 200);
        assert_eq!(meta.idx, 3);
        assert!(matches!(
            meta.payload,
            Payload::SimpleSend {
                property: 31,
                amount: 2_000_000_000
            }
        ));
    }

    #[test]
    fn sender_is_highest_contributor() {
        let mut chain = MemoryChain::new();
        chain.add_coin(outpoint(9, 0), coin(1_000, "1Small"));
        chain.add_coin(outpoint(9, 1), coin(4_000, "1Big"));
        chain.add_coin(outpoint(9, 2), coin(2_000, "1Small"));

        let payload = Payload::SimpleSend {
            property: 31,
            amount: 1,
        }
        .encode(0);
        let tx = HostTransaction {
            txid: TxHash::new([1; 32]),
            inputs: vec![
                TxInput { prevout: outpoint(9, 0) },
                TxInput { prevout: outpoint(9, 1) },
                TxInput { prevout: outpoint(9, 2) },
            ],
            outputs: vec![class_c::encode(&payload)],
        };

        // 1Big contributes 4000 against 1Small's 3000
        let meta = parse(&tx, &chain, &params(), 100, 0).unwrap();
        assert_eq!(meta.sender.as_str(), "1Big");
    }

    #[test]
    fn contribution_tie_breaks_by_input_order() {
        let mut chain = MemoryChain::new();
        chain.add_coin(outpoint(9, 0), coin(3_000, "1First"));
        chain.add_coin(outpoint(9, 1), coin(3_000, "1Second"));

        let payload = Payload::SimpleSend { property: 31, amount: 1 }.encode(0);
        let tx = HostTransaction {
            txid: TxHash::new([1; 32]),
            inputs: vec![
                TxInput { prevout: outpoint(9, 0) },
                TxInput { prevout: outpoint(9, 1) },
            ],
            outputs: vec![class_c::encode(&payload)],
        };

        let meta = parse(&tx, &chain, &params(), 100, 0).unwrap();
        assert_eq!(meta.sender.as_str(), "1First");
    }

    #[test]
    fn reference_skips_sender_change() {
        let mut chain = MemoryChain::new();
        chain.add_coin(outpoint(9, 0), coin(10_000, "1Alice"));
        let payload = Payload::SimpleSend { property: 31, amount: 1 }.encode(0);
        let tx = HostTransaction {
            txid: TxHash::new([1; 32]),
            inputs: vec![TxInput { prevout: outpoint(9, 0) }],
            outputs: vec![
                class_c::encode(&payload),
                TxOutput {
                    value: 5_000,
                    script: Script::PubKeyHash(Address::new("1Alice")), // change
                },
                TxOutput {
                    value: 546,
                    script: Script::PubKeyHash(Address::new("1Bob")),
                },
            ],
        };
        let meta = parse(&tx, &chain, &params(), 100, 0).unwrap();
        assert_eq!(meta.reference.unwrap().as_str(), "1Bob");
    }

    #[test]
    fn script_hash_sender_gated_by_height() {
        let mut mainnet = ConsensusParams::for_network(Network::Main);
        mainnet.genesis_block = 0;

        let mut chain = MemoryChain::new();
        chain.add_coin(
            outpoint(9, 0),
            Coin {
                value: 10_000,
                script: Script::ScriptHash(Address::new("3Multisig")),
                height: 1,
                coinbase: false,
            },
        );
        let payload = Payload::SimpleSend { property: 31, amount: 1 }.encode(0);
        let tx = HostTransaction {
            txid: TxHash::new([1; 32]),
            inputs: vec![TxInput { prevout: outpoint(9, 0) }],
            outputs: vec![class_c::encode(&payload)],
        };

        // below the gate the input cannot resolve a sender
        let early = parse(&tx, &chain, &mainnet, 300_000, 0);
        assert_eq!(early.unwrap_err(), ParseError::NoSender);

        // above both gates parsing succeeds
        let late = parse(&tx, &chain, &mainnet, 400_000, 0).unwrap();
        assert_eq!(late.sender.as_str(), "3Multisig");
    }

    #[test]
    fn malformed_payload_reports_type() {
        let mut chain = MemoryChain::new();
        chain.add_coin(outpoint(9, 0), coin(10_000, "1Alice"));
        // type 0 header followed by a truncated body
        let tx = HostTransaction {
            txid: TxHash::new([1; 32]),
            inputs: vec![TxInput { prevout: outpoint(9, 0) }],
            outputs: vec![class_c::encode(&[0x00, 0x00, 0x00, 0x00, 0x00])],
        };
        match parse(&tx, &chain, &params(), 100, 0) {
            Err(ParseError::Malformed { ty: Some(0), .. }) => {}
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn plain_spend_is_not_protocol() {
        let mut chain = MemoryChain::new();
        chain.add_coin(outpoint(9, 0), coin(10_000, "1Alice"));
        let tx = HostTransaction {
            txid: TxHash::new([1; 32]),
            inputs: vec![TxInput { prevout: outpoint(9, 0) }],
            outputs: vec![TxOutput {
                value: 9_000,
                script: Script::PubKeyHash(Address::new("1Bob")),
            }],
        };
        assert_eq!(
            parse(&tx, &chain, &params(), 100, 0).unwrap_err(),
            ParseError::NotProtocolTx
        );
    }
}
