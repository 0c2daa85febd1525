//! Class-B Payload Encoding
//!
//! The legacy encoding: the payload is split into 31-byte packets (1
//! sequence byte + 30 payload bytes), each embedded as a data public key of
//! a 1-of-n bare multisig output. The first key of every multisig output is
//! the sender's redeemable key and carries no data.
//!
//! Packets are obfuscated by XOR against a SHA-256 chain derived from the
//! sender address: the first key is SHA256(address) rendered as upper-case
//! hex, each further key is the SHA-256 of the previous rendering. The
//! obfuscation is applied uniformly; there is no unobfuscated path.

use sha2::{Digest, Sha256};

use crate::host::{HostTransaction, Script, TxOutput};
use crate::types::Address;

/// Payload bytes per packet (one packet per data key).
pub const PACKET_DATA_BYTES: usize = 30;

/// Data keys per multisig output (plus the redeemable key).
const DATA_KEYS_PER_OUTPUT: usize = 2;

/// Obfuscation keys: SHA-256 chain over the upper-case-hex renderings of the
/// sender address. `count` keys of 32 bytes each.
fn obfuscation_keys(sender: &Address, count: usize) -> Vec<[u8; 32]> {
    let mut keys = Vec::with_capacity(count);
    let mut material = sender.as_str().as_bytes().to_vec();
    for _ in 0..count {
        let digest: [u8; 32] = Sha256::digest(&material).into();
        keys.push(digest);
        material = hex::encode_upper(digest).into_bytes();
    }
    keys
}

fn xor_packet(packet: &mut [u8; 31], key: &[u8; 32]) {
    for (byte, key_byte) in packet.iter_mut().zip(key.iter()) {
        *byte ^= key_byte;
    }
}

/// Split `payload` into obfuscated packets.
fn build_packets(sender: &Address, payload: &[u8]) -> Vec<[u8; 31]> {
    let chunks: Vec<&[u8]> = payload.chunks(PACKET_DATA_BYTES).collect();
    let keys = obfuscation_keys(sender, chunks.len());

    chunks
        .iter()
        .zip(keys.iter())
        .enumerate()
        .map(|(i, (chunk, key))| {
            let mut packet = [0u8; 31];
            packet[0] = (i + 1) as u8; // sequence numbers start at 1
            packet[1..1 + chunk.len()].copy_from_slice(chunk);
            xor_packet(&mut packet, key);
            packet
        })
        .collect()
}

/// Wrap a packet as a 33-byte compressed-key blob.
fn packet_to_pubkey(packet: &[u8; 31]) -> Vec<u8> {
    let mut pubkey = Vec::with_capacity(33);
    pubkey.push(0x02);
    pubkey.extend_from_slice(packet);
    pubkey.push(0x00); // nonce byte, irrelevant to the payload
    pubkey
}

/// Encode `payload` into multisig outputs. `redeemable` is the sender's own
/// key placed first in every output.
pub fn encode(sender: &Address, redeemable: &[u8], payload: &[u8]) -> Vec<TxOutput> {
    let packets = build_packets(sender, payload);

    packets
        .chunks(DATA_KEYS_PER_OUTPUT)
        .map(|group| {
            let mut pubkeys = Vec::with_capacity(1 + group.len());
            pubkeys.push(redeemable.to_vec());
            pubkeys.extend(group.iter().map(packet_to_pubkey));
            TxOutput {
                value: 0,
                script: Script::Multisig {
                    required: 1,
                    pubkeys,
                },
            }
        })
        .collect()
}

/// Reconstruct a Class-B payload from a transaction's multisig outputs.
///
/// Packets are collected in output order, deobfuscated with the sender's key
/// chain and validated against their sequence bytes. Returns the payload and
/// the index of the first multisig output, or `None` when no coherent packet
/// sequence exists.
pub fn extract(tx: &HostTransaction, sender: &Address) -> Option<(Vec<u8>, u32)> {
    let mut obfuscated: Vec<[u8; 31]> = Vec::new();
    let mut first_output = None;

    for (vout, output) in tx.outputs.iter().enumerate() {
        if let Script::Multisig { pubkeys, .. } = &output.script {
            if first_output.is_none() {
                first_output = Some(vout as u32);
            }
            // first key is the redeemable key; the rest carry data
            for pubkey in pubkeys.iter().skip(1) {
                if pubkey.len() != 33 {
                    return None;
                }
                let mut packet = [0u8; 31];
                packet.copy_from_slice(&pubkey[1..32]);
                obfuscated.push(packet);
            }
        }
    }

    let first_output = first_output?;
    if obfuscated.is_empty() {
        return None;
    }

    let keys = obfuscation_keys(sender, obfuscated.len());
    let mut payload = Vec::with_capacity(obfuscated.len() * PACKET_DATA_BYTES);
    for (i, (mut packet, key)) in obfuscated.into_iter().zip(keys.iter()).enumerate() {
        xor_packet(&mut packet, key);
        if packet[0] != (i + 1) as u8 {
            return None; // out-of-order or foreign multisig
        }
        payload.extend_from_slice(&packet[1..]);
    }

    Some((payload, first_output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxHash;

    fn sender() -> Address {
        Address::new("1SenderAddress")
    }

    fn redeemable() -> Vec<u8> {
        vec![0x03; 33]
    }

    fn tx_with_outputs(outputs: Vec<TxOutput>) -> HostTransaction {
        HostTransaction {
            txid: TxHash::new([1; 32]),
            inputs: vec![],
            outputs,
        }
    }

    #[test]
    fn roundtrip_single_packet() {
        let payload = vec![0x00, 0x00, 0x00, 0x32, 0x01, 0x02];
        let outputs = encode(&sender(), &redeemable(), &payload);
        assert_eq!(outputs.len(), 1);

        let tx = tx_with_outputs(outputs);
        let (extracted, vout) = extract(&tx, &sender()).unwrap();
        assert_eq!(vout, 0);
        assert_eq!(&extracted[..payload.len()], payload.as_slice());
        // padding is zero
        assert!(extracted[payload.len()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn roundtrip_many_packets() {
        let payload: Vec<u8> = (0..100).collect();
        let outputs = encode(&sender(), &redeemable(), &payload);
        // 100 bytes → 4 packets → 2 multisig outputs
        assert_eq!(outputs.len(), 2);

        let tx = tx_with_outputs(outputs);
        let (extracted, _) = extract(&tx, &sender()).unwrap();
        assert_eq!(&extracted[..payload.len()], payload.as_slice());
    }

    #[test]
    fn obfuscation_depends_on_sender() {
        let payload = vec![0xaa; 40];
        let outputs = encode(&sender(), &redeemable(), &payload);
        let tx = tx_with_outputs(outputs);

        // the wrong sender cannot reconstruct a coherent sequence
        assert!(extract(&tx, &Address::new("1SomeoneElse")).is_none());
        assert!(extract(&tx, &sender()).is_some());
    }

    #[test]
    fn packets_are_actually_obfuscated() {
        let payload = vec![0x00; PACKET_DATA_BYTES];
        let outputs = encode(&sender(), &redeemable(), &payload);
        let tx = tx_with_outputs(outputs);
        if let Script::Multisig { pubkeys, .. } = &tx.outputs[0].script {
            // a zero payload with sequence byte 1 must not appear in clear
            assert_ne!(&pubkeys[1][1..32], &{
                let mut clear = [0u8; 31];
                clear[0] = 1;
                clear
            });
        } else {
            panic!("expected multisig output");
        }
    }

    #[test]
    fn no_multisig_means_no_payload() {
        let tx = tx_with_outputs(vec![TxOutput {
            value: 1000,
            script: Script::PubKeyHash(Address::new("1A")),
        }]);
        assert!(extract(&tx, &sender()).is_none());
    }
}
