//! Class-C Payload Encoding
//!
//! The preferred encoding: a single data-only output whose bytes are the
//! two-byte protocol marker followed by the raw payload.

use crate::host::{HostTransaction, Script, TxOutput};

/// The protocol marker, bit-exact.
pub const MARKER: [u8; 2] = [0x6f, 0x6d];

/// Host policy bound on data-carrier outputs (marker + payload).
pub const MAX_DATA_CARRIER_SIZE: usize = 80;

/// Whether a payload of this size fits a Class-C output.
pub fn fits_class_c(payload_len: usize) -> bool {
    MARKER.len() + payload_len <= MAX_DATA_CARRIER_SIZE
}

/// Build the data-only output embedding `payload`.
///
/// Callers must check [`fits_class_c`] first; oversized payloads fall back
/// to Class B.
pub fn encode(payload: &[u8]) -> TxOutput {
    let mut data = Vec::with_capacity(MARKER.len() + payload.len());
    data.extend_from_slice(&MARKER);
    data.extend_from_slice(payload);
    TxOutput {
        value: 0,
        script: Script::NullData(data),
    }
}

/// Locate and extract a Class-C payload: the first data-only output carrying
/// the marker. Returns the payload bytes and the output index.
pub fn extract(tx: &HostTransaction) -> Option<(Vec<u8>, u32)> {
    for (vout, output) in tx.outputs.iter().enumerate() {
        if let Script::NullData(data) = &output.script {
            if data.len() <= MAX_DATA_CARRIER_SIZE && data.starts_with(&MARKER) {
                return Some((data[MARKER.len()..].to_vec(), vout as u32));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxHash;

    fn tx_with_outputs(outputs: Vec<TxOutput>) -> HostTransaction {
        HostTransaction {
            txid: TxHash::new([1; 32]),
            inputs: vec![],
            outputs,
        }
    }

    #[test]
    fn roundtrip() {
        let payload = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1f, 0xff];
        let tx = tx_with_outputs(vec![encode(&payload)]);
        let (extracted, vout) = extract(&tx).unwrap();
        assert_eq!(extracted, payload);
        assert_eq!(vout, 0);
    }

    #[test]
    fn marker_is_required() {
        let tx = tx_with_outputs(vec![TxOutput {
            value: 0,
            script: Script::NullData(vec![0x6f, 0x00, 0x01]),
        }]);
        assert!(extract(&tx).is_none());
    }

    #[test]
    fn first_marked_output_wins() {
        let tx = tx_with_outputs(vec![
            TxOutput {
                value: 1000,
                script: Script::PubKeyHash(crate::types::Address::new("1A")),
            },
            encode(&[0x01]),
            encode(&[0x02]),
        ]);
        let (payload, vout) = extract(&tx).unwrap();
        assert_eq!(payload, vec![0x01]);
        assert_eq!(vout, 1);
    }

    #[test]
    fn oversized_output_is_ignored() {
        let payload = vec![0xaa; MAX_DATA_CARRIER_SIZE]; // marker pushes it over
        let mut data = MARKER.to_vec();
        data.extend_from_slice(&payload);
        let tx = tx_with_outputs(vec![TxOutput {
            value: 0,
            script: Script::NullData(data),
        }]);
        assert!(extract(&tx).is_none());
        assert!(!fits_class_c(payload.len()));
        assert!(fits_class_c(MAX_DATA_CARRIER_SIZE - MARKER.len()));
    }
}
