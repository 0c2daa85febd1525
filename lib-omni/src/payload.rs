//! Typed Payload Codec
//!
//! Decoding of raw payload bytes into typed records and the symmetric
//! encoding used by tests and payload-building tools. Every payload starts
//! with a big-endian 16-bit version and 16-bit type; all further integers
//! are big-endian fixed-width; strings are zero-terminated ASCII of at most
//! 256 bytes.

use thiserror::Error;

use crate::types::{Amount, TransactionType, MAX_STRING_FIELD_LEN};

/// Packet format versions.
pub const PKT_V0: u16 = 0;
pub const PKT_V1: u16 = 1;

/// Payload decode error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload truncated while reading {0}")]
    Truncated(&'static str),

    #[error("unknown transaction type {ty} (version {version})")]
    UnknownType { version: u16, ty: u16 },

    #[error("unsupported version {version} for type {ty}")]
    UnsupportedVersion { version: u16, ty: u16 },

    #[error("amount exceeds the 63-bit bound in field {0}")]
    AmountOutOfRange(&'static str),

    #[error("string field {0} exceeds 256 bytes or is unterminated")]
    BadString(&'static str),

    #[error("invalid value in field {0}")]
    BadField(&'static str),
}

pub type PayloadResult<T> = Result<T, PayloadError>;

/// A decoded meta-transaction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    SimpleSend {
        property: u32,
        amount: Amount,
    },
    SendToOwners {
        property: u32,
        amount: Amount,
        /// Property whose holders receive; the sent property before v1.
        distribution_property: u32,
    },
    SendAll {
        ecosystem: u8,
    },
    SendNonFungible {
        property: u32,
        token_start: i64,
        token_end: i64,
    },
    SendToMany {
        property: u32,
        /// (output index, amount) pairs in payload order.
        outputs: Vec<(u8, Amount)>,
    },
    TradeOffer {
        property: u32,
        amount: Amount,
        native_desired: Amount,
        payment_window: u8,
        min_fee: Amount,
        action: u8,
    },
    AcceptOffer {
        property: u32,
        amount: Amount,
    },
    MetaDexTrade {
        property_for_sale: u32,
        amount_for_sale: Amount,
        property_desired: u32,
        amount_desired: Amount,
    },
    MetaDexCancelPrice {
        property_for_sale: u32,
        amount_for_sale: Amount,
        property_desired: u32,
        amount_desired: Amount,
    },
    MetaDexCancelPair {
        property_for_sale: u32,
        property_desired: u32,
    },
    MetaDexCancelEcosystem {
        ecosystem: u8,
    },
    CreatePropertyFixed {
        ecosystem: u8,
        kind: u16,
        prev_property_id: u32,
        category: String,
        subcategory: String,
        name: String,
        url: String,
        data: String,
        amount: Amount,
    },
    CreatePropertyVariable {
        ecosystem: u8,
        kind: u16,
        prev_property_id: u32,
        category: String,
        subcategory: String,
        name: String,
        url: String,
        data: String,
        desired_property: u32,
        tokens_per_unit: Amount,
        deadline: u64,
        early_bird_bonus: u8,
        issuer_percentage: u8,
    },
    CloseCrowdsale {
        property: u32,
    },
    CreatePropertyManual {
        ecosystem: u8,
        kind: u16,
        prev_property_id: u32,
        category: String,
        subcategory: String,
        name: String,
        url: String,
        data: String,
    },
    GrantTokens {
        property: u32,
        amount: Amount,
        /// Grant info; becomes grant data on non-fungible properties.
        memo: String,
    },
    RevokeTokens {
        property: u32,
        amount: Amount,
        memo: String,
    },
    ChangeIssuer {
        property: u32,
    },
    EnableFreezing {
        property: u32,
    },
    DisableFreezing {
        property: u32,
    },
    AddDelegate {
        property: u32,
    },
    RemoveDelegate {
        property: u32,
    },
    FreezeTokens {
        property: u32,
        amount: Amount,
        address: String,
    },
    UnfreezeTokens {
        property: u32,
        amount: Amount,
        address: String,
    },
    AnyData {
        data: Vec<u8>,
    },
    NonFungibleData {
        property: u32,
        token_start: i64,
        token_end: i64,
        /// Set issuer data (sender must be issuer) instead of holder data.
        issuer_data: bool,
        data: String,
    },
    Deactivation {
        feature_id: u16,
    },
    Activation {
        feature_id: u16,
        live_block: u32,
        min_client_version: u32,
    },
    Alert {
        alert_type: u16,
        expiry: u32,
        message: String,
    },
}

impl Payload {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Payload::SimpleSend { .. } => TransactionType::SimpleSend,
            Payload::SendToOwners { .. } => TransactionType::SendToOwners,
            Payload::SendAll { .. } => TransactionType::SendAll,
            Payload::SendNonFungible { .. } => TransactionType::SendNonFungible,
            Payload::SendToMany { .. } => TransactionType::SendToMany,
            Payload::TradeOffer { .. } => TransactionType::TradeOffer,
            Payload::AcceptOffer { .. } => TransactionType::AcceptOffer,
            Payload::MetaDexTrade { .. } => TransactionType::MetaDexTrade,
            Payload::MetaDexCancelPrice { .. } => TransactionType::MetaDexCancelPrice,
            Payload::MetaDexCancelPair { .. } => TransactionType::MetaDexCancelPair,
            Payload::MetaDexCancelEcosystem { .. } => TransactionType::MetaDexCancelEcosystem,
            Payload::CreatePropertyFixed { .. } => TransactionType::CreatePropertyFixed,
            Payload::CreatePropertyVariable { .. } => TransactionType::CreatePropertyVariable,
            Payload::CloseCrowdsale { .. } => TransactionType::CloseCrowdsale,
            Payload::CreatePropertyManual { .. } => TransactionType::CreatePropertyManual,
            Payload::GrantTokens { .. } => TransactionType::GrantTokens,
            Payload::RevokeTokens { .. } => TransactionType::RevokeTokens,
            Payload::ChangeIssuer { .. } => TransactionType::ChangeIssuer,
            Payload::EnableFreezing { .. } => TransactionType::EnableFreezing,
            Payload::DisableFreezing { .. } => TransactionType::DisableFreezing,
            Payload::AddDelegate { .. } => TransactionType::AddDelegate,
            Payload::RemoveDelegate { .. } => TransactionType::RemoveDelegate,
            Payload::FreezeTokens { .. } => TransactionType::FreezeTokens,
            Payload::UnfreezeTokens { .. } => TransactionType::UnfreezeTokens,
            Payload::AnyData { .. } => TransactionType::AnyData,
            Payload::NonFungibleData { .. } => TransactionType::NonFungibleData,
            Payload::Deactivation { .. } => TransactionType::Deactivation,
            Payload::Activation { .. } => TransactionType::Activation,
            Payload::Alert { .. } => TransactionType::Alert,
        }
    }
}

// =============================================================================
// READER
// =============================================================================

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &'static str) -> PayloadResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(PayloadError::Truncated(field))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, field: &'static str) -> PayloadResult<u8> {
        Ok(self.take(1, field)?[0])
    }

    fn u16(&mut self, field: &'static str) -> PayloadResult<u16> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self, field: &'static str) -> PayloadResult<u32> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self, field: &'static str) -> PayloadResult<u64> {
        let bytes = self.take(8, field)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }

    /// 64-bit amount constrained to the 63-bit balance range.
    fn amount(&mut self, field: &'static str) -> PayloadResult<Amount> {
        let raw = self.u64(field)?;
        i64::try_from(raw).map_err(|_| PayloadError::AmountOutOfRange(field))
    }

    /// Token id: same range as amounts.
    fn token_id(&mut self, field: &'static str) -> PayloadResult<i64> {
        self.amount(field)
    }

    /// Zero-terminated string, at most 256 bytes including the terminator.
    fn string(&mut self, field: &'static str) -> PayloadResult<String> {
        let remaining = &self.bytes[self.pos..];
        let nul = remaining
            .iter()
            .position(|b| *b == 0)
            .ok_or(PayloadError::BadString(field))?;
        if nul >= MAX_STRING_FIELD_LEN {
            return Err(PayloadError::BadString(field));
        }
        let value = String::from_utf8_lossy(&remaining[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(value)
    }

    fn rest(&mut self) -> Vec<u8> {
        let rest = self.bytes[self.pos..].to_vec();
        self.pos = self.bytes.len();
        rest
    }
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode raw payload bytes into (version, typed payload).
pub fn decode(bytes: &[u8]) -> PayloadResult<(u16, Payload)> {
    let mut r = Reader::new(bytes);
    let version = r.u16("version")?;
    let ty = r.u16("type")?;

    let payload = match ty {
        0 => Payload::SimpleSend {
            property: r.u32("property")?,
            amount: r.amount("amount")?,
        },
        3 => {
            let property = r.u32("property")?;
            let amount = r.amount("amount")?;
            let distribution_property = if version >= PKT_V1 {
                r.u32("distribution property")?
            } else {
                property
            };
            Payload::SendToOwners {
                property,
                amount,
                distribution_property,
            }
        }
        4 => Payload::SendAll {
            ecosystem: r.u8("ecosystem")?,
        },
        5 => Payload::SendNonFungible {
            property: r.u32("property")?,
            token_start: r.token_id("token start")?,
            token_end: r.token_id("token end")?,
        },
        7 => {
            let property = r.u32("property")?;
            let count = r.u8("output count")?;
            let mut outputs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let output = r.u8("output index")?;
                let amount = r.amount("output amount")?;
                outputs.push((output, amount));
            }
            Payload::SendToMany { property, outputs }
        }
        20 => Payload::TradeOffer {
            property: r.u32("property")?,
            amount: r.amount("amount")?,
            native_desired: r.amount("native desired")?,
            payment_window: r.u8("payment window")?,
            min_fee: r.amount("minimum fee")?,
            action: r.u8("action")?,
        },
        22 => Payload::AcceptOffer {
            property: r.u32("property")?,
            amount: r.amount("amount")?,
        },
        25 => Payload::MetaDexTrade {
            property_for_sale: r.u32("property for sale")?,
            amount_for_sale: r.amount("amount for sale")?,
            property_desired: r.u32("property desired")?,
            amount_desired: r.amount("amount desired")?,
        },
        26 => Payload::MetaDexCancelPrice {
            property_for_sale: r.u32("property for sale")?,
            amount_for_sale: r.amount("amount for sale")?,
            property_desired: r.u32("property desired")?,
            amount_desired: r.amount("amount desired")?,
        },
        27 => Payload::MetaDexCancelPair {
            property_for_sale: r.u32("property for sale")?,
            property_desired: r.u32("property desired")?,
        },
        28 => Payload::MetaDexCancelEcosystem {
            ecosystem: r.u8("ecosystem")?,
        },
        50 => Payload::CreatePropertyFixed {
            ecosystem: r.u8("ecosystem")?,
            kind: r.u16("property type")?,
            prev_property_id: r.u32("previous property")?,
            category: r.string("category")?,
            subcategory: r.string("subcategory")?,
            name: r.string("name")?,
            url: r.string("url")?,
            data: r.string("data")?,
            amount: r.amount("amount")?,
        },
        51 => Payload::CreatePropertyVariable {
            ecosystem: r.u8("ecosystem")?,
            kind: r.u16("property type")?,
            prev_property_id: r.u32("previous property")?,
            category: r.string("category")?,
            subcategory: r.string("subcategory")?,
            name: r.string("name")?,
            url: r.string("url")?,
            data: r.string("data")?,
            desired_property: r.u32("desired property")?,
            tokens_per_unit: r.amount("tokens per unit")?,
            deadline: r.u64("deadline")?,
            early_bird_bonus: r.u8("early bird bonus")?,
            issuer_percentage: r.u8("issuer percentage")?,
        },
        53 => Payload::CloseCrowdsale {
            property: r.u32("property")?,
        },
        54 => Payload::CreatePropertyManual {
            ecosystem: r.u8("ecosystem")?,
            kind: r.u16("property type")?,
            prev_property_id: r.u32("previous property")?,
            category: r.string("category")?,
            subcategory: r.string("subcategory")?,
            name: r.string("name")?,
            url: r.string("url")?,
            data: r.string("data")?,
        },
        55 => Payload::GrantTokens {
            property: r.u32("property")?,
            amount: r.amount("amount")?,
            memo: r.string("memo").unwrap_or_default(),
        },
        56 => Payload::RevokeTokens {
            property: r.u32("property")?,
            amount: r.amount("amount")?,
            memo: r.string("memo").unwrap_or_default(),
        },
        70 => Payload::ChangeIssuer {
            property: r.u32("property")?,
        },
        71 => Payload::EnableFreezing {
            property: r.u32("property")?,
        },
        72 => Payload::DisableFreezing {
            property: r.u32("property")?,
        },
        73 => Payload::AddDelegate {
            property: r.u32("property")?,
        },
        74 => Payload::RemoveDelegate {
            property: r.u32("property")?,
        },
        185 => Payload::FreezeTokens {
            property: r.u32("property")?,
            amount: r.amount("amount")?,
            address: r.string("address")?,
        },
        186 => Payload::UnfreezeTokens {
            property: r.u32("property")?,
            amount: r.amount("amount")?,
            address: r.string("address")?,
        },
        200 => Payload::AnyData { data: r.rest() },
        201 => Payload::NonFungibleData {
            property: r.u32("property")?,
            token_start: r.token_id("token start")?,
            token_end: r.token_id("token end")?,
            issuer_data: r.u8("issuer flag")? != 0,
            data: r.string("data")?,
        },
        65533 => Payload::Deactivation {
            feature_id: r.u16("feature id")?,
        },
        65534 => Payload::Activation {
            feature_id: r.u16("feature id")?,
            live_block: r.u32("live block")?,
            min_client_version: r.u32("minimum client version")?,
        },
        65535 => Payload::Alert {
            alert_type: r.u16("alert type")?,
            expiry: r.u32("expiry")?,
            message: r.string("message")?,
        },
        _ => return Err(PayloadError::UnknownType { version, ty }),
    };

    Ok((version, payload))
}

// =============================================================================
// ENCODE
// =============================================================================

struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn new(version: u16, ty: u16) -> Self {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&version.to_be_bytes());
        bytes.extend_from_slice(&ty.to_be_bytes());
        Writer { bytes }
    }

    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn amount(&mut self, v: Amount) {
        self.u64(v as u64);
    }

    fn string(&mut self, s: &str) {
        let truncated = &s.as_bytes()[..s.len().min(MAX_STRING_FIELD_LEN - 1)];
        self.bytes.extend_from_slice(truncated);
        self.bytes.push(0);
    }
}

impl Payload {
    /// Encode the payload with the given packet version. Inverse of
    /// [`decode`] for well-formed payloads.
    pub fn encode(&self, version: u16) -> Vec<u8> {
        let ty = self.transaction_type().code();
        let mut w = Writer::new(version, ty);
        match self {
            Payload::SimpleSend { property, amount } => {
                w.u32(*property);
                w.amount(*amount);
            }
            Payload::SendToOwners {
                property,
                amount,
                distribution_property,
            } => {
                w.u32(*property);
                w.amount(*amount);
                if version >= PKT_V1 {
                    w.u32(*distribution_property);
                }
            }
            Payload::SendAll { ecosystem } => w.u8(*ecosystem),
            Payload::SendNonFungible {
                property,
                token_start,
                token_end,
            } => {
                w.u32(*property);
                w.u64(*token_start as u64);
                w.u64(*token_end as u64);
            }
            Payload::SendToMany { property, outputs } => {
                w.u32(*property);
                w.u8(outputs.len() as u8);
                for (output, amount) in outputs {
                    w.u8(*output);
                    w.amount(*amount);
                }
            }
            Payload::TradeOffer {
                property,
                amount,
                native_desired,
                payment_window,
                min_fee,
                action,
            } => {
                w.u32(*property);
                w.amount(*amount);
                w.amount(*native_desired);
                w.u8(*payment_window);
                w.amount(*min_fee);
                w.u8(*action);
            }
            Payload::AcceptOffer { property, amount } => {
                w.u32(*property);
                w.amount(*amount);
            }
            Payload::MetaDexTrade {
                property_for_sale,
                amount_for_sale,
                property_desired,
                amount_desired,
            }
            | Payload::MetaDexCancelPrice {
                property_for_sale,
                amount_for_sale,
                property_desired,
                amount_desired,
            } => {
                w.u32(*property_for_sale);
                w.amount(*amount_for_sale);
                w.u32(*property_desired);
                w.amount(*amount_desired);
            }
            Payload::MetaDexCancelPair {
                property_for_sale,
                property_desired,
            } => {
                w.u32(*property_for_sale);
                w.u32(*property_desired);
            }
            Payload::MetaDexCancelEcosystem { ecosystem } => w.u8(*ecosystem),
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
            } => {
                w.u8(*ecosystem);
                w.u16(*kind);
                w.u32(*prev_property_id);
                w.string(category);
                w.string(subcategory);
                w.string(name);
                w.string(url);
                w.string(data);
                w.amount(*amount);
            }
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
            } => {
                w.u8(*ecosystem);
                w.u16(*kind);
                w.u32(*prev_property_id);
                w.string(category);
                w.string(subcategory);
                w.string(name);
                w.string(url);
                w.string(data);
                w.u32(*desired_property);
                w.amount(*tokens_per_unit);
                w.u64(*deadline);
                w.u8(*early_bird_bonus);
                w.u8(*issuer_percentage);
            }
            Payload::CloseCrowdsale { property } => w.u32(*property),
            Payload::CreatePropertyManual {
                ecosystem,
                kind,
                prev_property_id,
                category,
                subcategory,
                name,
                url,
                data,
            } => {
                w.u8(*ecosystem);
                w.u16(*kind);
                w.u32(*prev_property_id);
                w.string(category);
                w.string(subcategory);
                w.string(name);
                w.string(url);
                w.string(data);
            }
            Payload::GrantTokens {
                property,
                amount,
                memo,
            }
            | Payload::RevokeTokens {
                property,
                amount,
                memo,
            } => {
                w.u32(*property);
                w.amount(*amount);
                w.string(memo);
            }
            Payload::ChangeIssuer { property }
            | Payload::EnableFreezing { property }
            | Payload::DisableFreezing { property }
            | Payload::AddDelegate { property }
            | Payload::RemoveDelegate { property } => w.u32(*property),
            Payload::FreezeTokens {
                property,
                amount,
                address,
            }
            | Payload::UnfreezeTokens {
                property,
                amount,
                address,
            } => {
                w.u32(*property);
                w.amount(*amount);
                w.string(address);
            }
            Payload::AnyData { data } => w.bytes.extend_from_slice(data),
            Payload::NonFungibleData {
                property,
                token_start,
                token_end,
                issuer_data,
                data,
            } => {
                w.u32(*property);
                w.u64(*token_start as u64);
                w.u64(*token_end as u64);
                w.u8(u8::from(*issuer_data));
                w.string(data);
            }
            Payload::Deactivation { feature_id } => w.u16(*feature_id),
            Payload::Activation {
                feature_id,
                live_block,
                min_client_version,
            } => {
                w.u16(*feature_id);
                w.u32(*live_block);
                w.u32(*min_client_version);
            }
            Payload::Alert {
                alert_type,
                expiry,
                message,
            } => {
                w.u16(*alert_type);
                w.u32(*expiry);
                w.string(message);
            }
        }
        w.bytes
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_send_wire_format() {
        // version 0, type 0, property 31, amount 20.00000000
        let bytes = hex::decode("00000000" .to_string() + "0000001f" + "0000000077359400").unwrap();
        let (version, payload) = decode(&bytes).unwrap();
        assert_eq!(version, PKT_V0);
        assert_eq!(
            payload,
            Payload::SimpleSend {
                property: 31,
                amount: 2_000_000_000,
            }
        );
    }

    #[test]
    fn send_to_many_wire_format() {
        // the documented example: three recipients on outputs 1, 2, 4
        let bytes = hex::decode(
            "00000007\
             0000001f\
             03\
             01 0000000077359400\
             02 0000000059682f00\
             04 00000000b2d05e00"
                .replace(' ', ""),
        )
        .unwrap();
        let (_, payload) = decode(&bytes).unwrap();
        assert_eq!(
            payload,
            Payload::SendToMany {
                property: 31,
                outputs: vec![
                    (1, 2_000_000_000),
                    (2, 1_500_000_000),
                    (4, 3_000_000_000),
                ],
            }
        );
    }

    #[test]
    fn amounts_above_63_bits_are_rejected() {
        let mut bytes = vec![0, 0, 0, 0, 0, 0, 0, 31];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(
            decode(&bytes),
            Err(PayloadError::AmountOutOfRange("amount"))
        );
    }

    #[test]
    fn truncated_payloads_are_rejected() {
        let bytes = Payload::SimpleSend {
            property: 31,
            amount: 1,
        }
        .encode(PKT_V0);
        for len in 0..bytes.len() {
            assert!(decode(&bytes[..len]).is_err(), "accepted prefix {}", len);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let bytes = [0u8, 0, 0, 99];
        assert_eq!(
            decode(&bytes),
            Err(PayloadError::UnknownType { version: 0, ty: 99 })
        );
    }

    #[test]
    fn sto_v1_carries_distribution_property() {
        let v0 = Payload::SendToOwners {
            property: 3,
            amount: 100,
            distribution_property: 3,
        };
        let (_, decoded) = decode(&v0.encode(PKT_V0)).unwrap();
        assert_eq!(decoded, v0);

        let v1 = Payload::SendToOwners {
            property: 3,
            amount: 100,
            distribution_property: 7,
        };
        let (version, decoded) = decode(&v1.encode(PKT_V1)).unwrap();
        assert_eq!(version, PKT_V1);
        assert_eq!(decoded, v1);
    }

    #[test]
    fn create_property_roundtrip() {
        let payload = Payload::CreatePropertyFixed {
            ecosystem: 1,
            kind: 2,
            prev_property_id: 0,
            category: "Finance".to_string(),
            subcategory: "Stablecoins".to_string(),
            name: "Quantum Notes".to_string(),
            url: "https://example.org".to_string(),
            data: String::new(),
            amount: 10_000_000_000,
        };
        let (_, decoded) = decode(&payload.encode(PKT_V0)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn overlong_strings_are_rejected() {
        let mut bytes = Payload::CreatePropertyManual {
            ecosystem: 1,
            kind: 1,
            prev_property_id: 0,
            category: String::new(),
            subcategory: String::new(),
            name: String::new(),
            url: String::new(),
            data: String::new(),
        }
        .encode(PKT_V0);
        // replace the category's terminator with 256 non-zero bytes
        bytes.truncate(11);
        bytes.extend(std::iter::repeat(b'x').take(300));
        assert!(matches!(decode(&bytes), Err(PayloadError::BadString(_))));
    }

    #[test]
    fn every_variant_roundtrips() {
        let samples = vec![
            Payload::SimpleSend { property: 31, amount: 1 },
            Payload::SendAll { ecosystem: 1 },
            Payload::SendNonFungible { property: 42, token_start: 40, token_end: 60 },
            Payload::TradeOffer {
                property: 1,
                amount: 500,
                native_desired: 1000,
                payment_window: 10,
                min_fee: 10,
                action: 1,
            },
            Payload::AcceptOffer { property: 1, amount: 100 },
            Payload::MetaDexTrade {
                property_for_sale: 3,
                amount_for_sale: 100,
                property_desired: 4,
                amount_desired: 200,
            },
            Payload::MetaDexCancelPair { property_for_sale: 3, property_desired: 4 },
            Payload::MetaDexCancelEcosystem { ecosystem: 2 },
            Payload::CloseCrowdsale { property: 8 },
            Payload::GrantTokens { property: 8, amount: 77, memo: "gift".to_string() },
            Payload::RevokeTokens { property: 8, amount: 7, memo: String::new() },
            Payload::ChangeIssuer { property: 8 },
            Payload::EnableFreezing { property: 8 },
            Payload::DisableFreezing { property: 8 },
            Payload::AddDelegate { property: 8 },
            Payload::RemoveDelegate { property: 8 },
            Payload::FreezeTokens {
                property: 8,
                amount: 0,
                address: "1Frozen".to_string(),
            },
            Payload::UnfreezeTokens {
                property: 8,
                amount: 0,
                address: "1Frozen".to_string(),
            },
            Payload::AnyData { data: vec![1, 2, 3] },
            Payload::NonFungibleData {
                property: 42,
                token_start: 1,
                token_end: 10,
                issuer_data: true,
                data: "registry".to_string(),
            },
            Payload::Deactivation { feature_id: 3 },
            Payload::Activation {
                feature_id: 3,
                live_block: 500_000,
                min_client_version: 10,
            },
            Payload::Alert {
                alert_type: 1,
                expiry: 600_000,
                message: "upgrade required".to_string(),
            },
        ];
        for payload in samples {
            let (_, decoded) = decode(&payload.encode(PKT_V0)).unwrap();
            assert_eq!(decoded, payload);
        }
    }
}
