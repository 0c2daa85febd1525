//! End-to-end send scenarios through the full pipeline: payload encoding,
//! parsing, interpretation and the tx-list records.

mod common;

use common::Harness;
use lib_omni::{Address, Payload, TransactionType};

// =============================================================================
// SIMPLE SEND
// =============================================================================

#[test]
fn simple_divisible_send() {
    let mut h = Harness::new();
    let property = h.create_fixed_property("1Alice", 100 * 100_000_000, true);
    assert_eq!(h.balance("1Alice", property), 100 * 100_000_000);

    let tx = h.protocol_tx(
        "1Alice",
        &Payload::SimpleSend {
            property,
            amount: 20 * 100_000_000,
        },
        &["1Bob"],
    );
    let txid = tx.txid;
    h.mine(vec![tx]);

    assert_eq!(h.balance("1Alice", property), 80 * 100_000_000);
    assert_eq!(h.balance("1Bob", property), 20 * 100_000_000);

    let record = h.core.dbs.txlist.get_tx(&txid).unwrap().unwrap();
    assert!(record.valid);
    assert_eq!(record.type_code, TransactionType::SimpleSend.code());
    assert_eq!(record.amount, 20 * 100_000_000);
}

#[test]
fn insufficient_balance_is_recorded_invalid() {
    let mut h = Harness::new();
    let property = h.create_fixed_property("1Alice", 100_000_000, true);

    let tx = h.protocol_tx(
        "1Alice",
        &Payload::SimpleSend {
            property,
            amount: 200_000_000,
        },
        &["1Bob"],
    );
    let txid = tx.txid;
    h.mine(vec![tx]);

    // balances unchanged
    assert_eq!(h.balance("1Alice", property), 100_000_000);
    assert_eq!(h.balance("1Bob", property), 0);

    let record = h.core.dbs.txlist.get_tx(&txid).unwrap().unwrap();
    assert!(!record.valid);
    // the send family is the -60000 range
    assert!(record.reason_code <= -60000 && record.reason_code > -70000);
}

#[test]
fn send_to_unknown_property_is_invalid() {
    let mut h = Harness::new();
    let tx = h.protocol_tx(
        "1Alice",
        &Payload::SimpleSend {
            property: 999,
            amount: 1,
        },
        &["1Bob"],
    );
    let txid = tx.txid;
    h.mine(vec![tx]);
    assert!(!h.core.dbs.txlist.get_tx(&txid).unwrap().unwrap().valid);
}

// =============================================================================
// SEND TO MANY
// =============================================================================

#[test]
fn send_to_many_with_leftover() {
    let mut h = Harness::new();
    let property = h.create_fixed_property("1Alice", 100 * 100_000_000, true);

    // outputs: payload at 0, Bob at 1, Carol at 2, change at 3, Dave at 4
    let funding = h.fund("1Alice", 100_000);
    let payload = Payload::SendToMany {
        property,
        outputs: vec![
            (1, 20 * 100_000_000),
            (2, 15 * 100_000_000),
            (4, 30 * 100_000_000),
        ],
    };
    let tx = lib_omni::HostTransaction {
        txid: h.next_txid(),
        inputs: vec![lib_omni::TxInput { prevout: funding }],
        outputs: vec![
            lib_omni::codec::class_c::encode(&payload.encode(lib_omni::PKT_V0)),
            output_to("1Bob"),
            output_to("1Carol"),
            output_to("1Alice"),
            output_to("1Dave"),
        ],
    };
    h.mine(vec![tx]);

    assert_eq!(h.balance("1Bob", property), 20 * 100_000_000);
    assert_eq!(h.balance("1Carol", property), 15 * 100_000_000);
    assert_eq!(h.balance("1Dave", property), 30 * 100_000_000);
    assert_eq!(h.balance("1Alice", property), 35 * 100_000_000);
}

fn output_to(address: &str) -> lib_omni::TxOutput {
    lib_omni::TxOutput {
        value: 546,
        script: lib_omni::Script::PubKeyHash(Address::new(address)),
    }
}

#[test]
fn send_to_many_fails_atomically() {
    let mut h = Harness::new();
    let property = h.create_fixed_property("1Alice", 100, false);

    // output index 7 does not exist; the whole send must fail
    let tx = h.protocol_tx(
        "1Alice",
        &Payload::SendToMany {
            property,
            outputs: vec![(1, 10), (7, 10)],
        },
        &["1Bob"],
    );
    let txid = tx.txid;
    h.mine(vec![tx]);

    assert_eq!(h.balance("1Alice", property), 100);
    assert_eq!(h.balance("1Bob", property), 0);
    assert!(!h.core.dbs.txlist.get_tx(&txid).unwrap().unwrap().valid);
}

// =============================================================================
// FREEZING
// =============================================================================

#[test]
fn frozen_sender_cannot_send() {
    let mut h = Harness::new();
    let property = h.create_managed_property("1Issuer");
    h.grant("1Issuer", property, "1Alice", 10);

    let enable = h.protocol_tx("1Issuer", &Payload::EnableFreezing { property }, &[]);
    h.mine(vec![enable]);
    let freeze = h.protocol_tx(
        "1Issuer",
        &Payload::FreezeTokens {
            property,
            amount: 0,
            address: "1Alice".to_string(),
        },
        &[],
    );
    h.mine(vec![freeze]);

    let send = h.protocol_tx(
        "1Alice",
        &Payload::SimpleSend {
            property,
            amount: 5,
        },
        &["1Bob"],
    );
    let txid = send.txid;
    h.mine(vec![send]);

    assert_eq!(h.balance("1Alice", property), 10);
    assert_eq!(h.balance("1Bob", property), 0);
    assert!(!h.core.dbs.txlist.get_tx(&txid).unwrap().unwrap().valid);

    // unfreezing restores the ability to send
    let unfreeze = h.protocol_tx(
        "1Issuer",
        &Payload::UnfreezeTokens {
            property,
            amount: 0,
            address: "1Alice".to_string(),
        },
        &[],
    );
    h.mine(vec![unfreeze]);
    let send = h.protocol_tx(
        "1Alice",
        &Payload::SimpleSend {
            property,
            amount: 5,
        },
        &["1Bob"],
    );
    h.mine(vec![send]);
    assert_eq!(h.balance("1Bob", property), 5);
}

// =============================================================================
// SEND ALL
// =============================================================================

#[test]
fn send_all_moves_every_property() {
    let mut h = Harness::new();
    let prop_a = h.create_fixed_property("1Alice", 100, false);
    let prop_b = h.create_fixed_property("1Alice", 500, false);

    let tx = h.protocol_tx(
        "1Alice",
        &Payload::SendAll { ecosystem: 1 },
        &["1Bob"],
    );
    let txid = tx.txid;
    h.mine(vec![tx]);

    assert_eq!(h.balance("1Alice", prop_a), 0);
    assert_eq!(h.balance("1Alice", prop_b), 0);
    assert_eq!(h.balance("1Bob", prop_a), 100);
    assert_eq!(h.balance("1Bob", prop_b), 500);

    let record = h.core.dbs.txlist.get_tx(&txid).unwrap().unwrap();
    assert!(record.valid);
    assert_eq!(record.subsends, vec![(prop_a, 100), (prop_b, 500)]);
}

// =============================================================================
// SEND TO OWNERS
// =============================================================================

#[test]
fn send_to_owners_distributes_proportionally() {
    let mut h = Harness::new();
    let property = h.create_managed_property("1Issuer");
    h.grant("1Issuer", property, "1Alice", 1000);
    h.grant("1Issuer", property, "1B", 60);
    h.grant("1Issuer", property, "1C", 30);
    h.grant("1Issuer", property, "1D", 10);

    // seed the per-recipient fee balance in the protocol token
    use lib_omni::types::PROPERTY_OMNI;
    use lib_omni::Bucket;
    h.core
        .state
        .tally
        .credit(&Address::new("1Alice"), PROPERTY_OMNI, 1_000, Bucket::Available)
        .unwrap();

    let tx = h.protocol_tx(
        "1Alice",
        &Payload::SendToOwners {
            property,
            amount: 100,
            distribution_property: property,
        },
        &[],
    );
    let txid = tx.txid;
    h.mine(vec![tx]);

    // issuer holds no tokens, so holders are 1B/1C/1D plus Alice (excluded)
    let alice_after = h.balance("1Alice", property);
    assert_eq!(h.balance("1B", property), 60 + 60);
    assert_eq!(h.balance("1C", property), 30 + 30);
    assert_eq!(h.balance("1D", property), 10 + 10);
    assert_eq!(alice_after, 1000 - 100);

    let recipients = h.core.dbs.stolist.recipients_of(&txid).unwrap();
    assert_eq!(recipients.len(), 3);
}

// =============================================================================
// BALANCE CONSERVATION
// =============================================================================

#[test]
fn sends_conserve_property_totals() {
    let mut h = Harness::new();
    let property = h.create_fixed_property("1Alice", 10_000, false);
    assert_eq!(h.total(property), 10_000);

    let tx = h.protocol_tx(
        "1Alice",
        &Payload::SimpleSend {
            property,
            amount: 1234,
        },
        &["1Bob"],
    );
    h.mine(vec![tx]);
    assert_eq!(h.total(property), 10_000);

    let tx = h.protocol_tx(
        "1Bob",
        &Payload::SimpleSend {
            property,
            amount: 1000,
        },
        &["1Carol"],
    );
    h.mine(vec![tx]);
    assert_eq!(h.total(property), 10_000);
}
