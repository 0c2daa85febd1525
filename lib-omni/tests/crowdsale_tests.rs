//! Crowdsale lifecycle through the pipeline: opening, participation via
//! sends to the issuer, early-bird bonus, issuer close and deadline expiry.

mod common;

use common::{Harness, BASE_TIME};
use lib_omni::Payload;

/// Opens a crowdsale for `issuer` paying out `tokens_per_unit` per unit of
/// `desired`, returning the new property id.
fn open_crowdsale(
    h: &mut Harness,
    issuer: &str,
    desired: lib_omni::PropertyId,
    tokens_per_unit: i64,
    deadline: u64,
    early_bird_bonus: u8,
    issuer_percentage: u8,
) -> lib_omni::PropertyId {
    let expected = h.core.dbs.registry.peek_next_id(lib_omni::Ecosystem::Main);
    let tx = h.protocol_tx(
        issuer,
        &Payload::CreatePropertyVariable {
            ecosystem: 1,
            kind: 1,
            prev_property_id: 0,
            category: "Crowdsale".to_string(),
            subcategory: "Test".to_string(),
            name: "Crowdsale Tokens".to_string(),
            url: String::new(),
            data: String::new(),
            desired_property: desired,
            tokens_per_unit,
            deadline,
            early_bird_bonus,
            issuer_percentage,
        },
        &[],
    );
    h.mine(vec![tx]);
    expected
}

#[test]
fn participation_mints_at_the_crowdsale_rate() {
    let mut h = Harness::new();
    let base = h.create_fixed_property("1Funder", 1_000_000, false);
    // move some base currency to the participant
    let seed = h.protocol_tx(
        "1Funder",
        &Payload::SimpleSend {
            property: base,
            amount: 1_000,
        },
        &["1Part"],
    );
    h.mine(vec![seed]);

    let deadline = BASE_TIME + 10_000_000;
    let crowdsale = open_crowdsale(&mut h, "1Issuer", base, 100, deadline, 0, 0);
    assert!(h.core.state.crowdsales.get(crowdsale).is_some());

    // sending the desired property to the issuer is the participation
    let participate = h.protocol_tx(
        "1Part",
        &Payload::SimpleSend {
            property: base,
            amount: 10,
        },
        &["1Issuer"],
    );
    h.mine(vec![participate]);

    assert_eq!(h.balance("1Part", crowdsale), 1_000); // 10 × 100
    assert_eq!(h.balance("1Issuer", base), 10);
    assert_eq!(
        h.core.dbs.registry.get(crowdsale).unwrap().unwrap().num_tokens,
        1_000
    );
}

#[test]
fn issuer_percentage_mints_on_top() {
    let mut h = Harness::new();
    let base = h.create_fixed_property("1Part", 1_000_000, false);
    let deadline = BASE_TIME + 10_000_000;
    let crowdsale = open_crowdsale(&mut h, "1Issuer", base, 100, deadline, 0, 10);

    let participate = h.protocol_tx(
        "1Part",
        &Payload::SimpleSend {
            property: base,
            amount: 10,
        },
        &["1Issuer"],
    );
    h.mine(vec![participate]);

    assert_eq!(h.balance("1Part", crowdsale), 1_000);
    assert_eq!(h.balance("1Issuer", crowdsale), 100);
}

#[test]
fn issuer_can_close_early() {
    let mut h = Harness::new();
    let base = h.create_fixed_property("1Part", 1_000_000, false);
    let deadline = BASE_TIME + 10_000_000;
    let crowdsale = open_crowdsale(&mut h, "1Issuer", base, 100, deadline, 0, 0);

    let close = h.protocol_tx("1Issuer", &Payload::CloseCrowdsale { property: crowdsale }, &[]);
    h.mine(vec![close]);

    assert!(h.core.state.crowdsales.get(crowdsale).is_none());
    let entry = h.core.dbs.registry.get(crowdsale).unwrap().unwrap();
    assert!(entry.close_early);

    // participation after the close is a plain send
    let send = h.protocol_tx(
        "1Part",
        &Payload::SimpleSend {
            property: base,
            amount: 10,
        },
        &["1Issuer"],
    );
    h.mine(vec![send]);
    assert_eq!(h.balance("1Part", crowdsale), 0);
    assert_eq!(h.balance("1Issuer", base), 10);
}

#[test]
fn only_the_issuer_may_close() {
    let mut h = Harness::new();
    let base = h.create_fixed_property("1Part", 1_000, false);
    let deadline = BASE_TIME + 10_000_000;
    let crowdsale = open_crowdsale(&mut h, "1Issuer", base, 100, deadline, 0, 0);

    let close = h.protocol_tx("1Mallory", &Payload::CloseCrowdsale { property: crowdsale }, &[]);
    let txid = close.txid;
    h.mine(vec![close]);

    assert!(!h.core.dbs.txlist.get_tx(&txid).unwrap().unwrap().valid);
    assert!(h.core.state.crowdsales.get(crowdsale).is_some());
}

#[test]
fn deadline_expires_the_crowdsale_at_block_begin() {
    let mut h = Harness::new();
    let base = h.create_fixed_property("1Part", 1_000, false);

    let deadline = BASE_TIME + u64::from(h.core.tip().unwrap() + 2) * 600;
    let crowdsale = open_crowdsale(&mut h, "1Issuer", base, 100, deadline, 0, 0);
    assert!(h.core.state.crowdsales.get(crowdsale).is_some());

    // block times advance 600 seconds per block; two blocks pass the deadline
    h.mine(vec![]);
    h.mine(vec![]);

    assert!(h.core.state.crowdsales.get(crowdsale).is_none());
    let entry = h.core.dbs.registry.get(crowdsale).unwrap().unwrap();
    assert!(!entry.close_early);
    assert!(entry.time_closed > 0);
}

#[test]
fn one_active_crowdsale_per_issuer() {
    let mut h = Harness::new();
    let base = h.create_fixed_property("1Part", 1_000, false);
    let deadline = BASE_TIME + 10_000_000;
    open_crowdsale(&mut h, "1Issuer", base, 100, deadline, 0, 0);

    let second = h.protocol_tx(
        "1Issuer",
        &Payload::CreatePropertyVariable {
            ecosystem: 1,
            kind: 1,
            prev_property_id: 0,
            category: String::new(),
            subcategory: String::new(),
            name: "Second".to_string(),
            url: String::new(),
            data: String::new(),
            desired_property: base,
            tokens_per_unit: 1,
            deadline,
            early_bird_bonus: 0,
            issuer_percentage: 0,
        },
        &[],
    );
    let txid = second.txid;
    h.mine(vec![second]);
    assert!(!h.core.dbs.txlist.get_tx(&txid).unwrap().unwrap().valid);
}
