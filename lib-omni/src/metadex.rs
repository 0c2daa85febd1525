//! Token/Token Exchange (MetaDEx)
//!
//! Per-trading-pair order books with deterministic matching. Orders are kept
//! best-price-first with (block, tx-index) tie-breaks; prices are exact
//! rationals compared by cross multiplication, never floats. Matching uses
//! the resting order's price. Both ecosystems trade, but never with each
//! other.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, BlockHeight, PropertyId, TxHash};

/// A resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub address: Address,
    pub block: BlockHeight,
    pub idx: u32,
    pub txid: TxHash,
    pub property_for_sale: PropertyId,
    pub property_desired: PropertyId,
    /// Original amounts; together they are the price and stay fixed.
    pub amount_for_sale: Amount,
    pub amount_desired: Amount,
    /// For-sale units still in the book (backed by the metadex reserve).
    pub amount_remaining: Amount,
}

impl Order {
    /// The desired units this order still wants, at its own price, rounded
    /// up in the maker's favor.
    pub fn still_wants(&self) -> Amount {
        ceil_mul_div(
            self.amount_remaining,
            self.amount_desired,
            self.amount_for_sale,
        )
    }

    /// Unit-price ordering: desired/for_sale ascending, then block, then
    /// tx-index. Lower is a better price for the counterparty.
    fn book_cmp(&self, other: &Order) -> Ordering {
        let lhs = i128::from(self.amount_desired) * i128::from(other.amount_for_sale);
        let rhs = i128::from(other.amount_desired) * i128::from(self.amount_for_sale);
        lhs.cmp(&rhs)
            .then(self.block.cmp(&other.block))
            .then(self.idx.cmp(&other.idx))
    }
}

/// One executed match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub maker: Order,
    /// Units of the taker's for-sale property delivered to the maker.
    pub taker_paid: Amount,
    /// Units of the maker's for-sale property delivered to the taker.
    pub taker_received: Amount,
    /// Whether the maker order was fully filled and removed.
    pub maker_filled: bool,
    /// Reserve returned to the maker when its remainder became too small to
    /// trade and the order was dropped from the book.
    pub maker_refund: Amount,
}

#[inline]
fn ceil_mul_div(a: Amount, b: Amount, c: Amount) -> Amount {
    debug_assert!(c > 0);
    let num = i128::from(a) * i128::from(b);
    let den = i128::from(c);
    ((num + den - 1) / den) as Amount
}

#[inline]
fn floor_mul_div(a: Amount, b: Amount, c: Amount) -> Amount {
    debug_assert!(c > 0);
    (i128::from(a) * i128::from(b) / i128::from(c)) as Amount
}

// =============================================================================
// BOOK
// =============================================================================

/// All order books, keyed by (for-sale, desired) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaDexBook {
    books: BTreeMap<(PropertyId, PropertyId), Vec<Order>>,
}

impl MetaDexBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a residual order into its book, keeping best-price-first
    /// order.
    pub fn insert(&mut self, order: Order) {
        let book = self
            .books
            .entry((order.property_for_sale, order.property_desired))
            .or_default();
        let pos = book
            .binary_search_by(|resting| resting.book_cmp(&order))
            .unwrap_or_else(|pos| pos);
        book.insert(pos, order);
    }

    /// Match a new order against the opposite book.
    ///
    /// The opposite book sells what the taker desires. A resting order
    /// matches while its price does not exceed the taker's; amounts exchange
    /// at the resting order's price, rounding against the taker. Returns the
    /// executed matches and the taker's unfilled remainder (which the caller
    /// inserts via [`insert`] if non-zero).
    pub fn match_order(&mut self, taker: &Order) -> (Vec<Match>, Amount) {
        let mut remaining = taker.amount_remaining;
        let mut matches = Vec::new();

        let pair = (taker.property_desired, taker.property_for_sale);
        let book = match self.books.get_mut(&pair) {
            Some(book) => book,
            None => return (matches, remaining),
        };

        while remaining > 0 && !book.is_empty() {
            let maker = &book[0];
            // the taker offers `amount_for_sale` X for `amount_desired` Y;
            // the maker asks `amount_desired` X for `amount_for_sale` Y.
            // trade iff maker price ≤ taker price:
            //   maker.desired / maker.for_sale ≤ taker.for_sale / taker.desired
            let lhs = i128::from(maker.amount_desired) * i128::from(taker.amount_desired);
            let rhs = i128::from(maker.amount_for_sale) * i128::from(taker.amount_for_sale);
            if lhs > rhs {
                break; // best price already too high
            }

            let maker_wants = book[0].still_wants();
            if maker_wants <= 0 {
                // dust remainder that can no longer buy a unit; drop it
                let maker = book.remove(0);
                let maker_refund = maker.amount_remaining;
                matches.push(Match {
                    maker,
                    taker_paid: 0,
                    taker_received: 0,
                    maker_filled: true,
                    maker_refund,
                });
                continue;
            }

            let paid = remaining.min(maker_wants);
            let received = if paid == maker_wants {
                book[0].amount_remaining
            } else {
                floor_mul_div(
                    paid,
                    book[0].amount_for_sale,
                    book[0].amount_desired,
                )
            };
            if received <= 0 {
                break; // taker's remainder cannot buy a single unit
            }

            remaining -= paid;
            let maker_filled = paid == maker_wants;
            let maker_snapshot = if maker_filled {
                book.remove(0)
            } else {
                book[0].amount_remaining -= received;
                book[0].clone()
            };
            matches.push(Match {
                maker: maker_snapshot,
                taker_paid: paid,
                taker_received: received,
                maker_filled,
                maker_refund: 0,
            });
        }

        (matches, remaining)
    }

    /// Remove this address's orders on one pair at exactly the given price.
    pub fn cancel_at_price(
        &mut self,
        address: &Address,
        property_for_sale: PropertyId,
        amount_for_sale: Amount,
        property_desired: PropertyId,
        amount_desired: Amount,
    ) -> Vec<Order> {
        self.cancel_where(|order| {
            order.address == *address
                && order.property_for_sale == property_for_sale
                && order.property_desired == property_desired
                && i128::from(order.amount_desired) * i128::from(amount_for_sale)
                    == i128::from(amount_desired) * i128::from(order.amount_for_sale)
        })
    }

    /// Remove this address's orders on one pair at any price.
    pub fn cancel_pair(
        &mut self,
        address: &Address,
        property_for_sale: PropertyId,
        property_desired: PropertyId,
    ) -> Vec<Order> {
        self.cancel_where(|order| {
            order.address == *address
                && order.property_for_sale == property_for_sale
                && order.property_desired == property_desired
        })
    }

    /// Remove every order of this address within one ecosystem.
    pub fn cancel_ecosystem(
        &mut self,
        address: &Address,
        ecosystem: crate::types::Ecosystem,
    ) -> Vec<Order> {
        self.cancel_where(|order| {
            order.address == *address
                && crate::types::Ecosystem::of(order.property_for_sale) == ecosystem
        })
    }

    fn cancel_where<F: Fn(&Order) -> bool>(&mut self, predicate: F) -> Vec<Order> {
        let mut removed = Vec::new();
        for book in self.books.values_mut() {
            let mut i = 0;
            while i < book.len() {
                if predicate(&book[i]) {
                    removed.push(book.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        self.books.retain(|_, book| !book.is_empty());
        removed
    }

    /// Deterministic iteration over every resting order, pair-major then
    /// best-price-first.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.books.values().flatten()
    }

    /// Orders on one book, best-price-first.
    pub fn book(
        &self,
        property_for_sale: PropertyId,
        property_desired: PropertyId,
    ) -> &[Order] {
        self.books
            .get(&(property_for_sale, property_desired))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.books.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
