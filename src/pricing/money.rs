use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Authoritative unit price in major currency units.
///
/// Only the price table constructs these, so anything charged to a customer
/// traces back to [`super::lookup_price`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UnitPrice(Decimal);

impl UnitPrice {
    pub(super) fn from_major(units: u32) -> Self {
        UnitPrice(Decimal::from(units))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Price in processor minor units (cents), rounded half away from zero.
    pub fn to_minor_units(self) -> Option<i64> {
        to_minor_units(self.0)
    }

    pub fn times(self, quantity: u32) -> Decimal {
        self.0 * Decimal::from(quantity)
    }
}

impl std::fmt::Display for UnitPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Price the client claims for an item.
///
/// Advisory only. It can be compared against a [`UnitPrice`] for logging but
/// has no path into minor units or into a processor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ClientPrice(Decimal);

impl ClientPrice {
    pub fn new(amount: Decimal) -> Self {
        ClientPrice(amount)
    }

    pub fn matches(&self, price: UnitPrice) -> bool {
        self.0 == price.0
    }
}

impl std::fmt::Display for ClientPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Converts a major-unit amount to minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Converts processor minor units back to a major-unit amount.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}
