//! Server-side price authority.
//!
//! Ticket prices are a closed table keyed by event type and seating
//! category. Nothing the client sends can change what a customer is charged:
//! carts name a category, and the price comes from here.

mod money;

pub use money::{ClientPrice, UnitPrice, from_minor_units, to_minor_units};

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Tour an event belongs to. Each tour has its own price list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Wta,
    Atp,
}

impl EventType {
    /// Classifies an event from its display title.
    ///
    /// Case-insensitive: a title mentioning `WTA` or `WOMEN` is a WTA event,
    /// everything else (including an empty title) is ATP.
    pub fn classify(title: &str) -> Self {
        let title = title.to_uppercase();
        if title.contains("WTA") || title.contains("WOMEN") {
            EventType::Wta
        } else {
            EventType::Atp
        }
    }
}

/// Seating category, identified by a stable slug.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CategoryId {
    PrimeA,
    PrimeB,
    Grandstand,
    GrandstandLower,
    GrandstandUpper,
}

const CATEGORY_NAMES: &[(&str, CategoryId)] = &[
    ("Prime A", CategoryId::PrimeA),
    ("Prime B", CategoryId::PrimeB),
    ("Grandstand", CategoryId::Grandstand),
    ("Grandstand Lower", CategoryId::GrandstandLower),
    ("Grandstand Upper", CategoryId::GrandstandUpper),
];

impl CategoryId {
    /// Maps a storefront display name such as `"Prime A"` to its category.
    /// Surrounding whitespace and ASCII case are ignored.
    pub fn from_display_name(name: &str) -> Option<Self> {
        let name = name.trim();
        CATEGORY_NAMES
            .iter()
            .find(|(display, _)| display.eq_ignore_ascii_case(name))
            .map(|(_, id)| *id)
    }

    pub fn display_name(&self) -> &'static str {
        CATEGORY_NAMES
            .iter()
            .find(|(_, id)| id == self)
            .map(|(display, _)| *display)
            .unwrap_or("")
    }
}

/// Unit prices in major currency units.
const PRICE_TABLE: &[(EventType, CategoryId, u32)] = &[
    (EventType::Wta, CategoryId::PrimeA, 650),
    (EventType::Wta, CategoryId::PrimeB, 1200),
    (EventType::Wta, CategoryId::Grandstand, 250),
    (EventType::Atp, CategoryId::PrimeA, 750),
    (EventType::Atp, CategoryId::PrimeB, 1400),
    (EventType::Atp, CategoryId::GrandstandLower, 350),
    (EventType::Atp, CategoryId::GrandstandUpper, 200),
];

/// Looks up the authoritative price. `None` means the pair is not sold.
pub fn lookup_price(event_type: EventType, category: CategoryId) -> Option<UnitPrice> {
    PRICE_TABLE
        .iter()
        .find(|(et, cat, _)| *et == event_type && *cat == category)
        .map(|(_, _, units)| UnitPrice::from_major(*units))
}
