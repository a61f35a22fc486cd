use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{AppError, Result, msg};
use crate::pricing::{CategoryId, ClientPrice, EventType, UnitPrice, lookup_price, to_minor_units};

pub const MAX_CART_ITEMS: usize = 20;
pub const MAX_QUANTITY: u32 = 10;

/// A cart line as submitted by the browser. Nothing here is trusted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: String,
    pub event_title: String,
    pub category_name: String,
    pub quantity: u32,
    pub price: ClientPrice,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub event_month: Option<String>,
    #[serde(default)]
    pub event_day: Option<String>,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
}

impl CartItem {
    /// `"12 Nov Tue at 19:00 | Venue"` from whichever display fields are present.
    fn display_description(&self) -> Option<String> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let date: Vec<String> = [&self.event_date, &self.event_month, &self.event_day]
            .into_iter()
            .filter_map(non_empty)
            .collect();

        let mut description = date.join(" ");
        if let Some(time) = non_empty(&self.event_time) {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str("at ");
            description.push_str(&time);
        }
        if let Some(venue) = non_empty(&self.venue) {
            if !description.is_empty() {
                description.push_str(" | ");
            }
            description.push_str(&venue);
        }

        (!description.is_empty()).then_some(description)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub comments: Option<String>,
}

impl CustomerContact {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation(msg::NAME_REQUIRED.into()));
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err(AppError::Validation(msg::EMAIL_REQUIRED.into()));
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(AppError::Validation(msg::INVALID_EMAIL.into())),
        }
        if self.phone.trim().is_empty() {
            return Err(AppError::Validation(msg::PHONE_REQUIRED.into()));
        }
        Ok(())
    }
}

/// A cart line whose price came from the price table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLineItem {
    pub event_id: String,
    pub event_type: EventType,
    pub category: CategoryId,
    pub unit_price: UnitPrice,
    pub quantity: u32,
    pub display_name: String,
    pub display_description: Option<String>,
}

impl ValidatedLineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price.times(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCart {
    pub items: Vec<ValidatedLineItem>,
    pub total: Decimal,
}

impl ValidatedCart {
    pub fn total_minor_units(&self) -> Option<i64> {
        to_minor_units(self.total)
    }
}

fn validate_item(item: &CartItem) -> Result<ValidatedLineItem> {
    if item.quantity == 0 || item.quantity > MAX_QUANTITY {
        return Err(AppError::Validation(msg::INVALID_QUANTITY.into()));
    }

    let event_type = EventType::classify(&item.event_title);
    let category = CategoryId::from_display_name(&item.category_name)
        .ok_or_else(|| AppError::InvalidCategory(item.category_name.clone()))?;
    let unit_price = lookup_price(event_type, category).ok_or_else(|| {
        AppError::InvalidPriceConfiguration {
            category: category.to_string(),
            event_type: event_type.to_string(),
        }
    })?;

    if !item.price.matches(unit_price) {
        tracing::warn!(
            event_id = %item.id,
            category = %category,
            event_type = %event_type,
            client_price = %item.price,
            server_price = %unit_price,
            "Price mismatch, charging server price"
        );
    }

    Ok(ValidatedLineItem {
        event_id: item.id.clone(),
        event_type,
        category,
        unit_price,
        quantity: item.quantity,
        display_name: format!("{} - {}", item.event_title.trim(), category.display_name()),
        display_description: item.display_description(),
    })
}

/// Re-prices a cart against the price table.
///
/// All-or-nothing: one bad line rejects the whole request.
pub fn validate_cart(items: &[CartItem], contact: &CustomerContact) -> Result<ValidatedCart> {
    if items.is_empty() {
        return Err(AppError::Validation(msg::CART_EMPTY.into()));
    }
    if items.len() > MAX_CART_ITEMS {
        return Err(AppError::Validation(msg::CART_TOO_LARGE.into()));
    }
    contact.validate()?;

    let items = items
        .iter()
        .map(validate_item)
        .collect::<Result<Vec<_>>>()?;
    let total = items.iter().map(ValidatedLineItem::line_total).sum();

    Ok(ValidatedCart { items, total })
}
