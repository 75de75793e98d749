use std::fmt;

use serde::{Deserialize, Serialize};

/// A monetary amount as it appears on the feed wire: minor units plus an
/// ISO currency code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Price {
    #[serde(rename = "amountInCents")]
    pub pennies: i64,
    #[serde(rename = "currencyCode", default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "GBP".to_string()
}

impl Price {
    pub fn new(pennies: i64) -> Self {
        Self { pennies, currency: default_currency() }
    }

    /// Amount in major units (pounds for GBP).
    pub fn amount(&self) -> f64 {
        self.pennies as f64 / 100.0
    }

    pub fn add(&self, other: &Price) -> Price {
        Price {
            pennies: self.pennies + other.pennies,
            currency: self.currency.clone(),
        }
    }

    /// Split the price evenly, e.g. a total over a number of tickets.
    pub fn divide(&self, by: u32) -> Price {
        if by == 0 {
            return self.clone();
        }
        Price {
            pennies: self.pennies / by as i64,
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self.currency.as_str() {
            "GBP" => "£",
            "EUR" => "€",
            "USD" => "$",
            other => return write!(f, "{} {:.2}", other, self.amount()),
        };
        write!(f, "{}{:.2}", symbol, self.amount())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Location {
    #[serde(rename = "shortName", default)]
    pub name: String,
    #[serde(rename = "regionCode", default)]
    pub region: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Venue {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(rename = "eventName", default)]
    pub name: String,
    /// Event date as the feed renders it, e.g. "Saturday 14 March 2026".
    #[serde(default)]
    pub date: String,
    #[serde(rename = "showStartingTime", default)]
    pub time: String,
    #[serde(default)]
    pub venue: Venue,
}

/// One resale listing from the live feed. Immutable once fetched; the
/// scanner only ever reads it.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketListing {
    #[serde(rename = "blockId")]
    pub id: String,

    /// Creation time in unix milliseconds. The feed returns listings
    /// newest-first on this field.
    #[serde(rename = "created")]
    pub created_at: u64,

    #[serde(rename = "ticketQuantity")]
    pub quantity: u32,

    /// Seller's asking price for all tickets, excluding the platform fee.
    #[serde(rename = "totalSellingPrice")]
    pub selling_price: Price,
    #[serde(rename = "totalTwicketsFee", default)]
    pub fee: Price,
    /// Face value of all tickets combined.
    #[serde(rename = "faceValuePrice", default)]
    pub face_value: Price,

    /// Seated, Standing, Box etc.
    #[serde(rename = "priceTier", default)]
    pub ticket_type: String,
    #[serde(rename = "sellerWillConsiderOffers", default)]
    pub seller_will_consider_offers: bool,

    #[serde(default)]
    pub event: Event,
}

impl TicketListing {
    /// Total price of all tickets including the platform fee.
    pub fn total_price_incl_fee(&self) -> Price {
        self.selling_price.add(&self.fee)
    }

    /// Price of a single ticket including its share of the fee.
    pub fn ticket_price_incl_fee(&self) -> Price {
        self.total_price_incl_fee().divide(self.quantity)
    }

    /// Face value of a single ticket.
    pub fn original_ticket_price(&self) -> Price {
        self.face_value.divide(self.quantity)
    }

    /// Discount against face value as a 0-1 fraction. A listing priced
    /// above face value has a discount of 0, never a negative value.
    pub fn discount(&self) -> f64 {
        if self.face_value.pennies <= 0 {
            return 0.0;
        }
        let discount =
            1.0 - self.total_price_incl_fee().pennies as f64 / self.face_value.pennies as f64;
        discount.max(0.0)
    }

    pub fn discount_string(&self) -> String {
        format!("{:.2}%", self.discount() * 100.0)
    }

    /// Buy link for this listing.
    pub fn url(&self) -> String {
        format!("https://www.twickets.live/app/block/{},{}", self.id, self.quantity)
    }
}

/// A named notification delivery mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Ntfy,
    Gotify,
    Telegram,
}

impl Channel {
    /// Every channel type the scanner knows how to deliver to.
    pub const ALL: [Channel; 3] = [Channel::Ntfy, Channel::Gotify, Channel::Telegram];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Ntfy => "ntfy",
            Channel::Gotify => "gotify",
            Channel::Telegram => "telegram",
        };
        f.write_str(name)
    }
}
