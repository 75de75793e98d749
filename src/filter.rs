//! Resolving interest configs against global defaults, and matching
//! listings against the resolved filters.

use std::fmt;

use crate::config::{GlobalFilterConfig, TicketConfig, UNCONSTRAINED_EPSILON};
use crate::similarity::name_similarity;
use crate::types::{Channel, TicketListing};

/// A numeric bound that may be explicitly unconstrained. Config zeroes
/// and near-zeroes (|v| < 1e-5) become `Any` at resolution time, so the
/// match path never needs an epsilon comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    Any,
    Value(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityRule {
    Any,
    Exactly(u32),
}

/// Fully resolved matching constraints for one wanted event. Immutable;
/// rebuilt from scratch whenever the config changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFilter {
    pub event: String,
    /// Name similarity threshold as a 0-1 fraction. 0 accepts any name.
    pub similarity: f64,
    /// Allowed region codes; empty accepts any region.
    pub regions: Vec<String>,
    pub quantity: QuantityRule,
    /// Minimum discount as a 0-1 fraction of face value.
    pub min_discount: Threshold,
    /// Maximum per-ticket price including fee, in major units.
    pub max_ticket_price: Threshold,
    pub channels: Vec<Channel>,
}

/// Merge global defaults into each interest, producing one filter per
/// interest. Pure: no side effects, never fails.
///
/// Each optional field takes the interest's value if present; a truly
/// absent field inherits the global default. An explicit zero is honored
/// as unconstrained, never replaced by the global. Channels fall back
/// interest → global → all known channel types.
pub fn resolve(global: &GlobalFilterConfig, tickets: &[TicketConfig]) -> Vec<ListingFilter> {
    tickets
        .iter()
        .map(|ticket| {
            let similarity = ticket.event_similarity.unwrap_or(global.event_similarity);
            let regions = ticket.regions.clone().unwrap_or_else(|| global.regions.clone());
            let num_tickets = ticket.num_tickets.unwrap_or(global.num_tickets);
            let min_discount = ticket.min_discount.unwrap_or(global.min_discount);
            let max_price = ticket.max_ticket_price.unwrap_or(global.max_ticket_price);

            let mut channels =
                ticket.notification.clone().unwrap_or_else(|| global.notification.clone());
            if channels.is_empty() {
                channels = Channel::ALL.to_vec();
            }

            ListingFilter {
                event: ticket.event.clone(),
                similarity: similarity / 100.0,
                regions,
                quantity: if num_tickets == 0 {
                    QuantityRule::Any
                } else {
                    QuantityRule::Exactly(num_tickets)
                },
                // Configured as percent; resolved to a fraction.
                min_discount: threshold(min_discount).map_value(|v| v / 100.0),
                max_ticket_price: threshold(max_price),
                channels,
            }
        })
        .collect()
}

fn threshold(value: f64) -> Threshold {
    if value.abs() < UNCONSTRAINED_EPSILON {
        Threshold::Any
    } else {
        Threshold::Value(value)
    }
}

impl Threshold {
    fn map_value(self, f: impl FnOnce(f64) -> f64) -> Threshold {
        match self {
            Threshold::Any => Threshold::Any,
            Threshold::Value(v) => Threshold::Value(f(v)),
        }
    }
}

/// Why a listing failed a filter. Exactly one per rejected listing: the
/// checks run in order and stop at the first failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Name { score: f64 },
    Region { listing_region: String },
    Quantity { listing_quantity: u32, wanted: u32 },
    Discount { listing_discount: f64, wanted: f64 },
    Price { listing_price: f64, wanted: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Name { score } => {
                write!(f, "event name too dissimilar (score {score:.2})")
            }
            Rejection::Region { listing_region } => {
                write!(f, "region {listing_region} not in allowed list")
            }
            Rejection::Quantity { listing_quantity, wanted } => {
                write!(f, "{listing_quantity} tickets listed, want exactly {wanted}")
            }
            Rejection::Discount { listing_discount, wanted } => write!(
                f,
                "discount {:.2}% below wanted {:.2}%",
                listing_discount * 100.0,
                wanted * 100.0
            ),
            Rejection::Price { listing_price, wanted } => {
                write!(f, "ticket price {listing_price:.2} above max {wanted:.2}")
            }
        }
    }
}

/// Evaluate a listing against one resolved filter. Pure and
/// deterministic: depends only on its two arguments.
pub fn evaluate(listing: &TicketListing, filter: &ListingFilter) -> Result<(), Rejection> {
    // Name similarity. A zero threshold accepts anything.
    let score = name_similarity(&filter.event, &listing.event.name);
    if score < filter.similarity {
        return Err(Rejection::Name { score });
    }

    let region = &listing.event.venue.location.region;
    let region_ok = filter.regions.is_empty()
        || filter.regions.iter().any(|r| r.eq_ignore_ascii_case(region));
    if !region_ok {
        return Err(Rejection::Region { listing_region: region.clone() });
    }

    if let QuantityRule::Exactly(wanted) = filter.quantity {
        if listing.quantity != wanted {
            return Err(Rejection::Quantity { listing_quantity: listing.quantity, wanted });
        }
    }

    if let Threshold::Value(wanted) = filter.min_discount {
        let listing_discount = listing.discount();
        if listing_discount < wanted {
            return Err(Rejection::Discount { listing_discount, wanted });
        }
    }

    if let Threshold::Value(wanted) = filter.max_ticket_price {
        let listing_price = listing.ticket_price_incl_fee().amount();
        if listing_price > wanted {
            return Err(Rejection::Price { listing_price, wanted });
        }
    }

    Ok(())
}

pub fn matches(listing: &TicketListing, filter: &ListingFilter) -> bool {
    evaluate(listing, filter).is_ok()
}
