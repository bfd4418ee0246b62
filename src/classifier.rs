//! Deciding whether a reconciliation is worth telling subscribers about.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    BackInStock,
    LowestPriceEver,
    PriceDrop,
    ThresholdMet,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BackInStock => "back_in_stock",
            NotificationKind::LowestPriceEver => "lowest_price_ever",
            NotificationKind::PriceDrop => "price_drop",
            NotificationKind::ThresholdMet => "threshold_met",
        }
    }
}

/// The slice of an item's state the classifier compares.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceState {
    pub current_price: Option<f64>,
    pub is_out_of_stock: bool,
    pub lowest_price: Option<f64>,
}

/// First matching rule wins: restock, new all-time low, drop, then target crossing.
pub fn classify(
    previous: &PriceState,
    next: &PriceState,
    targets: &[f64],
) -> Option<NotificationKind> {
    if previous.is_out_of_stock && !next.is_out_of_stock {
        return Some(NotificationKind::BackInStock);
    }

    if let (Some(current), Some(lowest)) = (next.current_price, next.lowest_price) {
        let new_minimum = match previous.lowest_price {
            Some(previous_lowest) => lowest < previous_lowest,
            None => true,
        };
        if current == lowest && new_minimum {
            return Some(NotificationKind::LowestPriceEver);
        }
    }

    if let (Some(current), Some(previous_price)) = (next.current_price, previous.current_price) {
        if current < previous_price {
            return Some(NotificationKind::PriceDrop);
        }
    }

    if targets
        .iter()
        .any(|target| crossed_target(previous, next, *target))
    {
        return Some(NotificationKind::ThresholdMet);
    }

    None
}

/// The price reached `target` during this transition rather than sitting under it already.
pub fn crossed_target(previous: &PriceState, next: &PriceState, target: f64) -> bool {
    match next.current_price {
        Some(current) if current <= target => match previous.current_price {
            Some(previous_price) => previous_price > target,
            None => true,
        },
        _ => false,
    }
}
