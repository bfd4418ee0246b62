use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::classifier::PriceState;
use crate::history::PriceStats;

/// One observed price, in the order it was recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

/// Descriptive fields overwritten by each observation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct ItemAttributes {
    pub currency: Option<String>,
    pub image: Option<String>,
    #[validate(range(min = 0.0, message = "original price must not be negative"))]
    pub original_price: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0, message = "discount rate must be a percentage"))]
    pub discount_rate: Option<f64>,
    pub category: Option<String>,
    pub reviews_count: Option<u32>,
    #[validate(range(min = 0.0, max = 5.0, message = "stars must be between 0 and 5"))]
    pub stars: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Subscriber {
    #[validate(email(message = "subscriber email is not a valid address"))]
    pub email: String,
    /// Alert once the price falls to or below this value.
    #[validate(range(exclusive_min = 0.0, message = "target price must be positive"))]
    pub target_price: Option<f64>,
}

impl Subscriber {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            target_price: None,
        }
    }

    pub fn with_target(email: impl Into<String>, target_price: f64) -> Self {
        Self {
            email: email.into(),
            target_price: Some(target_price),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedItem {
    /// Canonical source URL.
    pub key: String,
    pub title: String,
    pub attributes: ItemAttributes,

    // Append-only, chronological
    pub price_history: Vec<PricePoint>,
    pub current_price: Option<f64>,

    // Derived from price_history on every update
    pub lowest_price: Option<f64>,
    pub highest_price: Option<f64>,
    pub average_price: Option<f64>,

    pub is_out_of_stock: bool,
    pub subscribers: Vec<Subscriber>,

    pub last_updated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrackedItem {
    pub key: String,
    pub title: Option<String>,
}

/// Full set of fields written by a reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemUpdate {
    pub title: String,
    pub attributes: ItemAttributes,
    pub price_history: Vec<PricePoint>,
    pub current_price: Option<f64>,
    pub lowest_price: Option<f64>,
    pub highest_price: Option<f64>,
    pub average_price: Option<f64>,
    pub is_out_of_stock: bool,
    pub last_updated: DateTime<Utc>,
}

impl ItemUpdate {
    /// Recompute current price and statistics from the history so a writer cannot
    /// persist figures that disagree with it.
    pub fn normalized(mut self) -> Self {
        let stats = PriceStats::from_history(&self.price_history);
        self.lowest_price = stats.map(|s| s.lowest);
        self.highest_price = stats.map(|s| s.highest);
        self.average_price = stats.map(|s| s.average);
        if self.is_out_of_stock {
            self.current_price = None;
        }
        self
    }
}

impl TrackedItem {
    pub fn new(new_item: NewTrackedItem, now: DateTime<Utc>) -> Self {
        Self {
            key: new_item.key,
            title: new_item.title.unwrap_or_default(),
            attributes: ItemAttributes::default(),
            price_history: Vec::new(),
            current_price: None,
            lowest_price: None,
            highest_price: None,
            average_price: None,
            is_out_of_stock: false,
            subscribers: Vec::new(),
            last_updated: None,
            created_at: now,
        }
    }

    /// Overwrite every reconciled field. `key`, `subscribers` and `created_at` are untouched.
    pub fn apply(&mut self, update: ItemUpdate) {
        self.title = update.title;
        self.attributes = update.attributes;
        self.price_history = update.price_history;
        self.current_price = update.current_price;
        self.lowest_price = update.lowest_price;
        self.highest_price = update.highest_price;
        self.average_price = update.average_price;
        self.is_out_of_stock = update.is_out_of_stock;
        self.last_updated = Some(update.last_updated);
    }

    pub fn price_state(&self) -> PriceState {
        PriceState {
            current_price: self.current_price,
            is_out_of_stock: self.is_out_of_stock,
            lowest_price: self.lowest_price,
        }
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    pub fn subscriber_emails(&self) -> Vec<String> {
        self.subscribers.iter().map(|s| s.email.clone()).collect()
    }

    pub fn target_prices(&self) -> Vec<f64> {
        self.subscribers.iter().filter_map(|s| s.target_price).collect()
    }

    pub fn add_subscriber(&mut self, subscriber: Subscriber) {
        match self
            .subscribers
            .iter_mut()
            .find(|existing| existing.email == subscriber.email)
        {
            Some(existing) => existing.target_price = subscriber.target_price,
            None => self.subscribers.push(subscriber),
        }
    }
}
