use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::ItemAttributes;
use crate::utils::error::FetchError;

/// A point-in-time snapshot returned by an observation source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Observation {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: String,
    #[validate(range(min = 0.0, message = "price must not be negative"))]
    pub current_price: Option<f64>,
    pub is_out_of_stock: bool,
    pub attributes: ItemAttributes,
}

impl Observation {
    /// Reject observations with missing or nonsensical fields before they reach the pipeline.
    pub fn validated(self) -> Result<Self, FetchError> {
        self.validate()?;
        self.attributes.validate()?;

        let prices = [
            self.current_price,
            self.attributes.original_price,
            self.attributes.discount_rate,
            self.attributes.stars,
        ];
        if prices.iter().flatten().any(|value| !value.is_finite()) {
            return Err(FetchError::Malformed(format!(
                "non-finite number in observation for '{}'",
                self.title
            )));
        }

        Ok(self)
    }

    /// The price to record, if any. A listing flagged out of stock never contributes its price.
    pub fn usable_price(&self) -> Option<f64> {
        if self.is_out_of_stock {
            return None;
        }
        self.current_price
            .filter(|price| price.is_finite() && *price > 0.0)
    }
}
