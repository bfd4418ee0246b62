//! Folding observations into a price history.
//!
//! Everything here is pure: the only notion of time is the `now` passed in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Observation, PricePoint};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceStats {
    pub lowest: f64,
    pub highest: f64,
    pub average: f64,
}

impl PriceStats {
    /// Statistics over the whole history, `None` when it is empty.
    pub fn from_history(history: &[PricePoint]) -> Option<Self> {
        if history.is_empty() {
            return None;
        }

        let (lowest, highest, sum) = history.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(lowest, highest, sum), point| {
                (lowest.min(point.price), highest.max(point.price), sum + point.price)
            },
        );
        // Float summation can land an ulp outside the observed range.
        let average = (sum / history.len() as f64).clamp(lowest, highest);

        Some(Self {
            lowest,
            highest,
            average,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryFold {
    pub history: Vec<PricePoint>,
    pub stats: Option<PriceStats>,
    /// The entry appended by this fold, if the observation carried a usable price.
    pub appended: Option<PricePoint>,
}

impl HistoryFold {
    pub fn is_out_of_stock(&self) -> bool {
        self.appended.is_none()
    }

    pub fn current_price(&self) -> Option<f64> {
        self.appended.map(|point| point.price)
    }
}

pub fn fold(history: &[PricePoint], observation: &Observation, now: DateTime<Utc>) -> HistoryFold {
    match observation.usable_price() {
        Some(price) => {
            let point = PricePoint {
                price,
                observed_at: now,
            };
            let mut updated = Vec::with_capacity(history.len() + 1);
            updated.extend_from_slice(history);
            updated.push(point);
            let stats = PriceStats::from_history(&updated);

            HistoryFold {
                history: updated,
                stats,
                appended: Some(point),
            }
        }
        None => HistoryFold {
            history: history.to_vec(),
            stats: PriceStats::from_history(history),
            appended: None,
        },
    }
}
