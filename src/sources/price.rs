use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;

// Multi-character symbols first so "US$" wins over "$"
const CURRENCY_SYMBOLS: [(&str, &str); 8] = [
    ("US$", "USD"),
    ("A$", "AUD"),
    ("C$", "CAD"),
    ("$", "USD"),
    ("£", "GBP"),
    ("€", "EUR"),
    ("¥", "JPY"),
    ("₹", "INR"),
];

/// Extracts a numeric price and currency from scraped text such as `"$1,299.00"`.
pub struct PriceParser {
    price_regex: Regex,
}

impl Default for PriceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceParser {
    pub fn new() -> Self {
        PriceParser {
            price_regex: Regex::new(r"(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)")
                .expect("price pattern is valid"),
        }
    }

    pub fn parse_decimal(&self, text: &str) -> Option<Decimal> {
        let captures = self.price_regex.captures(text)?;
        let digits = captures.get(1)?.as_str().replace(',', "");
        Decimal::from_str(&digits).ok()
    }

    pub fn parse_price(&self, text: &str) -> Option<f64> {
        self.parse_decimal(text)?.to_f64()
    }

    pub fn currency(&self, text: &str) -> Option<String> {
        CURRENCY_SYMBOLS
            .iter()
            .find(|(symbol, _)| text.contains(symbol))
            .map(|(_, code)| code.to_string())
    }
}
