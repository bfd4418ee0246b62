use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use super::ObservationSource;
use super::price::PriceParser;
use crate::config::ScraperConfig;
use crate::models::{ItemAttributes, Observation};
use crate::utils::error::FetchError;

/// CSS selectors tried in order for each field; the first non-empty match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlSelectors {
    pub title: Vec<String>,
    pub price: Vec<String>,
    pub original_price: Vec<String>,
    pub availability: Vec<String>,
    pub image: Vec<String>,
    pub description: Vec<String>,
    pub category: Vec<String>,
    /// Lower-cased phrases in the availability text that mean the item cannot be bought.
    pub out_of_stock_markers: Vec<String>,
}

impl Default for HtmlSelectors {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            title: list(&["#productTitle", "meta[property='og:title']", "h1"]),
            price: list(&[
                ".priceToPay .a-offscreen",
                "#corePriceDisplay_desktop_feature_div .a-offscreen",
                "#priceblock_ourprice",
                "#priceblock_dealprice",
                "[itemprop='price']",
                "meta[property='product:price:amount']",
                ".price",
            ]),
            original_price: list(&[
                ".basisPrice .a-offscreen",
                "#priceblock_ourprice_row .a-text-price",
                "[data-original-price]",
                ".original-price",
            ]),
            availability: list(&["#availability span", "#availability", "[itemprop='availability']"]),
            image: list(&["#landingImage", "meta[property='og:image']", "img[itemprop='image']"]),
            description: list(&["#feature-bullets", "meta[name='description']", "[itemprop='description']"]),
            category: list(&["#wayfinding-breadcrumbs_feature_div li:last-child a", "[itemprop='category']"]),
            out_of_stock_markers: list(&[
                "currently unavailable",
                "out of stock",
                "sold out",
                "outofstock",
            ]),
        }
    }
}

/// Fetches product pages over HTTP and extracts an observation from the markup.
pub struct HttpObservationSource {
    client: Client,
    selectors: HtmlSelectors,
    parser: PriceParser,
}

impl HttpObservationSource {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            selectors: HtmlSelectors::default(),
            parser: PriceParser::new(),
        })
    }

    pub fn with_selectors(mut self, selectors: HtmlSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Build an observation from a product page.
    pub fn extract(&self, body: &str) -> Result<Observation, FetchError> {
        let document = Html::parse_document(body);

        let title = self
            .first_text(&document, &self.selectors.title)?
            .ok_or_else(|| FetchError::Parse {
                message: "no product title found".to_string(),
            })?;

        let price_text = self.first_text(&document, &self.selectors.price)?;
        let current_price = price_text
            .as_deref()
            .and_then(|text| self.parser.parse_price(text));
        let currency = price_text.as_deref().and_then(|text| self.parser.currency(text));

        let original_price = self
            .first_text(&document, &self.selectors.original_price)?
            .and_then(|text| self.parser.parse_price(&text));

        let availability = self
            .first_text(&document, &self.selectors.availability)?
            .map(|text| text.to_lowercase());
        let marked_unavailable = availability.as_deref().is_some_and(|text| {
            self.selectors
                .out_of_stock_markers
                .iter()
                .any(|marker| text.contains(marker.as_str()))
        });

        let discount_rate = match (current_price, original_price) {
            (Some(current), Some(original)) if original > current && current > 0.0 => {
                Some(((original - current) / original * 100.0).round())
            }
            _ => None,
        };

        let attributes = ItemAttributes {
            currency,
            image: self.first_text(&document, &self.selectors.image)?,
            original_price,
            discount_rate,
            category: self.first_text(&document, &self.selectors.category)?,
            reviews_count: None,
            stars: None,
            description: self.first_text(&document, &self.selectors.description)?,
        };

        let is_out_of_stock = marked_unavailable || current_price.is_none_or(|price| price <= 0.0);

        Ok(Observation {
            title,
            current_price,
            is_out_of_stock,
            attributes,
        })
    }

    fn first_text(&self, document: &Html, selectors: &[String]) -> Result<Option<String>, FetchError> {
        for raw in selectors {
            let selector = Selector::parse(raw).map_err(|e| FetchError::Parse {
                message: format!("invalid selector '{}': {:?}", raw, e),
            })?;

            if let Some(value) = document
                .select(&selector)
                .filter_map(element_value)
                .find(|value| !value.is_empty())
            {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Meta tags, microdata and images carry their value in an attribute, everything else in text.
fn element_value(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    let raw = match value.name() {
        "meta" => value.attr("content").map(str::to_string),
        "img" => value
            .attr("data-old-hires")
            .filter(|src| !src.is_empty())
            .or_else(|| value.attr("src"))
            .map(str::to_string),
        _ => value
            .attr("content")
            .or_else(|| value.attr("data-original-price"))
            .map(str::to_string)
            .or_else(|| Some(element.text().collect::<Vec<_>>().join(" "))),
    }?;

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed)
}

#[async_trait]
impl ObservationSource for HttpObservationSource {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch(&self, locator: &str) -> Result<Observation, FetchError> {
        let url = Url::parse(locator)
            .map_err(|e| FetchError::InvalidLocator(format!("{}: {}", locator, e)))?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                locator: locator.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let observation = self.extract(&body)?;
        tracing::debug!(
            title = %observation.title,
            price = ?observation.current_price,
            out_of_stock = observation.is_out_of_stock,
            "Extracted observation"
        );
        observation.validated()
    }
}
