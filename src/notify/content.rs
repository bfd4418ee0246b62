use serde::Serialize;

use crate::classifier::NotificationKind;
use crate::models::TrackedItem;

const SUBJECT_TITLE_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationContent {
    pub subject: String,
    pub body: String,
}

/// Render the message for `kind` from the item as it will be persisted.
pub fn render(kind: NotificationKind, item: &TrackedItem) -> NotificationContent {
    let short_title = shorten_title(&item.title);
    let currency = item.attributes.currency.as_deref();
    let current = item
        .current_price
        .map(|price| format_price(price, currency))
        .unwrap_or_else(|| "unavailable".to_string());

    let (subject, headline) = match kind {
        NotificationKind::BackInStock => (
            format!("{} is back in stock!", short_title),
            format!("{} is back in stock. Grab it before it sells out again.", item.title),
        ),
        NotificationKind::LowestPriceEver => (
            format!("Lowest price alert for {}", short_title),
            format!("{} just hit its lowest price ever: {}.", item.title, current),
        ),
        NotificationKind::PriceDrop => (
            format!("Price drop alert for {}", short_title),
            format!("{} is now cheaper at {}.", item.title, current),
        ),
        NotificationKind::ThresholdMet => (
            format!("Target price reached for {}", short_title),
            format!("{} is now {}, at or below your target price.", item.title, current),
        ),
    };

    let mut body = String::new();
    body.push_str("<div>\n");
    body.push_str(&format!("  <h2>{}</h2>\n", escape(&headline)));
    body.push_str(&format!("  <p><strong>Current price:</strong> {}</p>\n", escape(&current)));
    if let Some(lowest) = item.lowest_price {
        body.push_str(&format!(
            "  <p><strong>Lowest recorded:</strong> {}</p>\n",
            escape(&format_price(lowest, currency))
        ));
    }
    if let Some(original) = item.attributes.original_price {
        body.push_str(&format!(
            "  <p><strong>List price:</strong> {}</p>\n",
            escape(&format_price(original, currency))
        ));
    }
    body.push_str(&format!(
        "  <p><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">View product</a></p>\n",
        escape(&item.key)
    ));
    body.push_str("</div>\n");

    NotificationContent { subject, body }
}

pub fn shorten_title(title: &str) -> String {
    if title.chars().count() > SUBJECT_TITLE_CHARS {
        let short: String = title.chars().take(SUBJECT_TITLE_CHARS).collect();
        format!("{}...", short)
    } else {
        title.to_string()
    }
}

pub fn format_price(price: f64, currency: Option<&str>) -> String {
    match currency {
        Some(code) => format!("{} {:.2}", code, price),
        None => format!("{:.2}", price),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
