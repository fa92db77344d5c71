//! User-facing prompt text and description enrichment.

use crate::price::PriceInfo;

/// Payment prompt when the link must be opened manually.
#[must_use]
pub fn open_link_message(url: &str, price: &PriceInfo) -> String {
    format!(
        "To run this tool, please pay {price} using the link below:\n\n\
         {url}\n\n\
         After completing the payment, come back and confirm."
    )
}

/// Payment prompt when a webview window already popped open.
#[must_use]
pub fn opened_webview_message(url: &str, price: &PriceInfo) -> String {
    format!(
        "To run this tool, please pay {price}.\n\
         A payment window should be open. If not, you can use this link:\n\n\
         {url}\n\n\
         After completing the payment, come back and confirm."
    )
}

/// Appends the paid-function notice to a tool description.
///
/// The original description text is preserved (trimmed); the notice is
/// always the last line so clients and models can rely on its position.
#[must_use]
pub fn description_with_price(description: &str, price: &PriceInfo) -> String {
    format!(
        "{}\nThis is a paid function: {price}. Payment will be requested during execution.",
        description.trim()
    )
}
