use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

/// Marketplace name recorded as the source of every quote.
pub const MARKETPLACE: &str = "OpenSea";

// TODO: confirm the stats endpoint always quotes in ETH before adding more
// collections; the unit is appended blindly here.
const PRICE_UNIT: &str = "ETH";

/// Floor price of a collection as reported by one marketplace.
///
/// Produced fresh on every successful fetch and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct FloorPriceQuote {
    pub source: String,
    pub price: String,
    pub project: String,
}

#[derive(Deserialize)]
struct CollectionEnvelope {
    collection: Collection,
}

#[derive(Deserialize)]
struct Collection {
    stats: Stats,
}

#[derive(Deserialize)]
struct Stats {
    floor_price: f64,
}

#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Fetches the current floor price of the collection behind `url`.
    ///
    /// Performs a single GET with no retry. Every failure mode (network
    /// error, non-JSON body, empty payload, missing field) is logged here and
    /// collapsed to `None`, so callers only ever test the variant.
    pub async fn fetch_floor_price(&self, url: &str, alias: &str) -> Option<FloorPriceQuote> {
        match self.try_fetch(url, alias).await {
            Ok(quote) => Some(quote),
            Err(Error::UnexpectedPayload(raw)) => {
                log::error!(
                    "[{MARKETPLACE}] API request did not return the expected response: {raw}"
                );
                None
            }
            Err(e) => {
                log::error!("[{MARKETPLACE}] API response was invalid: {e}");
                None
            }
        }
    }

    async fn try_fetch(&self, url: &str, alias: &str) -> Result<FloorPriceQuote> {
        let response = self.client.get(url).send().await?;
        // The endpoint is not trusted to declare a JSON content type, so the
        // body is read as text and parsed manually.
        let text = response.text().await?;
        parse_floor_price(&text, alias)
    }
}

fn parse_floor_price(text: &str, alias: &str) -> Result<FloorPriceQuote> {
    let value: Value =
        serde_json::from_str(text).map_err(|_| Error::Deserialize(text.to_string()))?;

    if is_empty_payload(&value) {
        return Err(Error::UnexpectedPayload(text.to_string()));
    }

    let envelope: CollectionEnvelope =
        serde_json::from_value(value).map_err(|_| Error::Deserialize(text.to_string()))?;

    Ok(FloorPriceQuote {
        source: MARKETPLACE.to_string(),
        price: format!("{} {PRICE_UNIT}", envelope.collection.stats.floor_price),
        project: alias.to_string(),
    })
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(values) => values.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}
