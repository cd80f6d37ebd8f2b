use async_trait::async_trait;
use opensea::FloorPriceQuote;

/// Source of floor price quotes for one collection.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetches a fresh quote, or `None` when the marketplace could not
    /// produce one this cycle.
    async fn latest_quote(&self) -> Option<FloorPriceQuote>;
}

/// Quotes backed by the OpenSea collection-stats endpoint.
pub struct OpenSeaSource {
    client: opensea::HttpClient,
    url: String,
    alias: String,
}

impl OpenSeaSource {
    pub fn new(url: String, alias: String) -> Self {
        Self {
            client: opensea::HttpClient::new(),
            url,
            alias,
        }
    }
}

#[async_trait]
impl PriceSource for OpenSeaSource {
    async fn latest_quote(&self) -> Option<FloorPriceQuote> {
        self.client.fetch_floor_price(&self.url, &self.alias).await
    }
}
