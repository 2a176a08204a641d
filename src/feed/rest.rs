//! Public REST spot price lookup

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Coinbase Pro public REST API
pub const COINBASE_PRO_API_URL: &str = "https://api.pro.coinbase.com";

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}

/// Fetches the last trade price of a pair without opening a feed
pub struct SpotPriceClient {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl SpotPriceClient {
    pub fn new() -> Self {
        Self::with_base_url(COINBASE_PRO_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
            client: Client::new(),
        }
    }

    /// Last trade price of `pair`
    pub async fn get_price(&self, pair: &str) -> anyhow::Result<Decimal> {
        let url = format!("{}/products/{}/ticker", self.base_url, pair);

        tracing::debug!(url = %url, "Fetching spot price");

        let response = self
            .client
            .get(&url)
            .header("User-Agent", concat!("tickbot/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Ticker request for {} failed: {}", pair, response.status());
        }

        let ticker: TickerResponse = response.json().await?;
        let price = Decimal::from_str(&ticker.price)
            .map_err(|e| anyhow::anyhow!("Invalid price {:?}: {}", ticker.price, e))?;

        Ok(price)
    }
}

impl Default for SpotPriceClient {
    fn default() -> Self {
        Self::new()
    }
}
