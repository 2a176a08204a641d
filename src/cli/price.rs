//! Price command implementation

use crate::config::Config;
use crate::feed::{SpotPriceClient, COINBASE_PRO_API_URL};
use clap::Args;

#[derive(Args, Debug)]
pub struct PriceArgs {
    /// Pair to look up; the configured pair when omitted
    pub pair: Option<String>,

    /// REST API base URL
    #[arg(long, default_value = COINBASE_PRO_API_URL)]
    pub base_url: String,
}

impl PriceArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let pair = self.pair.as_deref().unwrap_or(&config.feed.pair);
        let client = SpotPriceClient::with_base_url(self.base_url.as_str());

        let price = client.get_price(pair).await?;
        println!("{} {}", pair, price);

        Ok(())
    }
}
