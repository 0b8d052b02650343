use crate::data_provider::MarketDataSource;
use crate::errors::Result;
use crate::scrapers::base::{owned, SymbolSource};
use async_trait::async_trait;
use log::info;
use std::sync::Arc;

/// The provider caps movers at 50 per request.
const MAX_MOVERS: usize = 50;

const FALLBACK: &[&str] = &[
    "AAPL", "MSFT", "AMZN", "GOOGL", "META", "TSLA", "NVDA", "AMD", "INTC", "ADBE", "CSCO", "PYPL", "NFLX", "PEP", "KO",
    "DIS", "CMCSA", "T", "VZ", "WMT", "HD", "MCD", "SBUX", "NKE", "PG", "JNJ", "PFE", "UNH", "V", "MA",
];

/// Today's top gainers from the market data provider.
pub struct MarketMoversSource {
    provider: Arc<dyn MarketDataSource>,
}

impl MarketMoversSource {
    pub fn new(provider: Arc<dyn MarketDataSource>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl SymbolSource for MarketMoversSource {
    fn name(&self) -> &str {
        "market movers"
    }

    async fn fetch_symbols(&self, max: usize) -> Result<Vec<String>> {
        let symbols = self.provider.fetch_market_movers(max.clamp(1, MAX_MOVERS)).await?;
        info!("Got {} market movers", symbols.len());
        Ok(symbols)
    }

    fn fallback_symbols(&self) -> Vec<String> {
        owned(FALLBACK)
    }
}
