use crate::config::Config;
use crate::data_provider::MarketDataSource;
use crate::errors::Result;
use crate::scrapers::{MarketMoversSource, SmallCapHoldings, StaticSymbols, SymbolSource, WikipediaIndex};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Plain common-stock tickers only: letters, and no warrant, rights, unit or
/// preferred suffix. Class shares (`BRK-B`) and dotted tickers are rejected.
pub fn is_regular_stock(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.chars().all(|c| c.is_ascii_alphabetic())
        && !symbol.ends_with(['W', 'R', 'U', 'P'])
}

/// Assembles the screening universe from an ordered chain of symbol sources.
pub struct SymbolUniverse {
    sources: Vec<Arc<dyn SymbolSource>>,
}

impl SymbolUniverse {
    pub fn new(sources: Vec<Arc<dyn SymbolSource>>) -> Self {
        Self { sources }
    }

    /// Market movers, S&P 500, Nasdaq-100, then S&P 600 small caps.
    pub fn standard(provider: Arc<dyn MarketDataSource>, config: &Config) -> Result<Self> {
        let timeout = config.request_timeout;
        Ok(Self::new(vec![
            Arc::new(MarketMoversSource::new(provider)),
            Arc::new(WikipediaIndex::sp500(timeout)?),
            Arc::new(WikipediaIndex::nasdaq100(timeout)?),
            Arc::new(SmallCapHoldings::new(timeout)?),
        ]))
    }

    pub fn custom(symbols: Vec<String>) -> Self {
        Self::new(vec![Arc::new(StaticSymbols::new("custom", symbols))])
    }

    /// Unique symbols in source priority order, at most `max_size`. A failing
    /// source contributes its fallback list instead; nothing here errors.
    pub async fn build_universe(&self, max_size: usize) -> Vec<String> {
        let mut universe = Vec::new();
        let mut seen = HashSet::new();

        for source in &self.sources {
            if universe.len() >= max_size {
                break;
            }

            let symbols = match source.fetch_symbols(max_size).await {
                Ok(symbols) if !symbols.is_empty() => symbols,
                Ok(_) => {
                    warn!("{} returned no symbols, using fallback list", source.name());
                    source.fallback_symbols()
                }
                Err(e) => {
                    warn!("{} unavailable ({}), using fallback list", source.name(), e);
                    source.fallback_symbols()
                }
            };

            let before = universe.len();
            for symbol in symbols {
                let symbol = symbol.trim().to_uppercase();
                if !is_regular_stock(&symbol) || !seen.insert(symbol.clone()) {
                    continue;
                }
                universe.push(symbol);
                if universe.len() >= max_size {
                    break;
                }
            }
            info!("{}: added {} symbols", source.name(), universe.len() - before);
        }

        info!("Universe built with {} symbols", universe.len());
        universe
    }
}
