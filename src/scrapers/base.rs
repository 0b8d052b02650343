use crate::errors::Result;
use async_trait::async_trait;

/// One source of candidate symbols for the screening universe.
#[async_trait]
pub trait SymbolSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Fetch up to roughly `max` symbols, in the source's own priority order.
    async fn fetch_symbols(&self, max: usize) -> Result<Vec<String>>;

    /// Static list used when `fetch_symbols` fails or comes back empty.
    fn fallback_symbols(&self) -> Vec<String>;
}

/// Caller-supplied fixed list, for custom universes.
pub struct StaticSymbols {
    name: String,
    symbols: Vec<String>,
}

impl StaticSymbols {
    pub fn new(name: &str, symbols: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            symbols,
        }
    }
}

#[async_trait]
impl SymbolSource for StaticSymbols {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_symbols(&self, _max: usize) -> Result<Vec<String>> {
        Ok(self.symbols.clone())
    }

    fn fallback_symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }
}

pub(crate) fn owned(symbols: &[&str]) -> Vec<String> {
    symbols.iter().map(|s| s.to_string()).collect()
}
