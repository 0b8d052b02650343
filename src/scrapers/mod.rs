pub mod base;
pub mod movers;
pub mod spdr;
pub mod wikipedia;

pub use base::{StaticSymbols, SymbolSource};
pub use movers::MarketMoversSource;
pub use spdr::SmallCapHoldings;
pub use wikipedia::WikipediaIndex;
