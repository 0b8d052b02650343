pub mod analysis;
pub mod cache;
pub mod config;
pub mod data_provider;
pub mod errors;
pub mod models;
pub mod scrapers;
pub mod services;
pub mod util;

pub use cache::{RateLimitedCache, ResponseCache};
pub use config::{AcceptancePolicy, Config};
pub use data_provider::{MarketDataClient, MarketDataSource};
pub use errors::{Result, ScreenerError};
pub use models::screening::{QualifiedCandidate, ScreeningOutcome, ScreeningSession, StockDetails};
pub use services::{ResultStore, ScreeningPipeline, SymbolUniverse};
