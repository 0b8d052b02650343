pub mod technical;
pub mod fundamental;

pub use technical::TechnicalAnalyzer;
pub use fundamental::FundamentalAnalyzer;
