use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    ArrowError(String),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    #[error("Excel parsing error: {0}")]
    ExcelError(#[from] calamine::Error),

    #[error("HTML parsing error: {0}")]
    HtmlError(String),

    /// Provider credits exhausted; no further upstream calls until the cooldown ends.
    #[error("Rate limited by market data provider")]
    RateLimited,

    #[error("Missing market data API key (set TWELVEDATA_API_KEY)")]
    MissingApiKey,

    /// Endpoint exists but is not part of the current subscription (HTTP/JSON 401 or 403).
    #[error("Endpoint unavailable ({code}): {message}")]
    Unavailable { code: u16, message: String },

    #[error("Provider error ({code}): {message}")]
    ProviderError { code: u16, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, ScreenerError>;

impl From<arrow::error::ArrowError> for ScreenerError {
    fn from(e: arrow::error::ArrowError) -> Self {
        ScreenerError::ArrowError(e.to_string())
    }
}

impl From<String> for ScreenerError {
    fn from(s: String) -> Self {
        ScreenerError::Unknown(s)
    }
}

impl From<&str> for ScreenerError {
    fn from(s: &str) -> Self {
        ScreenerError::Unknown(s.to_string())
    }
}
