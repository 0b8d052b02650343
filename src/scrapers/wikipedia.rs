use crate::errors::{Result, ScreenerError};
use crate::scrapers::base::{owned, SymbolSource};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

const SP500_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";
const NASDAQ100_URL: &str = "https://en.wikipedia.org/wiki/Nasdaq-100";

const SP500_FALLBACK: &[&str] = &[
    "AAPL", "MSFT", "AMZN", "NVDA", "GOOGL", "META", "LLY", "AVGO", "JPM", "TSLA", "UNH", "XOM", "V", "PG", "JNJ",
    "MA", "HD", "COST", "ABBV", "MRK", "CVX", "CRM", "KO", "WMT", "BAC", "ADBE", "NFLX", "TMO", "ORCL", "ACN",
];

const NASDAQ100_FALLBACK: &[&str] = &[
    "AAPL", "MSFT", "NVDA", "AMZN", "META", "AVGO", "GOOGL", "TSLA", "COST", "NFLX", "AMD", "ADBE", "CSCO", "TMUS",
    "INTC", "QCOM", "TXN", "AMGN", "ISRG", "HON", "AMAT", "BKNG", "SBUX", "GILD", "ADI", "VRTX", "REGN", "LRCX",
];

/// Constituents of an index, scraped from its Wikipedia page.
pub struct WikipediaIndex {
    name: &'static str,
    url: String,
    columns: &'static [&'static str],
    fallback: &'static [&'static str],
    client: Client,
}

impl WikipediaIndex {
    pub fn sp500(timeout: Duration) -> Result<Self> {
        Self::new("S&P 500", SP500_URL, &["Symbol"], SP500_FALLBACK, timeout)
    }

    pub fn nasdaq100(timeout: Duration) -> Result<Self> {
        Self::new("Nasdaq-100", NASDAQ100_URL, &["Ticker", "Symbol"], NASDAQ100_FALLBACK, timeout)
    }

    fn new(
        name: &'static str,
        url: &str,
        columns: &'static [&'static str],
        fallback: &'static [&'static str],
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("growth_screener/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            name,
            url: url.to_string(),
            columns,
            fallback,
            client,
        })
    }
}

#[async_trait]
impl SymbolSource for WikipediaIndex {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch_symbols(&self, _max: usize) -> Result<Vec<String>> {
        let html = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let symbols = parse_constituents(&html, self.columns)?;
        info!("Parsed {} {} constituents", symbols.len(), self.name);
        Ok(symbols)
    }

    fn fallback_symbols(&self) -> Vec<String> {
        owned(self.fallback)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScreenerError::HtmlError(format!("{:?}", e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Ticker column of `table#constituents`. The column is located by header
/// text, matching any of `columns`; class-share dots become dashes.
pub fn parse_constituents(html: &str, columns: &[&str]) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let table_selector = selector("table#constituents")?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("th, td")?;
    let data_selector = selector("td")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| ScreenerError::HtmlError("constituents table not found".to_string()))?;

    let mut column = None;
    let mut symbols = Vec::new();

    for row in table.select(&row_selector) {
        let cells: Vec<String> = row.select(&cell_selector).map(cell_text).collect();

        let Some(index) = column else {
            if row.select(&data_selector).next().is_none() {
                column = cells
                    .iter()
                    .position(|h| columns.iter().any(|c| h.eq_ignore_ascii_case(c)));
            }
            continue;
        };

        if let Some(symbol) = cells.get(index).filter(|s| !s.is_empty()) {
            symbols.push(symbol.replace('.', "-").to_uppercase());
        }
    }

    if column.is_none() {
        return Err(ScreenerError::HtmlError(format!("no {:?} column in constituents table", columns)));
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SP500_PAGE: &str = r#"
        <html><body>
        <table class="wikitable" id="other"><tr><th>Symbol</th></tr><tr><td>NOPE</td></tr></table>
        <table class="wikitable sortable" id="constituents">
          <tbody>
            <tr><th>Symbol</th><th>Security</th><th>GICS Sector</th></tr>
            <tr><td><a href="/x">MMM</a></td><td>3M</td><td>Industrials</td></tr>
            <tr><td><a href="/x">BRK.B</a></td><td>Berkshire Hathaway</td><td>Financials</td></tr>
            <tr><td>AAPL</td><td>Apple Inc.</td><td>Information Technology</td></tr>
          </tbody>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_sp500_table() {
        let symbols = parse_constituents(SP500_PAGE, &["Symbol"]).unwrap();
        assert_eq!(symbols, vec!["MMM", "BRK-B", "AAPL"]);
    }

    #[test]
    fn test_ticker_column_found_by_header() {
        let page = r#"
            <table id="constituents">
              <tr><th>Company</th><th>Ticker</th></tr>
              <tr><td>Adobe Inc.</td><td>ADBE</td></tr>
              <tr><td>Airbnb</td><td>abnb</td></tr>
            </table>
        "#;
        let symbols = parse_constituents(page, &["Ticker", "Symbol"]).unwrap();
        assert_eq!(symbols, vec!["ADBE", "ABNB"]);
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let err = parse_constituents("<html><p>moved</p></html>", &["Symbol"]).unwrap_err();
        assert!(matches!(err, ScreenerError::HtmlError(_)));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let page = r#"<table id="constituents"><tr><th>Name</th></tr><tr><td>x</td></tr></table>"#;
        assert!(parse_constituents(page, &["Symbol"]).is_err());
    }
}
