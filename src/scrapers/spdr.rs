use crate::errors::{Result, ScreenerError};
use crate::scrapers::base::{owned, SymbolSource};
use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Reader};
use log::info;
use reqwest::Client;
use std::io::Cursor;
use std::time::Duration;

const SPSM_HOLDINGS_URL: &str =
    "https://www.ssga.com/us/en/intermediary/library-content/products/fund-data/etfs/us/holdings-daily-us-en-spsm.xlsx";

const SMALL_CAP_FALLBACK: &[&str] = &[
    "SPSC", "AEIS", "ABG", "BMI", "CRVL", "FSS", "ITGR", "JXN", "MTH", "NSIT", "ALRM", "AVAV", "CALM", "CVCO", "DIOD",
];

/// S&P 600 small caps, read from the SPDR Portfolio S&P 600 ETF daily holdings sheet.
pub struct SmallCapHoldings {
    url: String,
    client: Client,
}

impl SmallCapHoldings {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: SPSM_HOLDINGS_URL.to_string(),
            client,
        })
    }
}

#[async_trait]
impl SymbolSource for SmallCapHoldings {
    fn name(&self) -> &str {
        "S&P 600 holdings"
    }

    async fn fetch_symbols(&self, _max: usize) -> Result<Vec<String>> {
        let bytes = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ScreenerError::DataError("holdings workbook has no sheets".to_string()))??;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        let tickers = tickers_from_rows(&rows);
        info!("Read {} small-cap holdings", tickers.len());
        Ok(tickers)
    }

    fn fallback_symbols(&self) -> Vec<String> {
        owned(SMALL_CAP_FALLBACK)
    }
}

/// The sheet starts with a few lines of fund metadata; holdings begin below the
/// row that has a `Ticker` cell and end at the first blank ticker.
pub fn tickers_from_rows(rows: &[Vec<String>]) -> Vec<String> {
    let mut column = None;
    let mut tickers = Vec::new();

    for row in rows {
        let Some(index) = column else {
            column = row.iter().position(|cell| cell.trim().eq_ignore_ascii_case("ticker"));
            continue;
        };

        match row.get(index).map(|cell| cell.trim()) {
            Some(ticker) if !ticker.is_empty() => tickers.push(ticker.to_uppercase()),
            _ => break,
        }
    }

    tickers
}
