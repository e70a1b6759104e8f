//! Financial Modeling Prep feeds for quotes and macro releases.

use super::{number, send_json, MacroFeed, MarketFeed};
use crate::error::FeedError;
use crate::models::{MacroEvent, MacroEventKind, MacroStream, MarketIndexPoint, MarketSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info};

const FMP_BASE_URL: &str = "https://financialmodelingprep.com";
const PROVIDER: &str = "FMP";
const CALENDAR_LIMIT: usize = 25;

/// Thin authenticated client shared by the FMP-backed feeds.
#[derive(Clone)]
pub struct FmpClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl FmpClient {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: FMP_BASE_URL.to_string(),
        }
    }

    /// GET `path` with the API key appended.
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, FeedError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(FeedError::MissingCredential("FMP_API_KEY"))?;

        let url = format!("{}{}", self.base_url, path);
        let request = self
            .http
            .get(&url)
            .query(query)
            .query(&[("apikey", api_key)]);

        send_json(request, PROVIDER, &url).await
    }
}

/// Index and sector ETF quotes.
pub struct FmpMarketFeed {
    client: FmpClient,
    index_symbols: Vec<String>,
    sector_symbols: Vec<String>,
}

impl FmpMarketFeed {
    pub fn new(client: FmpClient, index_symbols: Vec<String>, sector_symbols: Vec<String>) -> Self {
        Self {
            client,
            index_symbols,
            sector_symbols,
        }
    }

    /// One request per symbol, issued concurrently.
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<MarketIndexPoint>, FeedError> {
        try_join_all(symbols.iter().map(|symbol| self.quote(symbol))).await
    }

    async fn quote(&self, symbol: &str) -> Result<MarketIndexPoint, FeedError> {
        let data = self.client.get("/stable/quote", &[("symbol", symbol)]).await?;
        parse_quote(symbol, &data)
    }
}

fn parse_quote(symbol: &str, data: &Value) -> Result<MarketIndexPoint, FeedError> {
    let quote = data
        .as_array()
        .and_then(|rows| rows.first())
        .ok_or_else(|| FeedError::Malformed {
            provider: PROVIDER,
            detail: format!("no quote returned for {}", symbol),
        })?;

    let change_pct = number(quote, "changePercentage").ok_or_else(|| FeedError::Malformed {
        provider: PROVIDER,
        detail: format!("quote for {} has no changePercentage", symbol),
    })?;

    let price = number(quote, "price").filter(|p| *p > 0.0);

    Ok(MarketIndexPoint::new(symbol, change_pct, price))
}

#[async_trait]
impl MarketFeed for FmpMarketFeed {
    async fn snapshot(&self) -> Result<MarketSnapshot, FeedError> {
        let (indices, sectors) = tokio::try_join!(
            self.quotes(&self.index_symbols),
            self.quotes(&self.sector_symbols)
        )?;

        debug!("FMP snapshot: {} indices, {} sectors", indices.len(), sectors.len());

        Ok(MarketSnapshot {
            indices,
            sectors,
            timestamp: Utc::now(),
        })
    }
}

/// CPI, payrolls, Fed funds and the economic calendar.
pub struct FmpMacroFeed {
    client: FmpClient,
}

impl FmpMacroFeed {
    pub fn new(client: FmpClient) -> Self {
        Self { client }
    }

    async fn latest_release(
        &self,
        name: &str,
        kind: MacroEventKind,
    ) -> Result<Option<MacroEvent>, FeedError> {
        let data = self.client.get("/api/v4/economic", &[("name", name)]).await?;
        Ok(parse_latest_release(&data, kind))
    }

    async fn calendar(&self) -> Result<Vec<MacroEvent>, FeedError> {
        let data = self.client.get("/api/v4/economic_calendar", &[]).await?;
        Ok(parse_calendar(&data))
    }
}

fn row_to_event(row: &Value, kind: MacroEventKind) -> MacroEvent {
    let date = row
        .get("date")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    MacroEvent::release(
        kind,
        date,
        number(row, "actual"),
        number(row, "estimate"),
        number(row, "previous"),
    )
}

fn parse_latest_release(data: &Value, kind: MacroEventKind) -> Option<MacroEvent> {
    let row = data.as_array()?.first()?;
    Some(row_to_event(row, kind))
}

fn parse_calendar(data: &Value) -> Vec<MacroEvent> {
    let Some(rows) = data.as_array() else {
        debug!("FMP calendar payload was not an array");
        return Vec::new();
    };

    rows.iter()
        .take(CALENDAR_LIMIT)
        .map(|row| {
            let event = row_to_event(row, MacroEventKind::Other);
            match row.get("event").and_then(|v| v.as_str()) {
                Some(name) => event.with_notes(name),
                None => event,
            }
        })
        .collect()
}

/// Typed releases first, then the calendar.
pub fn build_stream(
    cpi: Option<MacroEvent>,
    jobs: Option<MacroEvent>,
    fed: Option<MacroEvent>,
    calendar: Vec<MacroEvent>,
) -> MacroStream {
    let events = [&cpi, &jobs, &fed]
        .into_iter()
        .flatten()
        .cloned()
        .chain(calendar)
        .collect();

    MacroStream {
        events,
        latest_cpi: cpi,
        latest_jobs: jobs,
        latest_fed: fed,
    }
}

#[async_trait]
impl MacroFeed for FmpMacroFeed {
    async fn stream(&self) -> Result<MacroStream, FeedError> {
        let (cpi, jobs, fed, calendar) = tokio::try_join!(
            self.latest_release("cpi", MacroEventKind::Cpi),
            self.latest_release("nonfarm_payroll", MacroEventKind::Jobs),
            self.latest_release("fed_interest_rate", MacroEventKind::Fed),
            self.calendar()
        )?;

        let stream = build_stream(cpi, jobs, fed, calendar);
        info!("Loaded {} macro events", stream.events.len());
        Ok(stream)
    }
}
