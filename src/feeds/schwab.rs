//! Schwab market data: OAuth refresh-token auth and a quotes-backed market feed.
//!
//! The access token lives in a [`TokenCache`] owned by each [`SchwabAuth`]
//! instance; there is no process-wide token state.

use super::{number, send_json, MarketFeed};
use crate::error::FeedError;
use crate::models::{MarketIndexPoint, MarketSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const TOKEN_URL: &str = "https://api.schwabapi.com/v1/oauth/token";
const QUOTES_URL: &str = "https://api.schwabapi.com/marketdata/v1/quotes";
const PROVIDER: &str = "Schwab";

/// Tokens closer than this to expiry are refreshed early.
const EXPIRY_BUFFER_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Access token plus expiry.
#[derive(Debug, Default)]
pub struct TokenCache {
    current: Option<CachedToken>,
}

impl TokenCache {
    /// The cached token if it stays valid past the safety buffer.
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|t| {
                TimeDelta::try_seconds(EXPIRY_BUFFER_SECS)
                    .and_then(|buffer| now.checked_add_signed(buffer))
                    .is_some_and(|cutoff| t.expires_at > cutoff)
            })
            .map(|t| t.token.as_str())
    }

    /// Caches `token`; an expiry that does not fit a timestamp is rejected.
    pub fn store(
        &mut self,
        token: String,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<(), FeedError> {
        let expires_at = TimeDelta::try_seconds(expires_in_secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| FeedError::Malformed {
                provider: PROVIDER,
                detail: format!("token expires_in out of range: {}", expires_in_secs),
            })?;
        self.current = Some(CachedToken { token, expires_at });
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Accepts both `{ "token": {...} }` and a bare token object.
fn parse_token_response(data: Value) -> Result<TokenResponse, FeedError> {
    let inner = match data {
        Value::Object(mut map) if map.get("token").is_some_and(Value::is_object) => {
            map.remove("token").unwrap_or_default()
        }
        other => other,
    };

    let token: TokenResponse = serde_json::from_value(inner).map_err(|e| FeedError::Malformed {
        provider: PROVIDER,
        detail: format!("token response: {}", e),
    })?;

    if token.expires_in < 0 {
        return Err(FeedError::Malformed {
            provider: PROVIDER,
            detail: format!("negative token expires_in: {}", token.expires_in),
        });
    }
    Ok(token)
}

/// Refresh-token authenticator.
pub struct SchwabAuth {
    http: reqwest::Client,
    app_key: Option<String>,
    app_secret: Option<String>,
    refresh_token: Option<String>,
    cache: Mutex<TokenCache>,
}

impl SchwabAuth {
    pub fn new(
        http: reqwest::Client,
        app_key: Option<String>,
        app_secret: Option<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            http,
            app_key,
            app_secret,
            refresh_token,
            cache: Mutex::new(TokenCache::default()),
        }
    }

    /// A valid access token, refreshing it when needed.
    pub async fn access_token(&self) -> Result<String, FeedError> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.valid_token(Utc::now()) {
            return Ok(token.to_string());
        }

        let app_key = self
            .app_key
            .as_deref()
            .ok_or(FeedError::MissingCredential("SCHWAB_APP_KEY"))?;
        let app_secret = self
            .app_secret
            .as_deref()
            .ok_or(FeedError::MissingCredential("SCHWAB_APP_SECRET"))?;
        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or(FeedError::MissingCredential("SCHWAB_REFRESH_TOKEN"))?;

        let request = self
            .http
            .post(TOKEN_URL)
            .basic_auth(app_key, Some(app_secret))
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)]);

        let data = send_json(request, PROVIDER, TOKEN_URL).await?;
        let token = parse_token_response(data)?;

        info!("Refreshed Schwab access token, expires in {}s", token.expires_in);
        cache.store(token.access_token.clone(), token.expires_in, Utc::now())?;

        Ok(token.access_token)
    }
}

/// Index and sector quotes from the Schwab quotes endpoint.
pub struct SchwabMarketFeed {
    http: reqwest::Client,
    auth: Arc<SchwabAuth>,
    index_symbols: Vec<String>,
    sector_symbols: Vec<String>,
}

impl SchwabMarketFeed {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<SchwabAuth>,
        index_symbols: Vec<String>,
        sector_symbols: Vec<String>,
    ) -> Self {
        Self {
            http,
            auth,
            index_symbols,
            sector_symbols,
        }
    }
}

fn point_from_quotes(data: &Value, symbol: &str) -> Result<MarketIndexPoint, FeedError> {
    let key = symbol.to_uppercase();
    let quote = data
        .get(&key)
        .and_then(|entry| entry.get("quote"))
        .ok_or_else(|| FeedError::Malformed {
            provider: PROVIDER,
            detail: format!("no quote returned for {}", key),
        })?;

    let change_pct = number(quote, "netPercentChange").ok_or_else(|| FeedError::Malformed {
        provider: PROVIDER,
        detail: format!("quote for {} has no netPercentChange", key),
    })?;

    Ok(MarketIndexPoint::new(key, change_pct, number(quote, "lastPrice")))
}

#[async_trait]
impl MarketFeed for SchwabMarketFeed {
    async fn snapshot(&self) -> Result<MarketSnapshot, FeedError> {
        let token = self.auth.access_token().await?;

        let symbols = self
            .index_symbols
            .iter()
            .chain(&self.sector_symbols)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let request = self
            .http
            .get(QUOTES_URL)
            .bearer_auth(token)
            .query(&[("symbols", symbols.as_str()), ("fields", "quote")]);
        let data = send_json(request, PROVIDER, QUOTES_URL).await?;

        let indices = self
            .index_symbols
            .iter()
            .map(|s| point_from_quotes(&data, s))
            .collect::<Result<Vec<_>, _>>()?;
        let sectors = self
            .sector_symbols
            .iter()
            .map(|s| point_from_quotes(&data, s))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Schwab snapshot: {} indices, {} sectors", indices.len(), sectors.len());

        Ok(MarketSnapshot {
            indices,
            sectors,
            timestamp: Utc::now(),
        })
    }
}
