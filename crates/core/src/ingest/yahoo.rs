use crate::config::Settings;
use crate::domain::market::{Lookback, PriceSeries};
use crate::ingest::provider::{MarketDataProvider, RetryPolicy};
use crate::ingest::types::{ChartResponse, QuoteResponse, RawFundamentals};
use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) lens/0.1";

#[derive(Debug, Clone)]
pub struct YahooMarketData {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl YahooMarketData {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .market_data_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(&base_url, RetryPolicy::from_env(), Duration::from_secs(timeout_secs))
    }

    pub fn new(base_url: &str, retry: RetryPolicy, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid market data base url: {base_url}"))?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "market data base url cannot be a base: {base_url}"
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn chart_url(&self, symbol: &str) -> Url {
        self.endpoint(&["v8", "finance", "chart", symbol])
    }

    fn quote_url(&self) -> Url {
        self.endpoint(&["v7", "finance", "quote"])
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
        symbol: &str,
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let res = match self.http.get(url.clone()).query(query).send().await {
                Ok(r) => r,
                Err(err) => {
                    if !self.retry.should_retry(attempt) {
                        return Err(err).context("market data request failed");
                    }
                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        %symbol,
                        error = %err,
                        "market data request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = res.status();
            let text = res
                .text()
                .await
                .context("failed to read market data response")?;

            if !status.is_success() {
                let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                if retryable && self.retry.should_retry(attempt) {
                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        %symbol,
                        http_status = %status,
                        "market data HTTP error; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                anyhow::bail!("market data HTTP {status} for {symbol}: {text}");
            }

            return serde_json::from_str::<T>(&text)
                .with_context(|| format!("failed to parse market data response for {symbol}"));
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooMarketData {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn fetch_price_series(&self, symbol: &str, lookback: Lookback) -> Result<PriceSeries> {
        let body: ChartResponse = self
            .get_json(
                self.chart_url(symbol),
                &[("range", lookback.as_range()), ("interval", "1d")],
                symbol,
            )
            .await?;

        if let Some(err) = body.chart.error {
            anyhow::bail!("chart error for {symbol}: {} ({})", err.code, err.description);
        }

        let result = body
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .with_context(|| format!("empty chart result for {symbol}"))?;
        result.into_series()
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<RawFundamentals> {
        let body: QuoteResponse = self
            .get_json(self.quote_url(), &[("symbols", symbol)], symbol)
            .await?;

        if let Some(err) = body.quote_response.error.filter(|e| !e.is_null()) {
            anyhow::bail!("quote error for {symbol}: {err}");
        }

        body.quote_response
            .result
            .into_iter()
            .next()
            .with_context(|| format!("no quote returned for {symbol}"))
    }
}
