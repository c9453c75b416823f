//! HTTP-backed upstream sources
//!
//! TVL endpoint: `GET <tvl_url>` → `{ "markets": [MarketTvl, ...] }`.
//!
//! Points endpoint: `GET <points_url>` → `{ "programs": [{ "name", "cumulativePoints",
//! "participantCount" }, ...] }`; numeric fields arrive as strings or numbers.

use crate::error::SourceError;
use crate::sources::{PointsReport, PointsSource, TvlSource};
use async_trait::async_trait;
use pointscope_core::TvlReport;
use std::time::Duration;

/// Shared client setup for upstream sources
pub fn build_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(SourceError::from)
}

async fn get_json(client: &reqwest::Client, url: &str) -> Result<serde_json::Value, SourceError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::from_status(status.as_u16(), &body));
    }
    Ok(response.json().await?)
}

pub struct HttpTvlSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTvlSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

/// Parse a TVL response body; an empty market list counts as a shape change
pub fn parse_tvl_response(data: serde_json::Value) -> Result<TvlReport, SourceError> {
    let report: TvlReport = serde_json::from_value(data)
        .map_err(|e| SourceError::ShapeChanged(format!("tvl response: {e}")))?;
    if report.markets.is_empty() {
        return Err(SourceError::ShapeChanged("no markets in tvl response".into()));
    }
    Ok(report)
}

#[async_trait]
impl TvlSource for HttpTvlSource {
    async fn fetch_tvl(&self) -> Result<TvlReport, SourceError> {
        tracing::debug!(url = %self.url, "Fetching TVL");
        let report = parse_tvl_response(get_json(&self.client, &self.url).await?)?;
        tracing::debug!(markets = report.markets.len(), "TVL fetched");
        Ok(report)
    }

    fn name(&self) -> &str {
        "tvl"
    }
}

pub struct HttpPointsSource {
    client: reqwest::Client,
    url: String,
    program: String,
    warmup_url: Option<String>,
}

impl HttpPointsSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            program: program.into(),
            warmup_url: None,
        }
    }

    pub fn with_warmup_url(mut self, url: impl Into<String>) -> Self {
        self.warmup_url = Some(url.into());
        self
    }
}

fn lenient_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_str()
        .and_then(|s| s.trim().replace(',', "").parse::<f64>().ok())
        .or_else(|| v.as_f64())
}

/// Pick the named program out of a points response
pub fn parse_points_response(
    data: &serde_json::Value,
    program: &str,
) -> Result<PointsReport, SourceError> {
    let programs = data
        .get("programs")
        .and_then(|p| p.as_array())
        .ok_or_else(|| SourceError::ShapeChanged("no programs in points response".into()))?;

    let entry = programs
        .iter()
        .find(|p| p.get("name").and_then(|n| n.as_str()) == Some(program))
        .ok_or_else(|| SourceError::ShapeChanged(format!("program '{program}' not found")))?;

    let cumulative_points = entry
        .get("cumulativePoints")
        .and_then(lenient_f64)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| SourceError::ShapeChanged("cumulativePoints missing or invalid".into()))?;

    let participant_count = entry
        .get("participantCount")
        .and_then(lenient_f64)
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
        .ok_or_else(|| SourceError::ShapeChanged("participantCount missing or invalid".into()))?;

    Ok(PointsReport {
        program: program.to_string(),
        cumulative_points,
        participant_count: participant_count as u64,
    })
}

#[async_trait]
impl PointsSource for HttpPointsSource {
    async fn warmup(&self) -> Result<(), SourceError> {
        let Some(url) = &self.warmup_url else {
            return Ok(());
        };
        tracing::debug!(%url, "Warming up points source");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::from_status(status.as_u16(), &body));
        }
        Ok(())
    }

    async fn fetch_points(&self) -> Result<PointsReport, SourceError> {
        tracing::debug!(url = %self.url, program = %self.program, "Fetching points");
        let data = get_json(&self.client, &self.url).await?;
        let report = parse_points_response(&data, &self.program)?;
        tracing::info!(
            program = %report.program,
            cumulative_points = report.cumulative_points,
            participants = report.participant_count,
            "Points fetched"
        );
        Ok(report)
    }

    fn program(&self) -> &str {
        &self.program
    }
}
