//! Daily search trends, used to ground trend-related questions.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const TRENDS_BASE_URL: &str = "https://trends.google.com";
const DAILY_TRENDS_PATH: &str = "/trends/api/dailytrends";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The endpoint prepends `)]}',` to defeat JSON hijacking.
const XSSI_PREFIX_LEN: usize = 5;

const JAPANESE_TREND: &str = "トレンド";
const SYNONYMS: [&str; 8] = [
    "trend",
    "trending",
    "tendency",
    "fashion",
    "movement",
    "direction",
    "current",
    "popular",
];

/// True when the text mentions trends in English (or a loose synonym) or Japanese.
pub fn contains_trend_or_synonyms(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains(JAPANESE_TREND) || SYNONYMS.iter().any(|word| lowered.contains(word))
}

#[derive(Debug)]
pub enum TrendError {
    Transport(String),
    Status(u16),
    Parse(String),
}

impl TrendError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TrendError::Transport(_) => true,
            TrendError::Status(status) => matches!(status, 408 | 429 | 500..=599),
            TrendError::Parse(_) => false,
        }
    }
}

impl std::fmt::Display for TrendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendError::Transport(e) => write!(f, "trends HTTP error: {e}"),
            TrendError::Status(status) => write!(f, "trends HTTP error! Status: {status}"),
            TrendError::Parse(e) => write!(f, "failed to parse trends: {e}"),
        }
    }
}

impl std::error::Error for TrendError {}

#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn today_trends(&self) -> Result<Vec<String>, TrendError>;
}

#[derive(Deserialize)]
struct DailyTrends {
    #[serde(rename = "default")]
    body: TrendsBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrendsBody {
    trending_searches_days: Vec<TrendingDay>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrendingDay {
    trending_searches: Vec<TrendingSearch>,
}

#[derive(Deserialize)]
struct TrendingSearch {
    title: TrendTitle,
}

#[derive(Deserialize)]
struct TrendTitle {
    query: String,
}

/// Extract the first day's search queries from a raw daily-trends body.
pub fn parse_daily_trends(body: &str) -> Result<Vec<String>, TrendError> {
    let json = body
        .get(XSSI_PREFIX_LEN..)
        .ok_or_else(|| TrendError::Parse(format!("body too short ({} bytes)", body.len())))?;

    let parsed: DailyTrends =
        serde_json::from_str(json).map_err(|e| TrendError::Parse(e.to_string()))?;

    let today = parsed
        .body
        .trending_searches_days
        .into_iter()
        .next()
        .ok_or_else(|| TrendError::Parse("no trending days".to_string()))?;

    Ok(today.trending_searches.into_iter().map(|s| s.title.query).collect())
}

/// Daily trends for one region.
pub struct GoogleTrends {
    http: reqwest::Client,
    base_url: String,
    language: String,
    tz_offset_minutes: i32,
    region: String,
}

impl GoogleTrends {
    /// Japanese trends for Japan (`hl=ja`, `tz=-540`, `geo=JP`).
    pub fn japan() -> Result<Self, TrendError> {
        Self::with_base_url(TRENDS_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, TrendError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TrendError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            language: "ja".to_string(),
            tz_offset_minutes: -540,
            region: "JP".to_string(),
        })
    }
}

#[async_trait]
impl TrendSource for GoogleTrends {
    async fn today_trends(&self) -> Result<Vec<String>, TrendError> {
        let url = format!("{}{}", self.base_url, DAILY_TRENDS_PATH);
        let tz = self.tz_offset_minutes.to_string();

        let response = self
            .http
            .get(&url)
            .query(&[("hl", self.language.as_str()), ("tz", tz.as_str()), ("geo", self.region.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TrendError::Transport(e.to_string()))?;

        let status = response.status();
        debug!("Trends response status: {status}");
        if !status.is_success() {
            return Err(TrendError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TrendError::Transport(e.to_string()))?;

        let trends = parse_daily_trends(&body)?;
        info!("📈 Fetched {} trend(s) for {}", trends.len(), self.region);
        Ok(trends)
    }
}
