//! Weather data sources.
//!
//! [`QWeatherClient`] talks to the QWeather HTTP API. [`SimulatedWeather`]
//! produces deterministic data and stands in whenever the provider is not
//! configured, so the tool server always has something to answer with.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::config::WeatherConfig;

use super::errors::WeatherError;
use super::location;

/// Header carrying the QWeather API key.
const API_KEY_HEADER: &str = "X-QW-Api-Key";

/// TCP connection timeout for provider requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Records ─────────────────────────────────────────────────────────────────

/// One active weather warning, as returned by `v7/warning/now`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WarningRecord {
    pub id: Option<String>,
    pub title: Option<String>,
    pub pub_time: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub type_name: Option<String>,
    pub severity: Option<String>,
    pub severity_color: Option<String>,
    pub sender: Option<String>,
    pub status: Option<String>,
    pub text: Option<String>,
}

/// One forecast day, as returned by `v7/weather/{n}d`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyRecord {
    pub fx_date: Option<String>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub temp_max: Option<String>,
    pub temp_min: Option<String>,
    pub text_day: Option<String>,
    pub text_night: Option<String>,
    pub wind_dir_day: Option<String>,
    pub wind_scale_day: Option<String>,
    pub wind_speed_day: Option<String>,
    pub wind_dir_night: Option<String>,
    pub wind_scale_night: Option<String>,
    pub wind_speed_night: Option<String>,
    pub humidity: Option<String>,
    pub precip: Option<String>,
    pub uv_index: Option<String>,
    pub vis: Option<String>,
}

// ─── WeatherSource ───────────────────────────────────────────────────────────

/// Anything that can answer the two weather tools.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Look up a city name. `Ok(None)` means the provider knows no match.
    async fn lookup_city(&self, name: &str) -> Result<Option<String>, WeatherError>;

    /// Active warnings for a resolved location.
    async fn warnings(&self, location: &str) -> Result<Vec<WarningRecord>, WeatherError>;

    /// Daily forecast for a resolved location. `days` is one of the
    /// supported spans.
    async fn daily_forecast(
        &self,
        location: &str,
        days: u32,
    ) -> Result<Vec<DailyRecord>, WeatherError>;
}

/// Pick the live provider when configured, otherwise simulated data.
pub fn source_from_config(config: &WeatherConfig) -> Box<dyn WeatherSource> {
    if !config.is_live() {
        tracing::warn!("QWeather key or base URL not set, using simulated weather data");
        return Box::new(SimulatedWeather::new());
    }

    match QWeatherClient::new(
        config.api_key.as_deref().unwrap_or_default(),
        config.api_base.as_deref().unwrap_or_default(),
        Duration::from_secs(config.timeout_secs),
    ) {
        Ok(client) => Box::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to build QWeather client, using simulated data");
            Box::new(SimulatedWeather::new())
        }
    }
}

// ─── QWeather ────────────────────────────────────────────────────────────────

/// QWeather HTTP API client.
pub struct QWeatherClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl QWeatherClient {
    pub fn new(api_key: &str, api_base: &str, timeout: Duration) -> Result<Self, WeatherError> {
        if api_key.trim().is_empty() {
            return Err(WeatherError::Config {
                reason: "QWEATHER_API_KEY is empty".into(),
            });
        }
        let base_url = normalize_base_url(api_base)?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `endpoint` and return the body once its API `code` is "200".
    async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, WeatherError> {
        let url = format!("{}{}", self.base_url, endpoint.trim_start_matches('/'));
        tracing::info!(endpoint, ?params, "QWeather request");

        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(params)
            .send()
            .await
            .map_err(|e| WeatherError::Http {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(endpoint, status = status.as_u16(), body = %body, "QWeather HTTP error");
            return Err(WeatherError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| WeatherError::Parse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        check_api_code(endpoint, &body)?;
        Ok(body)
    }
}

#[async_trait]
impl WeatherSource for QWeatherClient {
    fn name(&self) -> &str {
        "qweather"
    }

    async fn lookup_city(&self, name: &str) -> Result<Option<String>, WeatherError> {
        let body = self
            .get("v2/city/lookup", &[("location", name), ("lang", "zh")])
            .await?;

        let first = body
            .get("location")
            .or_else(|| body.get("locations"))
            .and_then(|l| l.as_array())
            .and_then(|arr| arr.first());

        let id = first
            .and_then(|loc| loc.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string);

        if let (Some(loc), Some(id)) = (first, &id) {
            tracing::info!(
                input = name,
                id = %id,
                name = ?loc.get("name"),
                adm1 = ?loc.get("adm1"),
                "city lookup resolved"
            );
        }
        Ok(id)
    }

    async fn warnings(&self, location: &str) -> Result<Vec<WarningRecord>, WeatherError> {
        let endpoint = "v7/warning/now";
        let body = self.get(endpoint, &[("location", location), ("lang", "zh")]).await?;
        parse_records(endpoint, &body, "warning")
    }

    async fn daily_forecast(
        &self,
        location: &str,
        days: u32,
    ) -> Result<Vec<DailyRecord>, WeatherError> {
        let endpoint = format!("v7/weather/{days}d");
        let body = self.get(&endpoint, &[("location", location), ("lang", "zh")]).await?;
        parse_records(&endpoint, &body, "daily")
    }
}

/// Ensure the base URL has a scheme and exactly one trailing slash.
pub fn normalize_base_url(raw: &str) -> Result<String, WeatherError> {
    let base = raw.trim();
    if base.is_empty() {
        return Err(WeatherError::Config {
            reason: "QWEATHER_API_BASE is empty".into(),
        });
    }

    let mut base = if base.starts_with("http://") || base.starts_with("https://") {
        base.to_string()
    } else {
        format!("https://{}", base.trim_start_matches('/'))
    };
    let trimmed_len = base.trim_end_matches('/').len();
    base.truncate(trimmed_len);
    base.push('/');
    Ok(base)
}

/// QWeather signals failures in-band through a string `code` field.
fn check_api_code(endpoint: &str, body: &serde_json::Value) -> Result<(), WeatherError> {
    let code = match body.get("code") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    if code == "200" {
        Ok(())
    } else {
        Err(WeatherError::Api {
            endpoint: endpoint.to_string(),
            code,
        })
    }
}

fn parse_records<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    body: &serde_json::Value,
    field: &str,
) -> Result<Vec<T>, WeatherError> {
    match body.get(field) {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|e| WeatherError::Parse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

// ─── Simulated ───────────────────────────────────────────────────────────────

const SIMULATED_CONDITIONS: [&str; 4] = ["Sunny", "Cloudy", "Overcast", "Light rain"];

/// Deterministic stand-in for the live provider.
#[derive(Debug, Clone)]
pub struct SimulatedWeather {
    start: NaiveDate,
}

impl SimulatedWeather {
    /// Forecasts start today.
    pub fn new() -> Self {
        Self::starting(Local::now().date_naive())
    }

    /// Forecasts start on a fixed date.
    pub fn starting(start: NaiveDate) -> Self {
        Self { start }
    }
}

impl Default for SimulatedWeather {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherSource for SimulatedWeather {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn lookup_city(&self, name: &str) -> Result<Option<String>, WeatherError> {
        Ok(location::lookup_fallback(name).map(str::to_string))
    }

    async fn warnings(&self, _location: &str) -> Result<Vec<WarningRecord>, WeatherError> {
        Ok(Vec::new())
    }

    async fn daily_forecast(
        &self,
        _location: &str,
        days: u32,
    ) -> Result<Vec<DailyRecord>, WeatherError> {
        let records = (0..days.max(1))
            .map(|i| {
                let date = self
                    .start
                    .checked_add_days(Days::new(u64::from(i)))
                    .unwrap_or(self.start);
                let temp_max = 24 + (i % 8);
                let condition = SIMULATED_CONDITIONS[(i as usize) % SIMULATED_CONDITIONS.len()];
                DailyRecord {
                    fx_date: Some(date.format("%Y-%m-%d").to_string()),
                    sunrise: Some("06:00".into()),
                    sunset: Some("18:30".into()),
                    temp_max: Some(temp_max.to_string()),
                    temp_min: Some((temp_max - 8).to_string()),
                    text_day: Some(condition.into()),
                    text_night: Some(condition.into()),
                    wind_dir_day: Some("N".into()),
                    wind_scale_day: Some("1-3".into()),
                    wind_speed_day: Some(format!("{}", 5 + i % 3)),
                    wind_dir_night: Some("N".into()),
                    wind_scale_night: Some("1-3".into()),
                    wind_speed_night: Some(format!("{}", 3 + i % 3)),
                    humidity: Some(format!("{}", 60 + (i % 5) * 5)),
                    precip: Some(if condition == "Light rain" { "2.0" } else { "0.0" }.into()),
                    uv_index: Some("5".into()),
                    vis: Some("25".into()),
                }
            })
            .collect();
        Ok(records)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("api.qweather.com").unwrap(),
            "https://api.qweather.com/"
        );
        assert_eq!(
            normalize_base_url("http://localhost:9000///").unwrap(),
            "http://localhost:9000/"
        );
        assert_eq!(
            normalize_base_url(" https://abc.qweatherapi.com/ ").unwrap(),
            "https://abc.qweatherapi.com/"
        );
        assert!(normalize_base_url("  ").is_err());
    }

    #[test]
    fn test_check_api_code() {
        assert!(check_api_code("v7/warning/now", &serde_json::json!({"code": "200"})).is_ok());
        match check_api_code("v7/warning/now", &serde_json::json!({"code": "401"})) {
            Err(WeatherError::Api { code, .. }) => assert_eq!(code, "401"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_daily_record_reads_camel_case() {
        let body = serde_json::json!({
            "code": "200",
            "daily": [{"fxDate": "2026-10-17", "tempMax": "24", "tempMin": "13", "uvIndex": "4"}]
        });
        let records: Vec<DailyRecord> = parse_records("v7/weather/3d", &body, "daily").unwrap();
        assert_eq!(records[0].fx_date.as_deref(), Some("2026-10-17"));
        assert_eq!(records[0].uv_index.as_deref(), Some("4"));
        assert!(records[0].sunrise.is_none());
    }

    #[test]
    fn test_missing_list_is_empty() {
        let records: Vec<WarningRecord> =
            parse_records("v7/warning/now", &serde_json::json!({"code": "200"}), "warning")
                .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            QWeatherClient::new("", "api.qweather.com", Duration::from_secs(5)),
            Err(WeatherError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_simulated_forecast_is_deterministic() {
        let start = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let source = SimulatedWeather::starting(start);

        let days = source.daily_forecast("101010100", 7).await.unwrap();
        assert_eq!(days.len(), 7);
        assert_eq!(days[0].fx_date.as_deref(), Some("2026-10-17"));
        assert_eq!(days[6].fx_date.as_deref(), Some("2026-10-23"));
        assert_eq!(days, source.daily_forecast("101010100", 7).await.unwrap());
        assert!(source.warnings("101010100").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_lookup_uses_table() {
        let source = SimulatedWeather::starting(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(
            source.lookup_city("Beijing").await.unwrap().as_deref(),
            Some("101010100")
        );
        assert!(source.lookup_city("Atlantis").await.unwrap().is_none());
    }

    #[test]
    fn test_unconfigured_source_is_simulated() {
        let source = source_from_config(&WeatherConfig::default());
        assert_eq!(source.name(), "simulated");
    }
}
