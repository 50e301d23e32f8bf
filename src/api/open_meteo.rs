use chrono::{DateTime, Utc};
use polars::prelude::*;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{read_body, send_with_retry, status_error, FetchError, RetryPolicy};
use crate::models::{parse_timestamp, timestamp_series};

const API: &str = "Open-Meteo";

/// Hourly variables Open-Meteo is known to accept
pub const VALID_VARIABLES: &[&str] = &[
    "temperature_2m",
    "relative_humidity_2m",
    "wind_speed_10m",
    "wind_direction_10m",
    "shortwave_radiation",
    "direct_radiation",
    "diffuse_radiation",
    "cloudcover",
    "pressure_msl",
    "surface_pressure",
    "precipitation",
    "weathercode",
];

/// Used when none of the requested variables are valid
pub const FALLBACK_VARIABLES: &[&str] = &["temperature_2m", "relative_humidity_2m"];

/// Forecast response; `error`/`reason` are set on rejected requests
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    hourly: Option<Map<String, Value>>,
}

/// Location and window for one hourly request
#[derive(Debug, Clone)]
pub struct WeatherQuery<'a> {
    pub lat: f64,
    pub lon: f64,
    pub variables: &'a [String],
    pub past_days: u32,
    pub forecast_days: u32,
}

impl WeatherQuery<'_> {
    fn params(&self, variables: &[String]) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", format!("{:.4}", self.lat)),
            ("longitude", format!("{:.4}", self.lon)),
            ("hourly", variables.join(",")),
            ("past_days", self.past_days.to_string()),
            ("forecast_days", self.forecast_days.to_string()),
            ("timezone", "auto".to_string()),
            // epoch seconds stay UTC across DST changes
            ("timeformat", "unixtime".to_string()),
        ]
    }
}

/// Drop names Open-Meteo does not know; fall back to temperature + humidity if none remain.
pub fn clean_variables(requested: &[String]) -> Vec<String> {
    let (valid, dropped): (Vec<&String>, Vec<&String>) = requested
        .iter()
        .partition(|v| VALID_VARIABLES.contains(&v.as_str()));

    if !dropped.is_empty() {
        debug!("Ignoring unknown weather variables: {:?}", dropped);
    }

    if valid.is_empty() {
        warn!("No valid weather variables in {:?}, using defaults", requested);
        return FALLBACK_VARIABLES.iter().map(|v| v.to_string()).collect();
    }
    valid.into_iter().cloned().collect()
}

/// Open-Meteo hourly forecast/history client
pub struct OpenMeteoClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenMeteoClient {
    pub fn new(http: Client, base_url: &str, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            retry,
        }
    }

    /// Fetch hourly observations for the query window.
    pub async fn fetch_weather(&self, query: &WeatherQuery<'_>) -> Result<DataFrame, FetchError> {
        let variables = clean_variables(query.variables);
        info!(
            "Fetching weather for ({:.4}, {:.4}): {}",
            query.lat,
            query.lon,
            variables.join(", ")
        );

        let request = self.http.get(&self.base_url).query(&query.params(&variables));
        let resp = send_with_retry(API, request, &self.retry).await?;
        let (status, body) = read_body(API, resp).await?;

        let df = handle_forecast(status, &body, &variables)?;
        info!("Fetched {} weather records", df.height());
        Ok(df)
    }
}

/// Frame for a forecast response. A rejected request still carries
/// `{"error": true, "reason": ...}`, which wins over the bare status.
pub(crate) fn handle_forecast(status: StatusCode, body: &str, variables: &[String]) -> Result<DataFrame, FetchError> {
    if !status.is_success() {
        if let Ok(ForecastResponse { error: true, reason, .. }) = serde_json::from_str(body) {
            return Err(payload_error(reason));
        }
        return Err(status_error(API, status, body));
    }
    parse_forecast(body, variables)
}

fn payload_error(reason: Option<String>) -> FetchError {
    FetchError::Payload {
        api: API,
        reason: reason.unwrap_or_else(|| "Unknown error".to_string()),
    }
}

/// Tabulate the `hourly` block. `time` (epoch seconds) becomes a UTC
/// `timestamp` column; requested variables come first, in request order.
pub(crate) fn parse_forecast(body: &str, variables: &[String]) -> Result<DataFrame, FetchError> {
    let data: ForecastResponse =
        serde_json::from_str(body).map_err(|source| FetchError::Decode { api: API, source })?;

    if data.error {
        return Err(payload_error(data.reason));
    }

    let hourly = match data.hourly {
        Some(h) if !h.is_empty() => h,
        _ => {
            return Err(FetchError::Payload {
                api: API,
                reason: "No hourly data returned from weather API".to_string(),
            })
        }
    };

    let mut names: Vec<&str> = variables
        .iter()
        .map(String::as_str)
        .filter(|v| hourly.contains_key(*v))
        .collect();
    for key in hourly.keys() {
        if key != "time" && !names.contains(&key.as_str()) {
            names.push(key);
        }
    }

    let mut columns = Vec::new();
    let mut height = None;

    if let Some(times) = hourly.get("time") {
        let times = as_array("time", times)?;
        check_len("time", times.len(), &mut height)?;
        let stamps: Vec<_> = times.iter().map(json_time).collect();
        let series = timestamp_series("timestamp", &stamps).map_err(|source| FetchError::Frame { api: API, source })?;
        columns.push(series);
    }

    for name in names {
        let values = as_array(name, &hourly[name])?;
        check_len(name, values.len(), &mut height)?;
        columns.push(Series::new(name, values.iter().map(json_f64).collect::<Vec<_>>()));
    }

    DataFrame::new(columns).map_err(|source| FetchError::Frame { api: API, source })
}

/// Every hourly array must match the first one's length.
fn check_len(name: &str, len: usize, height: &mut Option<usize>) -> Result<(), FetchError> {
    match *height {
        Some(expected) if expected != len => Err(FetchError::Payload {
            api: API,
            reason: format!("hourly.{name} has {len} values, expected {expected}"),
        }),
        Some(_) => Ok(()),
        None => {
            *height = Some(len);
            Ok(())
        }
    }
}

fn json_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

fn as_array<'a>(name: &str, value: &'a Value) -> Result<&'a Vec<Value>, FetchError> {
    value.as_array().ok_or_else(|| FetchError::Payload {
        api: API,
        reason: format!("hourly.{name} is not an array"),
    })
}

fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
