use polars::prelude::*;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use std::future::Future;
use tracing::{debug, info, warn};

use super::{endpoints, read_body, send_with_retry, status_error, FetchError, RetryPolicy};
use crate::config::EiaConfig;
use crate::models::{parse_timestamp, timestamp_series};

const API: &str = "EIA";

/// Deserialize a value that might be a string or a number as f64
fn deserialize_string_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNum {
        Num(f64),
        Str(String),
        Other(serde_json::Value),
    }
    match Option::<StringOrNum>::deserialize(deserializer)? {
        Some(StringOrNum::Num(n)) => Ok(Some(n)),
        Some(StringOrNum::Str(s)) => Ok(s.trim().parse::<f64>().ok()),
        Some(StringOrNum::Other(_)) | None => Ok(None),
    }
}

/// One hourly row of `electricity/rto/region-sub-ba-data`
#[derive(Debug, Clone, Deserialize)]
pub struct EiaRow {
    pub period: Option<String>,
    pub subba: Option<String>,
    #[serde(rename = "subba-name")]
    pub subba_name: Option<String>,
    pub parent: Option<String>,
    #[serde(rename = "parent-name")]
    pub parent_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_f64")]
    pub value: Option<f64>,
    #[serde(rename = "value-units")]
    pub value_units: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EiaEnvelope {
    #[serde(default)]
    response: Option<EiaResponseBody>,
}

#[derive(Debug, Deserialize)]
struct EiaResponseBody {
    #[serde(default)]
    data: Vec<EiaRow>,
}

/// Facets and window for one sub-BA demand query
#[derive(Debug, Clone)]
pub struct EnergyQuery<'a> {
    pub parent: &'a str,
    pub subba: &'a str,
    /// Inclusive ISO dates (YYYY-MM-DD)
    pub start: &'a str,
    pub end: &'a str,
    /// Page size sent as `length`
    pub length: usize,
}

impl EnergyQuery<'_> {
    fn params(&self, api_key: &str, offset: usize) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", api_key.to_string()),
            ("frequency", "hourly".to_string()),
            ("data[0]", "value".to_string()),
            ("facets[parent][]", self.parent.to_string()),
            ("facets[subba][]", self.subba.to_string()),
            ("start", self.start.to_string()),
            ("end", self.end.to_string()),
            ("length", self.length.to_string()),
            ("offset", offset.to_string()),
        ]
    }
}

/// EIA v2 client for hourly sub-balancing-authority demand
pub struct EiaClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    page_size: usize,
    retry: RetryPolicy,
}

impl EiaClient {
    pub fn new(http: Client, config: &EiaConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            page_size: config.page_size,
            retry,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch every row for the window, following `offset` until a short page.
    /// Zero rows is an empty frame, not an error.
    pub async fn fetch_region_subba(&self, query: &EnergyQuery<'_>) -> Result<DataFrame, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::MissingApiKey)?;

        info!(
            "Fetching EIA demand for {}/{} from {} to {}",
            query.parent, query.subba, query.start, query.end
        );
        let rows = paginate(query.length, |offset| self.fetch_page(api_key, query, offset)).await?;

        if rows.is_empty() {
            warn!("EIA returned no rows for {}/{}", query.parent, query.subba);
        } else {
            info!("Fetched {} EIA rows", rows.len());
        }
        rows_to_frame(rows).map_err(|source| FetchError::Frame { api: API, source })
    }

    async fn fetch_page(&self, api_key: &str, query: &EnergyQuery<'_>, offset: usize) -> Result<Vec<EiaRow>, FetchError> {
        let url = format!("{}{}", self.base_url, endpoints::EIA_REGION_SUBBA_DATA);
        // api_key is in the params, never log them
        debug!("EIA page request: {} offset={} length={}", url, offset, query.length);

        let request = self.http.get(&url).query(&query.params(api_key, offset));
        let resp = send_with_retry(API, request, &self.retry).await?;
        let (status, body) = read_body(API, resp).await?;
        handle_page(status, &body)
    }
}

/// Rows of one page response; any non-2xx status is an error.
pub(crate) fn handle_page(status: StatusCode, body: &str) -> Result<Vec<EiaRow>, FetchError> {
    if !status.is_success() {
        return Err(status_error(API, status, body));
    }
    parse_page(body)
}

/// Drive `fetch_page` from offset 0 in steps of `length` until a page is empty or short.
pub(crate) async fn paginate<T, F, Fut>(length: usize, mut fetch_page: F) -> Result<Vec<T>, FetchError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
{
    let length = length.max(1);
    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let page = fetch_page(offset).await?;
        let n = page.len();
        if n == 0 {
            break;
        }
        rows.extend(page);
        if n < length {
            break;
        }
        offset += length;
    }
    Ok(rows)
}

/// A body without `response.data` is an empty page.
pub(crate) fn parse_page(body: &str) -> Result<Vec<EiaRow>, FetchError> {
    let envelope: EiaEnvelope =
        serde_json::from_str(body).map_err(|source| FetchError::Decode { api: API, source })?;
    Ok(envelope.response.map(|r| r.data).unwrap_or_default())
}

fn text_series(rows: &[EiaRow], name: &str, field: fn(&EiaRow) -> &Option<String>) -> Series {
    Series::new(name, rows.iter().map(|r| field(r).as_deref()).collect::<Vec<_>>())
}

/// Tabulate rows; `timestamp` is derived from `period` when any row carries one.
pub fn rows_to_frame(rows: Vec<EiaRow>) -> PolarsResult<DataFrame> {
    if rows.is_empty() {
        return Ok(DataFrame::default());
    }

    let has_period = rows.iter().any(|r| r.period.is_some());

    let mut columns = Vec::new();
    if has_period {
        columns.push(text_series(&rows, "period", |r| &r.period));
    }
    columns.push(text_series(&rows, "subba", |r| &r.subba));
    columns.push(text_series(&rows, "subba-name", |r| &r.subba_name));
    columns.push(text_series(&rows, "parent", |r| &r.parent));
    columns.push(text_series(&rows, "parent-name", |r| &r.parent_name));
    columns.push(Series::new("value", rows.iter().map(|r| r.value).collect::<Vec<_>>()));
    columns.push(text_series(&rows, "value-units", |r| &r.value_units));
    if has_period {
        let stamps: Vec<_> = rows
            .iter()
            .map(|r| r.period.as_deref().and_then(parse_timestamp))
            .collect();
        columns.push(timestamp_series("timestamp", &stamps)?);
    }

    DataFrame::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::timestamps;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;

    const PAGE: &str = r#"{
        "response": {
            "total": "2",
            "data": [
                {"period": "2024-03-01T05", "subba": "PGAE", "subba-name": "Pacific Gas and Electric",
                 "parent": "CISO", "parent-name": "California Independent System Operator",
                 "value": "10123", "value-units": "megawatthours"},
                {"period": "2024-03-01T06", "subba": "PGAE", "subba-name": "Pacific Gas and Electric",
                 "parent": "CISO", "parent-name": "California Independent System Operator",
                 "value": 9876.5, "value-units": "megawatthours"}
            ]
        }
    }"#;

    #[test]
    fn test_parse_page_string_and_number_values() {
        let rows = parse_page(PAGE).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, Some(10123.0));
        assert_eq!(rows[1].value, Some(9876.5));
        assert_eq!(rows[0].subba_name.as_deref(), Some("Pacific Gas and Electric"));
    }

    #[test]
    fn test_parse_page_missing_data_is_empty() {
        assert!(parse_page(r#"{"response": {}}"#).unwrap().is_empty());
        assert!(parse_page(r#"{}"#).unwrap().is_empty());
        assert!(matches!(parse_page("<html>"), Err(FetchError::Decode { .. })));
    }

    #[test]
    fn test_null_and_garbage_values() {
        let rows = parse_page(
            r#"{"response": {"data": [
                {"period": "2024-03-01T05", "value": null},
                {"period": "2024-03-01T06", "value": "n/a"},
                {"period": "2024-03-01T07"}
            ]}}"#,
        )
        .unwrap();
        assert!(rows.iter().all(|r| r.value.is_none()));
    }

    #[test]
    fn test_rows_to_frame_derives_timestamp() {
        let df = rows_to_frame(parse_page(PAGE).unwrap()).unwrap();
        assert_eq!(df.height(), 2);
        let stamps = timestamps(df.column("timestamp").unwrap()).unwrap();
        assert_eq!(stamps[0], Some(Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap()));
        let values: Vec<Option<f64>> = df.column("value").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(10123.0), Some(9876.5)]);
        assert_eq!(df.column("subba").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_rows_without_period_have_no_timestamp() {
        let rows = parse_page(r#"{"response": {"data": [{"value": 1}]}}"#).unwrap();
        let df = rows_to_frame(rows).unwrap();
        assert!(df.column("timestamp").is_err());
        assert!(df.column("period").is_err());
        assert!(rows_to_frame(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_handle_page_statuses() {
        match handle_page(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") {
            Err(FetchError::Status { status, body, .. }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        // an EIA error body on a 4xx is still a status error, not an empty page
        let denied = r#"{"error": {"code": "API_KEY_INVALID", "message": "bad key"}}"#;
        assert!(matches!(
            handle_page(StatusCode::FORBIDDEN, denied),
            Err(FetchError::Status { .. })
        ));
        assert_eq!(handle_page(StatusCode::OK, PAGE).unwrap().len(), 2);
    }

    #[test]
    fn test_query_params() {
        let query = EnergyQuery { parent: "CISO", subba: "PGAE", start: "2024-03-01", end: "2024-03-08", length: 5000 };
        let params = query.params("KEY", 10000);
        assert!(params.contains(&("frequency", "hourly".to_string())));
        assert!(params.contains(&("data[0]", "value".to_string())));
        assert!(params.contains(&("facets[parent][]", "CISO".to_string())));
        assert!(params.contains(&("facets[subba][]", "PGAE".to_string())));
        assert!(params.contains(&("start", "2024-03-01".to_string())));
        assert!(params.contains(&("end", "2024-03-08".to_string())));
        assert!(params.contains(&("length", "5000".to_string())));
        assert!(params.contains(&("offset", "10000".to_string())));
    }

    #[tokio::test]
    async fn test_paginate_stops_on_short_page() {
        let offsets = RefCell::new(Vec::new());
        let rows = paginate(2, |offset| {
            offsets.borrow_mut().push(offset);
            let page: Vec<usize> = match offset {
                0 => vec![1, 2],
                2 => vec![3, 4],
                4 => vec![5],
                _ => vec![99],
            };
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(rows, vec![1, 2, 3, 4, 5]);
        assert_eq!(*offsets.borrow(), vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_paginate_stops_on_empty_page() {
        let rows = paginate(2, |offset| async move {
            Ok(if offset < 4 { vec![offset, offset + 1] } else { Vec::new() })
        })
        .await
        .unwrap();
        assert_eq!(rows, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_paginate_propagates_errors() {
        let result: Result<Vec<u8>, FetchError> = paginate(10, |_| async {
            Err(FetchError::Payload { api: API, reason: "boom".to_string() })
        })
        .await;
        assert!(matches!(result, Err(FetchError::Payload { .. })));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = EiaClient::new(Client::new(), &EiaConfig::default(), RetryPolicy::none());
        let query = EnergyQuery { parent: "CISO", subba: "PGAE", start: "2024-03-01", end: "2024-03-02", length: 10 };
        let err = client.fetch_region_subba(&query).await.unwrap_err();
        assert!(matches!(err, FetchError::MissingApiKey));
    }
}
