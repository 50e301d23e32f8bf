use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use std::io::Write;

/// Naive layouts tried after RFC 3339; all are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Timestamps in the CSV snapshot; every stored time is UTC.
const CSV_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S+00:00";

/// UTC timestamps are stored as naive millisecond datetimes.
pub fn datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

pub fn timestamp_series(name: &str, stamps: &[Option<DateTime<Utc>>]) -> PolarsResult<Series> {
    let millis: Vec<Option<i64>> = stamps.iter().map(|t| t.map(|t| t.timestamp_millis())).collect();
    Series::new(name, millis).cast(&datetime_dtype())
}

/// Coerce a column to UTC datetimes. Text that does not parse becomes null.
pub fn to_timestamps(series: &Series) -> PolarsResult<Series> {
    match series.dtype() {
        DataType::String => {
            let stamps: Vec<Option<DateTime<Utc>>> = series
                .str()?
                .into_iter()
                .map(|cell| cell.and_then(parse_timestamp))
                .collect();
            timestamp_series(series.name(), &stamps)
        }
        DataType::Datetime(_, _) => series.cast(&datetime_dtype()),
        other => Err(PolarsError::SchemaMismatch(
            format!("column '{}' of type {} holds no timestamps", series.name(), other).into(),
        )),
    }
}

/// A datetime (or parseable text) column read back as UTC times.
pub fn timestamps(series: &Series) -> PolarsResult<Vec<Option<DateTime<Utc>>>> {
    let millis = to_timestamps(series)?.cast(&DataType::Int64)?;
    let stamps = millis
        .i64()?
        .into_iter()
        .map(|ms| ms.and_then(DateTime::from_timestamp_millis))
        .collect();
    Ok(stamps)
}

/// Values of a column as floats. Unparseable text and NaN read as missing.
pub fn float_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let floats = series.cast(&DataType::Float64)?;
    let values = floats
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Ok(values)
}

/// Coerce to a Float64 column with NaN stored as null.
pub fn to_float(series: &Series) -> PolarsResult<Series> {
    Ok(Series::new(series.name(), float_values(series)?))
}

/// Write the frame as CSV with a header row; missing cells are empty.
pub fn write_csv<W: Write>(df: &mut DataFrame, writer: W) -> PolarsResult<()> {
    CsvWriter::new(writer)
        .include_header(true)
        .with_datetime_format(Some(CSV_DATETIME_FORMAT.to_string()))
        .finish(df)
}

/// Parse a provider timestamp into UTC. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    // EIA hourly periods stop at the hour: "2024-01-01T05"
    if s.len() == 13 && s.as_bytes()[10] == b'T' {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&format!("{s}:00"), "%Y-%m-%dT%H:%M") {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%:z").to_string()
}
