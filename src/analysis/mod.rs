pub mod report;
pub mod statistics;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::frame::{float_values, to_float, to_timestamps};
use crate::models::timestamps;
use statistics::{describe, pearson, round_to, Summary};

/// Columns coerced to numbers before analysis
const NUMERIC_CANDIDATES: &[&str] = &[
    "value",
    "temperature_2m",
    "relative_humidity_2m",
    "wind_speed_10m",
    "shortwave_radiation",
];

/// A column is a weather variable if its lowercased name contains one of these
const WEATHER_MARKERS: &[&str] = &["temperature", "humidity", "wind", "shortwave", "radiation"];

const VALUE_COLUMN: &str = "value";
const TIMESTAMP_COLUMN: &str = "timestamp";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("No numeric columns found for analysis")]
    NoNumericColumns,
    #[error("No energy value column found")]
    NoValueColumn,
    #[error("No timestamp column found")]
    NoTimestampColumn,
}

/// Correlation of one weather column with energy demand
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    Value(f64),
    Error(String),
}

impl Correlation {
    pub fn value(&self) -> Option<f64> {
        match self {
            Correlation::Value(v) => Some(*v),
            Correlation::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub column: String,
    pub summary: Summary,
}

/// Pairwise Pearson matrix over the numeric columns; NaN where undefined
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[i][j])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicStats {
    pub summary: Vec<ColumnSummary>,
    pub correlations: CorrelationMatrix,
    pub energy_weather_corr: Result<Vec<(String, Correlation)>, AnalysisError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourBucket {
    pub hour: u32,
    pub mean: f64,
    pub std: f64,
    /// Non-missing energy values in this hour
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourlyPatterns {
    pub energy_by_hour: Option<Vec<HourBucket>>,
    /// (column, [(hour, mean)]) for the first temperature column
    pub temp_by_hour: Option<(String, Vec<(u32, f64)>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissingData {
    pub column: String,
    pub count: usize,
    /// 0-100, rounded to 2 decimals
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub missing_data: Vec<MissingData>,
    pub data_types: Vec<(String, DataType)>,
    pub time_range: Option<TimeRange>,
}

/// Energy/weather statistics over a merged frame
pub struct Analyzer {
    data: DataFrame,
}

impl Analyzer {
    /// Normalise types: parse `timestamp`, coerce numeric columns to floats,
    /// drop rows with no numeric value at all.
    pub fn new(data: DataFrame) -> Self {
        let mut data = data;

        let parsed = data.column(TIMESTAMP_COLUMN).ok().map(to_timestamps);
        if let Some(parsed) = parsed {
            if let Err(e) = parsed.and_then(|stamps| data.with_column(stamps).map(|_| ())) {
                warn!("Leaving '{}' unparsed: {}", TIMESTAMP_COLUMN, e);
            }
        }

        let numeric: Vec<String> = data
            .get_columns()
            .iter()
            .filter(|s| {
                s.dtype().is_numeric() || (NUMERIC_CANDIDATES.contains(&s.name()) && !s.dtype().is_temporal())
            })
            .map(|s| s.name().to_string())
            .collect();
        for name in &numeric {
            let coerced = data.column(name).and_then(to_float);
            if let Err(e) = coerced.and_then(|s| data.with_column(s).map(|_| ())) {
                warn!("Could not coerce '{}' to numbers: {}", name, e);
            }
        }

        let mask = data
            .get_columns()
            .iter()
            .filter(|s| s.dtype() == &DataType::Float64)
            .map(|s| s.is_not_null())
            .reduce(|a, b| &a | &b);
        if let Some(mask) = mask {
            match data.filter(&mask) {
                Ok(kept) => data = kept,
                Err(e) => warn!("Could not drop empty rows: {}", e),
            }
        }

        info!("Data prepared: {} rows, {} numeric columns", data.height(), numeric.len());
        Self { data }
    }

    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    fn numeric_columns(&self) -> Vec<(&str, &Float64Chunked)> {
        self.data
            .get_columns()
            .iter()
            .filter_map(|s| s.f64().ok().map(|ca| (s.name(), ca)))
            .collect()
    }

    /// First column whose name contains "temperature"
    fn temperature_column(&self) -> Option<&str> {
        self.data
            .get_column_names()
            .into_iter()
            .find(|name| name.to_lowercase().contains("temperature"))
    }

    /// Summary table, full correlation matrix and the energy/weather correlations.
    pub fn basic_stats(&self) -> Result<BasicStats, AnalysisError> {
        let numeric = self.numeric_columns();
        if numeric.is_empty() {
            return Err(AnalysisError::NoNumericColumns);
        }

        let summary = numeric
            .iter()
            .map(|(name, values)| ColumnSummary {
                column: name.to_string(),
                summary: describe(values),
            })
            .collect();

        let cells: Vec<Vec<Option<f64>>> = numeric
            .iter()
            .map(|(_, values)| values.into_iter().collect())
            .collect();
        let values = cells
            .iter()
            .map(|x| cells.iter().map(|y| pearson(x, y).unwrap_or(f64::NAN)).collect())
            .collect();

        Ok(BasicStats {
            summary,
            correlations: CorrelationMatrix {
                columns: numeric.iter().map(|(name, _)| name.to_string()).collect(),
                values,
            },
            energy_weather_corr: self.energy_weather_correlations(),
        })
    }

    /// Pearson correlation of `value` with each weather column, rounded to 4 decimals.
    /// Undefined correlations are left out.
    pub fn energy_weather_correlations(&self) -> Result<Vec<(String, Correlation)>, AnalysisError> {
        let energy = self
            .data
            .column(VALUE_COLUMN)
            .ok()
            .filter(|s| !s.dtype().is_temporal())
            .and_then(|s| float_values(s).ok())
            .ok_or(AnalysisError::NoValueColumn)?;

        let mut correlations = Vec::new();
        for series in self.data.get_columns() {
            let name = series.name();
            let lower = name.to_lowercase();
            if !WEATHER_MARKERS.iter().any(|m| lower.contains(m)) {
                continue;
            }
            if series.dtype().is_temporal() {
                correlations.push((
                    name.to_string(),
                    Correlation::Error(format!("Error: column of type {} is not numeric", series.dtype())),
                ));
                continue;
            }
            match float_values(series) {
                Ok(weather) => {
                    if let Some(r) = pearson(&energy, &weather) {
                        correlations.push((name.to_string(), Correlation::Value(round_to(r, 4))));
                    }
                }
                Err(e) => correlations.push((name.to_string(), Correlation::Error(format!("Error: {e}")))),
            }
        }
        Ok(correlations)
    }

    /// Mean/std/count of `value` and mean temperature per UTC hour of day.
    pub fn hourly_patterns(&self) -> Result<HourlyPatterns, AnalysisError> {
        let stamps = self
            .data
            .column(TIMESTAMP_COLUMN)
            .map_err(|_| AnalysisError::NoTimestampColumn)?;
        if !matches!(stamps.dtype(), DataType::Datetime(_, _)) {
            return Err(AnalysisError::NoTimestampColumn);
        }

        let energy_by_hour = self.hour_buckets(VALUE_COLUMN);
        let temp_by_hour = self.temperature_column().and_then(|name| {
            let means: Vec<(u32, f64)> = self.hour_buckets(name)?.into_iter().map(|b| (b.hour, b.mean)).collect();
            Some((name.to_string(), means))
        });

        Ok(HourlyPatterns { energy_by_hour, temp_by_hour })
    }

    /// Group a float column by the hour of `timestamp`. `None` when the column
    /// is missing or not numeric.
    fn hour_buckets(&self, column: &str) -> Option<Vec<HourBucket>> {
        if self.data.column(column).ok()?.f64().is_err() {
            return None;
        }

        let grouped = self
            .data
            .clone()
            .lazy()
            .filter(col(TIMESTAMP_COLUMN).is_not_null())
            .group_by([col(TIMESTAMP_COLUMN).dt().hour().cast(DataType::UInt32).alias("hour")])
            .agg([
                col(column).mean().alias("mean"),
                col(column).std(1).alias("std"),
                col(column).count().alias("count"),
            ])
            .sort(["hour"], SortMultipleOptions::default())
            .collect()
            .and_then(|df| read_buckets(&df));

        match grouped {
            Ok(buckets) => Some(buckets),
            Err(e) => {
                warn!("Hourly grouping of '{}' failed: {}", column, e);
                None
            }
        }
    }

    /// Missing counts/percentages, column types and the covered time range.
    pub fn data_quality_check(&self) -> QualityReport {
        let total_rows = self.data.height();

        let missing_data = self
            .data
            .get_columns()
            .iter()
            .map(|s| {
                let count = s.null_count();
                let percentage = if total_rows == 0 {
                    0.0
                } else {
                    round_to(count as f64 / total_rows as f64 * 100.0, 2)
                };
                MissingData { column: s.name().to_string(), count, percentage }
            })
            .collect();

        let data_types = self
            .data
            .get_columns()
            .iter()
            .map(|s| (s.name().to_string(), s.dtype().clone()))
            .collect();

        QualityReport {
            total_rows,
            columns: self.data.get_column_names().into_iter().map(str::to_string).collect(),
            missing_data,
            data_types,
            time_range: self.time_range(),
        }
    }

    fn time_range(&self) -> Option<TimeRange> {
        let stamps = self.data.column(TIMESTAMP_COLUMN).ok()?;
        if !matches!(stamps.dtype(), DataType::Datetime(_, _)) {
            return None;
        }
        let stamps = timestamps(stamps).ok()?;
        let start = *stamps.iter().flatten().min()?;
        let end = *stamps.iter().flatten().max()?;
        Some(TimeRange {
            start,
            end,
            duration_hours: (end - start).num_seconds() as f64 / 3600.0,
        })
    }

    /// Mean, max and min of `value`, for the insights section
    fn energy_extremes(&self) -> Option<(f64, f64, f64)> {
        let values = self.data.column(VALUE_COLUMN).ok()?.f64().ok()?;
        Some((values.mean()?, values.max()?, values.min()?))
    }
}

fn read_buckets(grouped: &DataFrame) -> PolarsResult<Vec<HourBucket>> {
    let hours = grouped.column("hour")?.u32()?;
    let means = grouped.column("mean")?.f64()?;
    let stds = grouped.column("std")?.f64()?;
    let counts = grouped.column("count")?.cast(&DataType::UInt64)?;
    let counts = counts.u64()?;

    let buckets = hours
        .into_iter()
        .zip(means)
        .zip(stds)
        .zip(counts)
        .filter_map(|(((hour, mean), std), count)| {
            Some(HourBucket {
                hour: hour?,
                mean: mean.unwrap_or(f64::NAN),
                std: std.unwrap_or(f64::NAN),
                count: count.unwrap_or(0) as usize,
            })
        })
        .collect();
    Ok(buckets)
}
