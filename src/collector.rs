use chrono::{DateTime, Duration, Utc};
use polars::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::api::{EiaClient, EnergyQuery, FetchError, OpenMeteoClient, WeatherQuery};
use crate::config::WeatherConfig;
use crate::models::frame::to_timestamps;
use crate::regions::{RegionConfig, RegionRegistry, UnknownRegion};

const JOIN_KEY: &str = "timestamp";
const ENERGY_SUFFIX: &str = "_energy";
const WEATHER_SUFFIX: &str = "_weather";
/// Temporary column holding the energy row order across the join
const ENERGY_ROW: &str = "energy_row";

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    UnknownRegion(#[from] UnknownRegion),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Cannot merge empty datasets (energy: {energy_rows} rows, weather: {weather_rows} rows)")]
    EmptyDataset { energy_rows: usize, weather_rows: usize },
    #[error("Both datasets must have a 'timestamp' column")]
    MissingTimestamp,
    #[error("cannot look back {days} days from {now}")]
    WindowOutOfRange { days: u32, now: DateTime<Utc> },
    #[error("failed to build merged frame")]
    Frame(#[from] PolarsError),
}

/// (start, end) as `YYYY-MM-DD`, `days_back` days apart, ending at `now`
pub fn date_range(days_back: u32, now: DateTime<Utc>) -> Result<(String, String), CollectError> {
    let start = now
        .checked_sub_signed(Duration::days(i64::from(days_back)))
        .ok_or(CollectError::WindowOutOfRange { days: days_back, now })?;
    Ok((
        start.format("%Y-%m-%d").to_string(),
        now.format("%Y-%m-%d").to_string(),
    ))
}

/// Fetches and joins energy and weather data for one region
pub struct Collector<'a> {
    region_key: String,
    region: &'a RegionConfig,
    energy: &'a EiaClient,
    weather: &'a OpenMeteoClient,
    settings: &'a WeatherConfig,
}

impl<'a> Collector<'a> {
    /// Fails immediately when `region_key` is not in the registry.
    pub fn new(
        registry: &'a RegionRegistry,
        region_key: &str,
        energy: &'a EiaClient,
        weather: &'a OpenMeteoClient,
        settings: &'a WeatherConfig,
    ) -> Result<Self, CollectError> {
        let region = registry.resolve(region_key)?;
        Ok(Self {
            region_key: region_key.to_string(),
            region,
            energy,
            weather,
            settings,
        })
    }

    pub fn region(&self) -> &RegionConfig {
        self.region
    }

    /// Energy frame for the region's facets and weather frame for its coordinates.
    pub async fn collect_data(&self, start_date: &str, end_date: &str) -> Result<(DataFrame, DataFrame), CollectError> {
        info!("Collecting data for {}...", self.region.name);

        let energy = self
            .energy
            .fetch_region_subba(&EnergyQuery {
                parent: &self.region.parent,
                subba: &self.region.subba,
                start: start_date,
                end: end_date,
                length: self.energy.page_size(),
            })
            .await?;

        let weather = self
            .weather
            .fetch_weather(&WeatherQuery {
                lat: self.region.lat,
                lon: self.region.lon,
                variables: &self.settings.variables,
                past_days: self.settings.past_days,
                forecast_days: self.settings.forecast_days,
            })
            .await?;

        Ok((energy, weather))
    }

    pub fn merge_datasets(&self, energy: &DataFrame, weather: &DataFrame) -> Result<DataFrame, CollectError> {
        merge_datasets(&self.region_key, self.region, energy, weather)
    }
}

/// Inner join on `timestamp`, tagged with `region` and `region_key`.
///
/// Energy row order is kept; a timestamp repeated on both sides yields one row
/// per pair. Other shared column names get `_energy` / `_weather` suffixes.
pub fn merge_datasets(
    region_key: &str,
    region: &RegionConfig,
    energy: &DataFrame,
    weather: &DataFrame,
) -> Result<DataFrame, CollectError> {
    if energy.is_empty() || weather.is_empty() {
        return Err(CollectError::EmptyDataset {
            energy_rows: energy.height(),
            weather_rows: weather.height(),
        });
    }

    let left = with_join_key(energy)?.with_row_index(ENERGY_ROW, None)?;
    let right = with_join_key(weather)?;

    let shared: Vec<String> = energy
        .get_column_names()
        .into_iter()
        .filter(|name| *name != JOIN_KEY && weather.column(name).is_ok())
        .map(str::to_string)
        .collect();

    let args = JoinArgs::new(JoinType::Inner).with_suffix(Some(WEATHER_SUFFIX.to_string()));
    let mut merged = left
        .join(&right, [JOIN_KEY], [JOIN_KEY], args)?
        .sort([ENERGY_ROW], SortMultipleOptions::default())?
        .drop(ENERGY_ROW)?;

    for name in &shared {
        merged.rename(name, &format!("{name}{ENERGY_SUFFIX}"))?;
    }

    let n = merged.height();
    merged.with_column(Series::new("region", vec![region.name.as_str(); n]))?;
    merged.with_column(Series::new("region_key", vec![region_key; n]))?;

    info!(
        "Merged {} energy rows with {} weather rows into {} rows",
        energy.height(),
        weather.height(),
        n
    );
    Ok(merged)
}

/// Copy of `df` whose `timestamp` column holds UTC datetimes, parsing text if needed.
fn with_join_key(df: &DataFrame) -> Result<DataFrame, CollectError> {
    let column = df.column(JOIN_KEY).map_err(|_| CollectError::MissingTimestamp)?;
    let key = to_timestamps(column).map_err(|_| CollectError::MissingTimestamp)?;
    let mut df = df.clone();
    df.with_column(key)?;
    Ok(df)
}
