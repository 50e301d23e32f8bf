/// EIA open data v2
pub const EIA_API: &str = "https://api.eia.gov/v2";
pub const EIA_REGION_SUBBA_DATA: &str = "/electricity/rto/region-sub-ba-data/data/";

/// Open-Meteo hourly forecast (also serves `past_days` history)
pub const OPEN_METEO_FORECAST: &str = "https://api.open-meteo.com/v1/forecast";
