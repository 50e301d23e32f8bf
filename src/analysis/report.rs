use polars::prelude::ChunkAgg;

use super::{Analyzer, Correlation};
use crate::models::format_timestamp;

impl Analyzer {
    /// Plain-text summary of the merged dataset. Always produces output;
    /// sections whose inputs are missing are left out.
    pub fn generate_report(&self) -> String {
        let mut report = vec!["=== Energy-Weather Analysis Report ===".to_string(), String::new()];

        let quality = self.data_quality_check();
        report.push(format!(
            "Dataset: {} rows, {} columns",
            quality.total_rows,
            quality.columns.len()
        ));
        if let Some(range) = &quality.time_range {
            report.push(format!(
                "Time range: {} to {}",
                format_timestamp(&range.start),
                format_timestamp(&range.end)
            ));
            report.push(format!("Duration: {:.1} hours", range.duration_hours));
        }
        if let Some(region) = self.first_region() {
            report.push(format!("Region: {region}"));
        }
        report.push(String::new());

        match self.energy_weather_correlations() {
            Ok(correlations) if !correlations.is_empty() => {
                report.push("Energy-Weather Correlations:".to_string());
                for (name, corr) in &correlations {
                    match corr {
                        Correlation::Value(v) => report.push(format!("  {name}: {v:.3}")),
                        Correlation::Error(msg) => report.push(format!("  {name}: {msg}")),
                    }
                }
                report.push(String::new());
            }
            _ => {}
        }

        report.push("Key Insights:".to_string());
        if let Some((mean, peak, low)) = self.energy_extremes() {
            report.push(format!("  Average energy demand: {mean:.2}"));
            report.push(format!("  Peak energy demand: {peak:.2}"));
            report.push(format!("  Minimum energy demand: {low:.2}"));
        }
        if let Some(avg) = self.average_temperature() {
            report.push(format!("  Average temperature: {avg:.1}°C"));
        }

        report.push(String::new());
        report.push("Data Quality:".to_string());
        let missing: Vec<String> = quality
            .missing_data
            .iter()
            .filter(|m| m.count > 0)
            .map(|m| format!("{}: {:.1}% missing", m.column, m.percentage))
            .collect();
        if missing.is_empty() {
            report.push("  No missing data detected".to_string());
        } else {
            report.push(format!("  Missing data: {}", missing.join(", ")));
        }

        report.join("\n")
    }

    /// Per-column summary statistics and the hourly demand profile.
    pub fn generate_details(&self) -> String {
        let mut out = Vec::new();

        match self.basic_stats() {
            Ok(stats) => {
                out.push("Summary Statistics:".to_string());
                out.push(format!(
                    "  {:<24} {:>6} {:>12} {:>12} {:>12} {:>12} {:>12}",
                    "column", "count", "mean", "std", "min", "median", "max"
                ));
                for col in &stats.summary {
                    let s = &col.summary;
                    out.push(format!(
                        "  {:<24} {:>6} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
                        col.column, s.count, s.mean, s.std, s.min, s.median, s.max
                    ));
                }
            }
            Err(e) => out.push(format!("Summary Statistics: {e}")),
        }
        out.push(String::new());

        match self.hourly_patterns() {
            Ok(patterns) => {
                out.push("Hourly Profile (UTC):".to_string());
                let temps = patterns.temp_by_hour.map(|(_, means)| means).unwrap_or_default();
                for bucket in patterns.energy_by_hour.unwrap_or_default() {
                    let temp = temps
                        .iter()
                        .find(|(hour, _)| *hour == bucket.hour)
                        .map(|(_, t)| format!("  temp {t:.1}°C"))
                        .unwrap_or_default();
                    out.push(format!(
                        "  {:02}:00  mean {:>10.2}  std {:>10.2}  n={}{}",
                        bucket.hour, bucket.mean, bucket.std, bucket.count, temp
                    ));
                }
            }
            Err(e) => out.push(format!("Hourly Profile: {e}")),
        }

        out.join("\n")
    }

    /// Region name from the first row; `None` when that cell is null or empty.
    fn first_region(&self) -> Option<String> {
        let regions = self.data().column("region").ok()?;
        let first = regions.str().ok()?.get(0)?;
        (!first.is_empty()).then(|| first.to_string())
    }

    fn average_temperature(&self) -> Option<f64> {
        let name = self.temperature_column()?;
        self.data().column(name).ok()?.f64().ok()?.mean()
    }
}
