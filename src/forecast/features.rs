//! Feature engineering for demand forecasting
//!
//! Turns a chronologically ordered slice of observations into a named,
//! column-oriented feature frame. Values that cannot be derived (lags before
//! the start of the series, rolling windows with gaps, missing telemetry)
//! are filled with 0.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeSet;
use std::f64::consts::PI;

use crate::domain::Observation;

const LAGS: [(usize, &str); 3] = [
    (1, "demand_lag_1h"),
    (24, "demand_lag_24h"),
    (168, "demand_lag_168h"),
];
const ROLLING_WINDOWS: [(usize, &str); 2] = [(24, "demand_ma_24h"), (168, "demand_ma_168h")];

/// Fixed-date public holidays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    /// (month, day) pairs
    days: Vec<(u32, u32)>,
}

impl HolidayCalendar {
    /// Parse "MM-DD" entries
    pub fn from_mmdd(entries: &[String]) -> Result<Self> {
        let days = entries
            .iter()
            .map(|entry| {
                let (m, d) = entry
                    .split_once('-')
                    .with_context(|| format!("holiday '{entry}' is not in MM-DD form"))?;
                let month: u32 = m.trim().parse().with_context(|| format!("bad month in '{entry}'"))?;
                let day: u32 = d.trim().parse().with_context(|| format!("bad day in '{entry}'"))?;
                if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
                    anyhow::bail!("holiday '{entry}' is out of range");
                }
                Ok((month, day))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { days })
    }

    pub fn is_holiday(&self, timestamp: &DateTime<Utc>) -> bool {
        self.days.contains(&(timestamp.month(), timestamp.day()))
    }
}

/// Named feature columns, one row per observation
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Reorder columns to match `schema`. Columns the frame lacks are 0,
    /// columns absent from the schema are dropped.
    pub fn align_to(&self, schema: &[String]) -> Vec<Vec<f64>> {
        let positions: Vec<Option<usize>> = schema
            .iter()
            .map(|name| self.columns.iter().position(|c| c == name))
            .collect();

        self.rows
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|pos| pos.map(|i| row[i]).unwrap_or(0.0))
                    .collect()
            })
            .collect()
    }
}

/// Derives the demand feature frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureBuilder {
    holidays: HolidayCalendar,
}

impl FeatureBuilder {
    pub fn new(holidays: HolidayCalendar) -> Self {
        Self { holidays }
    }

    /// Build features for observations that are already in time order.
    pub fn build(&self, observations: &[Observation]) -> FeatureFrame {
        let mut columns: Vec<(String, Vec<f64>)> = Vec::new();

        let temperature: Vec<f64> = observations
            .iter()
            .map(|o| o.temperature.unwrap_or(f64::NAN))
            .collect();
        let has_temperature = observations.iter().any(|o| o.temperature.is_some());

        let utilization: Vec<f64> = observations
            .iter()
            .map(|o| o.station_utilization.unwrap_or(f64::NAN))
            .collect();
        let has_utilization = observations.iter().any(|o| o.station_utilization.is_some());

        // Raw telemetry passes through as-is
        if has_temperature {
            columns.push(("temperature".to_string(), temperature.clone()));
        }
        if has_utilization {
            columns.push(("station_utilization".to_string(), utilization.clone()));
        }

        let extra_keys: BTreeSet<&String> = observations.iter().flat_map(|o| o.extra.keys()).collect();
        for key in extra_keys {
            if is_reserved(key) {
                continue;
            }
            let values = observations
                .iter()
                .map(|o| o.extra.get(key).copied().unwrap_or(f64::NAN))
                .collect();
            columns.push((key.clone(), values));
        }

        // Calendar
        let hours: Vec<f64> = observations.iter().map(|o| o.timestamp.hour() as f64).collect();
        let weekdays: Vec<f64> = observations
            .iter()
            .map(|o| o.timestamp.weekday().num_days_from_monday() as f64)
            .collect();
        let months: Vec<f64> = observations.iter().map(|o| o.timestamp.month() as f64).collect();
        let is_weekend: Vec<f64> = weekdays.iter().map(|d| if *d >= 5.0 { 1.0 } else { 0.0 }).collect();

        let (hour_sin, hour_cos): (Vec<f64>, Vec<f64>) =
            hours.iter().map(|h| cyclical_encode(*h, 24.0)).unzip();
        let (day_sin, day_cos): (Vec<f64>, Vec<f64>) =
            weekdays.iter().map(|d| cyclical_encode(*d, 7.0)).unzip();

        columns.push(("hour".to_string(), hours));
        columns.push(("day_of_week".to_string(), weekdays));
        columns.push(("month".to_string(), months));
        columns.push(("is_weekend".to_string(), is_weekend));
        columns.push(("hour_sin".to_string(), hour_sin));
        columns.push(("hour_cos".to_string(), hour_cos));
        columns.push(("day_sin".to_string(), day_sin));
        columns.push(("day_cos".to_string(), day_cos));

        // Target history
        let demand: Vec<f64> = observations
            .iter()
            .map(|o| o.demand.unwrap_or(f64::NAN))
            .collect();
        for (offset, name) in LAGS {
            columns.push((name.to_string(), lag(&demand, offset)));
        }
        for (window, name) in ROLLING_WINDOWS {
            columns.push((name.to_string(), rolling_mean(&demand, window)));
        }

        if has_temperature {
            columns.push(("temp_normalized".to_string(), z_scores(&temperature)));
        }

        let conditions: BTreeSet<&str> = observations
            .iter()
            .filter_map(|o| o.weather_condition.as_deref())
            .collect();
        for condition in conditions {
            let values = observations
                .iter()
                .map(|o| {
                    if o.weather_condition.as_deref() == Some(condition) {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            columns.push((format!("weather_{condition}"), values));
        }

        if has_utilization {
            columns.push((
                "utilization_normalized".to_string(),
                utilization.iter().map(|u| u / 100.0).collect(),
            ));
        }

        columns.push((
            "is_holiday".to_string(),
            observations
                .iter()
                .map(|o| if self.holidays.is_holiday(&o.timestamp) { 1.0 } else { 0.0 })
                .collect(),
        ));

        let rows = (0..observations.len())
            .map(|i| {
                columns
                    .iter()
                    .map(|(_, values)| if values[i].is_finite() { values[i] } else { 0.0 })
                    .collect()
            })
            .collect();

        FeatureFrame {
            columns: columns.into_iter().map(|(name, _)| name).collect(),
            rows,
        }
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "timestamp"
            | "demand"
            | "station_id"
            | "temperature"
            | "station_utilization"
            | "weather_condition"
            | "hour"
            | "day_of_week"
            | "month"
            | "is_weekend"
            | "hour_sin"
            | "hour_cos"
            | "day_sin"
            | "day_cos"
            | "temp_normalized"
            | "utilization_normalized"
            | "is_holiday"
    ) || name.starts_with("demand_")
        || name.starts_with("weather_")
}

/// Cyclical encoding for periodic features.
/// Returns (sin, cos) encoding to preserve continuity
pub fn cyclical_encode(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}

/// Value `offset` steps earlier; NaN before the series starts
pub fn lag(values: &[f64], offset: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= offset { values[i - offset] } else { f64::NAN })
        .collect()
}

/// Trailing mean over `window` values ending at (and including) each
/// position; NaN until the window is full or when it contains a gap
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            if slice.iter().any(|v| !v.is_finite()) {
                f64::NAN
            } else {
                slice.iter().sum::<f64>() / window as f64
            }
        })
        .collect()
}

/// Standardize with sample statistics over the finite values
fn z_scores(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let mean = finite.iter().mean();
    let std = finite.iter().std_dev();
    values.iter().map(|v| (v - mean) / std).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn hourly(n: usize, demand: impl Fn(usize) -> f64) -> Vec<Observation> {
        // 2024-01-01 was a Monday
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Observation::new(start + Duration::hours(i as i64), "st-1", Some(demand(i))))
            .collect()
    }

    #[test]
    fn test_lag() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let lagged = lag(&values, 2);

        assert!(lagged[0].is_nan());
        assert!(lagged[1].is_nan());
        assert_eq!(&lagged[2..], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rolling_mean() {
        let values = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        let means = rolling_mean(&values, 3);

        assert!(means[0].is_nan());
        assert!(means[1].is_nan());
        assert_eq!(means[2], 2.0); // Mean of [1.0, 2.0, 3.0]
        assert!(means[3].is_nan());
        assert!(means[4].is_nan());
    }

    #[test]
    fn test_cyclical_encoding_continuity() {
        let (s0, c0) = cyclical_encode(0.0, 24.0);
        let (s24, c24) = cyclical_encode(24.0, 24.0);
        assert!((s0 - s24).abs() < 1e-9);
        assert!((c0 - c24).abs() < 1e-9);

        let (s6, c6) = cyclical_encode(6.0, 24.0);
        assert!((s6 - 1.0).abs() < 1e-9);
        assert!(c6.abs() < 1e-9);
    }

    #[test]
    fn test_base_columns() {
        let frame = FeatureBuilder::default().build(&hourly(200, |i| i as f64));

        assert_eq!(frame.len(), 200);
        assert_eq!(
            frame.columns,
            vec![
                "hour", "day_of_week", "month", "is_weekend", "hour_sin", "hour_cos", "day_sin",
                "day_cos", "demand_lag_1h", "demand_lag_24h", "demand_lag_168h", "demand_ma_24h",
                "demand_ma_168h", "is_holiday",
            ]
        );

        let lag1 = frame.column("demand_lag_1h").unwrap();
        assert_eq!(lag1[0], 0.0);
        assert_eq!(lag1[10], 9.0);

        let lag168 = frame.column("demand_lag_168h").unwrap();
        assert_eq!(lag168[167], 0.0);
        assert_eq!(lag168[170], 2.0);

        let ma24 = frame.column("demand_ma_24h").unwrap();
        assert_eq!(ma24[22], 0.0);
        // mean of 0..=23
        assert_eq!(ma24[23], 11.5);

        let weekend = frame.column("is_weekend").unwrap();
        assert_eq!(weekend[0], 0.0);
        assert_eq!(weekend[5 * 24], 1.0); // Saturday
    }

    #[test]
    fn test_telemetry_and_weather_columns() {
        let mut obs = hourly(4, |_| 1.0);
        obs[0].temperature = Some(10.0);
        obs[1].temperature = Some(20.0);
        obs[0].weather_condition = Some("rain".to_string());
        obs[1].weather_condition = Some("clear".to_string());
        obs[2].station_utilization = Some(50.0);
        obs[3].extra.insert("grid_price".to_string(), 0.3);

        let frame = FeatureBuilder::default().build(&obs);

        assert_eq!(frame.column("temperature").unwrap(), vec![10.0, 20.0, 0.0, 0.0]);
        let z = frame.column("temp_normalized").unwrap();
        // sample std of [10, 20] is ~7.07
        assert!((z[0] + 0.7071).abs() < 1e-3);
        assert!((z[1] - 0.7071).abs() < 1e-3);
        assert_eq!(z[2], 0.0);

        assert_eq!(frame.column("weather_clear").unwrap(), vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(frame.column("weather_rain").unwrap(), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(frame.column("utilization_normalized").unwrap(), vec![0.0, 0.0, 0.5, 0.0]);
        assert_eq!(frame.column("grid_price").unwrap(), vec![0.0, 0.0, 0.0, 0.3]);

        let clear = frame.columns.iter().position(|c| c == "weather_clear").unwrap();
        let rain = frame.columns.iter().position(|c| c == "weather_rain").unwrap();
        assert!(clear < rain);
    }

    #[test]
    fn test_single_temperature_normalizes_to_zero() {
        let mut obs = hourly(3, |_| 1.0);
        for o in &mut obs {
            o.temperature = Some(15.0);
        }
        let frame = FeatureBuilder::default().build(&obs);
        assert!(frame.column("temp_normalized").unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_holidays() {
        let calendar = HolidayCalendar::from_mmdd(&["01-01".to_string()]).unwrap();
        let frame = FeatureBuilder::new(calendar).build(&hourly(30, |_| 1.0));
        let holiday = frame.column("is_holiday").unwrap();
        assert_eq!(holiday[0], 1.0);
        assert_eq!(holiday[25], 0.0);

        assert!(HolidayCalendar::from_mmdd(&["13-01".to_string()]).is_err());
        assert!(HolidayCalendar::from_mmdd(&["xmas".to_string()]).is_err());
    }

    #[test]
    fn test_align_to_schema() {
        let frame = FeatureFrame {
            columns: vec!["a".to_string(), "b".to_string()],
            rows: vec![vec![1.0, 2.0]],
        };
        let schema = vec!["b".to_string(), "c".to_string()];
        assert_eq!(frame.align_to(&schema), vec![vec![2.0, 0.0]]);
    }
}
