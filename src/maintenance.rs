//! Predictive maintenance for charging ports
//!
//! A live telemetry reading is scored against a per-metric baseline. The
//! baseline comes from the port's own history when there is enough of it,
//! otherwise from the fleet-wide baseline fitted by [`MaintenancePredictor::retrain`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use itertools::Itertools;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::MaintenanceConfig;
use crate::domain::{PortTelemetry, TelemetryReading};

/// Samples (hourly) for a port baseline to reach full confidence
const FULL_CONFIDENCE_SAMPLES: f64 = 720.0;
const TREND_WEIGHT: f64 = 0.15;
/// Daily temperature rise (Celsius) that earns the full trend contribution
const TREND_SATURATION_C_PER_DAY: f64 = 2.0;
const FAILURE_SCORE: f64 = 0.3;
const IMMEDIATE_VISIT_SCORE: f64 = 0.7;
const MAX_FAILURE_HORIZON_DAYS: f64 = 365.0;

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("Insufficient telemetry: {rows} samples, {required} required")]
    InsufficientData { rows: usize, required: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Voltage,
    Current,
    Errors,
}

impl Metric {
    const ALL: [Metric; 4] = [Metric::Temperature, Metric::Voltage, Metric::Current, Metric::Errors];

    fn weight(self) -> f64 {
        match self {
            Metric::Temperature => 0.35,
            Metric::Voltage => 0.2,
            Metric::Current => 0.15,
            Metric::Errors => 0.3,
        }
    }

    /// Smallest spread used when scoring, so a flat history does not turn
    /// every small deviation into an outlier
    fn min_std(self) -> f64 {
        match self {
            Metric::Temperature => 1.0,
            Metric::Voltage => 1.0,
            Metric::Current => 1.0,
            Metric::Errors => 0.5,
        }
    }

    fn sample_value(self, sample: &PortTelemetry) -> f64 {
        match self {
            Metric::Temperature => sample.temperature_c,
            Metric::Voltage => sample.voltage_v,
            Metric::Current => sample.current_a,
            Metric::Errors => sample.error_count as f64,
        }
    }

    fn reading_value(self, reading: &TelemetryReading) -> Option<f64> {
        let value = match self {
            Metric::Temperature => reading.temperature_c,
            Metric::Voltage => reading.voltage_v,
            Metric::Current => reading.current_a,
            Metric::Errors => reading.error_count,
        };
        value.filter(|v| v.is_finite())
    }

    fn description(self) -> &'static str {
        match self {
            Metric::Temperature => "Connector temperature outside normal range",
            Metric::Voltage => "Supply voltage deviation",
            Metric::Current => "Abnormal charging current",
            Metric::Errors => "Elevated fault rate",
        }
    }

    fn action(self) -> &'static str {
        match self {
            Metric::Temperature => "Inspect connector cooling and cable for overheating",
            Metric::Voltage => "Check supply voltage and power electronics",
            Metric::Current => "Verify current regulation and load balancing",
            Metric::Errors => "Review fault logs and update port firmware",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBaseline {
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub temperature: MetricBaseline,
    pub voltage: MetricBaseline,
    pub current: MetricBaseline,
    pub errors: MetricBaseline,
    pub samples: usize,
}

impl Baseline {
    fn fit(samples: &[PortTelemetry]) -> Self {
        let fit_metric = |metric: Metric| {
            let values: Vec<f64> = samples.iter().map(|s| metric.sample_value(s)).collect();
            let std = if values.len() > 1 { values.iter().std_dev() } else { 0.0 };
            MetricBaseline {
                mean: values.iter().mean(),
                std,
            }
        };
        Self {
            temperature: fit_metric(Metric::Temperature),
            voltage: fit_metric(Metric::Voltage),
            current: fit_metric(Metric::Current),
            errors: fit_metric(Metric::Errors),
            samples: samples.len(),
        }
    }

    /// Typical values for an AC port on a 230 V supply
    fn builtin(cfg: &MaintenanceConfig) -> Self {
        Self {
            temperature: MetricBaseline { mean: 35.0, std: 8.0 },
            voltage: MetricBaseline {
                mean: cfg.voltage_nominal_v,
                std: cfg.voltage_nominal_v * 0.02,
            },
            current: MetricBaseline { mean: 32.0, std: 8.0 },
            errors: MetricBaseline { mean: 0.5, std: 1.0 },
            samples: 0,
        }
    }

    fn get(&self, metric: Metric) -> MetricBaseline {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Voltage => self.voltage,
            Metric::Current => self.current,
            Metric::Errors => self.errors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    Port,
    Fleet,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub metric: Metric,
    pub value: f64,
    pub baseline: f64,
    pub z_score: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenancePrediction {
    pub maintenance_score: f64,
    pub predicted_failure_date: Option<DateTime<Utc>>,
    pub recommended_actions: Vec<String>,
    pub confidence: f64,
    pub risk_factors: Vec<RiskFactor>,
    pub baseline_source: BaselineSource,
}

pub struct MaintenancePredictor {
    cfg: MaintenanceConfig,
    fleet: RwLock<Option<Baseline>>,
}

impl MaintenancePredictor {
    pub fn new(cfg: MaintenanceConfig) -> Self {
        Self {
            cfg,
            fleet: RwLock::new(None),
        }
    }

    pub fn fleet_baseline(&self) -> Option<Baseline> {
        self.fleet.read().clone()
    }

    fn baseline_for(&self, history: &[PortTelemetry]) -> (Baseline, BaselineSource) {
        if history.len() >= self.cfg.min_history {
            return (Baseline::fit(history), BaselineSource::Port);
        }
        if let Some(fleet) = self.fleet.read().clone() {
            return (fleet, BaselineSource::Fleet);
        }
        (Baseline::builtin(&self.cfg), BaselineSource::Default)
    }

    fn breaches_limit(&self, metric: Metric, value: f64) -> bool {
        match metric {
            Metric::Temperature => value >= self.cfg.temperature_limit_c,
            Metric::Voltage => {
                let band = self.cfg.voltage_nominal_v * self.cfg.voltage_tolerance;
                (value - self.cfg.voltage_nominal_v).abs() > band
            }
            Metric::Current => false,
            Metric::Errors => value >= self.cfg.error_limit,
        }
    }

    pub fn predict(
        &self,
        history: &[PortTelemetry],
        reading: &TelemetryReading,
        now: DateTime<Utc>,
    ) -> MaintenancePrediction {
        let (baseline, source) = self.baseline_for(history);

        let mut weighted = 0.0;
        let mut weight_total = 0.0;
        let mut risk_factors = Vec::new();

        for metric in Metric::ALL {
            let Some(value) = metric.reading_value(reading) else {
                continue;
            };
            let base = baseline.get(metric);
            let z = (value - base.mean) / base.std.max(metric.min_std());
            let breach = self.breaches_limit(metric, value);
            let risk = if breach {
                1.0
            } else {
                ((z.abs() - 1.0) / 3.0).clamp(0.0, 1.0)
            };

            weighted += metric.weight() * risk;
            weight_total += metric.weight();

            let severity = if breach || z.abs() >= 3.0 {
                Some(Severity::High)
            } else if z.abs() >= 2.0 {
                Some(Severity::Medium)
            } else {
                None
            };
            if let Some(severity) = severity {
                risk_factors.push(RiskFactor {
                    factor: metric.description().to_string(),
                    metric,
                    value,
                    baseline: base.mean,
                    z_score: z,
                    severity,
                });
            }
        }

        let trend = daily_temperature_trend(history);
        let trend_risk = if trend > 0.0 {
            TREND_WEIGHT * (trend / TREND_SATURATION_C_PER_DAY).min(1.0)
        } else {
            0.0
        };
        let base_score = if weight_total > 0.0 { weighted / weight_total } else { 0.0 };
        let maintenance_score = (base_score + trend_risk).clamp(0.0, 1.0);

        let predicted_failure_date = (maintenance_score >= FAILURE_SCORE).then(|| {
            let current_temp = reading
                .temperature_c
                .or_else(|| history.iter().max_by_key(|s| s.timestamp).map(|s| s.temperature_c));
            let days = match current_temp {
                Some(t) if trend > 0.0 && t < self.cfg.temperature_limit_c => {
                    (self.cfg.temperature_limit_c - t) / trend
                }
                _ => (1.0 - maintenance_score) * 90.0,
            };
            let days = days.clamp(1.0, MAX_FAILURE_HORIZON_DAYS).ceil() as i64;
            now + Duration::days(days)
        });

        let mut recommended_actions: Vec<String> = risk_factors
            .iter()
            .map(|f| f.metric)
            .unique()
            .map(|m| m.action().to_string())
            .collect();
        if maintenance_score >= IMMEDIATE_VISIT_SCORE {
            recommended_actions.insert(0, "Schedule immediate on-site maintenance visit".to_string());
        }
        if recommended_actions.is_empty() {
            recommended_actions.push("Continue routine monitoring".to_string());
        }

        let confidence = match source {
            BaselineSource::Port => {
                0.3 + 0.6 * (baseline.samples as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0)
            }
            BaselineSource::Fleet | BaselineSource::Default => 0.3,
        };

        debug!(
            score = maintenance_score,
            trend_c_per_day = trend,
            ?source,
            factors = risk_factors.len(),
            "Maintenance score computed"
        );

        MaintenancePrediction {
            maintenance_score,
            predicted_failure_date,
            recommended_actions,
            confidence,
            risk_factors,
            baseline_source: source,
        }
    }

    /// Refit the fleet baseline from telemetry across all ports
    pub fn retrain(&self, fleet: &[PortTelemetry]) -> Result<BTreeMap<String, f64>, MaintenanceError> {
        if fleet.len() < self.cfg.min_history {
            return Err(MaintenanceError::InsufficientData {
                rows: fleet.len(),
                required: self.cfg.min_history,
            });
        }

        let baseline = Baseline::fit(fleet);
        let ports = fleet.iter().map(|s| &s.port_id).unique().count();

        info!(
            samples = baseline.samples,
            ports,
            temperature_mean = baseline.temperature.mean,
            "Fleet maintenance baseline updated"
        );

        let summary = BTreeMap::from([
            ("samples".to_string(), baseline.samples as f64),
            ("ports".to_string(), ports as f64),
            ("metrics".to_string(), Metric::ALL.len() as f64),
        ]);
        *self.fleet.write() = Some(baseline);
        Ok(summary)
    }
}

/// Slope of daily mean temperature (Celsius per day)
fn daily_temperature_trend(history: &[PortTelemetry]) -> f64 {
    let daily: BTreeMap<NaiveDate, Vec<f64>> = history
        .iter()
        .map(|s| (s.timestamp.date_naive(), s.temperature_c))
        .into_group_map()
        .into_iter()
        .collect();
    let means: Vec<f64> = daily.values().map(|v| v.iter().mean()).collect();
    linear_slope(&means)
}

fn linear_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        numerator += (x - x_mean) * (y - y_mean);
        denominator += (x - x_mean).powi(2);
    }

    if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}
