//! Charging demand forecasting
//!
//! A random forest and a gradient-boosted tree ensemble are trained on the
//! same scaled feature matrix and blended with fixed weights. Forecasts
//! seed future demand from the historical hour-of-week profile, re-derive
//! the features and score them with the blended ensemble.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::features::{FeatureBuilder, FeatureFrame};
use crate::domain::Observation;
use crate::ml::{
    calculate_metrics, chronological_split, permutation_importance, GradientBoostingParameters,
    Regressor, SmartcoreGradientBoosting, SmartcoreRandomForest, StandardScaler,
    ValidationMetrics,
};

pub const RF_WEIGHT: f64 = 0.6;
pub const GB_WEIGHT: f64 = 0.4;
pub const MIN_TRAINING_ROWS: usize = 100;
pub const TEST_FRACTION: f64 = 0.2;
/// Nominal coverage reported alongside forecasts
pub const CONFIDENCE_INTERVAL: (f64, f64) = (0.8, 0.95);

const BAND_Z: f64 = 1.96;
const BAND_STD_FACTOR: f64 = 0.1;
const IMPORTANCE_SEED: u64 = 42;

#[derive(Debug, thiserror::Error)]
pub enum DemandError {
    #[error("Insufficient training data: {rows} valid rows, need at least {required}")]
    InsufficientData { rows: usize, required: usize },

    #[error("Model not trained. Train the model before predicting")]
    NotTrained,

    #[error("No historical demand available")]
    EmptyHistory,

    #[error("Invalid prediction window: {0}")]
    InvalidWindow(String),

    #[error("Model error: {0}")]
    Model(#[from] anyhow::Error),

    #[error("Model file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Ensemble hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParams {
    pub rf_trees: usize,
    pub rf_max_depth: usize,
    pub gb: GradientBoostingParameters,
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self {
            rf_trees: 100,
            rf_max_depth: 10,
            gb: GradientBoostingParameters::default(),
        }
    }
}

/// One hourly point of a demand forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub predicted_demand: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Everything produced by a successful training run
#[derive(Debug, Serialize, Deserialize)]
pub struct DemandModel {
    rf_model: SmartcoreRandomForest,
    gb_model: SmartcoreGradientBoosting,
    pub rf_weight: f64,
    pub gb_weight: f64,
    scaler: StandardScaler,
    features: FeatureBuilder,
    /// Feature column order the regressors were fitted on
    pub feature_names: Vec<String>,
    pub accuracy: ValidationMetrics,
    pub feature_importance: BTreeMap<String, f64>,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
}

impl DemandModel {
    /// Fit the ensemble on `data`. Observations are put in time order first.
    pub fn train(
        data: &[Observation],
        features: FeatureBuilder,
        params: &EnsembleParams,
    ) -> Result<Self, DemandError> {
        let mut ordered = data.to_vec();
        ordered.sort_by_key(|o| o.timestamp);

        let frame = features.build(&ordered);

        // Drop rows without a usable target
        let (x, y): (Vec<Vec<f64>>, Vec<f64>) = frame
            .rows
            .into_iter()
            .zip(ordered.iter())
            .filter_map(|(row, obs)| obs.valid_demand().map(|d| (row, d)))
            .unzip();

        if x.len() < MIN_TRAINING_ROWS {
            return Err(DemandError::InsufficientData {
                rows: x.len(),
                required: MIN_TRAINING_ROWS,
            });
        }

        let (x_train, x_test) = chronological_split(&x, TEST_FRACTION)?;
        let (y_train, y_test) = chronological_split(&y, TEST_FRACTION)?;

        let scaler = StandardScaler::fit(&x_train)?;
        let x_train = scaler.transform(&x_train)?;
        let x_test = scaler.transform(&x_test)?;

        let rf_params = SmartcoreRandomForest::custom_parameters(
            params.rf_trees,
            Some(params.rf_max_depth),
            2,
        );
        let rf_model = SmartcoreRandomForest::train(&x_train, &y_train, rf_params)?;
        let gb_model = SmartcoreGradientBoosting::train(&x_train, &y_train, params.gb)?;

        let ensemble_pred = blend(&rf_model.predict(&x_test)?, &gb_model.predict(&x_test)?);
        let accuracy = calculate_metrics(&ensemble_pred, &y_test)?;

        let rf_importance = permutation_importance(&rf_model, &x_train, &y_train, IMPORTANCE_SEED)?;
        let gb_importance = permutation_importance(&gb_model, &x_train, &y_train, IMPORTANCE_SEED)?;
        let feature_importance = frame
            .columns
            .iter()
            .zip(blend(&rf_importance, &gb_importance))
            .map(|(name, score)| (name.clone(), score))
            .collect();

        Ok(Self {
            rf_model,
            gb_model,
            rf_weight: RF_WEIGHT,
            gb_weight: GB_WEIGHT,
            scaler,
            features,
            feature_names: frame.columns,
            accuracy,
            feature_importance,
            trained_at: Utc::now(),
            training_samples: y.len(),
        })
    }

    /// Score a feature frame with the blended ensemble
    pub fn predict_frame(&self, frame: &FeatureFrame) -> Result<Vec<f64>, DemandError> {
        let x = self.scaler.transform(&frame.align_to(&self.feature_names))?;
        let rf = self.rf_model.predict(&x)?;
        let gb = self.gb_model.predict(&x)?;
        Ok(rf
            .iter()
            .zip(gb.iter())
            .map(|(r, g)| self.rf_weight * r + self.gb_weight * g)
            .collect())
    }

    pub fn feature_builder(&self) -> &FeatureBuilder {
        &self.features
    }
}

fn blend(rf: &[f64], gb: &[f64]) -> Vec<f64> {
    rf.iter()
        .zip(gb.iter())
        .map(|(r, g)| RF_WEIGHT * r + GB_WEIGHT * g)
        .collect()
}

/// Hourly timestamps from `start` to `end`, both inclusive
pub fn hourly_grid(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut grid = Vec::new();
    let mut ts = start;
    while ts <= end {
        grid.push(ts);
        ts += Duration::hours(1);
    }
    grid
}

/// Mean historical demand per (hour, weekday) plus the global mean
struct DemandProfile {
    slots: HashMap<(u32, u32), f64>,
    global_mean: f64,
}

impl DemandProfile {
    fn from_history(history: &[Observation]) -> Result<Self, DemandError> {
        let mut sums: HashMap<(u32, u32), (f64, usize)> = HashMap::new();
        let mut all = Vec::new();
        for obs in history {
            if let Some(demand) = obs.valid_demand() {
                let key = (obs.timestamp.hour(), obs.timestamp.weekday().num_days_from_monday());
                let entry = sums.entry(key).or_insert((0.0, 0));
                entry.0 += demand;
                entry.1 += 1;
                all.push(demand);
            }
        }
        if all.is_empty() {
            return Err(DemandError::EmptyHistory);
        }

        Ok(Self {
            slots: sums
                .into_iter()
                .map(|(key, (sum, count))| (key, sum / count as f64))
                .collect(),
            global_mean: all.iter().mean(),
        })
    }

    fn demand_at(&self, ts: &DateTime<Utc>) -> f64 {
        self.slots
            .get(&(ts.hour(), ts.weekday().num_days_from_monday()))
            .copied()
            .unwrap_or(self.global_mean)
    }
}

/// Apply caller-supplied feature overrides to a synthetic observation
fn apply_overrides(obs: &mut Observation, overrides: &serde_json::Map<String, serde_json::Value>) {
    for (key, value) in overrides {
        match (key.as_str(), value) {
            ("temperature", v) => obs.temperature = v.as_f64(),
            ("station_utilization", v) => obs.station_utilization = v.as_f64(),
            ("demand", v) => match v.as_f64() {
                Some(n) => obs.demand = Some(n),
                None => warn!(feature = %key, "ignoring non-numeric demand override"),
            },
            ("weather_condition", serde_json::Value::String(s)) => {
                obs.weather_condition = Some(s.clone())
            }
            (_, serde_json::Value::Bool(b)) => {
                obs.extra.insert(key.clone(), if *b { 1.0 } else { 0.0 });
            }
            (_, v) => match v.as_f64() {
                Some(n) => {
                    obs.extra.insert(key.clone(), n);
                }
                None => warn!(feature = %key, "ignoring non-numeric feature override"),
            },
        }
    }
}

/// Process-wide demand predictor. Holds the latest trained bundle; training
/// swaps in a complete new bundle so concurrent forecasts never observe a
/// partially trained model.
#[derive(Debug)]
pub struct DemandPredictor {
    params: EnsembleParams,
    features: FeatureBuilder,
    max_horizon_hours: usize,
    model: RwLock<Option<Arc<DemandModel>>>,
}

impl DemandPredictor {
    pub fn new(params: EnsembleParams, features: FeatureBuilder, max_horizon_hours: usize) -> Self {
        Self {
            params,
            features,
            max_horizon_hours,
            model: RwLock::new(None),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().is_some()
    }

    pub fn current_model(&self) -> Option<Arc<DemandModel>> {
        self.model.read().clone()
    }

    fn trained(&self) -> Result<Arc<DemandModel>, DemandError> {
        self.current_model().ok_or(DemandError::NotTrained)
    }

    /// Train a new ensemble and make it current. On failure the previous
    /// model, if any, stays in place.
    pub fn train(&self, data: &[Observation]) -> Result<ValidationMetrics, DemandError> {
        info!(rows = data.len(), "Starting demand prediction model training");

        let model = match DemandModel::train(data, self.features.clone(), &self.params) {
            Ok(model) => model,
            Err(e) => {
                tracing::error!(error = %e, "Model training failed");
                return Err(e);
            }
        };
        let accuracy = model.accuracy;
        *self.model.write() = Some(Arc::new(model));

        info!(
            r2 = accuracy.r2,
            rmse = accuracy.rmse,
            mae = accuracy.mae,
            mape = accuracy.mape,
            "Model training completed"
        );
        Ok(accuracy)
    }

    /// Check a forecast window against ordering and the horizon limit.
    /// Independent of whether a model is trained.
    pub fn validate_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), DemandError> {
        if end < start {
            return Err(DemandError::InvalidWindow(format!(
                "end {end} is before start {start}"
            )));
        }
        let span_hours = (end - start).num_hours().saturating_add(1);
        if span_hours > self.max_horizon_hours as i64 {
            return Err(DemandError::InvalidWindow(format!(
                "{span_hours} hours exceeds the {} hour limit",
                self.max_horizon_hours
            )));
        }
        Ok(())
    }

    /// Forecast hourly demand between `start` and `end` (inclusive).
    pub fn predict(
        &self,
        history: &[Observation],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        overrides: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Vec<DemandForecastPoint>, DemandError> {
        self.validate_window(start, end)?;
        let model = self.trained()?;

        let profile = DemandProfile::from_history(history)?;
        let station_id = history.first().map(|o| o.station_id.clone()).unwrap_or_default();
        let timestamps = hourly_grid(start, end);

        let synthetic: Vec<Observation> = timestamps
            .iter()
            .map(|ts| {
                let mut obs = Observation::new(*ts, station_id.clone(), Some(profile.demand_at(ts)));
                if let Some(overrides) = overrides {
                    apply_overrides(&mut obs, overrides);
                }
                obs
            })
            .collect();

        let frame = model.feature_builder().build(&synthetic);
        let predictions = model.predict_frame(&frame)?;

        let band = if predictions.len() > 1 {
            BAND_Z * predictions.iter().population_std_dev() * BAND_STD_FACTOR
        } else {
            0.0
        };

        Ok(timestamps
            .into_iter()
            .zip(predictions)
            .map(|(timestamp, predicted_demand)| DemandForecastPoint {
                timestamp,
                predicted_demand,
                lower_bound: predicted_demand - band,
                upper_bound: predicted_demand + band,
            })
            .collect())
    }

    pub fn model_accuracy(&self) -> Option<ValidationMetrics> {
        self.current_model().map(|m| m.accuracy)
    }

    pub fn feature_importance(&self) -> BTreeMap<String, f64> {
        self.current_model()
            .map(|m| m.feature_importance.clone())
            .unwrap_or_default()
    }

    pub fn confidence_interval(&self) -> (f64, f64) {
        CONFIDENCE_INTERVAL
    }

    /// Persist the current model. Does nothing when untrained.
    pub fn save(&self, path: &Path) -> Result<(), DemandError> {
        let Some(model) = self.current_model() else {
            warn!(path = %path.display(), "No trained model to save");
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let bytes = bincode::serialize(model.as_ref())?;
        std::fs::write(path, bytes)?;
        info!(path = %path.display(), "Saved demand model");
        Ok(())
    }

    /// Load a model written by [`DemandPredictor::save`] and make it current.
    pub fn load(&self, path: &Path) -> Result<(), DemandError> {
        let bytes = std::fs::read(path)?;
        let model: DemandModel = bincode::deserialize(&bytes)?;
        info!(
            path = %path.display(),
            features = model.feature_names.len(),
            trained_at = %model.trained_at,
            "Loaded demand model"
        );
        *self.model.write() = Some(Arc::new(model));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn small_params() -> EnsembleParams {
        EnsembleParams {
            rf_trees: 10,
            rf_max_depth: 6,
            gb: GradientBoostingParameters {
                n_estimators: 20,
                max_depth: 3,
                ..Default::default()
            },
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// Daily demand cycle peaking in the evening, lower on weekends
    fn history(hours: usize) -> Vec<Observation> {
        (0..hours)
            .map(|i| {
                let ts = start() + Duration::hours(i as i64);
                let daily = 10.0 + 5.0 * (2.0 * std::f64::consts::PI * (ts.hour() as f64 - 12.0) / 24.0).sin();
                let weekend = if ts.weekday().num_days_from_monday() >= 5 { 0.7 } else { 1.0 };
                let mut obs = Observation::new(ts, "st-1", Some(daily * weekend));
                obs.temperature = Some(5.0 + (i % 24) as f64 * 0.5);
                obs
            })
            .collect()
    }

    fn predictor() -> DemandPredictor {
        DemandPredictor::new(small_params(), FeatureBuilder::default(), 744)
    }

    #[test]
    fn test_train_requires_minimum_rows() {
        let predictor = predictor();
        let err = predictor.train(&history(99)).unwrap_err();
        assert!(matches!(
            err,
            DemandError::InsufficientData { rows: 99, required: 100 }
        ));
        assert!(!predictor.is_trained());
    }

    #[test]
    fn test_missing_targets_do_not_count() {
        let mut data = history(120);
        for obs in data.iter_mut().take(30) {
            obs.demand = None;
        }
        let err = predictor().train(&data).unwrap_err();
        assert!(matches!(err, DemandError::InsufficientData { rows: 90, .. }));
    }

    #[test]
    fn test_predict_before_training_fails() {
        let err = predictor()
            .predict(&history(48), start(), start() + Duration::hours(5), None)
            .unwrap_err();
        assert!(matches!(err, DemandError::NotTrained));
    }

    #[test]
    fn test_train_reports_metrics_and_importance() {
        let predictor = predictor();
        let metrics = predictor.train(&history(24 * 14)).unwrap();

        assert!(metrics.mae.is_finite());
        assert!(metrics.rmse >= metrics.mae);
        assert!(metrics.r2 > 0.5, "r2 was {}", metrics.r2);

        let model = predictor.current_model().unwrap();
        assert_eq!(model.rf_weight, 0.6);
        assert_eq!(model.gb_weight, 0.4);
        assert_eq!(model.training_samples, 24 * 14);

        let importance = predictor.feature_importance();
        assert_eq!(importance.len(), model.feature_names.len());
        let total: f64 = importance.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_training_is_deterministic() {
        let data = history(24 * 10);
        let a = predictor().train(&data).unwrap();
        let b = predictor().train(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffled_input_trains_like_ordered_input() {
        let data = history(24 * 10);
        let mut shuffled = data.clone();
        shuffled.reverse();
        let a = predictor().train(&data).unwrap();
        let b = predictor().train(&shuffled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_predict_grid_and_bands() {
        let predictor = predictor();
        predictor.train(&history(24 * 14)).unwrap();

        let from = start() + Duration::days(14);
        let to = from + Duration::hours(23);
        let points = predictor.predict(&history(24 * 14), from, to, None).unwrap();

        assert_eq!(points.len(), 24);
        assert_eq!(points[0].timestamp, from);
        assert_eq!(points[23].timestamp, to);
        for p in &points {
            assert!(p.lower_bound <= p.predicted_demand);
            assert!(p.predicted_demand <= p.upper_bound);
            let below = p.predicted_demand - p.lower_bound;
            let above = p.upper_bound - p.predicted_demand;
            assert!((below - above).abs() < 1e-9);
        }
    }

    #[test]
    fn test_band_width_follows_prediction_spread() {
        let predictor = predictor();
        predictor.train(&history(24 * 14)).unwrap();
        let from = start() + Duration::days(14);
        let points = predictor
            .predict(&history(24 * 14), from, from + Duration::hours(11), None)
            .unwrap();

        let preds: Vec<f64> = points.iter().map(|p| p.predicted_demand).collect();
        let expected = 1.96 * 0.1 * preds.iter().population_std_dev();
        let width = points[0].upper_bound - points[0].predicted_demand;
        assert!((width - expected).abs() < 1e-9);
    }

    #[test]
    fn test_overrides_are_accepted() {
        let predictor = predictor();
        predictor.train(&history(24 * 14)).unwrap();

        let overrides = serde_json::json!({
            "temperature": 30.0,
            "weather_condition": "rain",
            "event_nearby": true,
            "label": "ignored"
        });
        let from = start() + Duration::days(14);
        let points = predictor
            .predict(
                &history(48),
                from,
                from + Duration::hours(2),
                overrides.as_object(),
            )
            .unwrap();
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.predicted_demand.is_finite()));
    }

    #[test]
    fn test_predict_rejects_bad_windows() {
        let predictor = DemandPredictor::new(small_params(), FeatureBuilder::default(), 48);
        predictor.train(&history(24 * 7)).unwrap();

        let reversed = predictor.predict(&history(48), start() + Duration::hours(5), start(), None);
        assert!(matches!(reversed, Err(DemandError::InvalidWindow(_))));

        let too_long = predictor.predict(&history(48), start(), start() + Duration::hours(48), None);
        assert!(matches!(too_long, Err(DemandError::InvalidWindow(_))));

        let empty = predictor.predict(&[], start(), start() + Duration::hours(1), None);
        assert!(matches!(empty, Err(DemandError::EmptyHistory)));
    }

    #[test]
    fn test_window_checked_before_training_state() {
        let predictor = DemandPredictor::new(small_params(), FeatureBuilder::default(), 48);
        assert!(!predictor.is_trained());

        let reversed = predictor.predict(&history(48), start() + Duration::days(60), start(), None);
        assert!(matches!(reversed, Err(DemandError::InvalidWindow(_))));

        let far = start() + Duration::days(365 * 8000);
        assert!(matches!(
            predictor.validate_window(start(), far),
            Err(DemandError::InvalidWindow(_))
        ));
        assert!(predictor.validate_window(start(), start() + Duration::hours(47)).is_ok());
    }

    #[test]
    fn test_demand_override_replaces_seeded_value() {
        let mut obs = Observation::new(start(), "st-1", Some(3.0));
        let overrides = serde_json::json!({ "demand": 11.5 });
        apply_overrides(&mut obs, overrides.as_object().unwrap());
        assert_eq!(obs.demand, Some(11.5));
        assert!(obs.extra.is_empty());

        let ignored = serde_json::json!({ "demand": "high" });
        apply_overrides(&mut obs, ignored.as_object().unwrap());
        assert_eq!(obs.demand, Some(11.5));
    }

    #[test]
    fn test_profile_falls_back_to_global_mean() {
        // Only Monday 00:00 and 01:00 are known
        let history = vec![
            Observation::new(start(), "st-1", Some(4.0)),
            Observation::new(start() + Duration::hours(1), "st-1", Some(8.0)),
            Observation::new(start() + Duration::hours(2), "st-1", None),
        ];
        let profile = DemandProfile::from_history(&history).unwrap();

        assert_eq!(profile.demand_at(&start()), 4.0);
        assert_eq!(profile.demand_at(&(start() + Duration::weeks(1))), 4.0);
        assert_eq!(profile.demand_at(&(start() + Duration::hours(5))), 6.0);
    }

    #[test]
    fn test_hourly_grid_is_inclusive() {
        let grid = hourly_grid(start(), start() + Duration::hours(3));
        assert_eq!(grid.len(), 4);
        assert_eq!(hourly_grid(start(), start()).len(), 1);
        assert!(hourly_grid(start() + Duration::hours(1), start()).is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("demand.bin");

        let trained = predictor();
        trained.train(&history(24 * 8)).unwrap();
        trained.save(&path).unwrap();

        let restored = predictor();
        restored.load(&path).unwrap();
        assert!(restored.is_trained());
        assert_eq!(restored.model_accuracy(), trained.model_accuracy());

        let from = start() + Duration::days(8);
        let to = from + Duration::hours(5);
        let a = trained.predict(&history(24 * 8), from, to, None).unwrap();
        let b = restored.predict(&history(24 * 8), from, to, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_save_without_model_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demand.bin");
        predictor().save(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_retrain_keeps_previous_model() {
        let predictor = predictor();
        let first = predictor.train(&history(24 * 7)).unwrap();
        assert!(predictor.train(&history(10)).is_err());
        assert_eq!(predictor.model_accuracy(), Some(first));
    }
}
