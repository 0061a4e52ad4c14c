//! Shared application state and model lifecycle

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analytics::AnalyticsController;
use crate::config::Config;
use crate::forecast::{DemandPredictor, EnsembleParams, FeatureBuilder, HolidayCalendar};
use crate::maintenance::MaintenancePredictor;
use crate::ml::ValidationMetrics;
use crate::optimizer::PricingOptimizer;
use crate::repo::{build_data_source, DataSource};

/// Accuracy of every model after a retrain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelAccuracies {
    pub demand_prediction: ValidationMetrics,
    pub pricing_optimization: BTreeMap<String, f64>,
    pub maintenance_prediction: BTreeMap<String, f64>,
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub data: Arc<dyn DataSource>,
    pub demand: Arc<DemandPredictor>,
    pub pricing: Arc<PricingOptimizer>,
    pub maintenance: Arc<MaintenancePredictor>,
    pub analytics: Arc<AnalyticsController>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let data = build_data_source(&cfg).await?;
        Self::with_data_source(cfg, data)
    }

    /// State over an existing data source, with untrained models
    pub fn with_data_source(cfg: Config, data: Arc<dyn DataSource>) -> Result<Self> {
        let holidays = HolidayCalendar::from_mmdd(&cfg.features.holidays)
            .context("invalid holiday calendar")?;
        let demand = DemandPredictor::new(
            EnsembleParams::default(),
            FeatureBuilder::new(holidays),
            cfg.demand.max_horizon_hours,
        );

        Ok(Self {
            demand: Arc::new(demand),
            pricing: Arc::new(PricingOptimizer::new(cfg.pricing.clone())),
            maintenance: Arc::new(MaintenancePredictor::new(cfg.maintenance.clone())),
            analytics: Arc::new(AnalyticsController::new(data.clone(), cfg.analytics.clone())),
            data,
            cfg: Arc::new(cfg),
            started_at: Utc::now(),
        })
    }

    /// Load the persisted demand model, or train everything when there is
    /// none. Failures leave the service running untrained.
    pub async fn initialize_models(&self) {
        if let Some(path) = self.cfg.models.model_path.clone() {
            if path.exists() {
                let demand = self.demand.clone();
                let loaded = tokio::task::spawn_blocking(move || demand.load(&path)).await;
                match loaded {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => warn!(error = %e, "Could not load demand model, retraining"),
                    Err(e) => warn!(error = %e, "Model loading task failed"),
                }
            }
        }

        if !self.cfg.models.train_on_startup {
            info!("Startup training disabled, models stay untrained until retrain");
            return;
        }

        match self.retrain_all().await {
            Ok(accuracies) => info!(
                r2 = accuracies.demand_prediction.r2,
                mape = accuracies.demand_prediction.mape,
                "Startup training completed"
            ),
            Err(e) => warn!(error = %e, "Startup training failed"),
        }
    }

    async fn retrain_demand(&self, now: DateTime<Utc>) -> Result<ValidationMetrics> {
        let station = &self.cfg.models.training_station_id;
        let start = now - Duration::days(self.cfg.models.training_window_days);
        let data = self.data.station_data(station, start, now).await?;
        info!(station = %station, rows = data.len(), "Fetched demand training data");

        let demand = self.demand.clone();
        let model_path = self.cfg.models.model_path.clone();
        let accuracy = tokio::task::spawn_blocking(move || -> Result<ValidationMetrics> {
            let accuracy = demand.train(&data)?;
            if let Some(path) = model_path {
                demand.save(&path)?;
            }
            Ok(accuracy)
        })
        .await??;
        Ok(accuracy)
    }

    pub async fn retrain_all(&self) -> Result<ModelAccuracies> {
        let now = Utc::now();

        let demand_prediction = self.retrain_demand(now).await.context("demand model")?;

        let market = self
            .data
            .market_data(&self.cfg.models.training_station_id)
            .await?;
        let pricing_optimization = self.pricing.retrain(&market).context("pricing model")?;

        let since = now - Duration::days(self.cfg.data.telemetry_days);
        let fleet = self.data.fleet_telemetry(since).await?;
        let maintenance_prediction = self
            .maintenance
            .retrain(&fleet)
            .context("maintenance model")?;

        Ok(ModelAccuracies {
            demand_prediction,
            pricing_optimization,
            maintenance_prediction,
        })
    }
}
