//! Historical data access
//!
//! Every model and report reads through [`DataSource`], so the service can
//! run against simulated data or a recorded dataset without code changes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, DataSourceKind};
use crate::domain::{ChargingSession, MarketSnapshot, Observation, PortTelemetry};

pub mod memory;
pub mod simulated;

pub use memory::{Dataset, MemoryDataSource};
pub use simulated::SimulatedDataSource;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Hourly observations for a station within `[start, end]`, oldest first
    async fn station_data(
        &self,
        station_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>>;

    async fn market_data(&self, station_id: &str) -> Result<MarketSnapshot>;

    /// Telemetry for one port recorded at or after `since`
    async fn telemetry_data(&self, port_id: &str, since: DateTime<Utc>) -> Result<Vec<PortTelemetry>>;

    /// Telemetry across every known port recorded at or after `since`
    async fn fleet_telemetry(&self, since: DateTime<Utc>) -> Result<Vec<PortTelemetry>>;

    /// Sessions of a tenant that started within `[start, end]`
    async fn sessions(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ChargingSession>>;
}

pub async fn build_data_source(cfg: &Config) -> Result<Arc<dyn DataSource>> {
    match cfg.data.source {
        DataSourceKind::Simulated => {
            info!("Using simulated data source");
            Ok(Arc::new(SimulatedDataSource::new()))
        }
        DataSourceKind::File => {
            let source = MemoryDataSource::from_json_file(&cfg.data.path).await?;
            info!(path = %cfg.data.path.display(), "Using dataset file");
            Ok(Arc::new(source))
        }
    }
}
