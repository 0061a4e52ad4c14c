use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::DataSource;
use crate::domain::{ChargingSession, MarketSnapshot, Observation, PortTelemetry};

/// Recorded data, as stored in a JSON dataset file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub markets: Vec<MarketSnapshot>,
    #[serde(default)]
    pub telemetry: Vec<PortTelemetry>,
    #[serde(default)]
    pub sessions: Vec<ChargingSession>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDataSource {
    data: Dataset,
}

impl MemoryDataSource {
    pub fn new(mut data: Dataset) -> Self {
        data.observations.sort_by_key(|o| o.timestamp);
        data.telemetry.sort_by_key(|t| t.timestamp);
        data.sessions.sort_by_key(|s| s.started_at);
        Self { data }
    }

    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading dataset {}", path.display()))?;
        let data: Dataset = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing dataset {}", path.display()))?;
        debug!(
            observations = data.observations.len(),
            markets = data.markets.len(),
            telemetry = data.telemetry.len(),
            sessions = data.sessions.len(),
            "Dataset loaded"
        );
        Ok(Self::new(data))
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn station_data(
        &self,
        station_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>> {
        Ok(self
            .data
            .observations
            .iter()
            .filter(|o| o.station_id == station_id && o.timestamp >= start && o.timestamp <= end)
            .cloned()
            .collect())
    }

    async fn market_data(&self, station_id: &str) -> Result<MarketSnapshot> {
        self.data
            .markets
            .iter()
            .find(|m| m.station_id == station_id)
            .cloned()
            .ok_or_else(|| anyhow!("no market data for station {station_id}"))
    }

    async fn telemetry_data(&self, port_id: &str, since: DateTime<Utc>) -> Result<Vec<PortTelemetry>> {
        Ok(self
            .data
            .telemetry
            .iter()
            .filter(|t| t.port_id == port_id && t.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn fleet_telemetry(&self, since: DateTime<Utc>) -> Result<Vec<PortTelemetry>> {
        Ok(self
            .data
            .telemetry
            .iter()
            .filter(|t| t.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn sessions(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ChargingSession>> {
        Ok(self
            .data
            .sessions
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.started_at >= start && s.started_at <= end)
            .cloned()
            .collect())
    }
}
