use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Periodic telemetry sample from a single charging port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortTelemetry {
    pub timestamp: DateTime<Utc>,
    pub station_id: String,
    pub port_id: String,
    /// Connector temperature (Celsius)
    pub temperature_c: f64,
    pub voltage_v: f64,
    pub current_a: f64,
    /// Faults logged during the sample interval
    pub error_count: u32,
    pub energy_kwh: f64,
}

/// Live reading submitted with a maintenance request. Missing metrics are
/// skipped when scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    #[serde(default, alias = "temperature")]
    pub temperature_c: Option<f64>,
    #[serde(default, alias = "voltage")]
    pub voltage_v: Option<f64>,
    #[serde(default, alias = "current")]
    pub current_a: Option<f64>,
    #[serde(default, alias = "errors")]
    pub error_count: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_accepts_short_names() {
        let reading: TelemetryReading =
            serde_json::from_str(r#"{"temperature": 41.5, "voltage_v": 228.0, "errors": 2}"#).unwrap();
        assert_eq!(reading.temperature_c, Some(41.5));
        assert_eq!(reading.voltage_v, Some(228.0));
        assert_eq!(reading.current_a, None);
        assert_eq!(reading.error_count, Some(2.0));
    }
}
