use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One hourly demand observation for a charging station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub station_id: String,
    /// Delivered charging demand (kW averaged over the hour). `None` marks a gap.
    #[serde(default)]
    pub demand: Option<f64>,
    /// Ambient temperature (Celsius)
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Free-form weather label, e.g. "clear", "rain"
    #[serde(default)]
    pub weather_condition: Option<String>,
    /// Share of ports in use (0-100%)
    #[serde(default)]
    pub station_utilization: Option<f64>,
    /// Additional numeric telemetry columns. Booleans become 0/1, other
    /// non-numeric fields are dropped.
    #[serde(default, flatten, deserialize_with = "numeric_fields")]
    pub extra: BTreeMap<String, f64>,
}

fn numeric_fields<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| {
            let n = match value {
                serde_json::Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
                other => other.as_f64(),
            };
            n.map(|n| (key, n))
        })
        .collect())
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, station_id: impl Into<String>, demand: Option<f64>) -> Self {
        Self {
            timestamp,
            station_id: station_id.into(),
            demand,
            temperature: None,
            weather_condition: None,
            station_utilization: None,
            extra: BTreeMap::new(),
        }
    }

    /// Demand usable as a training target
    pub fn valid_demand(&self) -> Option<f64> {
        self.demand.filter(|d| d.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_fields_are_flattened() {
        let json = r#"{
            "timestamp": "2024-03-01T10:00:00Z",
            "station_id": "st-1",
            "demand": 12.5,
            "temperature": 8.0,
            "grid_price": 0.31
        }"#;
        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.demand, Some(12.5));
        assert_eq!(obs.temperature, Some(8.0));
        assert_eq!(obs.extra.get("grid_price"), Some(&0.31));
        assert!(obs.weather_condition.is_none());
    }

    #[test]
    fn test_non_numeric_extra_fields_are_dropped() {
        let json = r#"{
            "timestamp": "2024-03-01T10:00:00Z",
            "station_id": "st-1",
            "demand": 4.0,
            "source": "meter-a",
            "humidity": null,
            "event_nearby": true,
            "grid_price": 0.31
        }"#;
        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.demand, Some(4.0));
        assert_eq!(obs.extra.len(), 2);
        assert_eq!(obs.extra.get("event_nearby"), Some(&1.0));
        assert_eq!(obs.extra.get("grid_price"), Some(&0.31));
    }

    #[test]
    fn test_valid_demand_rejects_nan() {
        let mut obs = Observation::new(Utc::now(), "st-1", Some(f64::NAN));
        assert!(obs.valid_demand().is_none());
        obs.demand = Some(3.0);
        assert_eq!(obs.valid_demand(), Some(3.0));
    }
}
