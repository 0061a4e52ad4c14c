use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Completed charging session billed to a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSession {
    pub session_id: String,
    pub tenant_id: String,
    pub station_id: String,
    pub port_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub energy_kwh: f64,
    pub revenue: f64,
}

impl ChargingSession {
    pub fn duration_hours(&self) -> f64 {
        (self.ended_at - self.started_at).num_seconds().max(0) as f64 / 3600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_duration_hours() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let session = ChargingSession {
            session_id: "s1".to_string(),
            tenant_id: "t1".to_string(),
            station_id: "st1".to_string(),
            port_id: "p1".to_string(),
            started_at: start,
            ended_at: start + chrono::Duration::minutes(90),
            energy_kwh: 20.0,
            revenue: 8.0,
        };
        assert_eq!(session.duration_hours(), 1.5);
    }
}
