//! Tenant-level usage, revenue and utilization reporting

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::debug;

use crate::config::AnalyticsConfig;
use crate::domain::ChargingSession;
use crate::repo::DataSource;

pub mod insights;

pub use insights::{derive_insights, Insight, InsightCategory, Priority};

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Unknown metric type: {0}")]
    UnknownMetricType(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error(transparent)]
    Data(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Overview,
    Usage,
    Revenue,
    Utilization,
}

impl MetricType {
    fn includes_usage(self) -> bool {
        matches!(self, MetricType::Overview | MetricType::Usage)
    }

    fn includes_revenue(self) -> bool {
        matches!(self, MetricType::Overview | MetricType::Revenue)
    }

    fn includes_utilization(self) -> bool {
        matches!(self, MetricType::Overview | MetricType::Utilization)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsFilters {
    /// Restrict the report to these stations
    #[serde(default)]
    pub station_ids: Option<Vec<String>>,
    /// Drop sessions delivering less than this
    #[serde(default)]
    pub min_energy_kwh: Option<f64>,
}

impl AnalyticsFilters {
    fn matches(&self, session: &ChargingSession) -> bool {
        let station_ok = self
            .station_ids
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| *id == session.station_id));
        let energy_ok = self.min_energy_kwh.map_or(true, |min| session.energy_kwh >= min);
        station_ok && energy_ok
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_sessions: usize,
    pub total_energy_kwh: f64,
    pub total_revenue: f64,
    pub average_duration_hours: f64,
    pub average_energy_kwh: f64,
    pub active_stations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub sessions: usize,
    pub energy_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageBreakdown {
    /// Session starts per hour of day (index 0-23)
    pub sessions_by_hour: Vec<usize>,
    /// Session starts per weekday (index 0 = Monday)
    pub sessions_by_weekday: Vec<usize>,
    pub peak_hour: Option<u32>,
    pub daily: Vec<DailyUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRevenue {
    pub station_id: String,
    pub revenue: f64,
    pub sessions: usize,
    pub share_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueBreakdown {
    pub daily: Vec<DailyRevenue>,
    pub revenue_per_kwh: f64,
    /// Highest revenue first
    pub stations: Vec<StationRevenue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationUtilization {
    pub station_id: String,
    /// Ports seen in the period's sessions
    pub ports: usize,
    pub occupied_hours: f64,
    pub available_hours: f64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationBreakdown {
    pub average_percent: f64,
    pub stations: Vec<StationUtilization>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub metric_type: MetricType,
    pub period: Period,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<RevenueBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization: Option<UtilizationBreakdown>,
}

pub struct AnalyticsController {
    data: Arc<dyn DataSource>,
    cfg: AnalyticsConfig,
}

impl AnalyticsController {
    pub fn new(data: Arc<dyn DataSource>, cfg: AnalyticsConfig) -> Self {
        Self { data, cfg }
    }

    pub async fn generate_comprehensive_analytics(
        &self,
        tenant_id: &str,
        metric_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &AnalyticsFilters,
    ) -> Result<AnalyticsReport, AnalyticsError> {
        let metric_type = MetricType::from_str(metric_type)
            .map_err(|_| AnalyticsError::UnknownMetricType(metric_type.to_string()))?;
        if end < start {
            return Err(AnalyticsError::InvalidPeriod(format!(
                "end {end} is before start {start}"
            )));
        }
        if end - start > Duration::days(self.cfg.max_period_days) {
            return Err(AnalyticsError::InvalidPeriod(format!(
                "period exceeds the {} day limit",
                self.cfg.max_period_days
            )));
        }

        let sessions: Vec<ChargingSession> = self
            .data
            .sessions(tenant_id, start, end)
            .await?
            .into_iter()
            .filter(|s| filters.matches(s))
            .collect();

        debug!(
            tenant_id,
            %metric_type,
            sessions = sessions.len(),
            "Building analytics report"
        );

        Ok(build_report(&sessions, metric_type, start, end))
    }

    /// Insights comparing the most recent window with the one before it
    pub async fn generate_ai_insights(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Insight>, AnalyticsError> {
        let window = Duration::days(self.cfg.insights_window_days.max(1));
        let split = now - window;
        let sessions = self.data.sessions(tenant_id, split - window, now).await?;

        let (current, previous): (Vec<ChargingSession>, Vec<ChargingSession>) =
            sessions.into_iter().partition(|s| s.started_at >= split);

        debug!(
            tenant_id,
            current = current.len(),
            previous = previous.len(),
            "Deriving insights"
        );

        Ok(derive_insights(
            &current,
            &previous,
            window.num_hours() as f64,
            self.cfg.underutilized_percent,
        ))
    }
}

pub fn build_report(
    sessions: &[ChargingSession],
    metric_type: MetricType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> AnalyticsReport {
    let hours = (end - start).num_seconds().max(0) as f64 / 3600.0;

    AnalyticsReport {
        metric_type,
        period: Period { start, end, hours },
        summary: summarize(sessions),
        usage: metric_type.includes_usage().then(|| usage_breakdown(sessions)),
        revenue: metric_type.includes_revenue().then(|| revenue_breakdown(sessions)),
        utilization: metric_type
            .includes_utilization()
            .then(|| utilization_breakdown(sessions, hours)),
    }
}

fn summarize(sessions: &[ChargingSession]) -> Summary {
    let n = sessions.len();
    let total_energy_kwh: f64 = sessions.iter().map(|s| s.energy_kwh).sum();
    let total_revenue: f64 = sessions.iter().map(|s| s.revenue).sum();
    let total_hours: f64 = sessions.iter().map(ChargingSession::duration_hours).sum();
    let per_session = |total: f64| if n == 0 { 0.0 } else { total / n as f64 };

    Summary {
        total_sessions: n,
        total_energy_kwh: round2(total_energy_kwh),
        total_revenue: round2(total_revenue),
        average_duration_hours: round2(per_session(total_hours)),
        average_energy_kwh: round2(per_session(total_energy_kwh)),
        active_stations: sessions.iter().map(|s| &s.station_id).unique().count(),
    }
}

pub(crate) fn sessions_by_hour(sessions: &[ChargingSession]) -> Vec<usize> {
    let mut by_hour = vec![0; 24];
    for s in sessions {
        by_hour[s.started_at.hour() as usize] += 1;
    }
    by_hour
}

fn usage_breakdown(sessions: &[ChargingSession]) -> UsageBreakdown {
    let sessions_by_hour = sessions_by_hour(sessions);
    let mut sessions_by_weekday = vec![0; 7];
    for s in sessions {
        sessions_by_weekday[s.started_at.weekday().num_days_from_monday() as usize] += 1;
    }

    let peak_hour = sessions_by_hour
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by(|(ha, a), (hb, b)| a.cmp(b).then(hb.cmp(ha)))
        .map(|(h, _)| h as u32);

    let daily = sessions
        .iter()
        .into_group_map_by(|s| s.started_at.date_naive())
        .into_iter()
        .sorted_by_key(|(date, _)| *date)
        .map(|(date, day)| DailyUsage {
            date,
            sessions: day.len(),
            energy_kwh: round2(day.iter().map(|s| s.energy_kwh).sum()),
        })
        .collect();

    UsageBreakdown {
        sessions_by_hour,
        sessions_by_weekday,
        peak_hour,
        daily,
    }
}

pub(crate) fn revenue_by_station(sessions: &[ChargingSession]) -> Vec<StationRevenue> {
    let total: f64 = sessions.iter().map(|s| s.revenue).sum();
    let mut stations: Vec<StationRevenue> = sessions
        .iter()
        .into_group_map_by(|s| s.station_id.clone())
        .into_iter()
        .map(|(station_id, group)| {
            let revenue: f64 = group.iter().map(|s| s.revenue).sum();
            StationRevenue {
                station_id,
                revenue: round2(revenue),
                sessions: group.len(),
                share_percent: if total > 0.0 { round2(revenue / total * 100.0) } else { 0.0 },
            }
        })
        .collect();
    stations.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.station_id.cmp(&b.station_id))
    });
    stations
}

fn revenue_breakdown(sessions: &[ChargingSession]) -> RevenueBreakdown {
    let daily = sessions
        .iter()
        .map(|s| (s.started_at.date_naive(), s.revenue))
        .fold(BTreeMap::<NaiveDate, f64>::new(), |mut acc, (date, revenue)| {
            *acc.entry(date).or_default() += revenue;
            acc
        })
        .into_iter()
        .map(|(date, revenue)| DailyRevenue {
            date,
            revenue: round2(revenue),
        })
        .collect();

    let energy: f64 = sessions.iter().map(|s| s.energy_kwh).sum();
    let revenue: f64 = sessions.iter().map(|s| s.revenue).sum();

    RevenueBreakdown {
        daily,
        revenue_per_kwh: if energy > 0.0 { round3(revenue / energy) } else { 0.0 },
        stations: revenue_by_station(sessions),
    }
}

/// Occupied port-hours over available port-hours per station
pub(crate) fn station_utilization(sessions: &[ChargingSession], period_hours: f64) -> Vec<StationUtilization> {
    sessions
        .iter()
        .into_group_map_by(|s| s.station_id.clone())
        .into_iter()
        .sorted_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(station_id, group)| {
            let ports = group.iter().map(|s| &s.port_id).unique().count();
            let occupied_hours: f64 = group.iter().map(|s| s.duration_hours()).sum();
            let available_hours = period_hours * ports as f64;
            let utilization_percent = if available_hours > 0.0 {
                (occupied_hours / available_hours * 100.0).min(100.0)
            } else {
                0.0
            };
            StationUtilization {
                station_id,
                ports,
                occupied_hours: round2(occupied_hours),
                available_hours: round2(available_hours),
                utilization_percent: round2(utilization_percent),
            }
        })
        .collect()
}

fn utilization_breakdown(sessions: &[ChargingSession], period_hours: f64) -> UtilizationBreakdown {
    let stations = station_utilization(sessions, period_hours);
    let average_percent = if stations.is_empty() {
        0.0
    } else {
        round2(stations.iter().map(|s| s.utilization_percent).sum::<f64>() / stations.len() as f64)
    };
    UtilizationBreakdown {
        average_percent,
        stations,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repo::MockDataSource;
    use chrono::TimeZone;
    use rstest::rstest;

    pub(crate) fn session(station: &str, port: &str, start: DateTime<Utc>, hours: i64, energy: f64, revenue: f64) -> ChargingSession {
        ChargingSession {
            session_id: format!("{station}-{port}-{}", start.timestamp()),
            tenant_id: "tenant-1".to_string(),
            station_id: station.to_string(),
            port_id: port.to_string(),
            started_at: start,
            ended_at: start + Duration::hours(hours),
            energy_kwh: energy,
            revenue,
        }
    }

    fn monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap()
    }

    fn sample_sessions() -> Vec<ChargingSession> {
        vec![
            session("st-a", "p1", monday() + Duration::hours(8), 2, 20.0, 8.0),
            session("st-a", "p2", monday() + Duration::hours(8), 1, 10.0, 4.0),
            session("st-b", "p1", monday() + Duration::hours(18), 3, 30.0, 12.0),
            session("st-a", "p1", monday() + Duration::hours(32), 2, 4.0, 1.6),
        ]
    }

    fn controller(sessions: Vec<ChargingSession>) -> AnalyticsController {
        let mut mock = MockDataSource::new();
        mock.expect_sessions()
            .returning(move |_, _, _| Ok(sessions.clone()));
        AnalyticsController::new(
            Arc::new(mock),
            AnalyticsConfig {
                insights_window_days: 30,
                underutilized_percent: 5.0,
                max_period_days: 366,
            },
        )
    }

    #[test]
    fn test_summary_totals() {
        let report = build_report(&sample_sessions(), MetricType::Overview, monday(), monday() + Duration::days(2));
        let s = &report.summary;
        assert_eq!(s.total_sessions, 4);
        assert_eq!(s.total_energy_kwh, 64.0);
        assert_eq!(s.total_revenue, 25.6);
        assert_eq!(s.average_duration_hours, 2.0);
        assert_eq!(s.average_energy_kwh, 16.0);
        assert_eq!(s.active_stations, 2);
        assert_eq!(report.period.hours, 48.0);
    }

    #[test]
    fn test_usage_breakdown() {
        let report = build_report(&sample_sessions(), MetricType::Usage, monday(), monday() + Duration::days(2));
        let usage = report.usage.unwrap();
        assert_eq!(usage.sessions_by_hour[8], 3);
        assert_eq!(usage.sessions_by_hour[18], 1);
        assert_eq!(usage.peak_hour, Some(8));
        assert_eq!(usage.sessions_by_weekday[0], 3);
        assert_eq!(usage.sessions_by_weekday[1], 1);
        assert_eq!(usage.daily.len(), 2);
        assert_eq!(usage.daily[0].sessions, 3);
        assert!(report.revenue.is_none());
        assert!(report.utilization.is_none());
    }

    #[test]
    fn test_revenue_ranking() {
        let report = build_report(&sample_sessions(), MetricType::Revenue, monday(), monday() + Duration::days(2));
        let revenue = report.revenue.unwrap();
        assert_eq!(revenue.stations[0].station_id, "st-a");
        assert_eq!(revenue.stations[0].revenue, 13.6);
        assert_eq!(revenue.stations[1].station_id, "st-b");
        assert_eq!(revenue.revenue_per_kwh, 0.4);
        assert_eq!(revenue.daily.iter().map(|d| d.revenue).sum::<f64>(), 25.6);
    }

    #[test]
    fn test_utilization_uses_port_hours() {
        let report = build_report(&sample_sessions(), MetricType::Utilization, monday(), monday() + Duration::days(2));
        let util = report.utilization.unwrap();
        let a = util.stations.iter().find(|s| s.station_id == "st-a").unwrap();
        assert_eq!(a.ports, 2);
        assert_eq!(a.occupied_hours, 5.0);
        assert_eq!(a.available_hours, 96.0);
        assert!((a.utilization_percent - 5.21).abs() < 1e-9);
    }

    #[test]
    fn test_empty_period() {
        let report = build_report(&[], MetricType::Overview, monday(), monday() + Duration::days(1));
        assert_eq!(report.summary.total_sessions, 0);
        assert_eq!(report.summary.average_energy_kwh, 0.0);
        assert_eq!(report.usage.unwrap().peak_hour, None);
        assert_eq!(report.utilization.unwrap().average_percent, 0.0);
    }

    #[rstest]
    #[case("overview", MetricType::Overview)]
    #[case("Usage", MetricType::Usage)]
    #[case("REVENUE", MetricType::Revenue)]
    #[case("utilization", MetricType::Utilization)]
    fn test_metric_type_parsing(#[case] raw: &str, #[case] expected: MetricType) {
        assert_eq!(MetricType::from_str(raw).unwrap(), expected);
        assert_eq!(expected.to_string(), raw.to_lowercase());
    }

    #[tokio::test]
    async fn test_filters_apply() {
        let controller = controller(sample_sessions());
        let filters = AnalyticsFilters {
            station_ids: Some(vec!["st-a".to_string()]),
            min_energy_kwh: Some(5.0),
        };
        let report = controller
            .generate_comprehensive_analytics("tenant-1", "overview", monday(), monday() + Duration::days(2), &filters)
            .await
            .unwrap();
        assert_eq!(report.summary.total_sessions, 2);
        assert_eq!(report.summary.total_revenue, 12.0);
    }

    #[tokio::test]
    async fn test_unknown_metric_type_rejected() {
        let controller = controller(vec![]);
        let result = controller
            .generate_comprehensive_analytics("t", "carbon", monday(), monday() + Duration::days(1), &Default::default())
            .await;
        assert!(matches!(result, Err(AnalyticsError::UnknownMetricType(m)) if m == "carbon"));
    }

    #[tokio::test]
    async fn test_reversed_period_rejected() {
        let controller = controller(vec![]);
        let result = controller
            .generate_comprehensive_analytics("t", "usage", monday() + Duration::days(1), monday(), &Default::default())
            .await;
        assert!(matches!(result, Err(AnalyticsError::InvalidPeriod(_))));
    }

    #[tokio::test]
    async fn test_overlong_period_rejected_before_fetch() {
        let mut mock = MockDataSource::new();
        mock.expect_sessions().never();
        let controller = AnalyticsController::new(
            Arc::new(mock),
            AnalyticsConfig {
                insights_window_days: 30,
                underutilized_percent: 5.0,
                max_period_days: 366,
            },
        );
        let result = controller
            .generate_comprehensive_analytics("t", "overview", monday(), monday() + Duration::days(367), &Default::default())
            .await;
        assert!(matches!(result, Err(AnalyticsError::InvalidPeriod(_))));
    }

    #[tokio::test]
    async fn test_data_errors_propagate() {
        let mut mock = MockDataSource::new();
        mock.expect_sessions()
            .returning(|_, _, _| Err(anyhow::anyhow!("backend down")));
        let controller = AnalyticsController::new(
            Arc::new(mock),
            AnalyticsConfig {
                insights_window_days: 30,
                underutilized_percent: 5.0,
                max_period_days: 366,
            },
        );
        let result = controller.generate_ai_insights("t", monday()).await;
        assert!(matches!(result, Err(AnalyticsError::Data(_))));
    }
}
