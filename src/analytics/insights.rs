//! Rule-based insights over two consecutive periods

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{revenue_by_station, sessions_by_hour, station_utilization};
use crate::domain::ChargingSession;

/// Relative change below which a trend is reported as stable (%)
const TREND_THRESHOLD: f64 = 10.0;
/// Share of sessions in the three busiest hours that counts as concentrated (%)
const PEAK_CONCENTRATION: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Usage,
    Revenue,
    Utilization,
    Performance,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub category: InsightCategory,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Insight {
    fn new(category: InsightCategory, priority: Priority, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            category,
            priority,
            title: title.into(),
            description: description.into(),
            recommendation: None,
            value: None,
        }
    }

    fn recommend(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    fn value(mut self, value: f64) -> Self {
        self.value = Some((value * 100.0).round() / 100.0);
        self
    }
}

/// Insights for `current` against the `previous` period of equal length.
///
/// Ordered by priority, highest first.
pub fn derive_insights(
    current: &[ChargingSession],
    previous: &[ChargingSession],
    window_hours: f64,
    underutilized_percent: f64,
) -> Vec<Insight> {
    if current.is_empty() && previous.is_empty() {
        return vec![Insight::new(
            InsightCategory::Info,
            Priority::Low,
            "No charging activity",
            "No sessions were recorded in the last two periods.",
        )];
    }

    let mut insights = Vec::new();

    insights.extend(trend_insight(
        InsightCategory::Usage,
        "Session volume",
        current.len() as f64,
        previous.len() as f64,
    ));

    let revenue = |s: &[ChargingSession]| s.iter().map(|x| x.revenue).sum::<f64>();
    insights.extend(trend_insight(
        InsightCategory::Revenue,
        "Revenue",
        revenue(current),
        revenue(previous),
    ));

    insights.extend(peak_concentration(current));
    insights.extend(underutilized_stations(current, window_hours, underutilized_percent));
    insights.extend(top_station(current));

    insights.sort_by(|a, b| b.priority.cmp(&a.priority));
    insights
}

fn trend_insight(category: InsightCategory, label: &str, current: f64, previous: f64) -> Option<Insight> {
    if previous <= 0.0 {
        return (current > 0.0).then(|| {
            Insight::new(
                category,
                Priority::Low,
                format!("{label} started"),
                format!("{label} appeared this period with no activity in the previous one."),
            )
        });
    }

    let change = (current - previous) / previous * 100.0;
    let insight = if change >= TREND_THRESHOLD {
        Insight::new(
            category,
            Priority::Low,
            format!("{label} growing"),
            format!("{label} increased {change:.1}% compared with the previous period."),
        )
        .recommend("Review capacity at the busiest stations ahead of further growth")
    } else if change <= -TREND_THRESHOLD {
        Insight::new(
            category,
            Priority::High,
            format!("{label} declining"),
            format!("{label} decreased {:.1}% compared with the previous period.", change.abs()),
        )
        .recommend("Check station availability and pricing against nearby competitors")
    } else {
        Insight::new(
            category,
            Priority::Low,
            format!("{label} stable"),
            format!("{label} changed {change:.1}% compared with the previous period."),
        )
    };
    Some(insight.value(change))
}

fn peak_concentration(sessions: &[ChargingSession]) -> Option<Insight> {
    if sessions.is_empty() {
        return None;
    }
    let by_hour = sessions_by_hour(sessions);
    let top: Vec<(usize, usize)> = by_hour
        .iter()
        .copied()
        .enumerate()
        .sorted_by(|(ha, a), (hb, b)| b.cmp(a).then(ha.cmp(hb)))
        .take(3)
        .collect();
    let share = top.iter().map(|(_, c)| *c).sum::<usize>() as f64 / sessions.len() as f64 * 100.0;
    if share < PEAK_CONCENTRATION {
        return None;
    }

    let hours = top.iter().map(|(h, _)| format!("{h:02}:00")).join(", ");
    Some(
        Insight::new(
            InsightCategory::Usage,
            Priority::Medium,
            "Demand concentrated in peak hours",
            format!("{share:.1}% of sessions start at {hours}."),
        )
        .recommend("Use time-of-use pricing to shift charging away from peak hours")
        .value(share),
    )
}

fn underutilized_stations(sessions: &[ChargingSession], window_hours: f64, threshold: f64) -> Option<Insight> {
    let low: Vec<_> = station_utilization(sessions, window_hours)
        .into_iter()
        .filter(|s| s.utilization_percent < threshold)
        .collect();
    if low.is_empty() {
        return None;
    }

    let names = low.iter().map(|s| s.station_id.as_str()).join(", ");
    Some(
        Insight::new(
            InsightCategory::Utilization,
            Priority::Medium,
            "Under-utilized stations",
            format!("{} station(s) below {threshold:.0}% utilization: {names}.", low.len()),
        )
        .recommend("Consider promotional pricing or relocating ports at these stations")
        .value(low.len() as f64),
    )
}

fn top_station(sessions: &[ChargingSession]) -> Option<Insight> {
    let stations = revenue_by_station(sessions);
    if stations.len() < 2 {
        return None;
    }
    let top = stations.first()?;
    Some(
        Insight::new(
            InsightCategory::Performance,
            Priority::Low,
            "Top performing station",
            format!(
                "{} generated {:.1}% of revenue across {} sessions.",
                top.station_id, top.share_percent, top.sessions
            ),
        )
        .value(top.share_percent),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::session;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    /// `n` two-hour sessions per day at 08:00 across `stations`
    fn period(offset_days: i64, n: usize, stations: &[&str], revenue: f64) -> Vec<ChargingSession> {
        (0..n)
            .map(|i| {
                let day = offset_days + (i / stations.len()) as i64;
                let station = stations[i % stations.len()];
                session(station, "p1", start() + Duration::days(day) + Duration::hours(8), 2, 20.0, revenue)
            })
            .collect()
    }

    fn find<'a>(insights: &'a [Insight], title: &str) -> Option<&'a Insight> {
        insights.iter().find(|i| i.title == title)
    }

    #[test]
    fn test_no_activity() {
        let insights = derive_insights(&[], &[], 720.0, 5.0);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].category, InsightCategory::Info);
    }

    #[test]
    fn test_declining_volume_is_high_priority() {
        let previous = period(0, 40, &["a", "b"], 8.0);
        let current = period(30, 20, &["a", "b"], 8.0);
        let insights = derive_insights(&current, &previous, 720.0, 0.0);

        let decline = find(&insights, "Session volume declining").unwrap();
        assert_eq!(decline.priority, Priority::High);
        assert_eq!(decline.value, Some(-50.0));
        assert!(find(&insights, "Revenue declining").is_some());
        assert_eq!(insights[0].priority, Priority::High);
    }

    #[test]
    fn test_growth_and_stable() {
        let previous = period(0, 20, &["a", "b"], 10.0);
        let current = period(30, 30, &["a", "b"], 7.0);
        let insights = derive_insights(&current, &previous, 720.0, 0.0);
        assert!(find(&insights, "Session volume growing").is_some());
        // 210 vs 200
        assert!(find(&insights, "Revenue stable").is_some());
    }

    #[test]
    fn test_new_activity() {
        let current = period(30, 5, &["a"], 8.0);
        let insights = derive_insights(&current, &[], 720.0, 0.0);
        assert!(find(&insights, "Session volume started").is_some());
        assert!(find(&insights, "Revenue started").is_some());
    }

    #[test]
    fn test_peak_concentration_and_top_station() {
        let mut current = period(30, 10, &["a", "b"], 5.0);
        current.push(session("a", "p1", start() + Duration::days(31) + Duration::hours(8), 2, 20.0, 5.0));
        let insights = derive_insights(&current, &current, 720.0, 0.0);

        let peak = find(&insights, "Demand concentrated in peak hours").unwrap();
        assert_eq!(peak.value, Some(100.0));
        assert!(peak.description.contains("08:00"));

        let top = find(&insights, "Top performing station").unwrap();
        assert!(top.description.starts_with("a generated"));
    }

    #[test]
    fn test_underutilized_station_listed() {
        // 2 hours per session, 5 sessions over 720 hours is about 1.4%
        let current = period(30, 10, &["a", "b"], 5.0);
        let insights = derive_insights(&current, &current, 720.0, 5.0);
        let under = find(&insights, "Under-utilized stations").unwrap();
        assert_eq!(under.value, Some(2.0));
        assert!(under.description.contains("a, b"));
    }
}
