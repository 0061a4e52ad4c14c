//! Synthetic charging network used when no dataset is configured
//!
//! Every value is drawn from an RNG seeded by its key (station, port or
//! tenant) and hour, so repeated queries over overlapping windows agree.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use uuid::Uuid;

use super::DataSource;
use crate::domain::{ChargingSession, MarketSnapshot, Observation, PortTelemetry, PriceObservation};

const STATIONS: usize = 5;
const PORTS_PER_STATION: usize = 4;
const PORT_POWER_KW: f64 = 7.4;
const ENERGY_COST: f64 = 0.18;
const PRICE_ELASTICITY: f64 = -1.1;
const MARKET_HISTORY_HOURS: i64 = 168;
/// Port with a failing connector: hotter and more faults
const DEGRADED_PORT: &str = "station-003-p4";

#[derive(Debug, Clone, Default)]
pub struct SimulatedDataSource;

impl SimulatedDataSource {
    pub fn new() -> Self {
        Self
    }

    pub fn station_ids() -> Vec<String> {
        (1..=STATIONS).map(|i| format!("station-{i:03}")).collect()
    }

    pub fn port_ids() -> Vec<String> {
        Self::station_ids()
            .into_iter()
            .flat_map(|s| (1..=PORTS_PER_STATION).map(move |p| format!("{s}-p{p}")))
            .collect()
    }

    fn observation(&self, station_id: &str, ts: DateTime<Utc>) -> Observation {
        let mut rng = rng_for(station_id, ts);
        let hour = ts.hour() as f64;
        let season = (2.0 * std::f64::consts::PI * (ts.ordinal() as f64 - 105.0) / 365.0).sin();
        let temperature = 10.0 + 9.0 * season + 5.0 * bump(hour, 14.0, 3.0) + gaussian(&mut rng, 1.5);

        let weather = match rng.gen::<f64>() {
            u if u < 0.55 => "clear",
            u if u < 0.85 => "cloudy",
            _ => "rain",
        };
        let rain_factor = if weather == "rain" { 1.1 } else { 1.0 };

        let demand = (demand_profile(ts) * station_scale(station_id) * rain_factor
            + 0.08 * temperature
            + gaussian(&mut rng, 1.2))
        .max(0.0);
        let capacity = PORTS_PER_STATION as f64 * PORT_POWER_KW;

        let mut obs = Observation::new(ts, station_id, Some(demand));
        obs.temperature = Some(temperature);
        obs.weather_condition = Some(weather.to_string());
        obs.station_utilization = Some((demand / capacity * 100.0).clamp(0.0, 100.0));
        obs
    }

    fn telemetry(&self, port_id: &str, ts: DateTime<Utc>) -> PortTelemetry {
        let mut rng = rng_for(port_id, ts);
        let station_id = port_id.rsplit_once("-p").map_or(port_id, |(s, _)| s);
        let degraded = port_id == DEGRADED_PORT;

        let load = (demand_profile(ts) / 30.0).min(1.0);
        let temperature_c = 32.0 + 8.0 * load + if degraded { 9.0 } else { 0.0 } + gaussian(&mut rng, 1.5);
        let voltage_v = 230.0 + gaussian(&mut rng, 2.5);
        let current_a = (32.0 * load + gaussian(&mut rng, 1.0)).max(0.0);
        let error_count = rng.gen_bool(if degraded { 0.2 } else { 0.03 }) as u32;

        PortTelemetry {
            timestamp: ts,
            station_id: station_id.to_string(),
            port_id: port_id.to_string(),
            temperature_c,
            voltage_v,
            current_a,
            error_count,
            energy_kwh: voltage_v * current_a / 1000.0,
        }
    }

    fn sessions_in_hour(&self, tenant_id: &str, station_id: &str, ts: DateTime<Utc>) -> Vec<ChargingSession> {
        let key = format!("{tenant_id}/{station_id}");
        let mut rng = rng_for(&key, ts);
        let rate = demand_profile(ts) * station_scale(station_id) * station_scale(tenant_id) / 10.0;
        let count = match Poisson::new(rate.max(0.01)) {
            Ok(dist) => dist.sample(&mut rng) as usize,
            Err(_) => 0,
        };
        let price = market_price(station_id);

        (0..count)
            .map(|_| {
                let started_at = ts + Duration::minutes(rng.gen_range(0..60));
                let hours = rng.gen_range(0.5..3.0);
                let energy_kwh = hours * PORT_POWER_KW * rng.gen_range(0.5..1.0);
                ChargingSession {
                    session_id: Uuid::from_u128(rng.gen()).to_string(),
                    tenant_id: tenant_id.to_string(),
                    station_id: station_id.to_string(),
                    port_id: format!("{station_id}-p{}", rng.gen_range(1..=PORTS_PER_STATION)),
                    started_at,
                    ended_at: started_at + Duration::seconds((hours * 3600.0) as i64),
                    energy_kwh,
                    revenue: (energy_kwh * price * 100.0).round() / 100.0,
                }
            })
            .collect()
    }
}

#[async_trait]
impl DataSource for SimulatedDataSource {
    async fn station_data(
        &self,
        station_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>> {
        Ok(hourly(start, end).map(|ts| self.observation(station_id, ts)).collect())
    }

    async fn market_data(&self, station_id: &str) -> Result<MarketSnapshot> {
        let current_price = market_price(station_id);
        let end = truncate_to_hour(Utc::now());
        let start = end - Duration::hours(MARKET_HISTORY_HOURS - 1);
        let scale = station_scale(station_id);

        let price_history: Vec<PriceObservation> = hourly(start, end)
            .map(|ts| {
                let mut rng = rng_for(&format!("{station_id}/market"), ts);
                let swing = 0.15 * (2.0 * std::f64::consts::PI * ts.hour() as f64 / 24.0).sin();
                let price = (current_price * (1.0 + swing) + gaussian(&mut rng, 0.01)).max(0.05);
                let demand = demand_profile(ts).max(1.0)
                    * scale
                    * (price / current_price).powf(PRICE_ELASTICITY)
                    * gaussian(&mut rng, 0.05).exp();
                PriceObservation {
                    timestamp: ts,
                    price,
                    demand,
                }
            })
            .collect();

        let average_demand = if price_history.is_empty() {
            0.0
        } else {
            price_history.iter().map(|p| p.demand).sum::<f64>() / price_history.len() as f64
        };

        Ok(MarketSnapshot {
            station_id: station_id.to_string(),
            current_price,
            energy_cost: ENERGY_COST,
            average_demand,
            price_history,
        })
    }

    async fn telemetry_data(&self, port_id: &str, since: DateTime<Utc>) -> Result<Vec<PortTelemetry>> {
        Ok(hourly(since, Utc::now()).map(|ts| self.telemetry(port_id, ts)).collect())
    }

    async fn fleet_telemetry(&self, since: DateTime<Utc>) -> Result<Vec<PortTelemetry>> {
        let now = Utc::now();
        Ok(Self::port_ids()
            .iter()
            .flat_map(|port| hourly(since, now).map(move |ts| self.telemetry(port, ts)))
            .collect())
    }

    async fn sessions(
        &self,
        tenant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ChargingSession>> {
        let mut sessions: Vec<ChargingSession> = Self::station_ids()
            .iter()
            .flat_map(|station| {
                hourly(start - Duration::hours(1), end)
                    .flat_map(move |ts| self.sessions_in_hour(tenant_id, station, ts))
            })
            .filter(|s| s.started_at >= start && s.started_at <= end)
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }
}

/// Whole hours within `[start, end]`
fn hourly(start: DateTime<Utc>, end: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> {
    let first = start.timestamp().div_euclid(3600) + i64::from(start.timestamp().rem_euclid(3600) != 0);
    let last = end.timestamp().div_euclid(3600);
    (first..=last).filter_map(|h| Utc.timestamp_opt(h * 3600, 0).single())
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp().div_euclid(3600) * 3600, 0)
        .single()
        .unwrap_or(ts)
}

/// FNV-1a over the key and hour index
fn seed(key: &str, ts: DateTime<Utc>) -> u64 {
    let hour = ts.timestamp().div_euclid(3600);
    key.bytes()
        .chain(hour.to_le_bytes())
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        })
}

fn rng_for(key: &str, ts: DateTime<Utc>) -> StdRng {
    StdRng::seed_from_u64(seed(key, ts))
}

fn gaussian(rng: &mut StdRng, std: f64) -> f64 {
    Normal::new(0.0, std).map_or(0.0, |n| n.sample(rng))
}

fn bump(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma.max(0.01);
    (-0.5 * z * z).exp()
}

/// Typical demand (kW) with morning and evening commuter peaks
fn demand_profile(ts: DateTime<Utc>) -> f64 {
    let h = ts.hour() as f64;
    let base = 6.0 + 10.0 * bump(h, 8.5, 1.5) + 4.0 * bump(h, 13.0, 2.5) + 14.0 * bump(h, 18.0, 2.0);
    let weekend = if ts.weekday().number_from_monday() >= 6 { 0.75 } else { 1.0 };
    base * weekend
}

/// Size factor in [0.7, 1.3) derived from the key
fn station_scale(key: &str) -> f64 {
    let h = key
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
    0.7 + (h % 60) as f64 / 100.0
}

fn market_price(station_id: &str) -> f64 {
    let price = 0.35 + 0.2 * (station_scale(station_id) - 0.7);
    (price * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_station_data_is_hourly_and_repeatable() {
        let source = SimulatedDataSource::new();
        let start = t0() + Duration::minutes(30);
        let end = t0() + Duration::hours(48);

        let first = source.station_data("station-001", start, end).await.unwrap();
        let second = source.station_data("station-001", start, end).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 48);
        assert_eq!(first[0].timestamp, t0() + Duration::hours(1));
        assert!(first.windows(2).all(|w| w[1].timestamp - w[0].timestamp == Duration::hours(1)));
        assert!(first.iter().all(|o| o.valid_demand().is_some_and(|d| d >= 0.0)));
    }

    #[tokio::test]
    async fn test_overlapping_windows_agree() {
        let source = SimulatedDataSource::new();
        let long = source
            .station_data("station-002", t0(), t0() + Duration::hours(24))
            .await
            .unwrap();
        let short = source
            .station_data("station-002", t0() + Duration::hours(10), t0() + Duration::hours(12))
            .await
            .unwrap();
        assert_eq!(&long[10..=12], &short[..]);
    }

    #[tokio::test]
    async fn test_market_history_is_downward_sloping() {
        let source = SimulatedDataSource::new();
        let market = source.market_data("station-001").await.unwrap();

        assert_eq!(market.price_history.len(), MARKET_HISTORY_HOURS as usize);
        assert!(market.current_price > market.energy_cost);
        let estimate = crate::optimizer::estimate_elasticity(&market.price_history, 24).unwrap();
        assert!(estimate.elasticity < 0.0);
    }

    #[tokio::test]
    async fn test_fleet_telemetry_covers_every_port() {
        let source = SimulatedDataSource::new();
        let since = Utc::now() - Duration::hours(3);
        let fleet = source.fleet_telemetry(since).await.unwrap();
        let ports: std::collections::BTreeSet<_> = fleet.iter().map(|t| t.port_id.as_str()).collect();
        assert_eq!(ports.len(), STATIONS * PORTS_PER_STATION);
        assert!(fleet.iter().all(|t| t.port_id.starts_with(&t.station_id)));
    }

    #[tokio::test]
    async fn test_sessions_fall_inside_window() {
        let source = SimulatedDataSource::new();
        let end = t0() + Duration::days(2);
        let sessions = source.sessions("tenant-a", t0(), end).await.unwrap();

        assert!(!sessions.is_empty());
        assert!(sessions.iter().all(|s| s.started_at >= t0() && s.started_at <= end));
        assert!(sessions.iter().all(|s| s.ended_at > s.started_at && s.energy_kwh > 0.0));
        assert!(sessions.windows(2).all(|w| w[0].started_at <= w[1].started_at));
    }

    #[test]
    fn test_hourly_bounds() {
        let hours: Vec<_> = hourly(t0(), t0() + Duration::hours(2)).collect();
        assert_eq!(hours.len(), 3);
        assert_eq!(hourly(t0() + Duration::hours(2), t0()).count(), 0);
    }
}
