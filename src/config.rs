//! Centralized configuration — every environment variable the engine reads
//! is collected here once at startup.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveTime;

/// Runtime configuration, resolved from the environment (with `.env` support
/// via dotenvy in `main`). Defaults match a single-user deployment polling a
/// handful of origins.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path.
    pub database_url: String,
    /// Airport coordinate table (CSV with iata_code/latitude_deg/longitude_deg).
    pub airports_csv: String,
    /// Global ntfy topic, used when a profile's owner has none. Empty disables.
    pub ntfy_topic: String,
    /// Base URL of the ntfy service.
    pub ntfy_base_url: String,
    /// Web app base URL used for notification deep links.
    pub webapp_url: String,
    /// Minimum gap between upstream scans for a given (origin, party_size).
    pub scan_cooldown_minutes: i64,
    /// How many days into the future each scan queries.
    pub lookup_horizon_days: i64,
    /// Extra hours tolerated on each side of a strategy hour window.
    pub hour_tolerance: u32,
    /// Metro-area radius for pass-2 matching. Zero disables pass 2.
    pub nearby_airport_radius_km: f64,
    /// Minimum gap between orchestrations of the same profile.
    pub update_interval_minutes: i64,
    /// Flights not refreshed for this long are pruned.
    pub flight_staleness_hours: i64,
    /// Upper bound on concurrent profile orchestrations.
    pub max_workers: usize,
    /// Local wall-clock time at which the daily digest fires.
    pub digest_local_time: NaiveTime,
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let digest_raw = env::var("DIGEST_LOCAL_TIME").unwrap_or_else(|_| "08:00".to_string());
        let digest_local_time = NaiveTime::parse_from_str(&digest_raw, "%H:%M")
            .with_context(|| format!("invalid DIGEST_LOCAL_TIME: {:?}", digest_raw))?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "flights.db".to_string()),
            airports_csv: env::var("AIRPORTS_CSV")
                .unwrap_or_else(|_| "data/airports.csv".to_string()),
            ntfy_topic: env::var("NTFY_TOPIC").unwrap_or_default(),
            ntfy_base_url: env::var("NTFY_BASE_URL")
                .unwrap_or_else(|_| "https://ntfy.sh".to_string()),
            webapp_url: env::var("WEBAPP_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            scan_cooldown_minutes: env_or("SCAN_COOLDOWN_MINUTES", 30)?,
            lookup_horizon_days: env_or("LOOKUP_HORIZON_DAYS", 120)?,
            hour_tolerance: env_or("HOUR_TOLERANCE", 1)?,
            nearby_airport_radius_km: env_or("NEARBY_AIRPORT_RADIUS_KM", 100.0)?,
            update_interval_minutes: env_or("UPDATE_INTERVAL_MINUTES", 180)?,
            flight_staleness_hours: env_or("FLIGHT_STALENESS_HOURS", 24)?,
            max_workers: env_or("MAX_WORKERS", 3)?,
            digest_local_time,
        })
    }
}
