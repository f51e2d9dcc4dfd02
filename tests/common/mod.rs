//! Common test utilities for database-backed integration tests.
//!
//! `TestDatabase` creates a unique temp-file SQLite database per test with
//! all migrations applied, so tests run in parallel without interference.
//! `ScriptedFareClient` stands in for the upstream fare provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use tempfile::TempDir;

use farehound::airports::MetroIndex;
use farehound::db::{self, DbPool};
use farehound::deals_repo::DealsRepository;
use farehound::fares::FareClient;
use farehound::flights::{Flight, FlightLeg};
use farehound::flights_repo::FlightsRepository;
use farehound::matcher::DealMatcher;
use farehound::notifier::{Notifier, PushClient};
use farehound::profiles::{NewSearchProfile, SearchProfile};
use farehound::profiles_repo::ProfilesRepository;

/// An isolated database living inside its own temp directory. The directory
/// (and the database file with it) is removed when the struct drops.
pub struct TestDatabase {
    pool: DbPool,
    _dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("farehound_test.db");
        let url = path
            .to_str()
            .ok_or_else(|| anyhow!("non-utf8 temp path"))?
            .to_string();
        let pool = db::establish_pool(&url)?;
        db::run_migrations(&pool)?;
        Ok(Self { pool, _dir: dir })
    }

    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }
}

/// Metro index over a handful of airports with well-known geometry:
/// BCN/GRO/REU share a metro area at 100 km, PSA/FLR share another,
/// and EDI is far from everything.
pub fn test_metro_index() -> Arc<MetroIndex> {
    let coords = HashMap::from([
        ("PSA".to_string(), (43.683899, 10.39270)),
        ("FLR".to_string(), (43.810001, 11.20510)),
        ("BCN".to_string(), (41.297100, 2.07846)),
        ("GRO".to_string(), (41.901000, 2.76055)),
        ("REU".to_string(), (41.147399, 1.16717)),
        ("EDI".to_string(), (55.950145, -3.372288)),
    ]);
    Arc::new(MetroIndex::from_coords(coords))
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

pub fn leg(origin: &str, destination: &str, departure: NaiveDateTime, price: f64) -> FlightLeg {
    FlightLeg {
        origin: origin.to_string(),
        origin_full: format!("{origin} City"),
        destination: destination.to_string(),
        destination_full: format!("{destination} City"),
        departure_time: departure,
        arrival_time: departure + chrono::Duration::hours(2),
        flight_number: "FR0000".to_string(),
        price,
        currency: "EUR".to_string(),
        party_size: 1,
    }
}

pub async fn insert_leg(pool: &DbPool, flight_leg: FlightLeg) -> Result<Flight> {
    let record = flight_leg.into_record(Utc::now().naive_utc());
    let repo = FlightsRepository::new(pool.clone());
    repo.upsert_legs(vec![record.clone()]).await?;
    Ok(record)
}

/// Friday-evening-out, Sunday-afternoon-back weekend strategy.
pub fn weekend_strategy_json() -> String {
    r#"{"out_days": {"4": [17, 24]}, "in_days": {"6": [15, 23]}, "min_nights": 2, "max_nights": 3}"#
        .to_string()
}

pub fn weekend_profile(name: &str) -> NewSearchProfile {
    NewSearchProfile {
        user_id: None,
        name: name.to_string(),
        origins: r#"["PSA"]"#.to_string(),
        party_size: 1,
        max_price_pp: 100.0,
        allowed_destinations: None,
        notify_destinations: None,
        strategy: weekend_strategy_json(),
        metro_origins: false,
        is_active: true,
        updated_at: None,
    }
}

pub async fn create_profile(pool: &DbPool, new_profile: NewSearchProfile) -> Result<SearchProfile> {
    ProfilesRepository::new(pool.clone()).create(new_profile).await
}

pub fn matcher(pool: &DbPool, radius_km: f64) -> DealMatcher {
    DealMatcher::new(pool.clone(), test_metro_index(), 1, radius_km)
}

/// Notifier wired to a push endpoint nothing listens on: gating logic runs
/// for real, delivery fails fast and is swallowed.
pub fn notifier(pool: &DbPool, global_topic: &str) -> Notifier {
    let push = PushClient::new(reqwest::Client::new(), "http://127.0.0.1:1".to_string());
    Notifier::new(
        DealsRepository::new(pool.clone()),
        push,
        test_metro_index(),
        global_topic.to_string(),
        "http://localhost:8000".to_string(),
        100.0,
    )
}

/// Scripted fare provider. Outbound scripts are keyed by origin, return
/// scripts by `(origin, destination)`. Every call is recorded; origins in
/// `failing` error out instead.
#[derive(Default)]
pub struct ScriptedFareClient {
    outbound: HashMap<String, Vec<FlightLeg>>,
    returns: HashMap<(String, String), Vec<FlightLeg>>,
    failing: Vec<String>,
    pub calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedFareClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_outbound(mut self, origin: &str, legs: Vec<FlightLeg>) -> Self {
        self.outbound.insert(origin.to_string(), legs);
        self
    }

    pub fn script_return(mut self, origin: &str, destination: &str, legs: Vec<FlightLeg>) -> Self {
        self.returns
            .insert((origin.to_string(), destination.to_string()), legs);
        self
    }

    pub fn fail_for(mut self, origin: &str) -> Self {
        self.failing.push(origin.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl FareClient for ScriptedFareClient {
    async fn cheapest(
        &self,
        origin: &str,
        destination: Option<&str>,
        _date_from: NaiveDate,
        _date_to: NaiveDate,
        _party_size: i32,
    ) -> Result<Vec<FlightLeg>> {
        self.calls
            .lock()
            .unwrap()
            .push((origin.to_string(), destination.map(str::to_string)));
        if self.failing.iter().any(|o| o == origin) {
            return Err(anyhow!("scripted failure for {origin}"));
        }
        let legs = match destination {
            None => self.outbound.get(origin).cloned().unwrap_or_default(),
            Some(dest) => self
                .returns
                .get(&(origin.to_string(), dest.to_string()))
                .cloned()
                .unwrap_or_default(),
        };
        Ok(legs)
    }
}
