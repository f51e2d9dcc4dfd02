//! Deal matcher: two-pass round-trip reconstruction.
//!
//! Pass 1 pairs legs whose airports match exactly in both directions. Pass 2
//! relaxes the pairing to the metro area of the outbound destination (and,
//! when the profile opts in, of the home origins), skipping pairs pass 1
//! already produced. A single `OR`-join would double-count the exact pairs,
//! so the passes stay separate with an explicit seen-set.
//!
//! Each run happens inside one transaction: deal upserts plus the stale-deal
//! prune commit together, so a failed run leaves the previous deal set
//! intact.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::{debug, info, warn};

use crate::airports::MetroIndex;
use crate::db::DbPool;
use crate::deals_repo::DealsRepository;
use crate::flights::{Flight, round2};
use crate::profiles::{DayWindows, SearchProfile, Strategy};
use crate::schema::flights;

/// Over-fetch factor applied before the per-leg time-window filtering: pairs
/// up to 25% over budget stay in play until `valid_match` has its say.
const PRICE_TOLERANCE_FACTOR: f64 = 1.25;

#[derive(Clone)]
pub struct DealMatcher {
    pool: DbPool,
    index: Arc<MetroIndex>,
    hour_tolerance: u32,
    radius_km: f64,
}

impl DealMatcher {
    pub fn new(pool: DbPool, index: Arc<MetroIndex>, hour_tolerance: u32, radius_km: f64) -> Self {
        Self {
            pool,
            index,
            hour_tolerance,
            radius_km,
        }
    }

    /// Reconstruct round trips for the profile and reconcile its deal set.
    /// Returns the number of matched pairs. `excluded_destinations` is the
    /// profile owner's blocklist.
    pub async fn run(
        &self,
        profile: &SearchProfile,
        excluded_destinations: &[String],
    ) -> Result<usize> {
        let strategy = match profile.parsed_strategy() {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!("Profile {} ({}): {e:#}, matching nothing", profile.id, profile.name);
                return Ok(0);
            }
        };

        let origins = profile.origin_codes()?;
        let allowed = profile.allowed_destination_codes()?;
        let excluded: HashSet<String> = excluded_destinations.iter().cloned().collect();

        let profile_id = profile.id;
        let party_size = profile.party_size;
        let budget_cap = profile.max_price_pp * party_size as f64 * PRICE_TOLERANCE_FACTOR;
        let metro_origins = profile.metro_origins;

        let index = Arc::clone(&self.index);
        let hour_tolerance = self.hour_tolerance;
        let radius_km = self.radius_km;
        let pool = self.pool.clone();

        let matched = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction::<usize, anyhow::Error, _>(|conn| {
                let match_start = Utc::now().naive_utc();

                // Inbound legs may land at a metro alternative of a home
                // airport only when the profile opted in.
                let home_set: Vec<String> = if metro_origins && radius_km > 0.0 {
                    let mut set: HashSet<String> = HashSet::new();
                    for origin in &origins {
                        set.extend(index.nearby(origin, radius_km).iter().cloned());
                    }
                    set.into_iter().collect()
                } else {
                    origins.clone()
                };

                let outbounds: Vec<Flight> = flights::table
                    .filter(flights::origin.eq_any(&origins))
                    .filter(flights::party_size.eq(party_size))
                    .select(Flight::as_select())
                    .load(conn)?;
                let inbounds: Vec<Flight> = flights::table
                    .filter(flights::destination.eq_any(&home_set))
                    .filter(flights::party_size.eq(party_size))
                    .select(Flight::as_select())
                    .load(conn)?;

                let mut inbounds_by_origin: HashMap<&str, Vec<&Flight>> = HashMap::new();
                for leg in &inbounds {
                    inbounds_by_origin
                        .entry(leg.origin.as_str())
                        .or_default()
                        .push(leg);
                }

                let origin_set: HashSet<&str> = origins.iter().map(String::as_str).collect();
                let home_metro_set: HashSet<&str> = home_set.iter().map(String::as_str).collect();
                let allowed_set: HashSet<&str> = allowed.iter().map(String::as_str).collect();

                let mut seen: HashSet<(&str, &str)> = HashSet::new();
                let mut num_matches = 0;

                let pairable = |out: &Flight, inbound: &Flight| {
                    inbound.departure_time > out.arrival_time
                        && out.price + inbound.price <= budget_cap
                };

                for out in &outbounds {
                    if !allowed_set.is_empty() && !allowed_set.contains(out.destination.as_str()) {
                        continue;
                    }
                    if excluded.contains(&out.destination) {
                        continue;
                    }

                    // Pass 1: exact symmetric pairing.
                    if let Some(candidates) = inbounds_by_origin.get(out.destination.as_str()) {
                        for inbound in candidates {
                            if !origin_set.contains(inbound.destination.as_str()) {
                                continue;
                            }
                            if !pairable(out, inbound) {
                                continue;
                            }
                            seen.insert((out.id.as_str(), inbound.id.as_str()));
                            if valid_match(out, inbound, &strategy, hour_tolerance) {
                                upsert_pair(conn, profile_id, out, inbound, party_size, match_start)?;
                                num_matches += 1;
                            }
                        }
                    }

                    // Pass 2: metro-area pairing around the destination.
                    if radius_km > 0.0 {
                        for near_origin in index.nearby(&out.destination, radius_km).iter() {
                            let Some(candidates) = inbounds_by_origin.get(near_origin.as_str())
                            else {
                                continue;
                            };
                            for inbound in candidates {
                                if !home_metro_set.contains(inbound.destination.as_str()) {
                                    continue;
                                }
                                if seen.contains(&(out.id.as_str(), inbound.id.as_str())) {
                                    continue;
                                }
                                if !pairable(out, inbound) {
                                    continue;
                                }
                                seen.insert((out.id.as_str(), inbound.id.as_str()));
                                if valid_match(out, inbound, &strategy, hour_tolerance) {
                                    upsert_pair(
                                        conn,
                                        profile_id,
                                        out,
                                        inbound,
                                        party_size,
                                        match_start,
                                    )?;
                                    num_matches += 1;
                                }
                            }
                        }
                    }
                }

                // Deals this run did not refresh no longer reconstruct a
                // valid round trip.
                let pruned =
                    DealsRepository::delete_stale_blocking(conn, profile_id, match_start)?;
                if pruned > 0 {
                    debug!("Pruned {} stale deal(s) for profile {}", pruned, profile_id);
                }

                Ok(num_matches)
            })
        })
        .await??;

        info!("Profile {} matched {} deal(s)", profile_id, matched);
        Ok(matched)
    }
}

fn upsert_pair(
    conn: &mut SqliteConnection,
    profile_id: i32,
    out: &Flight,
    inbound: &Flight,
    party_size: i32,
    now: NaiveDateTime,
) -> QueryResult<()> {
    let price_pp = round2((out.price + inbound.price) / party_size as f64);
    DealsRepository::upsert_deal_blocking(conn, profile_id, &out.id, &inbound.id, price_pp, now)
}

fn departure_in_window(
    departure: NaiveDateTime,
    days: &DayWindows,
    tolerance: u32,
) -> bool {
    use chrono::{Datelike, Timelike};

    let weekday = departure.weekday().num_days_from_monday() as u8;
    let Some(&(lo, hi)) = days.get(&weekday) else {
        return false;
    };
    let hour = departure.hour();
    hour >= lo.saturating_sub(tolerance) && hour < (hi + tolerance).min(24)
}

/// Whether the pair satisfies the profile's calendar-and-clock strategy:
/// nights abroad within bounds, both departures on an allowed weekday and
/// inside the tolerance-widened half-open hour window.
fn valid_match(out: &Flight, inbound: &Flight, strategy: &Strategy, tolerance: u32) -> bool {
    let nights = (inbound.departure_time.date() - out.departure_time.date()).num_days();
    if nights < strategy.min_nights || nights > strategy.max_nights {
        return false;
    }
    departure_in_window(out.departure_time, &strategy.out_days, tolerance)
        && departure_in_window(inbound.departure_time, &strategy.in_days, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn leg(origin: &str, destination: &str, departure: NaiveDateTime, price: f64) -> Flight {
        Flight {
            id: crate::flights::fingerprint(origin, destination, departure, 1),
            origin: origin.to_string(),
            origin_full: origin.to_string(),
            destination: destination.to_string(),
            destination_full: destination.to_string(),
            departure_time: departure,
            arrival_time: departure + chrono::Duration::hours(2),
            flight_number: "FR0000".to_string(),
            price,
            currency: "EUR".to_string(),
            party_size: 1,
            updated_at: departure,
        }
    }

    fn weekend_strategy() -> Strategy {
        Strategy {
            out_days: BTreeMap::from([(4, (17, 24))]),
            in_days: BTreeMap::from([(6, (15, 23))]),
            min_nights: 2,
            max_nights: 3,
        }
    }

    #[test]
    fn friday_sunday_weekend_matches() {
        // 2025-07-04 is a Friday, 2025-07-06 a Sunday
        let out = leg("PSA", "BCN", at(2025, 7, 4, 18), 30.0);
        let inbound = leg("BCN", "PSA", at(2025, 7, 6, 16), 30.0);
        assert!(valid_match(&out, &inbound, &weekend_strategy(), 1));
    }

    #[test]
    fn nights_outside_bounds_reject() {
        let out = leg("PSA", "BCN", at(2025, 7, 4, 18), 30.0);
        // Monday return: 3 nights is still fine, 4 is not
        let monday = leg("BCN", "PSA", at(2025, 7, 8, 16), 30.0);
        assert!(!valid_match(&out, &monday, &weekend_strategy(), 1));
    }

    #[test]
    fn weekday_not_in_strategy_rejects() {
        // Saturday departure, strategy only allows Friday
        let out = leg("PSA", "BCN", at(2025, 7, 5, 18), 30.0);
        let inbound = leg("BCN", "PSA", at(2025, 7, 7, 16), 30.0);
        assert!(!valid_match(&out, &inbound, &weekend_strategy(), 1));
    }

    #[test]
    fn hour_tolerance_widens_the_window() {
        // 16:00 departure, window starts at 17:00
        let out = leg("PSA", "BCN", at(2025, 7, 4, 16), 30.0);
        let inbound = leg("BCN", "PSA", at(2025, 7, 6, 16), 30.0);
        assert!(!valid_match(&out, &inbound, &weekend_strategy(), 0));
        assert!(valid_match(&out, &inbound, &weekend_strategy(), 1));
    }

    #[test]
    fn window_is_half_open() {
        let strategy = Strategy {
            out_days: BTreeMap::from([(4, (17, 20))]),
            in_days: BTreeMap::from([(6, (15, 23))]),
            min_nights: 2,
            max_nights: 3,
        };
        let inbound = leg("BCN", "PSA", at(2025, 7, 6, 16), 30.0);
        // Upper bound 20 + tolerance 0 excludes the 20:00 departure
        let boundary = leg("PSA", "BCN", at(2025, 7, 4, 20), 30.0);
        assert!(!valid_match(&boundary, &inbound, &strategy, 0));
        let inside = leg("PSA", "BCN", at(2025, 7, 4, 19), 30.0);
        assert!(valid_match(&inside, &inbound, &strategy, 0));
    }

    #[test]
    fn empty_window_rejects_everything_and_full_window_accepts_any_hour() {
        let empty = BTreeMap::from([(4, (0, 0))]);
        let full = BTreeMap::from([(4, (0, 24))]);
        for hour in 0..24 {
            let departure = at(2025, 7, 4, hour);
            assert!(!departure_in_window(departure, &empty, 0));
            assert!(departure_in_window(departure, &full, 0));
        }
    }

    #[test]
    fn empty_day_map_matches_nothing() {
        let strategy = Strategy {
            out_days: BTreeMap::new(),
            in_days: BTreeMap::new(),
            min_nights: 0,
            max_nights: 7,
        };
        let out = leg("PSA", "BCN", at(2025, 7, 4, 18), 30.0);
        let inbound = leg("BCN", "PSA", at(2025, 7, 6, 16), 30.0);
        assert!(!valid_match(&out, &inbound, &strategy, 1));
    }

    #[test]
    fn zero_night_day_trip_matches_when_hours_permit() {
        let strategy = Strategy {
            out_days: BTreeMap::from([(4, (6, 10))]),
            in_days: BTreeMap::from([(4, (20, 24))]),
            min_nights: 0,
            max_nights: 0,
        };
        let out = leg("PSA", "BCN", at(2025, 7, 4, 7), 30.0);
        let inbound = leg("BCN", "PSA", at(2025, 7, 4, 21), 30.0);
        assert!(valid_match(&out, &inbound, &strategy, 0));

        let too_early_back = leg("BCN", "PSA", at(2025, 7, 4, 15), 30.0);
        assert!(!valid_match(&out, &too_early_back, &strategy, 0));
    }

    #[test]
    fn tolerance_clamps_at_midnight() {
        let strategy = Strategy {
            out_days: BTreeMap::from([(4, (0, 24))]),
            in_days: BTreeMap::from([(6, (22, 24))]),
            min_nights: 2,
            max_nights: 3,
        };
        let out = leg("PSA", "BCN", at(2025, 7, 4, 0), 30.0);
        let inbound = leg("BCN", "PSA", at(2025, 7, 6, 23), 30.0);
        // hi + tolerance would be 25; the window still ends at 24
        assert!(valid_match(&out, &inbound, &strategy, 1));
    }
}
