//! Detected round-trip matches.
//!
//! A deal belongs to exactly one profile and references its two legs by
//! fingerprint. The matcher refreshes `updated_at` on every run; rows left
//! behind by a run are stale and get pruned before commit.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::flights::Flight;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::deals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Deal {
    pub id: i32,
    pub profile_id: i32,
    pub outbound_flight_id: String,
    pub inbound_flight_id: String,
    /// Round-trip price per person, two decimals.
    pub total_price_pp: f64,
    pub updated_at: NaiveDateTime,
    pub notified: bool,
}

/// A deal joined with both of its legs, as served to the notifier and the
/// read-only view layer. Deals whose legs have been pruned underneath them
/// never materialize here; the join skips them.
#[derive(Debug, Clone)]
pub struct DealView {
    pub deal: Deal,
    pub outbound: Flight,
    pub inbound: Flight,
}

impl DealView {
    /// Short destination label: "Barcelona, Spain" becomes "Barcelona".
    pub fn destination_label(&self) -> String {
        let full = self.outbound.destination_full.trim();
        if full.is_empty() {
            return self.outbound.destination.clone();
        }
        full.split(',')
            .next()
            .unwrap_or(full)
            .trim()
            .to_string()
    }
}
