//! One-way flight legs.
//!
//! A `Flight` row is the atomic unit of the store: profile-independent and
//! shared across every profile with the same party size. Its primary key is
//! a deterministic fingerprint of the identifying fields, which is what makes
//! repeated harvests idempotent.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Deterministic flight id: md5 over the identifying fields. Computed by the
/// harvesting layer before upsert; the store never recomputes it.
pub fn fingerprint(
    origin: &str,
    destination: &str,
    departure_time: NaiveDateTime,
    party_size: i32,
) -> String {
    let raw = format!(
        "{}_{}_{}_{}",
        origin,
        destination,
        departure_time.format("%Y-%m-%dT%H:%M:%S%.f"),
        party_size
    );
    format!("{:x}", md5::compute(raw.as_bytes()))
}

/// Round to two decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A stored one-way leg.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::flights)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Flight {
    pub id: String,
    pub origin: String,
    pub origin_full: String,
    pub destination: String,
    pub destination_full: String,
    pub departure_time: NaiveDateTime,
    pub arrival_time: NaiveDateTime,
    pub flight_number: String,
    /// Total fare for the whole party, in `currency`.
    pub price: f64,
    pub currency: String,
    pub party_size: i32,
    pub updated_at: NaiveDateTime,
}

/// A normalized leg as returned by the fare provider, before it is given a
/// fingerprint and an `updated_at` stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightLeg {
    pub origin: String,
    pub origin_full: String,
    pub destination: String,
    pub destination_full: String,
    pub departure_time: NaiveDateTime,
    pub arrival_time: NaiveDateTime,
    pub flight_number: String,
    pub price: f64,
    pub currency: String,
    pub party_size: i32,
}

impl FlightLeg {
    /// Turn the provider leg into a store row: fingerprint id, two-decimal
    /// price, fresh `updated_at`.
    pub fn into_record(self, now: NaiveDateTime) -> Flight {
        let id = fingerprint(
            &self.origin,
            &self.destination,
            self.departure_time,
            self.party_size,
        );
        Flight {
            id,
            origin: self.origin,
            origin_full: self.origin_full,
            destination: self.destination,
            destination_full: self.destination_full,
            departure_time: self.departure_time,
            arrival_time: self.arrival_time,
            flight_number: self.flight_number,
            price: round2(self.price),
            currency: self.currency,
            party_size: self.party_size,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn departure() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 4)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("PSA", "BCN", departure(), 2);
        let b = fingerprint("PSA", "BCN", departure(), 2);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn fingerprint_varies_with_each_field() {
        let base = fingerprint("PSA", "BCN", departure(), 2);
        assert_ne!(base, fingerprint("FLR", "BCN", departure(), 2));
        assert_ne!(base, fingerprint("PSA", "GRO", departure(), 2));
        assert_ne!(base, fingerprint("PSA", "BCN", departure(), 1));
        let later = departure() + chrono::Duration::hours(1);
        assert_ne!(base, fingerprint("PSA", "BCN", later, 2));
    }

    #[test]
    fn round2_half_away_from_zero() {
        assert_eq!(round2(29.995), 30.0);
        assert_eq!(round2(29.994), 29.99);
        assert_eq!(round2(-1.005), -1.01);
    }

    #[test]
    fn into_record_rounds_price_and_keys_on_fingerprint() {
        let leg = FlightLeg {
            origin: "PSA".to_string(),
            origin_full: "Pisa".to_string(),
            destination: "BCN".to_string(),
            destination_full: "Barcelona".to_string(),
            departure_time: departure(),
            arrival_time: departure() + chrono::Duration::hours(2),
            flight_number: "FR1234".to_string(),
            price: 29.999,
            currency: "EUR".to_string(),
            party_size: 1,
        };
        let now = departure();
        let record = leg.clone().into_record(now);
        assert_eq!(record.price, 30.0);
        assert_eq!(
            record.id,
            fingerprint("PSA", "BCN", leg.departure_time, 1)
        );
        assert_eq!(record.updated_at, now);
    }
}
