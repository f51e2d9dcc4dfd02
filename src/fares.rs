//! Upstream fare source.
//!
//! The harvester only ever asks one question: the cheapest one-way legs out
//! of an airport (optionally pinned to a destination) inside a date range.
//! That seam is a trait so tests can script fares without the network.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::flights::FlightLeg;

#[async_trait]
pub trait FareClient: Send + Sync {
    /// Cheapest one-way legs departing `origin` in `[date_from, date_to]`.
    /// With `destination` set, only legs into that airport. One error per
    /// call; the caller decides what to skip.
    async fn cheapest(
        &self,
        origin: &str,
        destination: Option<&str>,
        date_from: NaiveDate,
        date_to: NaiveDate,
        party_size: i32,
    ) -> Result<Vec<FlightLeg>>;
}

#[derive(Debug, Deserialize)]
struct FareAirport {
    #[serde(rename = "iataCode")]
    iata_code: String,
    name: String,
    #[serde(rename = "countryName")]
    country_name: Option<String>,
}

impl FareAirport {
    fn full_name(&self) -> String {
        match &self.country_name {
            Some(country) => format!("{}, {}", self.name, country),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FarePrice {
    value: f64,
    #[serde(rename = "currencyCode")]
    currency_code: String,
}

#[derive(Debug, Deserialize)]
struct FareLeg {
    #[serde(rename = "departureAirport")]
    departure_airport: FareAirport,
    #[serde(rename = "arrivalAirport")]
    arrival_airport: FareAirport,
    #[serde(rename = "departureDate")]
    departure_date: NaiveDateTime,
    #[serde(rename = "arrivalDate")]
    arrival_date: NaiveDateTime,
    #[serde(rename = "flightNumber")]
    flight_number: String,
    price: Option<FarePrice>,
}

#[derive(Debug, Deserialize)]
struct Fare {
    outbound: FareLeg,
}

#[derive(Debug, Deserialize)]
struct FareFinderResponse {
    fares: Vec<Fare>,
}

/// Ryanair one-way fare-finder client.
#[derive(Clone)]
pub struct RyanairClient {
    client: Client,
    base_url: String,
}

impl RyanairClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: "https://services-api.ryanair.com".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl FareClient for RyanairClient {
    async fn cheapest(
        &self,
        origin: &str,
        destination: Option<&str>,
        date_from: NaiveDate,
        date_to: NaiveDate,
        party_size: i32,
    ) -> Result<Vec<FlightLeg>> {
        let url = format!("{}/farfnd/v4/oneWayFares", self.base_url);
        let date_from = date_from.format("%Y-%m-%d").to_string();
        let date_to = date_to.format("%Y-%m-%d").to_string();
        let party = party_size.to_string();

        let mut query: Vec<(&str, &str)> = vec![
            ("departureAirportIataCode", origin),
            ("outboundDepartureDateFrom", &date_from),
            ("outboundDepartureDateTo", &date_to),
            ("adultPaxCount", &party),
        ];
        if let Some(dest) = destination {
            query.push(("arrivalAirportIataCode", dest));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("fare request for {} failed", origin))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("fare provider returned {} for {}: {}", status, origin, body));
        }

        let parsed: FareFinderResponse = response
            .json()
            .await
            .context("failed to decode fare-finder response")?;

        let legs: Vec<FlightLeg> = parsed
            .fares
            .into_iter()
            .filter_map(|fare| {
                let leg = fare.outbound;
                // Sold-out dates come back without a price; skip them.
                let price = leg.price?;
                Some(FlightLeg {
                    origin: leg.departure_airport.iata_code.clone(),
                    origin_full: leg.departure_airport.full_name(),
                    destination: leg.arrival_airport.iata_code.clone(),
                    destination_full: leg.arrival_airport.full_name(),
                    departure_time: leg.departure_date,
                    arrival_time: leg.arrival_date,
                    flight_number: leg.flight_number,
                    price: price.value,
                    currency: price.currency_code,
                    party_size,
                })
            })
            .collect();

        debug!(
            "Fare provider returned {} leg(s) for {} -> {}",
            legs.len(),
            origin,
            destination.unwrap_or("anywhere")
        );
        Ok(legs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fare_finder_payload() {
        let raw = r#"{
            "fares": [{
                "outbound": {
                    "departureAirport": {"iataCode": "PSA", "name": "Pisa", "countryName": "Italy"},
                    "arrivalAirport": {"iataCode": "BCN", "name": "Barcelona", "countryName": "Spain"},
                    "departureDate": "2025-07-04T18:00:00",
                    "arrivalDate": "2025-07-04T19:55:00",
                    "flightNumber": "FR9876",
                    "price": {"value": 29.99, "currencyCode": "EUR"}
                }
            }, {
                "outbound": {
                    "departureAirport": {"iataCode": "PSA", "name": "Pisa", "countryName": "Italy"},
                    "arrivalAirport": {"iataCode": "GRO", "name": "Girona", "countryName": "Spain"},
                    "departureDate": "2025-07-05T08:10:00",
                    "arrivalDate": "2025-07-05T10:00:00",
                    "flightNumber": "FR1111",
                    "price": null
                }
            }]
        }"#;
        let parsed: FareFinderResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.fares.len(), 2);
        assert_eq!(parsed.fares[0].outbound.departure_airport.full_name(), "Pisa, Italy");
        assert!(parsed.fares[1].outbound.price.is_none());
    }
}
