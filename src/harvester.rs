//! Fleet harvester: decides what to fetch and fans out return-leg queries.
//!
//! For each `(origin, party_size)` pair the harvester fetches cheapest
//! outbound legs to anywhere, then one return query per discovered
//! destination metro back to the origin. The scan log gates the whole pair
//! behind a cooldown so profiles sharing an origin reuse each other's work.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::fares::FareClient;
use crate::flights::FlightLeg;
use crate::flights_repo::FlightsRepository;
use crate::scan_log_repo::ScanLogRepository;

#[derive(Clone)]
pub struct Harvester {
    fares: Arc<dyn FareClient>,
    flights: FlightsRepository,
    scan_log: ScanLogRepository,
}

impl Harvester {
    pub fn new(
        fares: Arc<dyn FareClient>,
        flights: FlightsRepository,
        scan_log: ScanLogRepository,
    ) -> Self {
        Self {
            fares,
            flights,
            scan_log,
        }
    }

    /// Harvest every `(origin, party_size)` pair that is out of cooldown.
    /// Returns the total number of legs fetched. A failed upstream call only
    /// skips its own pair or destination; the rest continue. Upserts flush
    /// per chunk, so partial progress is durable.
    pub async fn run(
        &self,
        pairs: &[(String, i32)],
        horizon_days: i64,
        cooldown: Duration,
    ) -> Result<usize> {
        let today = Utc::now().date_naive();
        let date_to = today + Duration::days(horizon_days);
        let mut total_legs = 0;

        for (origin, party_size) in pairs {
            if self
                .scan_log
                .recently_scanned(origin, *party_size, cooldown)
                .await?
            {
                info!(
                    "Skipping {} (party_size={}), scanned within cooldown",
                    origin, party_size
                );
                continue;
            }

            info!("Scanning from {} (party_size={})", origin, party_size);

            // Outbound legs to anywhere. The destination set for the return
            // fan-out is data-dependent, so this must complete first.
            let outbound = match self
                .fares
                .cheapest(origin, None, today, date_to, *party_size)
                .await
            {
                Ok(legs) => legs,
                Err(e) => {
                    warn!("Outbound fare fetch for {} failed: {e:#}", origin);
                    continue;
                }
            };

            let destinations: BTreeSet<String> =
                outbound.iter().map(|leg| leg.destination.clone()).collect();
            total_legs += self.upsert(outbound).await?;

            for destination in &destinations {
                match self
                    .fares
                    .cheapest(destination, Some(origin.as_str()), today, date_to, *party_size)
                    .await
                {
                    Ok(inbound) => {
                        total_legs += self.upsert(inbound).await?;
                    }
                    Err(e) => {
                        warn!(
                            "Return fare fetch {} -> {} failed: {e:#}",
                            destination, origin
                        );
                    }
                }
            }

            self.scan_log.record(origin, *party_size).await?;
        }

        Ok(total_legs)
    }

    async fn upsert(&self, legs: Vec<FlightLeg>) -> Result<usize> {
        let fetched = legs.len();
        let now = Utc::now().naive_utc();
        let records = legs.into_iter().map(|leg| leg.into_record(now)).collect();
        self.flights.upsert_legs(records).await?;
        Ok(fetched)
    }
}
