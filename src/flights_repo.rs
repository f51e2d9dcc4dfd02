use anyhow::Result;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::upsert::excluded;
use tracing::{debug, info};

use crate::db::DbPool;
use crate::flights::Flight;

/// Maximum rows per upsert statement, keeping us clear of SQLite's bind
/// parameter limit.
const BATCH_SIZE: usize = 1000;

#[derive(Clone)]
pub struct FlightsRepository {
    pool: DbPool,
}

impl FlightsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upsert leg records keyed on their fingerprint id. A conflicting row
    /// only has `price`, `updated_at`, `departure_time` and `arrival_time`
    /// refreshed; all other columns are left untouched. Each chunk is its own
    /// statement, so partial progress survives a failure later in the batch.
    pub async fn upsert_legs(&self, records: Vec<Flight>) -> Result<usize> {
        use crate::schema::flights::dsl::*;

        if records.is_empty() {
            return Ok(0);
        }

        let mut total_upserted = 0;
        for batch in records.chunks(BATCH_SIZE) {
            let pool = self.pool.clone();
            let batch_vec = batch.to_vec();

            let batch_result = tokio::task::spawn_blocking(move || {
                let mut conn = pool.get()?;
                // SQLite does not support a multi-row VALUES list combined with
                // ON CONFLICT DO UPDATE, so each record in the chunk is its own
                // statement; the chunk itself remains the unit of progress.
                let mut upserted = 0;
                for record in &batch_vec {
                    upserted += diesel::insert_into(flights)
                        .values(record)
                        .on_conflict(id)
                        .do_update()
                        .set((
                            price.eq(excluded(price)),
                            updated_at.eq(excluded(updated_at)),
                            departure_time.eq(excluded(departure_time)),
                            arrival_time.eq(excluded(arrival_time)),
                        ))
                        .execute(&mut conn)?;
                }
                Ok::<usize, anyhow::Error>(upserted)
            })
            .await??;

            total_upserted += batch_result;
        }

        debug!("Upserted {} flight leg(s)", total_upserted);
        Ok(total_upserted)
    }

    /// Delete flights whose `updated_at` predates the cutoff.
    pub async fn delete_stale(&self, cutoff: NaiveDateTime) -> Result<usize> {
        use crate::schema::flights::dsl::*;

        let pool = self.pool.clone();
        let deleted = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = diesel::delete(flights.filter(updated_at.lt(cutoff))).execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(rows)
        })
        .await??;

        if deleted > 0 {
            info!("Pruned {} stale flight(s)", deleted);
        }
        Ok(deleted)
    }

    pub async fn get_by_id(&self, flight_id: &str) -> Result<Option<Flight>> {
        use crate::schema::flights::dsl::*;

        let flight_id = flight_id.to_string();
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let row = flights
                .filter(id.eq(&flight_id))
                .select(Flight::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<Option<Flight>, anyhow::Error>(row)
        })
        .await??;

        Ok(result)
    }

    pub async fn delete_by_id(&self, flight_id: &str) -> Result<usize> {
        use crate::schema::flights::dsl::*;

        let flight_id = flight_id.to_string();
        let pool = self.pool.clone();
        let deleted = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = diesel::delete(flights.filter(id.eq(&flight_id))).execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(rows)
        })
        .await??;

        Ok(deleted)
    }

    pub async fn count(&self) -> Result<i64> {
        use crate::schema::flights::dsl::*;

        let pool = self.pool.clone();
        let total = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let total = flights.count().get_result::<i64>(&mut conn)?;
            Ok::<i64, anyhow::Error>(total)
        })
        .await??;

        Ok(total)
    }
}
