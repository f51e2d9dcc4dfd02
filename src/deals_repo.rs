use anyhow::Result;
use chrono::NaiveDateTime;
use diesel::dsl::not;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::info;

use crate::db::DbPool;
use crate::deals::{Deal, DealView};
use crate::flights::Flight;
use crate::schema::{deals, flights};

diesel::alias!(
    flights as outbound_legs: OutboundLegs,
    flights as inbound_legs: InboundLegs,
);

#[derive(Clone)]
pub struct DealsRepository {
    pool: DbPool,
}

impl DealsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh a deal inside the caller's transaction. Used by the
    /// matcher, which batches all of a run's writes with the stale prune.
    ///
    /// On a fingerprint-triple hit the row's `updated_at` is refreshed; when
    /// the per-person price moved, the price is rewritten and `notified` is
    /// cleared so the drop re-alerts.
    pub fn upsert_deal_blocking(
        conn: &mut SqliteConnection,
        deal_profile_id: i32,
        outbound_id: &str,
        inbound_id: &str,
        price_pp: f64,
        now: NaiveDateTime,
    ) -> QueryResult<()> {
        let existing: Option<Deal> = deals::table
            .filter(deals::profile_id.eq(deal_profile_id))
            .filter(deals::outbound_flight_id.eq(outbound_id))
            .filter(deals::inbound_flight_id.eq(inbound_id))
            .select(Deal::as_select())
            .first(conn)
            .optional()?;

        match existing {
            Some(deal) if deal.total_price_pp == price_pp => {
                diesel::update(deals::table.filter(deals::id.eq(deal.id)))
                    .set(deals::updated_at.eq(now))
                    .execute(conn)?;
            }
            Some(deal) => {
                diesel::update(deals::table.filter(deals::id.eq(deal.id)))
                    .set((
                        deals::updated_at.eq(now),
                        deals::total_price_pp.eq(price_pp),
                        deals::notified.eq(false),
                    ))
                    .execute(conn)?;
            }
            None => {
                diesel::insert_into(deals::table)
                    .values((
                        deals::profile_id.eq(deal_profile_id),
                        deals::outbound_flight_id.eq(outbound_id),
                        deals::inbound_flight_id.eq(inbound_id),
                        deals::total_price_pp.eq(price_pp),
                        deals::updated_at.eq(now),
                        deals::notified.eq(false),
                    ))
                    .execute(conn)?;
            }
        }
        Ok(())
    }

    /// Delete deals of this profile that the current run did not refresh:
    /// their flight pair no longer reconstructs a valid round trip.
    pub fn delete_stale_blocking(
        conn: &mut SqliteConnection,
        deal_profile_id: i32,
        match_start: NaiveDateTime,
    ) -> QueryResult<usize> {
        diesel::delete(
            deals::table
                .filter(deals::profile_id.eq(deal_profile_id))
                .filter(deals::updated_at.lt(match_start)),
        )
        .execute(conn)
    }

    fn load_views_blocking(
        conn: &mut SqliteConnection,
        deal_profile_id: i32,
        only_unnotified: bool,
    ) -> QueryResult<Vec<DealView>> {
        let mut query = deals::table
            .inner_join(
                outbound_legs
                    .on(deals::outbound_flight_id.eq(outbound_legs.field(flights::id))),
            )
            .inner_join(
                inbound_legs.on(deals::inbound_flight_id.eq(inbound_legs.field(flights::id))),
            )
            .filter(deals::profile_id.eq(deal_profile_id))
            .order(deals::total_price_pp.asc())
            .select((
                Deal::as_select(),
                outbound_legs.fields(flights::all_columns),
                inbound_legs.fields(flights::all_columns),
            ))
            .into_boxed();

        if only_unnotified {
            query = query.filter(deals::notified.eq(false));
        }

        let rows: Vec<(Deal, Flight, Flight)> = query.load(conn)?;
        Ok(rows
            .into_iter()
            .map(|(deal, outbound, inbound)| DealView {
                deal,
                outbound,
                inbound,
            })
            .collect())
    }

    /// All deals for a profile joined with both legs, cheapest first.
    pub async fn list_views(&self, deal_profile_id: i32) -> Result<Vec<DealView>> {
        let pool = self.pool.clone();
        let views = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let views = Self::load_views_blocking(&mut conn, deal_profile_id, false)?;
            Ok::<Vec<DealView>, anyhow::Error>(views)
        })
        .await??;

        Ok(views)
    }

    /// Deals not yet surfaced to the user, cheapest first.
    pub async fn list_unnotified_views(&self, deal_profile_id: i32) -> Result<Vec<DealView>> {
        let pool = self.pool.clone();
        let views = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let views = Self::load_views_blocking(&mut conn, deal_profile_id, true)?;
            Ok::<Vec<DealView>, anyhow::Error>(views)
        })
        .await??;

        Ok(views)
    }

    pub async fn mark_notified(&self, deal_ids: Vec<i32>) -> Result<()> {
        if deal_ids.is_empty() {
            return Ok(());
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::update(deals::table.filter(deals::id.eq_any(deal_ids)))
                .set(deals::notified.eq(true))
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }

    /// Reconcile deals whose legs were pruned out from under them. Flight
    /// deletion and deal deletion are not ordered across tasks, so readers
    /// still skip orphans defensively via the inner join.
    pub async fn prune_orphans(&self) -> Result<usize> {
        let pool = self.pool.clone();
        let deleted = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let known_flights = flights::table.select(flights::id);
            let rows = diesel::delete(
                deals::table.filter(
                    not(deals::outbound_flight_id.eq_any(known_flights.clone()))
                        .or(not(deals::inbound_flight_id.eq_any(known_flights)))
                ),
            )
            .execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(rows)
        })
        .await??;

        if deleted > 0 {
            info!("Pruned {} orphaned deal(s)", deleted);
        }
        Ok(deleted)
    }

    pub async fn list_for_profile(&self, deal_profile_id: i32) -> Result<Vec<Deal>> {
        let pool = self.pool.clone();
        let rows = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = deals::table
                .filter(deals::profile_id.eq(deal_profile_id))
                .order(deals::total_price_pp.asc())
                .select(Deal::as_select())
                .load(&mut conn)?;
            Ok::<Vec<Deal>, anyhow::Error>(rows)
        })
        .await??;

        Ok(rows)
    }

    pub async fn touch_updated_at(&self, deal_id: i32, stamp: NaiveDateTime) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::update(deals::table.filter(deals::id.eq(deal_id)))
                .set(deals::updated_at.eq(stamp))
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }
}
