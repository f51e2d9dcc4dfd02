use anyhow::Result;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use tracing::info;

use crate::db::DbPool;

/// The scan log records when each `(origin, party_size)` pair was last
/// harvested, so concurrent profiles sharing an origin don't hammer the
/// upstream provider. The cooldown check is advisory: two harvesters racing
/// on the same pair may both fetch once, which is bounded and harmless.
#[derive(Clone)]
pub struct ScanLogRepository {
    pool: DbPool,
}

impl ScanLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// True iff the pair was scanned within the cooldown window.
    pub async fn recently_scanned(
        &self,
        scan_origin: &str,
        scan_party_size: i32,
        cooldown: Duration,
    ) -> Result<bool> {
        use crate::schema::scan_log::dsl::*;

        let scan_origin = scan_origin.to_string();
        let threshold = Utc::now().naive_utc() - cooldown;
        let pool = self.pool.clone();
        let found = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let recent: Option<NaiveDateTime> = scan_log
                .filter(origin.eq(&scan_origin))
                .filter(party_size.eq(scan_party_size))
                .filter(scanned_at.gt(threshold))
                .select(scanned_at)
                .first(&mut conn)
                .optional()?;
            Ok::<bool, anyhow::Error>(recent.is_some())
        })
        .await??;

        Ok(found)
    }

    /// Append a scan entry stamped now. Never deduplicated; retention is
    /// handled by the periodic prune.
    pub async fn record(&self, scan_origin: &str, scan_party_size: i32) -> Result<()> {
        use crate::schema::scan_log::dsl::*;

        let scan_origin = scan_origin.to_string();
        let now = Utc::now().naive_utc();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::insert_into(scan_log)
                .values((
                    origin.eq(&scan_origin),
                    party_size.eq(scan_party_size),
                    scanned_at.eq(now),
                ))
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }

    /// Delete entries older than the cutoff.
    pub async fn delete_older_than(&self, cutoff: NaiveDateTime) -> Result<usize> {
        use crate::schema::scan_log::dsl::*;

        let pool = self.pool.clone();
        let deleted = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = diesel::delete(scan_log.filter(scanned_at.lt(cutoff))).execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(rows)
        })
        .await??;

        if deleted > 0 {
            info!("Pruned {} old scan log entrie(s)", deleted);
        }
        Ok(deleted)
    }

    pub async fn count_for(&self, scan_origin: &str, scan_party_size: i32) -> Result<i64> {
        use crate::schema::scan_log::dsl::*;

        let scan_origin = scan_origin.to_string();
        let pool = self.pool.clone();
        let total = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let total = scan_log
                .filter(origin.eq(&scan_origin))
                .filter(party_size.eq(scan_party_size))
                .count()
                .get_result::<i64>(&mut conn)?;
            Ok::<i64, anyhow::Error>(total)
        })
        .await??;

        Ok(total)
    }
}
