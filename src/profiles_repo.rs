use anyhow::Result;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::db::DbPool;
use crate::profiles::{NewSearchProfile, SearchProfile};
use crate::users::User;

#[derive(Clone)]
pub struct ProfilesRepository {
    pool: DbPool,
}

impl ProfilesRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Validate and insert a profile. Invalid strategies, empty origins and
    /// non-positive budgets are rejected here and never reach the matcher.
    pub async fn create(&self, new_profile: NewSearchProfile) -> Result<SearchProfile> {
        use crate::schema::search_profiles::dsl::*;

        new_profile.validate()?;
        let pool = self.pool.clone();
        let profile = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let row = diesel::insert_into(search_profiles)
                .values(&new_profile)
                .returning(SearchProfile::as_returning())
                .get_result(&mut conn)?;
            Ok::<SearchProfile, anyhow::Error>(row)
        })
        .await??;

        Ok(profile)
    }

    pub async fn get(&self, profile_id: i32) -> Result<Option<SearchProfile>> {
        use crate::schema::search_profiles::dsl::*;

        let pool = self.pool.clone();
        let profile = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let row = search_profiles
                .filter(id.eq(profile_id))
                .select(SearchProfile::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<Option<SearchProfile>, anyhow::Error>(row)
        })
        .await??;

        Ok(profile)
    }

    /// The profile owner, when the profile has one.
    pub async fn get_owner(&self, profile: &SearchProfile) -> Result<Option<User>> {
        use crate::schema::users::dsl::*;

        let Some(owner_id) = profile.user_id else {
            return Ok(None);
        };
        let pool = self.pool.clone();
        let owner = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let row = users
                .filter(id.eq(owner_id))
                .select(User::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<Option<User>, anyhow::Error>(row)
        })
        .await??;

        Ok(owner)
    }

    pub async fn list_active(&self) -> Result<Vec<SearchProfile>> {
        use crate::schema::search_profiles::dsl::*;

        let pool = self.pool.clone();
        let profiles = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = search_profiles
                .filter(is_active.eq(true))
                .order(id)
                .select(SearchProfile::as_select())
                .load(&mut conn)?;
            Ok::<Vec<SearchProfile>, anyhow::Error>(rows)
        })
        .await??;

        Ok(profiles)
    }

    /// Active profiles that have never been refreshed, or not within the
    /// update interval.
    pub async fn list_due(&self, update_interval: Duration) -> Result<Vec<SearchProfile>> {
        use crate::schema::search_profiles::dsl::*;

        let threshold = Utc::now().naive_utc() - update_interval;
        let pool = self.pool.clone();
        let profiles = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = search_profiles
                .filter(is_active.eq(true))
                .filter(updated_at.is_null().or(updated_at.lt(threshold)))
                .order(id)
                .select(SearchProfile::as_select())
                .load(&mut conn)?;
            Ok::<Vec<SearchProfile>, anyhow::Error>(rows)
        })
        .await??;

        Ok(profiles)
    }

    /// Stamp a successful orchestration. A failed run leaves `updated_at`
    /// untouched so the scheduler retries on its next tick.
    pub async fn stamp_updated(&self, profile_id: i32, stamp: NaiveDateTime) -> Result<()> {
        use crate::schema::search_profiles::dsl::*;

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::update(search_profiles.filter(id.eq(profile_id)))
                .set(updated_at.eq(stamp))
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }
}
