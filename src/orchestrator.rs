//! Per-profile refresh pipeline: harvest, match, notify, stamp.

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;

use crate::harvester::Harvester;
use crate::matcher::DealMatcher;
use crate::notifier::Notifier;
use crate::profiles_repo::ProfilesRepository;

#[derive(Clone)]
pub struct Orchestrator {
    profiles: ProfilesRepository,
    harvester: Harvester,
    matcher: DealMatcher,
    notifier: Notifier,
    scan_cooldown: Duration,
    lookup_horizon_days: i64,
}

impl Orchestrator {
    pub fn new(
        profiles: ProfilesRepository,
        harvester: Harvester,
        matcher: DealMatcher,
        notifier: Notifier,
        scan_cooldown: Duration,
        lookup_horizon_days: i64,
    ) -> Self {
        Self {
            profiles,
            harvester,
            matcher,
            notifier,
            scan_cooldown,
            lookup_horizon_days,
        }
    }

    /// Run the full harvest -> match -> notify cycle for one profile, then
    /// stamp `updated_at`. Any error propagates before the stamp, so the
    /// scheduler retries the profile after the update interval. Other
    /// profiles are unaffected either way.
    pub async fn update_profile(&self, profile_id: i32) -> Result<()> {
        let Some(profile) = self.profiles.get(profile_id).await? else {
            info!("Skipping update: profile {} not found", profile_id);
            return Ok(());
        };
        if !profile.is_active {
            info!("Skipping update: profile {} is inactive", profile.name);
            return Ok(());
        }

        info!("Starting update for {}", profile.name);

        let pairs: Vec<(String, i32)> = profile
            .origin_codes()?
            .into_iter()
            .map(|origin| (origin, profile.party_size))
            .collect();
        let fetched = self
            .harvester
            .run(&pairs, self.lookup_horizon_days, self.scan_cooldown)
            .await?;
        info!("  Fetched {} leg(s)", fetched);

        let owner = self.profiles.get_owner(&profile).await?;
        let excluded = match &owner {
            Some(user) => user.excluded_destination_codes()?,
            None => Vec::new(),
        };
        let matched = self.matcher.run(&profile, &excluded).await?;
        info!("  Matched {} deal(s)", matched);

        self.notifier
            .notify_new_deals(&profile, owner.as_ref())
            .await?;

        self.profiles
            .stamp_updated(profile.id, Utc::now().naive_utc())
            .await?;
        info!("Update complete for {}", profile.name);
        Ok(())
    }
}
