//! Polling scheduler: the single long-running loop of the daemon.
//!
//! Three periodic duties share one coarse tick: dispatching due profiles to
//! a bounded worker pool, pruning stale state, and the daily digest. Each
//! orchestration task is isolated; a failing or panicking profile never
//! takes its siblings down.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use chrono::{Duration as ChronoDuration, Local, NaiveDate, Utc};
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinSet;
use tokio::time::Duration;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::deals_repo::DealsRepository;
use crate::flights_repo::FlightsRepository;
use crate::notifier::Notifier;
use crate::orchestrator::Orchestrator;
use crate::profiles_repo::ProfilesRepository;
use crate::scan_log_repo::ScanLogRepository;

/// Coarse main-loop tick.
const TICK: Duration = Duration::from_secs(10);
const DISPATCH_EVERY: Duration = Duration::from_secs(5 * 60);
const PRUNE_EVERY: Duration = Duration::from_secs(60 * 60);
/// Scan-log retention.
const SCAN_LOG_RETENTION_DAYS: i64 = 7;

pub struct Scheduler {
    orchestrator: Orchestrator,
    profiles: ProfilesRepository,
    flights: FlightsRepository,
    deals: DealsRepository,
    scan_log: ScanLogRepository,
    notifier: Notifier,
    config: Config,
}

impl Scheduler {
    pub fn new(
        orchestrator: Orchestrator,
        profiles: ProfilesRepository,
        flights: FlightsRepository,
        deals: DealsRepository,
        scan_log: ScanLogRepository,
        notifier: Notifier,
        config: Config,
    ) -> Self {
        Self {
            orchestrator,
            profiles,
            flights,
            deals,
            scan_log,
            notifier,
            config,
        }
    }

    /// Run until the shutdown signal fires. In-flight orchestrations finish
    /// before the loop exits.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        info!("Starting polling scheduler");

        // Catch up immediately on startup rather than waiting a full
        // dispatch interval.
        self.dispatch().await;
        let mut last_dispatch = Instant::now();
        let mut last_prune = Instant::now();
        // When the process starts after today's digest time, wait for
        // tomorrow instead of firing immediately.
        let mut last_digest: Option<NaiveDate> =
            (Local::now().time() >= self.config.digest_local_time).then(|| Local::now().date_naive());

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if last_dispatch.elapsed() >= DISPATCH_EVERY {
                        self.dispatch().await;
                        last_dispatch = Instant::now();
                    }
                    if last_prune.elapsed() >= PRUNE_EVERY {
                        if let Err(e) = self.prune().await {
                            error!("Pruning failed: {e:#}");
                        }
                        last_prune = Instant::now();
                    }
                    let today = Local::now().date_naive();
                    if Local::now().time() >= self.config.digest_local_time
                        && last_digest != Some(today)
                    {
                        self.daily_digest().await;
                        last_digest = Some(today);
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler loop");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Select due profiles and run one orchestration per profile, at most
    /// `max_workers` at a time. Outcomes are collected and logged before
    /// returning; a failed or panicked task never affects its siblings.
    pub async fn dispatch(&self) {
        let update_interval = ChronoDuration::minutes(self.config.update_interval_minutes);
        let due = match self.profiles.list_due(update_interval).await {
            Ok(due) => due,
            Err(e) => {
                error!("Scheduler failed to select due profiles: {e:#}");
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        info!("Scheduling updates for {} profile(s)", due.len());
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut tasks = JoinSet::new();
        for profile in due {
            let semaphore = Arc::clone(&semaphore);
            let orchestrator = self.orchestrator.clone();
            let (profile_id, profile_name) = (profile.id, profile.name.clone());
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => orchestrator.update_profile(profile_id).await,
                    Err(_) => Err(anyhow!("worker pool closed")),
                };
                (profile_name, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!("Update finished for {}", name),
                Ok((name, Err(e))) => error!("Update FAILED for {}: {e:#}", name),
                Err(join_error) => error!("Orchestration task panicked: {join_error}"),
            }
        }
    }

    /// Hourly reconciliation: stale flights out, deals orphaned by that (or
    /// by earlier failures) out, week-old scan log entries out.
    pub async fn prune(&self) -> Result<()> {
        let now = Utc::now().naive_utc();
        let flight_cutoff = now - ChronoDuration::hours(self.config.flight_staleness_hours);
        let deleted_flights = self.flights.delete_stale(flight_cutoff).await?;
        let orphaned_deals = self.deals.prune_orphans().await?;
        let scan_cutoff = now - ChronoDuration::days(SCAN_LOG_RETENTION_DAYS);
        let old_logs = self.scan_log.delete_older_than(scan_cutoff).await?;

        if deleted_flights + orphaned_deals + old_logs > 0 {
            info!(
                "Pruned {} stale flight(s), {} orphaned deal(s), {} old scan log(s)",
                deleted_flights, orphaned_deals, old_logs
            );
        }
        Ok(())
    }

    /// One digest push per active profile. Per-profile failures are logged
    /// and skipped.
    pub async fn daily_digest(&self) {
        let profiles = match self.profiles.list_active().await {
            Ok(profiles) => profiles,
            Err(e) => {
                error!("Daily digest failed to list profiles: {e:#}");
                return;
            }
        };
        for profile in profiles {
            let owner = match self.profiles.get_owner(&profile).await {
                Ok(owner) => owner,
                Err(e) => {
                    error!("Daily digest failed to load owner of {}: {e:#}", profile.name);
                    continue;
                }
            };
            if let Err(e) = self.notifier.send_digest(&profile, owner.as_ref()).await {
                error!("Daily digest failed for {}: {e:#}", profile.name);
            }
        }
    }
}
