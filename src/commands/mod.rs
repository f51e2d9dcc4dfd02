pub mod digest;
pub mod prune;
pub mod run;

pub use digest::handle_digest;
pub use prune::handle_prune;
pub use run::handle_run;

use std::sync::Arc;

use chrono::Duration;

use crate::airports::MetroIndex;
use crate::config::Config;
use crate::db::DbPool;
use crate::deals_repo::DealsRepository;
use crate::fares::{FareClient, RyanairClient};
use crate::flights_repo::FlightsRepository;
use crate::harvester::Harvester;
use crate::matcher::DealMatcher;
use crate::notifier::{Notifier, PushClient};
use crate::orchestrator::Orchestrator;
use crate::profiles_repo::ProfilesRepository;
use crate::scan_log_repo::ScanLogRepository;
use crate::scheduler::Scheduler;

/// Wire the full service graph: repositories over the shared pool, the fare
/// and push clients, and the scheduler that drives them.
pub(crate) fn build_scheduler(config: &Config, pool: DbPool, index: Arc<MetroIndex>) -> Scheduler {
    let http = reqwest::Client::new();
    let fares: Arc<dyn FareClient> = Arc::new(RyanairClient::new(http.clone()));
    let push = PushClient::new(http, config.ntfy_base_url.clone());

    let flights = FlightsRepository::new(pool.clone());
    let scan_log = ScanLogRepository::new(pool.clone());
    let profiles = ProfilesRepository::new(pool.clone());
    let deals = DealsRepository::new(pool.clone());

    let harvester = Harvester::new(fares, flights.clone(), scan_log.clone());
    let matcher = DealMatcher::new(
        pool,
        Arc::clone(&index),
        config.hour_tolerance,
        config.nearby_airport_radius_km,
    );
    let notifier = Notifier::new(
        deals.clone(),
        push,
        index,
        config.ntfy_topic.clone(),
        config.webapp_url.clone(),
        config.nearby_airport_radius_km,
    );
    let orchestrator = Orchestrator::new(
        profiles.clone(),
        harvester,
        matcher,
        notifier.clone(),
        Duration::minutes(config.scan_cooldown_minutes),
        config.lookup_horizon_days,
    );

    Scheduler::new(
        orchestrator,
        profiles,
        flights,
        deals,
        scan_log,
        notifier,
        config.clone(),
    )
}
