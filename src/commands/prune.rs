use std::sync::Arc;

use anyhow::Result;

use crate::airports::MetroIndex;
use crate::config::Config;
use crate::db::DbPool;

/// One-shot reconciliation pass, same as the scheduler's hourly prune.
pub async fn handle_prune(config: Config, pool: DbPool, index: Arc<MetroIndex>) -> Result<()> {
    let scheduler = super::build_scheduler(&config, pool, index);
    scheduler.prune().await
}
