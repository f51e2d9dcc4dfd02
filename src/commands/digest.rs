use std::sync::Arc;

use anyhow::Result;

use crate::airports::MetroIndex;
use crate::config::Config;
use crate::db::DbPool;

/// Send the daily digest for every active profile immediately.
pub async fn handle_digest(config: Config, pool: DbPool, index: Arc<MetroIndex>) -> Result<()> {
    let scheduler = super::build_scheduler(&config, pool, index);
    scheduler.daily_digest().await;
    Ok(())
}
