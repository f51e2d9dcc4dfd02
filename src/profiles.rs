//! Search profiles and their calendar-and-clock strategy.
//!
//! A profile describes one weekend-break intent: where the trip may start,
//! how many travellers, the per-person budget, and which weekdays and hours
//! are acceptable for each leg. The strategy is persisted as a JSON blob
//! inside the profile row; matching always loads the whole profile, so
//! nothing ever queries on strategy fields.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Half-open hour window `[lo, hi)` keyed by weekday, 0 = Monday .. 6 = Sunday.
pub type DayWindows = BTreeMap<u8, (u32, u32)>;

/// When the outbound and return departures are allowed. JSON object keys are
/// strings on the wire ("4": [17, 24]) and integers in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub out_days: DayWindows,
    pub in_days: DayWindows,
    pub min_nights: i64,
    pub max_nights: i64,
}

impl Strategy {
    /// Parse and validate a persisted strategy blob.
    pub fn from_json(raw: &str) -> Result<Self> {
        let strategy: Strategy =
            serde_json::from_str(raw).context("strategy blob is not valid JSON")?;
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize strategy")
    }

    /// Reject impossible windows before they ever reach the matcher.
    pub fn validate(&self) -> Result<()> {
        if self.min_nights < 0 || self.max_nights < 0 {
            bail!("nights must be non-negative");
        }
        if self.min_nights > self.max_nights {
            bail!("min_nights cannot be greater than max_nights");
        }
        for (label, days) in [("out_days", &self.out_days), ("in_days", &self.in_days)] {
            for (&day, &(lo, hi)) in days {
                if day > 6 {
                    bail!("{label}: invalid weekday {day}");
                }
                if lo > hi || hi > 24 {
                    bail!("{label}: invalid hour window [{lo}, {hi}) for weekday {day}");
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::search_profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SearchProfile {
    pub id: i32,
    pub user_id: Option<i32>,
    pub name: String,
    pub origins: String,
    pub party_size: i32,
    pub max_price_pp: f64,
    pub allowed_destinations: Option<String>,
    pub notify_destinations: Option<String>,
    pub strategy: String,
    pub metro_origins: bool,
    pub is_active: bool,
    pub updated_at: Option<NaiveDateTime>,
}

fn parse_codes(raw: Option<&str>) -> Result<Vec<String>> {
    match raw {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw).context("IATA list column is not a JSON array"),
    }
}

impl SearchProfile {
    pub fn origin_codes(&self) -> Result<Vec<String>> {
        let origins = parse_codes(Some(self.origins.as_str()))
            .with_context(|| format!("profile {} has a malformed origins column", self.id))?;
        if origins.is_empty() {
            bail!("profile {} has no origins", self.id);
        }
        Ok(origins)
    }

    /// Empty means any destination is allowed.
    pub fn allowed_destination_codes(&self) -> Result<Vec<String>> {
        parse_codes(self.allowed_destinations.as_deref())
            .with_context(|| format!("profile {} has malformed allowed_destinations", self.id))
    }

    /// Destinations with the realtime alert bell enabled.
    pub fn notify_destination_codes(&self) -> Result<Vec<String>> {
        parse_codes(self.notify_destinations.as_deref())
            .with_context(|| format!("profile {} has malformed notify_destinations", self.id))
    }

    pub fn parsed_strategy(&self) -> Result<Strategy> {
        Strategy::from_json(&self.strategy)
            .with_context(|| format!("profile {} has an invalid strategy", self.id))
    }
}

/// Insertable profile, as produced by the profile-save path. `validate` runs
/// before insert so configuration errors never reach the matcher.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::search_profiles)]
pub struct NewSearchProfile {
    pub user_id: Option<i32>,
    pub name: String,
    pub origins: String,
    pub party_size: i32,
    pub max_price_pp: f64,
    pub allowed_destinations: Option<String>,
    pub notify_destinations: Option<String>,
    pub strategy: String,
    pub metro_origins: bool,
    pub is_active: bool,
    pub updated_at: Option<NaiveDateTime>,
}

impl NewSearchProfile {
    pub fn validate(&self) -> Result<()> {
        let origins = parse_codes(Some(self.origins.as_str()))?;
        if origins.is_empty() {
            bail!("profile needs at least one origin");
        }
        if self.party_size < 1 {
            bail!("party_size must be at least 1");
        }
        if self.max_price_pp <= 0.0 {
            bail!("max_price_pp must be positive");
        }
        parse_codes(self.allowed_destinations.as_deref())?;
        parse_codes(self.notify_destinations.as_deref())?;
        Strategy::from_json(&self.strategy)?;
        Ok(())
    }
}
