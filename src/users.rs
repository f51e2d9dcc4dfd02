//! Profile owners. Authentication lives elsewhere; the engine only needs the
//! notification channel and the per-user destination blocklist.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    /// Per-user ntfy topic; falls back to the global topic when unset.
    pub ntfy_topic: Option<String>,
    pub excluded_destinations: Option<String>,
    pub created_at: NaiveDateTime,
}

impl User {
    /// Destinations this user never wants to see, as IATA codes.
    pub fn excluded_destination_codes(&self) -> Result<Vec<String>> {
        match self.excluded_destinations.as_deref() {
            None | Some("") => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw).with_context(|| {
                format!("user {} has malformed excluded_destinations", self.id)
            }),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub username: String,
    pub ntfy_topic: Option<String>,
    pub excluded_destinations: Option<String>,
    pub created_at: NaiveDateTime,
}
