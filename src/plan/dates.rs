// src/plan/dates.rs

//! Lenient ISO-8601 date deserialisation for persisted plans.
//!
//! A plan file with a mangled timestamp is still a usable plan, so an
//! unparseable date is replaced with the current time instead of failing
//! the whole load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::warn;

pub fn parse_or_now(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            warn!(value = %raw, error = %e, "unparseable date in plan; using current time");
            Utc::now()
        }
    }
}

pub fn datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_or_now(&raw))
}

pub fn opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(parse_or_now))
}
