//! Shared photo event models

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A user-created photo collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Aggregate `[{"count": n}]` when the query asks for a member count.
    #[serde(default, rename = "event_memberships", skip_serializing)]
    member_counts: Vec<CountRow>,
}

impl Event {
    pub fn member_count(&self) -> Option<u64> {
        self.member_counts.first().map(|row| row.count)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CountRow {
    count: u64,
}

/// Uploaded photo belonging to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Media host identifier used to build transform URLs.
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Uploader's profile row, when the query joins `profiles`.
    #[serde(default, rename = "profiles")]
    pub uploader: Option<Uploader>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uploader {
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Row of the `event_memberships` table, optionally with the joined event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMembership {
    #[serde(deserialize_with = "string_or_number")]
    pub event_id: String,
    pub user_id: String,
    #[serde(default)]
    pub events: Option<Event>,
}

/// Row ids may be serial integers or uuids depending on the table.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
