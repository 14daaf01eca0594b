//! Shared events: listing, creation and joining
//!
//! Events are joined by scanning a QR code that encodes a join link,
//! `<scheme>://events/<id>/join`.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::json;

use super::client::SupabaseClient;
use crate::models::{Asset, Event, EventMembership};

/// Events the user is a member of, newest membership last.
pub async fn list_events_for_user(
    client: &SupabaseClient,
    access_token: &str,
    user_id: &str,
) -> Result<Vec<Event>> {
    let user_filter = format!("eq.{}", user_id);
    let url = client.rest_url(
        "event_memberships",
        &[
            ("select", "*,events(*,event_memberships(count))"),
            ("user_id", user_filter.as_str()),
        ],
    )?;
    let resp = client.rest_get(url, access_token).await?;
    let rows: Vec<EventMembership> = resp
        .json()
        .await
        .context("Failed to parse event_memberships response")?;

    Ok(rows.into_iter().filter_map(|row| row.events).collect())
}

/// A single event with its assets.
pub async fn get_event(client: &SupabaseClient, access_token: &str, event_id: &str) -> Result<Event> {
    let id_filter = format!("eq.{}", event_id);
    let url = client.rest_url("events", &[("select", "*,assets(*)"), ("id", id_filter.as_str())])?;
    let resp = client.rest_get(url, access_token).await?;
    let mut events: Vec<Event> = resp.json().await.context("Failed to parse events response")?;
    anyhow::ensure!(!events.is_empty(), "Event {} not found", event_id);
    Ok(events.swap_remove(0))
}

/// Photos in an event's gallery, with their uploaders.
pub async fn get_assets_for_event(
    client: &SupabaseClient,
    access_token: &str,
    event_id: &str,
) -> Result<Vec<Asset>> {
    let event_filter = format!("eq.{}", event_id);
    let url = client.rest_url(
        "assets",
        &[("select", "*,profiles(*)"), ("event_id", event_filter.as_str())],
    )?;
    let resp = client.rest_get(url, access_token).await?;
    resp.json().await.context("Failed to parse assets response")
}

/// Create an event and make its creator the first member.
pub async fn create_event(
    client: &SupabaseClient,
    access_token: &str,
    name: &str,
    user_id: &str,
) -> Result<Event> {
    let url = client.rest_url("events", &[])?;
    let resp = client
        .rest_insert(url, &json!({ "name": name }), access_token)
        .await?;
    let mut created: Vec<Event> = resp.json().await.context("Failed to parse created event")?;
    anyhow::ensure!(!created.is_empty(), "Backend returned no event row");
    let event = created.swap_remove(0);

    join_event(client, access_token, &event.id, user_id)
        .await
        .context("Event created but membership insert failed")?;
    Ok(event)
}

pub async fn join_event(
    client: &SupabaseClient,
    access_token: &str,
    event_id: &str,
    user_id: &str,
) -> Result<EventMembership> {
    let url = client.rest_url("event_memberships", &[])?;
    let body = json!({ "event_id": event_id, "user_id": user_id });
    let resp = client.rest_insert(url, &body, access_token).await?;
    let mut rows: Vec<EventMembership> = resp
        .json()
        .await
        .context("Failed to parse membership response")?;
    anyhow::ensure!(!rows.is_empty(), "Backend returned no membership row");
    Ok(rows.swap_remove(0))
}

/// Link encoded in an event's share QR code.
pub fn join_link(scheme: &str, event_id: &str) -> String {
    format!("{}://events/{}/join", scheme, event_id)
}

/// Event id from a join link, or from a bare id.
///
/// Accepts any URL whose path ends in `events/<id>/join`, which also covers
/// development links of the form `exp://host/--/events/<id>/join`.
pub fn parse_join_link(input: &str) -> Option<String> {
    static JOIN: OnceLock<Regex> = OnceLock::new();
    let re = JOIN.get_or_init(|| {
        Regex::new(r"events/([^/?#\s]+)/join/?(?:[?#].*)?$").expect("static regex")
    });

    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(caps) = re.captures(input) {
        return Some(caps[1].to_string());
    }
    let is_bare_id = !input.contains(&['/', ':', '?', '#'][..]) && !input.contains(char::is_whitespace);
    is_bare_id.then(|| input.to_string())
}
