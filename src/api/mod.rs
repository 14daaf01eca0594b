//! Backend API client module
//!
//! The auth service sits behind [`AuthBackend`]; events data goes through
//! the REST helpers in [`events`].

pub mod backend;
pub mod client;
pub mod events;
pub mod gotrue;

use anyhow::Result;

pub use backend::{AuthBackend, BackendError, OAuthOptions};
pub use client::SupabaseClient;
pub use gotrue::GoTrueBackend;

use crate::runtime::Runtime;

/// List the events the current user belongs to
pub async fn list_events() -> Result<()> {
    let rt = Runtime::connect()?;
    let (token, user_id) = rt.credentials().await?;
    let events = events::list_events_for_user(rt.backend.client(), &token, &user_id).await?;
    rt.reconciler.shutdown();

    if events.is_empty() {
        println!("No events yet. Create one with 'photoshare create-event <name>'.");
        return Ok(());
    }

    println!();
    for event in &events {
        let members = event
            .member_count()
            .map(|n| format!("{} member{}", n, if n == 1 { "" } else { "s" }))
            .unwrap_or_default();
        println!("  {:<12} {:<32} {}", event.id, event.name, members);
    }
    println!();
    Ok(())
}

/// Create an event owned by the current user
pub async fn create_event(name: &str) -> Result<()> {
    anyhow::ensure!(!name.trim().is_empty(), "Event name must not be empty");
    let rt = Runtime::connect()?;
    let (token, user_id) = rt.credentials().await?;
    let event = events::create_event(rt.backend.client(), &token, name.trim(), &user_id).await?;
    rt.reconciler.shutdown();

    println!("Created event {} ({}).", event.name, event.id);
    println!(
        "Share link: {}",
        events::join_link(&rt.config.redirect_scheme, &event.id)
    );
    Ok(())
}

/// Join an event from its id or share link
pub async fn join(target: &str) -> Result<()> {
    let event_id = events::parse_join_link(target)
        .ok_or_else(|| anyhow::anyhow!("Not an event id or join link: {}", target))?;

    let rt = Runtime::connect()?;
    let (token, user_id) = rt.credentials().await?;
    let client = rt.backend.client();
    let event = events::get_event(client, &token, &event_id).await?;
    events::join_event(client, &token, &event.id, &user_id).await?;
    rt.reconciler.shutdown();

    println!("Joined {} ({} photos).", event.name, event.assets.len());
    Ok(())
}

/// List the photos in an event's gallery
pub async fn photos(event_id: &str) -> Result<()> {
    let rt = Runtime::connect()?;
    let (token, _) = rt.credentials().await?;
    let assets = events::get_assets_for_event(rt.backend.client(), &token, event_id).await?;
    rt.reconciler.shutdown();

    if assets.is_empty() {
        println!("No photos in this event yet.");
        return Ok(());
    }

    println!();
    for asset in &assets {
        let uploader = asset
            .uploader
            .as_ref()
            .and_then(|u| u.full_name.as_deref())
            .unwrap_or("unknown");
        println!(
            "  {:<36} {:<24} {}",
            asset.asset_id.as_deref().unwrap_or(&asset.id),
            uploader,
            asset.created_at.as_deref().unwrap_or("")
        );
    }
    println!();
    println!("{} photo{}", assets.len(), if assets.len() == 1 { "" } else { "s" });
    Ok(())
}

/// Print the link a share QR code encodes
pub async fn share(event_id: &str) -> Result<()> {
    let rt = Runtime::connect()?;
    let (token, _) = rt.credentials().await?;
    let event = events::get_event(rt.backend.client(), &token, event_id).await?;
    rt.reconciler.shutdown();

    println!("{}", event.name);
    println!("{}", events::join_link(&rt.config.redirect_scheme, &event.id));
    Ok(())
}
