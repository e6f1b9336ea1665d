//! Two simulated execution contexts converging on one synced value.
//!
//! Run with: cargo run -p two-contexts-demo
//!
//! A "background" context and a "popup" context each own their own cell;
//! they share only the session store and the message bus, the way isolated
//! extension contexts would.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use session_sync::{MemoryBus, MemoryStore, SessionSyncer, SyncConfig};
use session_sync_core::ValueCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Session-scoped settings shared by every surface of the app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SessionSettings {
    minimize_on_copy: bool,
    clear_clipboard_secs: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Stand-ins for the runtime's shared session storage and its
    // inter-context messaging.
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());

    let config = || SyncConfig::new("SessionSettings").with_ctor(SessionSettings::default);

    // One cell and one syncer per context, initialized independently.
    let background_settings = Arc::new(ValueCell::new(SessionSettings::default()));
    let popup_settings = Arc::new(ValueCell::new(SessionSettings::default()));

    let background = Arc::new(SessionSyncer::new(
        Arc::clone(&background_settings),
        Arc::clone(&store),
        Arc::clone(&bus),
        config(),
    )?);
    let popup = Arc::new(SessionSyncer::new(
        Arc::clone(&popup_settings),
        store,
        bus,
        config(),
    )?);

    background.start();
    popup.start();

    // Let both contexts publish their initial state before acting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    tracing::info!(settings = ?background_settings.value(), "background before the change");

    // The user flips a setting in the popup surface.
    popup_settings.set(SessionSettings {
        minimize_on_copy: true,
        clear_clipboard_secs: Some(30),
    });

    // Give the store write + notification round trip a moment to land.
    tokio::time::sleep(Duration::from_millis(100)).await;

    tracing::info!(settings = ?background_settings.value(), "background after the change");
    anyhow::ensure!(
        background_settings.value() == popup_settings.value(),
        "contexts did not converge"
    );

    Ok(())
}
