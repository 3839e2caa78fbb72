//! # Dashboard Watch Example
//!
//! Connects to a Pulseboard server's owner-dashboard channel and prints the
//! view model as frames arrive:
//!
//! 1. Open the channel through a `ChannelRegistry`
//! 2. Register the metric cards the "page" shows
//! 3. Watch status transitions while the registry reconnects on failures
//! 4. Shut down gracefully on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start a Pulseboard server on localhost:8000, then:
//! cargo run --example dashboard_watch
//!
//! # Override the host:
//! PULSEBOARD_HOST=app.example.com:8000 cargo run --example dashboard_watch
//! ```

use std::sync::{Arc, Mutex};

use pulseboard_client::channels::dashboard;
use pulseboard_client::endpoint::{paths, PageOrigin};
use pulseboard_client::transports::WebSocketConnector;
use pulseboard_client::views::OwnerDashboard;
use pulseboard_client::{ChannelRegistry, ChannelStatus};

/// Default host when `PULSEBOARD_HOST` is not set.
const DEFAULT_HOST: &str = "localhost:8000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let host = std::env::var("PULSEBOARD_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let origin = PageOrigin::new(host, false);
    tracing::info!("Watching {}", origin.channel_url(paths::OWNER_DASHBOARD));

    // ── View model ──────────────────────────────────────────────────
    // Register the widgets this "page" renders; updates for anything else
    // are ignored, exactly as on a page without those elements.
    let view = Arc::new(Mutex::new(OwnerDashboard::new()));
    if let Ok(mut dashboard) = view.lock() {
        dashboard.register_metric("revenue");
        dashboard.register_metric("active_projects");
    }

    // ── Connect ─────────────────────────────────────────────────────
    // Dial the dashboard endpoint directly; the registry reconnects with
    // exponential backoff if the server goes away.
    let mut registry = ChannelRegistry::new();
    let connector = WebSocketConnector::new(origin.channel_url(paths::OWNER_DASHBOARD));
    let handle = registry.connect(
        dashboard::NAME,
        connector,
        dashboard::handlers(Arc::clone(&view)),
    );
    let mut status = handle.watch_status();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    tracing::info!("Channel task exited");
                    break;
                }
                let current = *status.borrow();
                tracing::info!("Channel status: {current:?}");

                if current == ChannelStatus::Open {
                    let Ok(dashboard) = view.lock() else { continue };
                    for id in ["revenue", "active_projects"] {
                        if let Some(card) = dashboard.metric(id) {
                            tracing::info!(
                                "  {id}: {} ({:?} {:+.1}%)",
                                card.value, card.trend, card.trend_pct
                            );
                        }
                    }
                    tracing::info!("  activity entries: {}", dashboard.activity_len());
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, disconnecting");
                registry.disconnect_all();
                break;
            }
        }
    }

    Ok(())
}
