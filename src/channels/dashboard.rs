//! The owner-dashboard channel: company metrics, activity log, system
//! alerts, and chart series updates.

use std::sync::{Arc, Mutex};

use crate::dispatch::Handlers;
use crate::protocol::{DashboardUpdate, EventKind, ServerEvent};
use crate::views::OwnerDashboard;

/// Registry name of the owner-dashboard channel.
pub const NAME: &str = "owner_dashboard";

/// Handler set updating `dashboard`.
pub fn handlers(dashboard: Arc<Mutex<OwnerDashboard>>) -> Handlers {
    let update_view = Arc::clone(&dashboard);
    let alert_view = Arc::clone(&dashboard);
    let chart_view = dashboard;

    Handlers::new()
        .on(EventKind::DashboardUpdate, move |event, _| {
            if let ServerEvent::DashboardUpdate { update } = event {
                if let Ok(mut dashboard) = update_view.lock() {
                    match update {
                        DashboardUpdate::CompanyMetric(metric) => dashboard.apply_metric(metric),
                        DashboardUpdate::ActivityLog(entry) => {
                            dashboard.push_activity(entry.clone());
                        }
                    }
                }
            }
        })
        .on(EventKind::SystemAlert, move |event, _| {
            if let ServerEvent::SystemAlert { alert } = event {
                if let Ok(mut dashboard) = alert_view.lock() {
                    dashboard.push_alert(alert.clone());
                }
            }
        })
        .on(EventKind::MetricUpdate, move |event, _| {
            if let ServerEvent::MetricUpdate { metric } = event {
                if let Ok(mut dashboard) = chart_view.lock() {
                    dashboard.apply_chart(metric);
                }
            }
        })
}

/// Connect the owner-dashboard channel, unless the page is served from a
/// development host. Returns whether a connection was registered.
#[cfg(feature = "transport-websocket")]
pub fn connect(
    registry: &mut crate::registry::ChannelRegistry,
    origin: &crate::endpoint::PageOrigin,
    dashboard: Arc<Mutex<OwnerDashboard>>,
) -> bool {
    use crate::endpoint::paths;
    use crate::transports::WebSocketConnector;

    if origin.is_development_host() {
        tracing::info!(host = %origin.host(), "development host, skipping owner-dashboard channel");
        return false;
    }

    let connector = WebSocketConnector::new(origin.channel_url(paths::OWNER_DASHBOARD));
    registry.connect(NAME, connector, handlers(dashboard));
    true
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::dispatch::{ChannelSender, Dispatcher};
    use crate::protocol::ChartData;
    use crate::views::Trend;
    use tokio::sync::mpsc;

    fn setup() -> (Arc<Mutex<OwnerDashboard>>, Dispatcher, ChannelSender) {
        let dashboard = Arc::new(Mutex::new(OwnerDashboard::new()));
        let dispatcher = Dispatcher::new(NAME, handlers(Arc::clone(&dashboard)));
        let (tx, _rx) = mpsc::unbounded_channel();
        (dashboard, dispatcher, ChannelSender::new(tx))
    }

    #[test]
    fn company_metric_updates_registered_card() {
        let (dashboard, mut dispatcher, tx) = setup();
        dashboard.lock().unwrap().register_metric("revenue");

        let raw = r#"{"type":"dashboard_update","update":
            {"type":"company_metric","metric_id":"revenue","value":"$52k","trend":4.2}}"#;
        dispatcher.dispatch(raw, &tx);

        let view = dashboard.lock().unwrap();
        let card = view.metric("revenue").unwrap();
        assert_eq!(card.value, "$52k");
        assert_eq!(card.trend, Trend::Up);
    }

    #[test]
    fn activity_log_entries_accumulate() {
        let (dashboard, mut dispatcher, tx) = setup();

        let raw = r#"{"type":"dashboard_update","update":
            {"type":"activity_log","timestamp":"t","user":"u","action":"created","resource":"invoice"}}"#;
        dispatcher.dispatch(raw, &tx);

        assert_eq!(dashboard.lock().unwrap().activity_len(), 1);
    }

    #[test]
    fn system_alert_is_added() {
        let (dashboard, mut dispatcher, tx) = setup();

        let raw = r#"{"type":"system_alert","alert":
            {"level":"warning","title":"Maintenance","message":"tonight"}}"#;
        dispatcher.dispatch(raw, &tx);

        let view = dashboard.lock().unwrap();
        assert_eq!(view.alerts().len(), 1);
        assert!(view.alerts()[0].auto_dismiss);
    }

    #[test]
    fn metric_update_replaces_chart_series() {
        let (dashboard, mut dispatcher, tx) = setup();
        dashboard.lock().unwrap().register_chart(
            "revenue_chart",
            ChartData::TimeSeries {
                labels: vec![],
                datasets: vec![],
            },
        );

        let raw = r#"{"type":"metric_update","metric":
            {"id":"revenue_chart","data_type":"time_series",
             "labels":["Jan","Feb"],"datasets":[{"data":[1.0,2.0]}]}}"#;
        dispatcher.dispatch(raw, &tx);

        let view = dashboard.lock().unwrap();
        match view.chart("revenue_chart").unwrap() {
            ChartData::TimeSeries { labels, .. } => assert_eq!(labels.len(), 2),
            other => panic!("expected time series, got {other:?}"),
        }
    }
}
