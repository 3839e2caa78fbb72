//! Per-team channel: team card patched in place, member list replaced
//! wholesale when present.

use std::sync::{Arc, Mutex};

use crate::dispatch::Handlers;
use crate::protocol::{EventKind, ServerEvent};
use crate::views::TeamPanel;

/// Registry name for a team channel.
pub fn name(team_id: u64) -> String {
    format!("team_{team_id}")
}

/// Handler set updating `panel`.
pub fn handlers(panel: Arc<Mutex<TeamPanel>>) -> Handlers {
    Handlers::new().on(EventKind::TeamUpdate, move |event, _| {
        if let ServerEvent::TeamUpdate { update } = event {
            if let Ok(mut panel) = panel.lock() {
                panel.apply(update);
            }
        }
    })
}

/// Connect the channel for one team.
#[cfg(feature = "transport-websocket")]
pub fn connect(
    registry: &mut crate::registry::ChannelRegistry,
    origin: &crate::endpoint::PageOrigin,
    team_id: u64,
    panel: Arc<Mutex<TeamPanel>>,
) {
    use crate::endpoint::paths;
    use crate::transports::WebSocketConnector;

    let connector = WebSocketConnector::new(origin.channel_url(&paths::team(team_id)));
    registry.connect(name(team_id), connector, handlers(panel));
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
    use crate::views::TeamCard;
    use tokio::sync::mpsc;

    #[test]
    fn team_update_patches_registered_card() {
        let panel = Arc::new(Mutex::new(TeamPanel::new()));
        panel.lock().unwrap().register_team(
            3,
            TeamCard {
                name: "Ops".into(),
                member_count: 4,
                members: vec![],
            },
        );

        let mut dispatcher = Dispatcher::new(name(3), handlers(Arc::clone(&panel)));
        let (tx, _rx) = mpsc::unbounded_channel();
        let tx = ChannelSender::new(tx);

        dispatcher.dispatch(
            r#"{"type":"team_update","update":{"id":3,"name":"Operations","member_count":5}}"#,
            &tx,
        );

        let view = panel.lock().unwrap();
        let card = view.team(3).unwrap();
        assert_eq!(card.name, "Operations");
        assert_eq!(card.member_count, 5);
    }

    #[test]
    fn channel_names_embed_the_team_id() {
        assert_eq!(name(7), "team_7");
    }
}
