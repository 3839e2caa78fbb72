//! Per-project channel: project and task rows patched in place.

use std::sync::{Arc, Mutex};

use crate::dispatch::Handlers;
use crate::protocol::{EventKind, ServerEvent};
use crate::views::ProjectBoard;

/// Registry name for a project channel.
pub fn name(project_id: u64) -> String {
    format!("project_{project_id}")
}

/// Handler set updating `board`.
pub fn handlers(board: Arc<Mutex<ProjectBoard>>) -> Handlers {
    let project_view = Arc::clone(&board);
    let task_view = board;

    Handlers::new()
        .on(EventKind::ProjectUpdate, move |event, _| {
            if let ServerEvent::ProjectUpdate { update } = event {
                if let Ok(mut board) = project_view.lock() {
                    board.apply_project(update);
                }
            }
        })
        .on(EventKind::TaskUpdate, move |event, _| {
            if let ServerEvent::TaskUpdate { update } = event {
                if let Ok(mut board) = task_view.lock() {
                    board.apply_task(update);
                }
            }
        })
}

/// Connect the channel for one project.
#[cfg(feature = "transport-websocket")]
pub fn connect(
    registry: &mut crate::registry::ChannelRegistry,
    origin: &crate::endpoint::PageOrigin,
    project_id: u64,
    board: Arc<Mutex<ProjectBoard>>,
) {
    use crate::endpoint::paths;
    use crate::transports::WebSocketConnector;

    let connector = WebSocketConnector::new(origin.channel_url(&paths::project(project_id)));
    registry.connect(name(project_id), connector, handlers(board));
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
    use crate::views::{ProjectCard, TaskRow};
    use tokio::sync::mpsc;

    #[test]
    fn project_and_task_frames_patch_the_board() {
        let board = Arc::new(Mutex::new(ProjectBoard::new()));
        {
            let mut b = board.lock().unwrap();
            b.register_project(
                7,
                ProjectCard {
                    name: "Redesign".into(),
                    status: "active".into(),
                    progress: 10,
                },
            );
            b.register_task(
                21,
                TaskRow {
                    title: "Wireframes".into(),
                    status: "todo".into(),
                    assignee: "".into(),
                },
            );
        }

        let mut dispatcher = Dispatcher::new(name(7), handlers(Arc::clone(&board)));
        let (tx, _rx) = mpsc::unbounded_channel();
        let tx = ChannelSender::new(tx);

        dispatcher.dispatch(
            r#"{"type":"project_update","update":{"id":7,"progress":55}}"#,
            &tx,
        );
        dispatcher.dispatch(
            r#"{"type":"task_update","update":{"id":21,"status":"in_progress","assignee":"Dana"}}"#,
            &tx,
        );

        let view = board.lock().unwrap();
        assert_eq!(view.project(7).unwrap().progress, 55);
        let task = view.task(21).unwrap();
        assert_eq!(task.status, "in_progress");
        assert_eq!(task.assignee, "Dana");
        // Untouched fields keep their values.
        assert_eq!(task.title, "Wireframes");
    }

    #[test]
    fn channel_names_embed_the_project_id() {
        assert_eq!(name(42), "project_42");
    }
}
