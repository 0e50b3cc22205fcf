use crate::hub::NotificationHub;

use models::BuildState;

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Something the compiler (or the file watcher on its behalf) observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerEvent {
    Invalid,
    Done(BuildState),
    StaticChanged(String),
}

/// Feed compiler events into the hub one at a time until every sender is gone.
pub fn spawn_event_loop(
    hub: Arc<NotificationHub>,
    mut events: mpsc::Receiver<CompilerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Compiler event loop started");

        while let Some(event) = events.recv().await {
            match event {
                CompilerEvent::Invalid => hub.on_invalid(),
                CompilerEvent::Done(state) => hub.on_done(state, false),
                CompilerEvent::StaticChanged(path) => hub.on_static_file_changed(&path),
            }
        }

        info!("Compiler event channel closed, event loop exiting");
    })
}
