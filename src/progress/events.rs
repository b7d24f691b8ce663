// SPDX-License-Identifier: MIT
//! Live progress stream.

use tokio::sync::broadcast;

use super::model::ProgressUpdate;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A status transition was committed.
    Transition(ProgressUpdate),
    /// The task reached `completed` and the performer was credited.
    Completed {
        task_id: String,
        performer: String,
        new_badges: Vec<String>,
    },
}

/// Shared broadcast bus for progress events.
#[derive(Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}
