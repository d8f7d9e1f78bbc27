use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::controller::DiagnosticianController;

pub const DURATION_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Placeholder shown while no chat is in progress.
pub const NO_DURATION_LABEL: &str = "-";

/// `m:ss` elapsed since `started_at`, or the placeholder when no chat has started.
pub fn format_elapsed(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(started_at) = started_at else {
        return NO_DURATION_LABEL.to_string();
    };
    let elapsed = (now - started_at).num_seconds().max(0);
    format!("{}:{:02}", elapsed / 60, elapsed % 60)
}

/// Handle to the repeating duration task. The task ends when the handle is
/// stopped or dropped, or once the controller is gone.
pub struct DurationTicker {
    handle: JoinHandle<()>,
}

impl DurationTicker {
    pub(crate) fn spawn(controller: &Arc<DiagnosticianController>) -> Self {
        let controller: Weak<DiagnosticianController> = Arc::downgrade(controller);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(DURATION_TICK_INTERVAL);
            loop {
                interval.tick().await;
                let Some(controller) = controller.upgrade() else {
                    debug!("duration ticker: controller dropped, exiting");
                    break;
                };
                controller.tick().await;
            }
        });
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for DurationTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
