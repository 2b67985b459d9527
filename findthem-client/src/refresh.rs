//! Periodic refresh of the active view
//!
//! At most one refresh task runs at a time. Switching view aborts the old task
//! before a new one is spawned, and dropping [`AutoRefresh`] aborts whatever is
//! running, so no tick can land after a stop.

use crate::backend::RequestError;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Navigable views of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Cases,
    Search,
    Settings,
}

impl View {
    /// Views whose content is kept fresh by polling
    pub fn polls(&self) -> bool {
        matches!(self, View::Dashboard | View::Cases)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            View::Dashboard => "dashboard",
            View::Cases => "cases",
            View::Search => "search",
            View::Settings => "settings",
        };
        f.write_str(s)
    }
}

/// Something that can reload the content of a view
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh(&self, view: View) -> Result<(), RequestError>;
}

struct Running {
    view: View,
    handle: JoinHandle<()>,
}

/// Owner of the refresh task
pub struct AutoRefresh {
    target: Arc<dyn Refresh>,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl AutoRefresh {
    pub fn new(target: Arc<dyn Refresh>, period: Duration) -> Self {
        Self {
            target,
            period,
            running: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `view` the active view. Replaces any running task; views that do
    /// not poll leave no task behind. Must be called within a tokio runtime.
    pub fn switch_view(&self, view: View) {
        let mut running = self.lock();
        if let Some(old) = running.take() {
            old.handle.abort();
            debug!(view = %old.view, "Auto-refresh stopped");
        }
        if !view.polls() {
            return;
        }
        if self.period.is_zero() {
            warn!(view = %view, "Auto-refresh period is zero, not polling");
            return;
        }

        let target = Arc::clone(&self.target);
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if let Err(e) = target.refresh(view).await {
                    debug!(view = %view, error = %e, "Auto-refresh tick failed");
                }
            }
        });
        debug!(view = %view, period_secs = period.as_secs(), "Auto-refresh started");
        *running = Some(Running { view, handle });
    }

    pub fn active_view(&self) -> Option<View> {
        self.lock().as_ref().map(|r| r.view)
    }

    pub fn stop(&self) {
        if let Some(old) = self.lock().take() {
            old.handle.abort();
            debug!(view = %old.view, "Auto-refresh stopped");
        }
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.stop();
    }
}
