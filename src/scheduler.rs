//! Process-wide background tasks. Tasks are registered at startup, run on a
//! fixed period, and stop together when [`TaskRegistry::shutdown`] is called.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::booking::{
    BookingStore,
    reminders::{self, Notifier},
};
use crate::models::today;

pub struct TaskRegistry {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Runs `job` immediately and then every `period`. A run in progress is
    /// finished before the task observes shutdown.
    pub fn spawn_interval<F, Fut>(&mut self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut stop = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => job().await,
                    _ = stop.changed() => break,
                }
            }
            debug!(task = name, "background task stopped");
        });

        info!(task = name, period_secs = period.as_secs(), "background task started");
        self.tasks.push((name, handle));
    }

    /// Signals every task and waits for all of them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "background task ended abnormally");
            }
        }
        info!("background tasks stopped");
    }
}

/// Registers the hourly reminder sweep for tomorrow's appointments.
pub fn spawn_reminder_sweep<S, N>(
    registry: &mut TaskRegistry,
    store: Arc<S>,
    notifier: Arc<N>,
    period: Duration,
) where
    S: BookingStore + 'static,
    N: Notifier + 'static,
{
    registry.spawn_interval("reminder-sweep", period, move || {
        let store = Arc::clone(&store);
        let notifier = Arc::clone(&notifier);
        async move {
            if let Err(e) = reminders::sweep(store.as_ref(), notifier.as_ref(), today()).await {
                warn!(error = %e, "reminder sweep failed");
            }
        }
    });
}
