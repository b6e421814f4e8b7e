use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, warn};

use crate::{error::Result, DownloadClient};

impl DownloadClient {
    /// Fetches the full backend state and folds it into the registry.
    pub async fn refresh_status(&self) -> Result<()> {
        let state = self.backend.get_full_state().await?;
        let changed = self
            .mutate(|registry| registry.apply_snapshot(state.queue, state.history))
            .await;
        debug!(changed, "poller: status refreshed");
        Ok(())
    }

    /// One-shot refresh after `delay`. Dropped silently if the client is gone.
    pub(crate) fn schedule_refresh(self: &Arc<Self>, delay: Duration) {
        let client = Arc::downgrade(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let Some(client) = client.upgrade() else {
                return;
            };
            if let Err(err) = client.refresh_status().await {
                debug!(error = %err, "poller: scheduled refresh failed");
            }
        });
    }

    /// Periodic refresh while any task is in flight. The loop ends once the
    /// client is dropped.
    pub(crate) fn spawn_status_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let client: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(client) = client.upgrade() else {
                    break;
                };
                if !client.registry.lock().await.has_in_flight() {
                    continue;
                }
                if let Err(err) = client.refresh_status().await {
                    warn!(error = %err, "poller: status refresh failed");
                }
            }
        })
    }
}
