//! Connectivity monitor
//!
//! Polls the reporting engine for its last persisted block on a fixed
//! period and mirrors the result into the session: a reply marks the
//! session connected and records the block, a failure marks it
//! disconnected and forgets the block.

use crate::rpc::RpcClient;
use crate::session::SharedSession;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Backend answered with its last persisted block.
    Connected(u64),
    /// Backend could not be reached or returned an error.
    Disconnected(String),
}

/// Poll the backend once and update the session.
pub async fn poll_once(client: &RpcClient, session: &SharedSession) -> PollOutcome {
    match client.get_last_persisted_block_number().await {
        Ok(block) => {
            let mut state = session.write().await;
            if state.last_persisted_block() != Some(block) {
                info!(block, "new last persisted block");
                state.set_last_persisted_block(Some(block));
            }
            state.connect();
            PollOutcome::Connected(block)
        }
        Err(e) => {
            let message = format!("{:#}", e);
            let mut state = session.write().await;
            if state.is_connected() {
                warn!(error = %message, "connectivity check failed");
            }
            state.disconnect();
            state.set_last_persisted_block(None);
            PollOutcome::Disconnected(message)
        }
    }
}

/// Background task polling the backend.
pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    /// Spawn the polling task.
    ///
    /// The first poll runs immediately. Polls never overlap; a slow reply
    /// delays the next tick instead of queueing another request. The task
    /// is bound to `client`; switching endpoints means stopping this
    /// monitor and spawning a new one.
    pub fn spawn(client: RpcClient, session: SharedSession, period: Duration) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            info!(endpoint = client.endpoint(), ?period, "connectivity monitor started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        poll_once(&client, &session).await;
                    }
                }
            }
            info!("connectivity monitor stopped");
        });

        MonitorHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running monitor. Dropping it also ends the polling loop.
pub struct MonitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop polling and wait for the task to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!("connectivity monitor task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
