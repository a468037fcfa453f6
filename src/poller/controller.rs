use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::capture::{FrameSource, Sampler};

use super::loop_worker::{recognition_loop, PollerPhase, PollerShared};

/// Owns the recognition loop task: start, observe, stop.
///
/// Each start gets a fresh cancellation token; an in-flight response from
/// a previous run sees its own token cancelled and is discarded, so a
/// restart can never be fed stale data.
pub struct PollerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    phase_rx: Option<watch::Receiver<PollerPhase>>,
}

impl PollerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            phase_rx: None,
        }
    }

    pub(crate) fn start(
        &mut self,
        shared: PollerShared,
        source: Box<dyn FrameSource>,
        sampler: Sampler,
        poll_interval: Duration,
        capture_timeout: Duration,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("recognition poller already active; release the camera first");
        }

        let cancel_token = CancellationToken::new();
        let (phase_tx, phase_rx) = watch::channel(PollerPhase::Idle);

        info!(
            "starting recognition poller for session {} ({}s cadence)",
            shared.session_id,
            poll_interval.as_secs()
        );
        let handle = tokio::spawn(recognition_loop(
            shared,
            source,
            sampler,
            poll_interval,
            capture_timeout,
            cancel_token.clone(),
            phase_tx,
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.phase_rx = Some(phase_rx);
        Ok(())
    }

    /// Cancel the loop and wait for it to finish. The frame source is
    /// dropped inside the task, releasing the camera before this returns.
    /// No-op when nothing is running.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.phase_rx = None;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("recognition loop task failed to join")?;
            info!("recognition poller stopped");
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn phase(&self) -> PollerPhase {
        match &self.phase_rx {
            Some(rx) => *rx.borrow(),
            None => PollerPhase::Stopped,
        }
    }
}

impl Default for PollerController {
    fn default() -> Self {
        Self::new()
    }
}
