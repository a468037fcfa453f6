use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{Backend, RecognitionReply};
use crate::capture::{CaptureError, FrameSource, Sampler};
use crate::events::EngineEvent;
use crate::ledger::{AttendanceLedger, LedgerError};
use crate::models::{RecognitionEvent, RecognitionOutcome, SessionId};

/// Where the poller currently is in its capture cycle.
///
/// The loop below is strictly sequential, so this can never show two
/// in-flight requests; it exists so callers can observe the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PollerPhase {
    Idle,
    Capturing,
    AwaitingResponse,
    Stopped,
}

/// Everything the loop shares with the rest of the engine.
pub(crate) struct PollerShared {
    pub session_id: SessionId,
    pub backend: Arc<dyn Backend>,
    pub ledger: Arc<Mutex<AttendanceLedger>>,
    pub events: broadcast::Sender<EngineEvent>,
}

/// Capture-and-recognize on a fixed cadence until cancelled.
///
/// One tick runs the whole cycle inline, so at most one recognition
/// request is ever outstanding; ticks that would land mid-cycle are
/// coalesced by the interval (delayed, not queued). The frame source is
/// owned here and dropped on exit, which releases the camera device.
pub(crate) async fn recognition_loop(
    shared: PollerShared,
    source: Box<dyn FrameSource>,
    sampler: Sampler,
    poll_interval: Duration,
    capture_timeout: Duration,
    cancel_token: CancellationToken,
    phase_tx: watch::Sender<PollerPhase>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The capture station moves into a blocking worker and back each tick.
    let mut station = Some((source, sampler));
    let mut watching_announced = false;
    let mut previous_was_no_match = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some((src, smp)) = station.take() else { break };
                let _ = phase_tx.send(PollerPhase::Capturing);

                let joined = tokio::task::spawn_blocking(move || {
                    let mut src = src;
                    let mut smp = smp;
                    let captured = smp.capture(src.as_mut());
                    (src, smp, captured)
                })
                .await;

                let captured = match joined {
                    Ok((src, smp, captured)) => {
                        station = Some((src, smp));
                        captured
                    }
                    Err(err) => {
                        error!("capture worker panicked: {err}");
                        break;
                    }
                };

                let sample = match captured {
                    Ok(sample) => sample,
                    Err(CaptureError::NoFrame) => {
                        debug!("camera not delivering frames yet; skipping poll");
                        let _ = phase_tx.send(PollerPhase::Idle);
                        continue;
                    }
                    Err(err) => {
                        warn!("frame capture failed: {err}");
                        let _ = shared.events.send(EngineEvent::PollFailed {
                            reason: err.to_string(),
                        });
                        let _ = phase_tx.send(PollerPhase::Idle);
                        continue;
                    }
                };

                if !sample.scene_changed && previous_was_no_match {
                    debug!("scene unchanged since last empty poll; skipping recognition call");
                    let _ = phase_tx.send(PollerPhase::Idle);
                    continue;
                }

                let _ = phase_tx.send(PollerPhase::AwaitingResponse);
                let recognize = tokio::time::timeout(
                    capture_timeout,
                    shared.backend.recognize_face(shared.session_id, &sample.jpeg),
                );
                let reply = tokio::select! {
                    reply = recognize => reply,
                    _ = cancel_token.cancelled() => {
                        debug!("stop requested mid-poll; discarding in-flight recognition");
                        break;
                    }
                };

                let event = RecognitionEvent {
                    captured_at: sample.captured_at,
                    outcome: match reply {
                        Ok(Ok(RecognitionReply::Matched { log, confidence })) => {
                            RecognitionOutcome::Matched { log, confidence }
                        }
                        Ok(Ok(RecognitionReply::NoMatch)) => RecognitionOutcome::NoMatch,
                        Ok(Err(err)) => RecognitionOutcome::TransientError {
                            reason: err.to_string(),
                        },
                        Err(_) => RecognitionOutcome::TransientError {
                            reason: format!(
                                "recognition call exceeded {}s",
                                capture_timeout.as_secs()
                            ),
                        },
                    },
                };

                // Stale-response guard: a reply that lands after stop was
                // requested belongs to a torn-down view. Drop it.
                if cancel_token.is_cancelled() {
                    debug!("discarding recognition response that arrived after stop");
                    break;
                }

                apply_event(
                    &shared,
                    event,
                    &mut watching_announced,
                    &mut previous_was_no_match,
                )
                .await;
                let _ = phase_tx.send(PollerPhase::Idle);
            }
            _ = cancel_token.cancelled() => {
                debug!("recognition loop shutting down");
                break;
            }
        }
    }

    let _ = phase_tx.send(PollerPhase::Stopped);
}

async fn apply_event(
    shared: &PollerShared,
    event: RecognitionEvent,
    watching_announced: &mut bool,
    previous_was_no_match: &mut bool,
) {
    match event.outcome {
        RecognitionOutcome::Matched { log, confidence } => {
            *previous_was_no_match = false;
            *watching_announced = false;

            let mut ledger = shared.ledger.lock().await;
            match ledger.on_recognized(log.clone(), event.captured_at) {
                Ok(()) => {
                    info!(
                        "recognized user {} in session {}",
                        log.user_id, log.session_id
                    );
                    let _ = shared.events.send(EngineEvent::Recognized { log, confidence });
                }
                // The session ended, or a manual correction issued after
                // this frame was captured already won. Conflict, not fault.
                Err(err @ (LedgerError::Frozen | LedgerError::Superseded)) => {
                    debug!("recognition of user {} discarded: {err}", log.user_id);
                }
                Err(err @ LedgerError::SessionMismatch { .. }) => {
                    warn!("recognition reply rejected: {err}");
                }
            }
        }
        RecognitionOutcome::NoMatch => {
            *previous_was_no_match = true;
            if !*watching_announced {
                *watching_announced = true;
                let _ = shared.events.send(EngineEvent::Watching);
            }
        }
        RecognitionOutcome::TransientError { reason } => {
            *previous_was_no_match = false;
            *watching_announced = false;
            warn!("recognition poll failed: {reason}");
            let _ = shared.events.send(EngineEvent::PollFailed { reason });
        }
    }
}
