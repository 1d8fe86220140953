/// Background monitor for the active call.
///
/// One task per call. Each tick it publishes a heartbeat, enforces the
/// max-duration watchdog, and asks the vendor whether the far end hung up.
/// It exits as soon as it is signalled or the call it watches is no longer current.
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use logging::{CallEventLogger, CallLogEvent};
use sudsline_core::{CallStatus, LogLevel, VoiceVendor};

use crate::manager::Shared;

/// How long `shutdown` waits for the task before aborting it.
pub(crate) const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// `interval_at` rejects a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub const REMOTE_HANGUP_REASON: &str = "ended by remote party";
pub const WATCHDOG_REASON: &str = "max call duration reached";

pub(crate) struct MonitorHandle {
    call_id: Uuid,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub(crate) fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Ask the task to stop at its next suspension point.
    pub(crate) fn signal(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub(crate) fn abort(&self) {
        self.signal();
        self.task.abort();
    }

    /// Signal, then wait briefly for the task; abort if it does not finish.
    pub(crate) async fn shutdown(self) {
        self.signal();
        let abort = self.task.abort_handle();
        if time::timeout(SHUTDOWN_GRACE, self.task).await.is_err() {
            warn!(call_id = %self.call_id, "Monitor did not stop in time, aborting");
            abort.abort();
        }
    }
}

pub(crate) fn spawn_monitor(
    shared: Weak<Shared>,
    call_id: Uuid,
    vendor: Arc<dyn VoiceVendor>,
    interval: Duration,
    max_duration: Option<Duration>,
    heartbeat_logs: bool,
) -> MonitorHandle {
    let interval = interval.max(MIN_INTERVAL);
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = time::interval_at(started + interval, interval);
        info!(call_id = %call_id, interval_ms = interval.as_millis() as u64, "Call monitor started");

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let Some(shared) = shared.upgrade() else { break };
            if !shared.is_current(call_id).await {
                debug!(call_id = %call_id, "Monitored call is no longer current");
                break;
            }

            let elapsed = started.elapsed();
            shared.heartbeat(call_id, elapsed.as_secs() as i64);
            CallEventLogger::log_event(
                &call_id.to_string(),
                CallLogEvent::MonitorTick { elapsed_secs: elapsed.as_secs() as i64 },
            );
            if heartbeat_logs {
                shared
                    .log(LogLevel::Info, format!("Call in progress ({}s)", elapsed.as_secs()))
                    .await;
            }

            if let Some(limit) = max_duration {
                if elapsed >= limit {
                    shared
                        .log(
                            LogLevel::Warning,
                            format!("Call exceeded {}s limit, stopping", limit.as_secs()),
                        )
                        .await;
                    if let Err(e) = vendor.stop().await {
                        warn!(call_id = %call_id, error = %e, "Vendor stop failed during watchdog");
                    }
                    shared.finalize(call_id, CallStatus::Ended, WATCHDOG_REASON).await;
                    break;
                }
            }

            match vendor.call_ended().await {
                Ok(Some(true)) => {
                    info!(call_id = %call_id, "Vendor reports call ended");
                    shared.finalize(call_id, CallStatus::Ended, REMOTE_HANGUP_REASON).await;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(call_id = %call_id, error = %e, "Vendor status poll failed");
                }
            }
        }

        debug!(call_id = %call_id, "Call monitor stopped");
    });

    MonitorHandle {
        call_id,
        stop_tx,
        task,
    }
}
