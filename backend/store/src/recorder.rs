use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use sudsline_core::CallEvent;

use crate::call_store::CallStore;

/// Append every `Ended` record to `store` until the channel closes, then
/// hand the store back. Store failures are logged and never reach call handling.
pub async fn record_finished_calls(
    mut events: broadcast::Receiver<CallEvent>,
    store: CallStore,
) -> CallStore {
    info!("Call recorder started");
    loop {
        match events.recv().await {
            Ok(CallEvent::Ended { record }) => match store.append(&record) {
                Ok(true) => debug!(call_id = %record.id, "Call record persisted"),
                Ok(false) => debug!(call_id = %record.id, "Call record already persisted"),
                Err(e) => error!(call_id = %record.id, error = %e, "Failed to persist call record"),
            },
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Call recorder lagged behind event stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    info!("Call recorder stopped");
    store
}
