//! Call Session Manager
//!
//! Owns the single call slot and everything hanging off it: the live record,
//! call history, the operator log, running analytics, and the monitor task.
//! Vendor network calls are never made while the state lock is held; the
//! `Starting` reservation is what serializes concurrent starts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;

use logging::{mask_phone, CallEventLogger, CallLogEvent};
use sudsline_core::{
    AssistantOverrides, CallError, CallEvent, CallRecord, CallStatus, CallType, LogEntry,
    LogLevel, PhoneNumberValidator, PhoneValidator, VendorCallRequest, VendorConnector,
    VendorCustomer, VoiceVendor,
};
use sudsline_infra::CallAnalytics;

use crate::log_buffer::LogBuffer;
use crate::monitor::{spawn_monitor, MonitorHandle};
use crate::prompt::system_prompt;
use crate::settings::SessionSettings;

pub const OPERATOR_STOP_REASON: &str = "stopped by operator";
pub const CLEANUP_REASON: &str = "cleanup";

/// How long `cleanup` waits for a start that is still talking to the vendor.
const START_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters for `start_call`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartCallRequest {
    pub assistant_id: String,
    #[serde(default)]
    pub assistant_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub call_type: CallType,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Extra vendor assistant fields, merged into the overrides as-is.
    #[serde(default)]
    pub overrides: Option<serde_json::Map<String, serde_json::Value>>,
}

impl StartCallRequest {
    pub fn outbound(
        assistant_id: impl Into<String>,
        assistant_name: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            assistant_name: assistant_name.into(),
            phone_number: Some(phone_number.into()),
            ..Default::default()
        }
    }

    fn display_name(&self) -> &str {
        if self.assistant_name.trim().is_empty() {
            &self.assistant_id
        } else {
            &self.assistant_name
        }
    }
}

/// Result of a manager operation as seen by the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<Uuid>,
    /// Stable error code (see `CallError::code`) when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallOutcome {
    fn ok(message: impl Into<String>, call_id: Option<Uuid>) -> Self {
        Self {
            success: true,
            message: message.into(),
            call_id,
            error: None,
        }
    }

    fn failed(err: &CallError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            call_id: None,
            error: Some(err.code().to_string()),
        }
    }
}

/// The live call as shown in a status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentCall {
    pub id: Uuid,
    pub assistant_id: String,
    pub assistant_name: String,
    pub phone_number: Option<String>,
    pub call_type: CallType,
    pub status: CallStatus,
    pub start_time: chrono::DateTime<Utc>,
    pub elapsed_secs: i64,
}

impl CurrentCall {
    fn from_record(record: &CallRecord) -> Self {
        Self {
            id: record.id,
            assistant_id: record.assistant_id.clone(),
            assistant_name: record.assistant_name.clone(),
            phone_number: record.phone_number.clone(),
            call_type: record.call_type,
            status: record.status,
            start_time: record.start_time,
            elapsed_secs: record.elapsed_secs(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub is_active: bool,
    pub state: CallStatus,
    pub current_call: Option<CurrentCall>,
    /// Oldest first.
    pub recent_logs: Vec<LogEntry>,
    /// Newest first.
    pub recent_history: Vec<CallRecord>,
    pub analytics: CallAnalytics,
}

struct SessionState {
    status: CallStatus,
    current: Option<CallRecord>,
    logs: LogBuffer,
    history: Vec<CallRecord>,
    analytics: CallAnalytics,
    monitor: Option<MonitorHandle>,
    /// Monitor of the last finalized call; it has been signalled and is winding down.
    retired: Option<MonitorHandle>,
    /// Set by `cleanup` while a start holds the reservation; the start rolls back instead of committing.
    cancel_start: bool,
}

pub(crate) struct Shared {
    state: Mutex<SessionState>,
    connector: Arc<dyn VendorConnector>,
    vendor: Mutex<Option<Arc<dyn VoiceVendor>>>,
    validator: Arc<dyn PhoneValidator>,
    settings: SessionSettings,
    events: broadcast::Sender<CallEvent>,
    /// Woken whenever a `Starting` reservation commits or rolls back.
    start_settled: Notify,
}

impl Shared {
    fn push_log(&self, state: &mut SessionState, level: LogLevel, message: impl Into<String>) {
        let entry = state.logs.push(level, message);
        let _ = self.events.send(CallEvent::Log { entry });
    }

    fn publish(&self, event: CallEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let mut state = self.state.lock().await;
        self.push_log(&mut state, level, message);
    }

    pub(crate) async fn is_current(&self, call_id: Uuid) -> bool {
        let state = self.state.lock().await;
        state.current.as_ref().map(|r| r.id) == Some(call_id)
    }

    pub(crate) fn heartbeat(&self, call_id: Uuid, elapsed_secs: i64) {
        self.publish(CallEvent::Heartbeat {
            call_id,
            elapsed_secs,
        });
    }

    /// Close the current call if it is still `call_id`. Whoever gets here
    /// first (operator stop, monitor, cleanup) wins; later callers get `None`.
    pub(crate) async fn finalize(
        &self,
        call_id: Uuid,
        terminal: CallStatus,
        reason: &str,
    ) -> Option<CallRecord> {
        let mut state = self.state.lock().await;
        if state.current.as_ref().map(|r| r.id) != Some(call_id) {
            return None;
        }
        let mut record = state.current.take()?;

        if let Err(e) = record.finish(terminal, reason, Utc::now()) {
            error!(call_id = %call_id, error = %e, "Could not finish call record");
            let _ = record.finish(CallStatus::Error, reason, Utc::now());
        }

        match state.history.iter_mut().find(|r| r.id == call_id) {
            Some(slot) => *slot = record.clone(),
            None => state.history.push(record.clone()),
        }
        state.analytics.record_finished(&record);
        state.status = CallStatus::Idle;

        if let Some(monitor) = state.monitor.take() {
            monitor.signal();
            if let Some(older) = state.retired.replace(monitor) {
                older.abort();
            }
        }

        let duration = record.duration_secs.unwrap_or(0);
        let level = if record.status == CallStatus::Ended {
            LogLevel::Success
        } else {
            LogLevel::Error
        };
        self.push_log(
            &mut state,
            level,
            format!("Call ended: {} ({}s)", reason, duration),
        );
        drop(state);

        info!(call_id = %call_id, status = %record.status, reason, duration_secs = duration, "Call finalized");
        CallEventLogger::log_event(
            &call_id.to_string(),
            CallLogEvent::CallEnded {
                status: record.status.to_string(),
                reason: reason.to_string(),
                duration_secs: record.duration_secs,
            },
        );
        self.publish(CallEvent::Ended {
            record: record.clone(),
        });
        Some(record)
    }
}

/// Single-slot call coordinator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CallSessionManager {
    shared: Arc<Shared>,
}

impl CallSessionManager {
    pub fn new(connector: Arc<dyn VendorConnector>, settings: SessionSettings) -> Self {
        Self::with_validator(connector, Arc::new(PhoneNumberValidator::new()), settings)
    }

    pub fn with_validator(
        connector: Arc<dyn VendorConnector>,
        validator: Arc<dyn PhoneValidator>,
        settings: SessionSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let state = SessionState {
            status: CallStatus::Idle,
            current: None,
            logs: LogBuffer::new(settings.log_capacity),
            history: Vec::new(),
            analytics: CallAnalytics::new(),
            monitor: None,
            retired: None,
            cancel_start: false,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                connector,
                vendor: Mutex::new(None),
                validator,
                settings,
                events,
                start_settled: Notify::new(),
            }),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    pub fn phone_validator(&self) -> Arc<dyn PhoneValidator> {
        self.shared.validator.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.shared.events.subscribe()
    }

    pub async fn start_call(&self, request: StartCallRequest) -> CallOutcome {
        match self.try_start(request).await {
            Ok(record) => {
                let target = record.phone_number.as_deref().unwrap_or("assistant");
                CallOutcome::ok(
                    format!("Call started with {} to {}", record.assistant_name, target),
                    Some(record.id),
                )
            }
            Err(e) => CallOutcome::failed(&e),
        }
    }

    /// Reserve the slot, place the call, and either commit it or roll back.
    pub async fn try_start(&self, request: StartCallRequest) -> Result<CallRecord, CallError> {
        {
            let mut state = self.shared.state.lock().await;
            if state.status.is_in_flight() {
                let err = CallError::AlreadyInProgress;
                self.shared
                    .push_log(&mut state, LogLevel::Warning, format!("Start rejected: {}", err));
                warn!(assistant_id = %request.assistant_id, "Start rejected, slot busy");
                return Err(err);
            }
            state.status = CallStatus::Starting;
        }

        match self.place_call(&request).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.abort_start(&request, &e).await;
                Err(e)
            }
        }
    }

    async fn vendor(&self) -> Result<Arc<dyn VoiceVendor>, CallError> {
        let mut slot = self.shared.vendor.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let connection = self.shared.connector.connect()?;
        info!(vendor = connection.client.name(), "Voice vendor client initialized");
        if let Some(warning) = &connection.warning {
            warn!(vendor = connection.client.name(), warning = %warning, "Vendor initialized with warning");
            self.shared
                .log(LogLevel::Warning, format!("Vendor warning: {}", warning))
                .await;
        }
        *slot = Some(connection.client.clone());
        Ok(connection.client)
    }

    async fn place_call(&self, request: &StartCallRequest) -> Result<CallRecord, CallError> {
        let vendor = self.vendor().await?;

        let phone = if request.call_type.requires_phone_number() {
            let raw = request
                .phone_number
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or(CallError::MissingPhoneNumber)?;
            let parsed = self.shared.validator.parse(raw);
            if !parsed.is_valid {
                return Err(CallError::InvalidPhoneNumber(raw.to_string()));
            }
            Some(parsed)
        } else {
            None
        };

        let settings = &self.shared.settings;
        let overrides = AssistantOverrides {
            caller_name: request.caller_name.clone(),
            context: request.context.clone(),
            system_prompt: system_prompt(
                &settings.persona,
                Utc::now(),
                request.caller_name.as_deref(),
                request.context.as_deref(),
            ),
            extra: request.overrides.clone().unwrap_or_default(),
        };
        let vendor_request = VendorCallRequest {
            assistant_id: request.assistant_id.clone(),
            customer: phone.as_ref().and_then(|p| p.dial_string()).map(|number| VendorCustomer {
                number,
                name: request.caller_name.clone(),
            }),
            assistant_overrides: overrides,
        };

        let formatted = phone.as_ref().map(|p| p.formatted.clone());
        self.shared
            .log(
                LogLevel::Info,
                format!(
                    "Starting {} call with {}{}",
                    request.call_type,
                    request.display_name(),
                    formatted
                        .as_deref()
                        .map(|n| format!(" to {}", n))
                        .unwrap_or_default()
                ),
            )
            .await;

        let call = vendor.start(&vendor_request).await?;

        let mut record = CallRecord::new(
            request.assistant_id.clone(),
            request.display_name().to_string(),
            request.call_type,
        )
        .with_phone_number(formatted)
        .with_user(request.user_id.clone())
        .with_metadata("vendor", vendor.name());
        if let Some(context) = &request.context {
            record = record.with_metadata("context", context.clone());
        }
        if let Some(name) = &request.caller_name {
            record = record.with_metadata("caller_name", name.clone());
        }
        if let Some(extra) = request.overrides.as_ref().filter(|m| !m.is_empty()) {
            record = record.with_metadata(
                "vendor_overrides",
                serde_json::Value::Object(extra.clone()).to_string(),
            );
        }
        if let Some(status) = &call.status {
            record = record.with_metadata("vendor_status", status.clone());
        }
        record.vendor_call_id = Some(call.id.clone());
        record.transition(CallStatus::Starting)?;
        record.transition(CallStatus::Active)?;

        let mut state = self.shared.state.lock().await;
        if state.cancel_start {
            drop(state);
            info!(vendor_call_id = %call.id, "Start cancelled by cleanup, ending vendor call");
            if let Err(e) = vendor.stop().await {
                warn!(vendor_call_id = %call.id, error = %e, "Vendor stop failed for cancelled start");
            }
            return Err(CallError::StartCancelled);
        }
        if let Some(stale) = state.monitor.take() {
            stale.abort();
        }
        if let Some(retired) = state.retired.take() {
            retired.abort();
        }
        state.current = Some(record.clone());
        state.history.push(record.clone());
        state.analytics.record_started(&record);
        state.status = CallStatus::Active;
        state.monitor = Some(spawn_monitor(
            Arc::downgrade(&self.shared),
            record.id,
            vendor.clone(),
            settings.monitor_interval,
            settings.max_call_duration,
            settings.heartbeat_logs,
        ));
        self.shared.push_log(
            &mut state,
            LogLevel::Success,
            format!("Call started (vendor id {})", call.id),
        );
        drop(state);
        self.shared.start_settled.notify_waiters();

        info!(
            call_id = %record.id,
            vendor_call_id = %call.id,
            assistant_id = %record.assistant_id,
            call_type = %record.call_type,
            "Call started"
        );
        CallEventLogger::log_event(
            &record.id.to_string(),
            CallLogEvent::CallStarted {
                assistant_id: record.assistant_id.clone(),
                phone_number: record.phone_number.clone(),
                vendor_call_id: record.vendor_call_id.clone(),
            },
        );
        self.shared.publish(CallEvent::Started {
            record: record.clone(),
        });
        Ok(record)
    }

    /// Release the reserved slot after a failed start.
    async fn abort_start(&self, request: &StartCallRequest, err: &CallError) {
        let mut state = self.shared.state.lock().await;
        if state.status == CallStatus::Starting {
            state.status = CallStatus::Idle;
        }
        state.cancel_start = false;
        if !err.is_input_error() && !matches!(err, CallError::StartCancelled) {
            state.analytics.record_failed_start();
        }
        self.shared
            .push_log(&mut state, LogLevel::Error, format!("Call failed to start: {}", err));
        drop(state);
        self.shared.start_settled.notify_waiters();

        let masked = request.phone_number.as_deref().map(mask_phone);
        if err.is_input_error() {
            warn!(code = err.code(), phone = ?masked, "Call start rejected");
            CallEventLogger::log_event(
                "-",
                CallLogEvent::StartRejected {
                    reason: err.to_string(),
                },
            );
        } else {
            error!(code = err.code(), error = %err, "Call start failed");
            CallEventLogger::log_event(
                "-",
                CallLogEvent::VendorError {
                    error_msg: err.to_string(),
                },
            );
        }
        self.shared.publish(CallEvent::Failed {
            reason: err.to_string(),
            phone_number: request.phone_number.clone(),
        });
    }

    pub async fn stop_call(&self, reason: Option<&str>) -> CallOutcome {
        match self.try_stop(reason).await {
            Ok(Some(record)) => CallOutcome::ok(
                format!(
                    "Call ended after {}s",
                    record.duration_secs.unwrap_or_default()
                ),
                Some(record.id),
            ),
            Ok(None) => CallOutcome::ok("Call had already ended", None),
            Err(e) => CallOutcome::failed(&e),
        }
    }

    /// Move the active call to `Ending`, tell the vendor, then finalize locally.
    /// Returns `None` when the monitor finalized the call first.
    pub async fn try_stop(&self, reason: Option<&str>) -> Result<Option<CallRecord>, CallError> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(OPERATOR_STOP_REASON);

        let call_id = {
            let mut state = self.shared.state.lock().await;
            if state.status == CallStatus::Ending {
                return Err(CallError::NoActiveCall);
            }
            let Some(current) = state.current.as_mut() else {
                return Err(CallError::NoActiveCall);
            };
            current.transition(CallStatus::Ending)?;
            let call_id = current.id;
            state.status = CallStatus::Ending;
            if let Some(monitor) = &state.monitor {
                monitor.signal();
            }
            self.shared
                .push_log(&mut state, LogLevel::Info, format!("Stopping call: {}", reason));
            call_id
        };

        let vendor = self.shared.vendor.lock().await.clone();
        if let Some(vendor) = vendor {
            if let Err(e) = vendor.stop().await {
                warn!(call_id = %call_id, error = %e, "Vendor stop failed, ending call locally");
                self.shared
                    .log(
                        LogLevel::Warning,
                        format!("Vendor stop failed ({}); ending call locally", e),
                    )
                    .await;
            }
        }

        Ok(self
            .shared
            .finalize(call_id, CallStatus::Ended, reason)
            .await)
    }

    pub async fn get_status(&self) -> StatusSnapshot {
        let settings = &self.shared.settings;
        self.status_with_limits(settings.status_log_lines, settings.status_history_records)
            .await
    }

    pub async fn status_with_limits(&self, log_lines: usize, history_records: usize) -> StatusSnapshot {
        let state = self.shared.state.lock().await;
        StatusSnapshot {
            is_active: state.status.is_in_flight(),
            state: state.status,
            current_call: state.current.as_ref().map(CurrentCall::from_record),
            recent_logs: state.logs.recent(log_lines),
            recent_history: state
                .history
                .iter()
                .rev()
                .take(history_records)
                .cloned()
                .collect(),
            analytics: state.analytics.clone(),
        }
    }

    /// All records, oldest first.
    pub async fn history(&self) -> Vec<CallRecord> {
        self.shared.state.lock().await.history.clone()
    }

    pub async fn logs(&self) -> Vec<LogEntry> {
        let state = self.shared.state.lock().await;
        state.logs.recent(state.logs.len())
    }

    pub async fn analytics(&self) -> CallAnalytics {
        self.shared.state.lock().await.analytics.clone()
    }

    pub async fn clear_logs(&self) -> CallOutcome {
        self.shared.state.lock().await.logs.clear();
        info!("Operator log cleared");
        self.shared.publish(CallEvent::LogsCleared);
        CallOutcome::ok("Logs cleared", None)
    }

    /// Drops history and zeroes analytics. An active call stays in the slot
    /// and is counted again when it finishes.
    pub async fn clear_history(&self) -> CallOutcome {
        {
            let mut state = self.shared.state.lock().await;
            state.history.clear();
            state.analytics.reset();
            self.shared
                .push_log(&mut state, LogLevel::Info, "Call history cleared");
        }
        info!("Call history and analytics cleared");
        self.shared.publish(CallEvent::HistoryCleared);
        CallOutcome::ok("History cleared", None)
    }

    /// Stop any active call and wind down monitor tasks. Safe to call repeatedly.
    pub async fn cleanup(&self) {
        self.cancel_pending_start().await;

        let has_call = {
            let state = self.shared.state.lock().await;
            state.current.is_some() && state.status != CallStatus::Ending
        };
        if has_call {
            if let Err(e) = self.try_stop(Some(CLEANUP_REASON)).await {
                warn!(error = %e, "Cleanup stop failed");
            }
        }

        let handles: Vec<MonitorHandle> = {
            let mut state = self.shared.state.lock().await;
            [state.monitor.take(), state.retired.take()]
                .into_iter()
                .flatten()
                .collect()
        };
        for handle in handles {
            let call_id = handle.call_id();
            handle.shutdown().await;
            info!(call_id = %call_id, "Monitor joined");
        }
    }

    /// A start still waiting on the vendor is told to roll back, and we wait
    /// for it to release the slot.
    async fn cancel_pending_start(&self) {
        let deadline = time::Instant::now() + START_SETTLE_TIMEOUT;
        loop {
            // Registered before the status check so a settle in between is not missed.
            let settled = self.shared.start_settled.notified();
            {
                let mut state = self.shared.state.lock().await;
                if state.status != CallStatus::Starting {
                    return;
                }
                if !state.cancel_start {
                    state.cancel_start = true;
                    self.shared
                        .push_log(&mut state, LogLevel::Warning, "Cancelling call start for cleanup");
                }
            }
            if time::timeout_at(deadline, settled).await.is_err() {
                warn!("Pending call start did not settle before cleanup gave up waiting");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use sudsline_core::{VendorCall, VendorConnection, VendorError, VendorInitError};

    use crate::monitor::{REMOTE_HANGUP_REASON, SHUTDOWN_GRACE, WATCHDOG_REASON};

    #[derive(Default)]
    struct FakeVendor {
        starts: AtomicUsize,
        stops: AtomicUsize,
        fail_start: AtomicBool,
        fail_stop: AtomicBool,
        remote_ended: AtomicBool,
        start_delay: Option<Duration>,
        last_request: std::sync::Mutex<Option<VendorCallRequest>>,
    }

    #[async_trait]
    impl VoiceVendor for FakeVendor {
        fn name(&self) -> &str {
            "fake"
        }

        async fn start(&self, request: &VendorCallRequest) -> Result<VendorCall, VendorError> {
            if let Some(delay) = self.start_delay {
                tokio::time::sleep(delay).await;
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(VendorError::Api {
                    status: 400,
                    message: "assistant not found".into(),
                });
            }
            Ok(VendorCall {
                id: format!("vc-{}", self.starts.load(Ordering::SeqCst)),
                status: Some("queued".into()),
            })
        }

        async fn stop(&self) -> Result<(), VendorError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err(VendorError::Transport("connection reset".into()));
            }
            Ok(())
        }

        async fn call_ended(&self) -> Result<Option<bool>, VendorError> {
            Ok(Some(self.remote_ended.load(Ordering::SeqCst)))
        }
    }

    struct FakeConnector {
        vendor: Arc<FakeVendor>,
        warning: Option<String>,
        fail: bool,
        connects: AtomicUsize,
    }

    impl FakeConnector {
        fn new(vendor: Arc<FakeVendor>) -> Self {
            Self {
                vendor,
                warning: None,
                fail: false,
                connects: AtomicUsize::new(0),
            }
        }
    }

    impl VendorConnector for FakeConnector {
        fn connect(&self) -> Result<VendorConnection, VendorInitError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(VendorInitError::MissingCredentials);
            }
            Ok(VendorConnection {
                client: self.vendor.clone(),
                warning: self.warning.clone(),
            })
        }
    }

    fn fast_settings() -> SessionSettings {
        SessionSettings {
            monitor_interval: Duration::from_millis(20),
            max_call_duration: None,
            ..Default::default()
        }
    }

    fn manager_with(vendor: Arc<FakeVendor>, settings: SessionSettings) -> CallSessionManager {
        CallSessionManager::new(Arc::new(FakeConnector::new(vendor)), settings)
    }

    fn request(phone: &str) -> StartCallRequest {
        StartCallRequest::outbound("A1", "Laundry Helper", phone)
    }

    async fn wait_for_ended(rx: &mut broadcast::Receiver<CallEvent>) -> CallRecord {
        let fut = async {
            loop {
                match rx.recv().await {
                    Ok(CallEvent::Ended { record }) => return record,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("event channel closed: {e}"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), fut)
            .await
            .expect("timed out waiting for Ended")
    }

    #[tokio::test]
    async fn test_start_formats_number_and_reports_status() {
        let vendor = Arc::new(FakeVendor::default());
        let manager = manager_with(vendor.clone(), fast_settings());

        let outcome = manager.start_call(request("5551234567")).await;
        assert!(outcome.success, "{}", outcome.message);

        let status = manager.get_status().await;
        assert!(status.is_active);
        assert_eq!(status.state, CallStatus::Active);
        let current = status.current_call.unwrap();
        assert_eq!(current.phone_number.as_deref(), Some("+1 (555) 123-4567"));
        assert_eq!(current.call_type, CallType::Outbound);
        assert_eq!(current.id, outcome.call_id.unwrap());

        let sent = vendor.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.customer.unwrap().number, "+15551234567");
        assert!(sent
            .assistant_overrides
            .system_prompt
            .contains("Current date and time"));

        let history = manager.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].vendor_call_id.as_deref(), Some("vc-1"));
        assert_eq!(manager.analytics().await.total_calls, 1);

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn test_invalid_number_creates_nothing() {
        let vendor = Arc::new(FakeVendor::default());
        let manager = manager_with(vendor.clone(), fast_settings());

        let outcome = manager.start_call(request("123")).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("Invalid phone number format"));
        assert_eq!(outcome.error.as_deref(), Some("invalid_phone_number"));

        assert!(manager.history().await.is_empty());
        let analytics = manager.analytics().await;
        assert_eq!(analytics.total_calls, 0);
        assert_eq!(analytics.failed_calls, 0);
        assert_eq!(vendor.starts.load(Ordering::SeqCst), 0);
        assert_eq!(manager.get_status().await.state, CallStatus::Idle);
    }

    #[tokio::test]
    async fn test_outbound_requires_phone_number() {
        let manager = manager_with(Arc::new(FakeVendor::default()), fast_settings());
        let mut req = request("");
        req.phone_number = None;
        let outcome = manager.start_call(req).await;
        assert_eq!(outcome.error.as_deref(), Some("missing_phone_number"));

        let inbound = StartCallRequest {
            assistant_id: "A1".into(),
            call_type: CallType::ServerLink,
            ..Default::default()
        };
        let outcome = manager.start_call(inbound).await;
        assert!(outcome.success, "{}", outcome.message);
        let history = manager.history().await;
        assert!(history[0].phone_number.is_none());
        assert_eq!(history[0].assistant_name, "A1");
        manager.cleanup().await;
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_active() {
        let manager = manager_with(Arc::new(FakeVendor::default()), fast_settings());

        assert!(manager.start_call(request("5551234567")).await.success);
        let second = manager.start_call(request("5559876543")).await;
        assert!(!second.success);
        assert!(second.message.contains("already in progress"));
        assert_eq!(second.error.as_deref(), Some("already_in_progress"));

        assert_eq!(manager.history().await.len(), 1);
        assert_eq!(manager.analytics().await.total_calls, 1);
        manager.cleanup().await;
    }

    #[tokio::test]
    async fn test_concurrent_starts_only_one_wins() {
        let vendor = Arc::new(FakeVendor {
            start_delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let manager = manager_with(vendor.clone(), fast_settings());

        let (a, b) = tokio::join!(
            manager.start_call(request("5551234567")),
            manager.start_call(request("5551234567"))
        );
        assert!(a.success ^ b.success);
        let loser = if a.success { b } else { a };
        assert!(loser.message.contains("already in progress"));

        assert_eq!(manager.history().await.len(), 1);
        assert_eq!(vendor.starts.load(Ordering::SeqCst), 1);
        manager.cleanup().await;
    }

    #[tokio::test]
    async fn test_start_then_stop_records_duration() {
        let vendor = Arc::new(FakeVendor::default());
        let manager = manager_with(vendor.clone(), fast_settings());

        assert!(manager.start_call(request("+1 555 123 4567")).await.success);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let outcome = manager.stop_call(None).await;
        assert!(outcome.success, "{}", outcome.message);

        let history = manager.history().await;
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record.status, CallStatus::Ended);
        let end = record.end_time.unwrap();
        assert!(end > record.start_time);
        assert_eq!(
            record.duration_secs,
            Some((end - record.start_time).num_seconds())
        );
        assert_eq!(record.end_reason.as_deref(), Some(OPERATOR_STOP_REASON));

        let analytics = manager.analytics().await;
        assert_eq!(analytics.successful_calls, 1);
        assert_eq!(vendor.stops.load(Ordering::SeqCst), 1);

        let status = manager.get_status().await;
        assert!(!status.is_active);
        assert!(status.current_call.is_none());
    }

    #[tokio::test]
    async fn test_stop_without_active_call() {
        let manager = manager_with(Arc::new(FakeVendor::default()), fast_settings());
        let before = manager.analytics().await;

        let outcome = manager.stop_call(None).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("no_active_call"));
        assert!(manager.history().await.is_empty());
        assert_eq!(manager.analytics().await, before);
    }

    #[tokio::test]
    async fn test_clear_history_resets_analytics() {
        let manager = manager_with(Arc::new(FakeVendor::default()), fast_settings());
        for _ in 0..2 {
            assert!(manager.start_call(request("5551234567")).await.success);
            assert!(manager.stop_call(None).await.success);
        }
        assert_eq!(manager.analytics().await.total_calls, 2);

        let mut rx = manager.subscribe();
        manager.clear_history().await;

        assert!(manager.history().await.is_empty());
        let analytics = manager.analytics().await;
        assert_eq!(analytics.total_calls, 0);
        assert_eq!(analytics.successful_calls, 0);
        assert_eq!(analytics.failed_calls, 0);

        let mut saw_cleared = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, CallEvent::HistoryCleared) {
                saw_cleared = true;
            }
        }
        assert!(saw_cleared);
    }

    #[tokio::test]
    async fn test_remote_hangup_finalizes_call() {
        let vendor = Arc::new(FakeVendor::default());
        let manager = manager_with(vendor.clone(), fast_settings());
        let mut rx = manager.subscribe();

        assert!(manager.start_call(request("5551234567")).await.success);
        vendor.remote_ended.store(true, Ordering::SeqCst);

        let record = wait_for_ended(&mut rx).await;
        assert_eq!(record.status, CallStatus::Ended);
        assert_eq!(record.end_reason.as_deref(), Some(REMOTE_HANGUP_REASON));

        let history = manager.history().await;
        assert_eq!(history[0].end_reason.as_deref(), Some(REMOTE_HANGUP_REASON));
        assert_eq!(manager.get_status().await.state, CallStatus::Idle);
        assert_eq!(vendor.stops.load(Ordering::SeqCst), 0);

        // The slot is free again.
        assert!(manager.start_call(request("5551234567")).await.success);
        manager.cleanup().await;
    }

    #[tokio::test]
    async fn test_watchdog_ends_long_call() {
        let vendor = Arc::new(FakeVendor::default());
        let settings = SessionSettings {
            max_call_duration: Some(Duration::from_millis(50)),
            ..fast_settings()
        };
        let manager = manager_with(vendor.clone(), settings);
        let mut rx = manager.subscribe();

        assert!(manager.start_call(request("5551234567")).await.success);
        let record = wait_for_ended(&mut rx).await;
        assert_eq!(record.end_reason.as_deref(), Some(WATCHDOG_REASON));
        assert_eq!(vendor.stops.load(Ordering::SeqCst), 1);
        assert_eq!(manager.analytics().await.successful_calls, 1);
    }

    #[tokio::test]
    async fn test_vendor_start_failure_counts_failed() {
        let vendor = Arc::new(FakeVendor::default());
        vendor.fail_start.store(true, Ordering::SeqCst);
        let manager = manager_with(vendor.clone(), fast_settings());
        let mut rx = manager.subscribe();

        let outcome = manager.start_call(request("5551234567")).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("vendor_call"));
        assert!(outcome.message.contains("assistant not found"));

        assert!(manager.history().await.is_empty());
        let analytics = manager.analytics().await;
        assert_eq!(analytics.failed_calls, 1);
        assert_eq!(analytics.total_calls, 0);
        assert_eq!(manager.get_status().await.state, CallStatus::Idle);

        let mut saw_failed = false;
        while let Ok(event) = rx.try_recv() {
            if let CallEvent::Failed { reason, .. } = event {
                assert!(reason.contains("assistant not found"));
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn test_vendor_stop_failure_still_finalizes() {
        let vendor = Arc::new(FakeVendor::default());
        vendor.fail_stop.store(true, Ordering::SeqCst);
        let manager = manager_with(vendor.clone(), fast_settings());

        assert!(manager.start_call(request("5551234567")).await.success);
        let outcome = manager.stop_call(Some("customer busy")).await;
        assert!(outcome.success);

        let history = manager.history().await;
        assert_eq!(history[0].status, CallStatus::Ended);
        assert_eq!(history[0].end_reason.as_deref(), Some("customer busy"));
        let logs = manager.logs().await;
        assert!(logs
            .iter()
            .any(|e| e.level == LogLevel::Warning && e.message.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_fatal_vendor_init_fails_start() {
        let vendor = Arc::new(FakeVendor::default());
        let connector = FakeConnector {
            fail: true,
            ..FakeConnector::new(vendor.clone())
        };
        let manager = CallSessionManager::new(Arc::new(connector), fast_settings());

        let outcome = manager.start_call(request("5551234567")).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("vendor_init"));
        assert_eq!(manager.analytics().await.failed_calls, 1);
        assert_eq!(manager.get_status().await.state, CallStatus::Idle);
        assert_eq!(vendor.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_init_warning_is_logged_once() {
        let vendor = Arc::new(FakeVendor::default());
        let connector = Arc::new(FakeConnector {
            warning: Some("local audio unavailable".into()),
            ..FakeConnector::new(vendor)
        });
        let manager = CallSessionManager::new(connector.clone(), fast_settings());

        assert!(manager.start_call(request("5551234567")).await.success);
        assert!(manager.stop_call(None).await.success);
        assert!(manager.start_call(request("5551234567")).await.success);

        let warnings = manager
            .logs()
            .await
            .into_iter()
            .filter(|e| e.message.contains("local audio unavailable"))
            .count();
        assert_eq!(warnings, 1);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        manager.cleanup().await;
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_and_ends_active_call() {
        let vendor = Arc::new(FakeVendor::default());
        let manager = manager_with(vendor.clone(), fast_settings());

        manager.cleanup().await;
        assert!(manager.start_call(request("5551234567")).await.success);
        manager.cleanup().await;
        manager.cleanup().await;

        let history = manager.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CallStatus::Ended);
        assert_eq!(history[0].end_reason.as_deref(), Some(CLEANUP_REASON));
        assert_eq!(vendor.stops.load(Ordering::SeqCst), 1);
        assert!(!manager.get_status().await.is_active);
    }

    #[tokio::test]
    async fn test_subscribe_sees_started_then_ended() {
        let manager = manager_with(Arc::new(FakeVendor::default()), fast_settings());
        let mut rx = manager.subscribe();

        assert!(manager.start_call(request("5551234567")).await.success);
        assert!(manager.stop_call(None).await.success);

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .filter(|k| *k == "started" || *k == "ended")
            .collect();
        assert_eq!(kinds, vec!["started", "ended"]);
    }

    #[tokio::test]
    async fn test_clear_history_during_active_call() {
        let manager = manager_with(Arc::new(FakeVendor::default()), fast_settings());
        assert!(manager.start_call(request("5551234567")).await.success);
        manager.clear_history().await;
        assert!(manager.stop_call(None).await.success);

        let history = manager.history().await;
        assert_eq!(history.len(), 1);
        let analytics = manager.analytics().await;
        assert_eq!(analytics.successful_calls, 1);
        assert_eq!(analytics.total_calls, 0);
    }

    #[tokio::test]
    async fn test_status_limits_and_log_capacity() {
        let settings = SessionSettings {
            log_capacity: 4,
            ..fast_settings()
        };
        let manager = manager_with(Arc::new(FakeVendor::default()), settings);
        for _ in 0..3 {
            assert!(manager.start_call(request("5551234567")).await.success);
            assert!(manager.stop_call(None).await.success);
        }
        assert_eq!(manager.logs().await.len(), 4);

        let status = manager.status_with_limits(2, 2).await;
        assert_eq!(status.recent_logs.len(), 2);
        assert_eq!(status.recent_history.len(), 2);
        let history = manager.history().await;
        assert_eq!(status.recent_history[0].id, history[2].id);
    }

    #[tokio::test]
    async fn test_monitor_publishes_heartbeats() {
        let manager = manager_with(Arc::new(FakeVendor::default()), fast_settings());
        let mut rx = manager.subscribe();
        let call_id = manager.start_call(request("5551234567")).await.call_id.unwrap();

        let beat = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(CallEvent::Heartbeat { call_id, .. }) = rx.recv().await {
                    return call_id;
                }
            }
        })
        .await
        .expect("no heartbeat");
        assert_eq!(beat, call_id);
        manager.cleanup().await;
    }

    #[tokio::test]
    async fn test_cleanup_cancels_start_in_flight() {
        let vendor = Arc::new(FakeVendor {
            start_delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let manager = manager_with(vendor.clone(), fast_settings());

        let starter = manager.clone();
        let start = tokio::spawn(async move { starter.start_call(request("5551234567")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.cleanup().await;

        let status = manager.get_status().await;
        assert!(!status.is_active);
        assert_eq!(status.state, CallStatus::Idle);
        assert!(status.current_call.is_none());
        assert!(manager.history().await.is_empty());
        assert_eq!(vendor.stops.load(Ordering::SeqCst), 1);

        let outcome = start.await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("start_cancelled"));
        let analytics = manager.analytics().await;
        assert_eq!(analytics.total_calls, 0);
        assert_eq!(analytics.failed_calls, 0);

        // The cancellation is one-shot; the next start goes through.
        assert!(manager.start_call(request("5551234567")).await.success);
        manager.cleanup().await;
        assert!(!manager.get_status().await.is_active);
    }

    #[tokio::test]
    async fn test_signalled_monitor_exits_before_next_tick() {
        let settings = SessionSettings {
            monitor_interval: Duration::from_secs(60),
            ..fast_settings()
        };
        let manager = manager_with(Arc::new(FakeVendor::default()), settings);
        assert!(manager.start_call(request("5551234567")).await.success);

        let handle = manager.shared.state.lock().await.monitor.take().unwrap();
        let started = std::time::Instant::now();
        handle.shutdown().await;
        assert!(started.elapsed() < SHUTDOWN_GRACE / 4);

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn test_repeated_cycles_release_monitor_tasks() {
        let vendor = Arc::new(FakeVendor::default());
        let manager = manager_with(vendor.clone(), fast_settings());

        assert!(manager.start_call(request("5551234567")).await.success);
        assert!(manager.stop_call(None).await.success);
        manager.cleanup().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let baseline = Arc::strong_count(&vendor);

        for _ in 0..20 {
            assert!(manager.start_call(request("5551234567")).await.success);
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(manager.stop_call(None).await.success);
        }
        manager.cleanup().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(Arc::strong_count(&vendor), baseline);
        assert_eq!(manager.history().await.len(), 21);
    }

    #[tokio::test]
    async fn test_zero_monitor_interval_still_detects_hangup() {
        let vendor = Arc::new(FakeVendor::default());
        let settings = SessionSettings {
            monitor_interval: Duration::ZERO,
            ..fast_settings()
        };
        let manager = manager_with(vendor.clone(), settings);
        let mut rx = manager.subscribe();

        assert!(manager.start_call(request("5551234567")).await.success);
        vendor.remote_ended.store(true, Ordering::SeqCst);

        let record = wait_for_ended(&mut rx).await;
        assert_eq!(record.end_reason.as_deref(), Some(REMOTE_HANGUP_REASON));
        assert!(!manager.get_status().await.is_active);
    }
}
