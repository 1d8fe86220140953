//! Call Analytics
//!
//! Running counters folded in from call record transitions. Nothing here is
//! recomputed from history; `reset` is the only way back to zero.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use sudsline_core::{CallRecord, CallStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallAnalytics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Terminal status -> count.
    pub calls_by_outcome: HashMap<CallStatus, u64>,
    /// Assistant name -> count.
    pub calls_by_assistant: HashMap<String, u64>,
    /// Hour of day (0-23, UTC) -> count.
    pub calls_by_hour: BTreeMap<u32, u64>,
    pub total_duration_secs: i64,
    pub average_duration_secs: f64,
    pub unique_numbers: BTreeSet<String>,
    #[serde(skip)]
    timed_calls: u64,
}

impl CallAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A call reached the active state.
    pub fn record_started(&mut self, record: &CallRecord) {
        self.total_calls += 1;
        *self
            .calls_by_assistant
            .entry(record.assistant_name.clone())
            .or_insert(0) += 1;
        *self.calls_by_hour.entry(record.start_time.hour()).or_insert(0) += 1;
        if let Some(number) = &record.phone_number {
            self.unique_numbers.insert(number.clone());
        }
    }

    /// A call reached a terminal status.
    pub fn record_finished(&mut self, record: &CallRecord) {
        match record.status {
            CallStatus::Ended => self.successful_calls += 1,
            CallStatus::Error => self.failed_calls += 1,
            other => {
                tracing::warn!(status = %other, call_id = %record.id, "Ignoring non-terminal record");
                return;
            }
        }
        *self.calls_by_outcome.entry(record.status).or_insert(0) += 1;

        if let Some(duration) = record.duration_secs {
            self.total_duration_secs += duration;
            self.timed_calls += 1;
            self.average_duration_secs = self.total_duration_secs as f64 / self.timed_calls as f64;
        }
    }

    /// A start attempt failed before any record existed.
    pub fn record_failed_start(&mut self) {
        self.failed_calls += 1;
        *self.calls_by_outcome.entry(CallStatus::Error).or_insert(0) += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Percentage of finished calls that ended normally.
    pub fn success_rate(&self) -> f64 {
        let finished = self.successful_calls + self.failed_calls;
        if finished == 0 {
            return 0.0;
        }
        self.successful_calls as f64 * 100.0 / finished as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use sudsline_core::CallType;

    fn record(assistant: &str, phone: Option<&str>) -> CallRecord {
        let mut r = CallRecord::new("id", assistant, CallType::Outbound)
            .with_phone_number(phone.map(String::from));
        r.start_time = Utc.with_ymd_and_hms(2026, 3, 2, 14, 5, 0).unwrap();
        r.transition(CallStatus::Active).unwrap();
        r
    }

    #[test]
    fn started_calls_are_bucketed() {
        let mut a = CallAnalytics::new();
        a.record_started(&record("Riley", Some("+1 (555) 123-4567")));
        a.record_started(&record("Riley", Some("+1 (555) 123-4567")));
        a.record_started(&record("Sam", None));

        assert_eq!(a.total_calls, 3);
        assert_eq!(a.calls_by_assistant["Riley"], 2);
        assert_eq!(a.calls_by_assistant["Sam"], 1);
        assert_eq!(a.calls_by_hour[&14], 3);
        assert_eq!(a.unique_numbers.len(), 1);
    }

    #[test]
    fn finished_calls_update_average() {
        let mut a = CallAnalytics::new();
        let mut first = record("Riley", None);
        let end = first.start_time + Duration::seconds(30);
        first.finish(CallStatus::Ended, "operator", end).unwrap();
        let mut second = record("Riley", None);
        let end = second.start_time + Duration::seconds(90);
        second.finish(CallStatus::Error, "vendor", end).unwrap();

        a.record_finished(&first);
        a.record_finished(&second);

        assert_eq!(a.successful_calls, 1);
        assert_eq!(a.failed_calls, 1);
        assert_eq!(a.total_duration_secs, 120);
        assert!((a.average_duration_secs - 60.0).abs() < f64::EPSILON);
        assert!((a.success_rate() - 50.0).abs() < f64::EPSILON);
        assert_eq!(a.calls_by_outcome[&CallStatus::Ended], 1);
    }

    #[test]
    fn open_record_is_ignored() {
        let mut a = CallAnalytics::new();
        a.record_finished(&record("Riley", None));
        assert_eq!(a.successful_calls + a.failed_calls, 0);
    }

    #[test]
    fn failed_start_and_reset() {
        let mut a = CallAnalytics::new();
        a.record_started(&record("Riley", Some("+1 (555) 123-4567")));
        a.record_failed_start();
        assert_eq!(a.failed_calls, 1);

        a.reset();
        assert_eq!(a, CallAnalytics::default());
        assert_eq!(a.success_rate(), 0.0);
    }
}
