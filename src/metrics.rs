//! # Session Metrics
//!
//! Progress, throughput and timing figures derived from a session snapshot.
//! Metrics are never stored; every call recomputes them from the operations it
//! is given.
//!
//! Timing figures cover finished operations only. Waiting time is the
//! `GlobalWaitDuration` each operation recorded while blocked on the session
//! manager's global lock; execution time is the operation's duration minus that
//! wait.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{processor_count, ESTIMATION_SENTINEL};
use crate::models::{Operation, OperationStatus, Session, GLOBAL_CONCURRENCY_LEVEL};

/// Metrics for one session at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Logical processors of the host
    pub processor_count: usize,
    /// Concurrency level of the owning session manager
    pub global_concurrency_level: usize,
    /// Per-session concurrency level of the run
    pub max_concurrency_level: usize,

    // Counts
    pub operations_count: usize,
    pub in_progress_count: usize,
    pub finished_count: usize,
    /// Finished with an exception
    pub error_count: usize,
    pub success_count: usize,
    /// Progress in range [0..100], truncated
    pub progress_in_percents: u32,

    // Timing (finished operations only)
    /// Average execution time, global lock wait excluded
    pub avg_milliseconds_per_operation: u64,
    /// Average wait plus execution time
    pub avg_processing_time_per_operation: u64,
    /// Average time spent waiting on the global lock
    pub avg_waiting_time_per_operation: u64,
    pub total_waiting_time: Duration,

    // Throughput
    pub operations_per_minute: f64,
    pub operations_per_second: f64,
    /// Total execution time over session duration
    pub speedup_ratio: f64,

    /// Session duration so far
    pub duration: Duration,
    /// Estimated time to finish
    pub estimation: Duration,
}

impl SessionMetrics {
    pub fn not_finished_count(&self) -> usize {
        self.operations_count - self.finished_count
    }
}

/// Compute metrics for `session` over `operations`
pub fn compute_metrics<SS, OS>(
    session: &Session<SS, OS>,
    operations: &[Operation<OS>],
) -> SessionMetrics {
    let operations_count = operations.len();
    let in_progress_count = operations
        .iter()
        .filter(|operation| operation.status() == OperationStatus::InProgress)
        .count();
    let finished: Vec<&Operation<OS>> = operations
        .iter()
        .filter(|operation| operation.is_finished())
        .collect();
    let finished_count = finished.len();
    let error_count = finished.iter().filter(|operation| operation.is_failed()).count();
    let not_finished = operations_count - finished_count;

    let duration = session.duration();
    let progress_in_percents =
        progress_in_percents(session.status(), finished_count, operations_count);

    let max_concurrency_level = session
        .execution_settings()
        .map(|settings| settings.max_concurrency_level)
        .unwrap_or(0);
    let global_concurrency_level = session
        .metadata()
        .get_value(GLOBAL_CONCURRENCY_LEVEL)
        .unwrap_or(0);

    let mut metrics = SessionMetrics {
        processor_count: processor_count(),
        global_concurrency_level,
        max_concurrency_level,
        operations_count,
        in_progress_count,
        finished_count,
        error_count,
        success_count: finished_count - error_count,
        progress_in_percents,
        avg_milliseconds_per_operation: 0,
        avg_processing_time_per_operation: 0,
        avg_waiting_time_per_operation: 0,
        total_waiting_time: Duration::ZERO,
        operations_per_minute: 0.0,
        operations_per_second: 0.0,
        speedup_ratio: 0.0,
        duration,
        estimation: ESTIMATION_SENTINEL,
    };

    if finished_count == 0 {
        return metrics;
    }

    let duration_ms = duration.as_secs_f64() * 1000.0;
    if duration_ms > 0.0 {
        metrics.operations_per_minute = round2(finished_count as f64 / (duration_ms / 60_000.0));
        metrics.operations_per_second = round2(finished_count as f64 / (duration_ms / 1000.0));
    }

    let total_finished_ms: f64 = finished
        .iter()
        .map(|operation| operation.duration().as_secs_f64() * 1000.0)
        .sum();
    let total_waiting: Duration = finished
        .iter()
        .map(|operation| operation.global_wait_duration())
        .sum();
    let total_waiting_ms = total_waiting.as_secs_f64() * 1000.0;
    // clock sources differ, so wait can exceed the measured duration
    let total_execution_ms = (total_finished_ms - total_waiting_ms).max(0.0);
    let count = finished_count as f64;

    metrics.total_waiting_time = total_waiting;
    metrics.avg_processing_time_per_operation = (total_finished_ms / count) as u64;
    metrics.avg_milliseconds_per_operation = (total_execution_ms / count) as u64;
    metrics.avg_waiting_time_per_operation = (total_waiting_ms / count) as u64;
    metrics.estimation =
        Duration::from_secs_f64(duration.as_secs_f64() * not_finished as f64 / count);
    if duration_ms > 0.0 {
        metrics.speedup_ratio = round2(total_execution_ms / duration_ms);
    }

    metrics
}

/// 0 before start, 100 once finished, truncated `finished * 100 / total` in between
fn progress_in_percents(status: OperationStatus, finished: usize, total: usize) -> u32 {
    match status {
        OperationStatus::NotStarted => 0,
        OperationStatus::Finished => 100,
        OperationStatus::InProgress if total == 0 => 0,
        OperationStatus::InProgress => (finished * 100 / total) as u32,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionSettings;
    use crate::models::{
        Metadata, MessageList, OperationError, OperationId, OperationUpdate, GLOBAL_WAIT_DURATION,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn id(value: &str) -> OperationId {
        OperationId::new(value).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn finished(name: &str, start: i64, end: i64, wait_ms: u64, failed: bool) -> Operation<()> {
        let mut update = OperationUpdate::new()
            .status(OperationStatus::Finished)
            .started_at(at(start))
            .finished_at(at(end))
            .metadata(Metadata::new().with_value(GLOBAL_WAIT_DURATION, wait_ms));
        if failed {
            update = update.exception(OperationError::Cancelled);
        }
        Operation::create_not_started(id(name), (), None).with(update)
    }

    fn pending(name: &str, status: OperationStatus) -> Operation<()> {
        Operation::create_not_started(id(name), (), None).with_status(status)
    }

    fn session(status: OperationStatus, start: i64, end: Option<i64>) -> Session<(), ()> {
        let mut update = OperationUpdate::new().status(status);
        if status != OperationStatus::NotStarted {
            update = update.started_at(at(start));
        }
        if let Some(end) = end {
            update = update.finished_at(at(end));
        }
        let operation = Operation::create_not_started(
            id("session"),
            (),
            Some(Metadata::new().with_value(GLOBAL_CONCURRENCY_LEVEL, 8)),
        )
        .with(update);
        Session::materialized(operation, MessageList::new(), Vec::new()).with_execution_settings(
            ExecutionSettings {
                max_concurrency_level: 4,
                ..ExecutionSettings::default()
            },
        )
    }

    #[test]
    fn test_nothing_finished_reports_sentinel_estimation() {
        let session = session(OperationStatus::InProgress, 0, Some(10));
        let operations = vec![
            pending("1", OperationStatus::NotStarted),
            pending("2", OperationStatus::InProgress),
        ];
        let metrics = compute_metrics(&session, &operations);

        assert_eq!(metrics.progress_in_percents, 0);
        assert_eq!(metrics.in_progress_count, 1);
        assert_eq!(metrics.operations_per_second, 0.0);
        assert_eq!(metrics.operations_per_minute, 0.0);
        assert_eq!(metrics.speedup_ratio, 0.0);
        assert_eq!(metrics.estimation, ESTIMATION_SENTINEL);
    }

    #[test]
    fn test_progress_truncates() {
        let session = session(OperationStatus::InProgress, 0, Some(10));
        let operations = vec![
            finished("1", 0, 1, 0, false),
            pending("2", OperationStatus::InProgress),
            pending("3", OperationStatus::NotStarted),
        ];
        assert_eq!(compute_metrics(&session, &operations).progress_in_percents, 33);
    }

    #[test]
    fn test_progress_follows_session_status_at_bounds() {
        let operations = vec![
            finished("1", 0, 1, 0, false),
            pending("2", OperationStatus::NotStarted),
        ];

        let not_started = session(OperationStatus::NotStarted, 0, None);
        assert_eq!(compute_metrics(&not_started, &operations).progress_in_percents, 0);

        let done = session(OperationStatus::Finished, 0, Some(10));
        assert_eq!(compute_metrics(&done, &operations).progress_in_percents, 100);
    }

    #[test]
    fn test_timing_figures() {
        // 10 s session, two 4 s operations that each waited 1 s on the global lock
        let session = session(OperationStatus::InProgress, 0, Some(10));
        let operations = vec![
            finished("1", 0, 4, 1000, false),
            finished("2", 2, 6, 1000, true),
            pending("3", OperationStatus::InProgress),
            pending("4", OperationStatus::NotStarted),
        ];
        let metrics = compute_metrics(&session, &operations);

        assert_eq!(metrics.finished_count, 2);
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.progress_in_percents, 50);
        assert_eq!(metrics.avg_processing_time_per_operation, 4000);
        assert_eq!(metrics.avg_milliseconds_per_operation, 3000);
        assert_eq!(metrics.avg_waiting_time_per_operation, 1000);
        assert_eq!(metrics.total_waiting_time, Duration::from_secs(2));
        assert_eq!(metrics.operations_per_second, 0.2);
        assert_eq!(metrics.operations_per_minute, 12.0);
        assert_eq!(metrics.speedup_ratio, 0.6);
        assert_eq!(metrics.estimation, Duration::from_secs(10));
        assert_eq!(metrics.duration, Duration::from_secs(10));
        assert_eq!(metrics.max_concurrency_level, 4);
        assert_eq!(metrics.global_concurrency_level, 8);
        assert_eq!(metrics.not_finished_count(), 2);
    }

    #[test]
    fn test_metrics_serialize_as_json_object() {
        let session = session(OperationStatus::Finished, 0, Some(2));
        let metrics = compute_metrics(&session, &[finished("1", 0, 2, 0, false)]);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["finished_count"], 1);
        assert_eq!(json["progress_in_percents"], 100);
    }

    proptest! {
        #[test]
        fn prop_counts_are_consistent(
            statuses in prop::collection::vec((0u8..3, any::<bool>()), 0..40)
        ) {
            let operations: Vec<Operation<()>> = statuses
                .iter()
                .enumerate()
                .map(|(index, (status, failed))| {
                    let name = index.to_string();
                    match status {
                        0 => pending(&name, OperationStatus::NotStarted),
                        1 => pending(&name, OperationStatus::InProgress),
                        _ => finished(&name, 0, 1, 0, *failed),
                    }
                })
                .collect();
            let session = session(OperationStatus::InProgress, 0, Some(5));
            let metrics = compute_metrics(&session, &operations);

            prop_assert_eq!(metrics.success_count + metrics.error_count, metrics.finished_count);
            prop_assert!(
                metrics.finished_count + metrics.in_progress_count <= metrics.operations_count
            );
            prop_assert!(metrics.progress_in_percents <= 100);
            if metrics.finished_count == 0 {
                prop_assert_eq!(metrics.estimation, ESTIMATION_SENTINEL);
            }
        }

        #[test]
        fn prop_progress_is_truncated_ratio(total in 1usize..500, finished in 0usize..500) {
            let finished = finished.min(total);
            let progress = progress_in_percents(OperationStatus::InProgress, finished, total);
            prop_assert_eq!(progress as usize, finished * 100 / total);
            prop_assert!(progress <= 100);
        }
    }
}
