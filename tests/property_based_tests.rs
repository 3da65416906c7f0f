mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::*;
use proptest::prelude::*;
use tasker_sessions::execution::{executor_fn, ExecutionOptions};
use tasker_sessions::models::{Operation, OperationStatus, Session};

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: every operation finishes and exactly the failing ones carry an exception
    #[test]
    fn batch_runs_finish_every_operation(
        count in 1u64..30,
        failing in prop::collection::btree_set(1u64..30, 0..10),
        concurrency in 1usize..6,
        global in 1usize..6,
    ) {
        let runtime = paused_runtime();
        let failing_in_range: BTreeSet<u64> =
            failing.iter().copied().filter(|n| *n <= count).collect();

        let finished = runtime.block_on(async {
            let manager = session_manager::<String, u64>(global);
            let session = numbers_session(&manager, "prop", count).await;
            let failing = failing_in_range.clone();
            let options = ExecutionOptions::new()
                .with_max_concurrency_level(concurrency)
                .with_executor(executor_fn(
                    move |_session: Session<String, u64>, operation: Operation<u64>, _token| {
                        let fails = failing.contains(operation.state());
                        async move {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            if fails {
                                anyhow::bail!("planned failure");
                            }
                            Ok(operation)
                        }
                    },
                ));
            session.start(options).await.unwrap().await.unwrap()
        });

        let metrics = finished.metrics();
        prop_assert_eq!(finished.status(), OperationStatus::Finished);
        prop_assert_eq!(metrics.finished_count as u64, count);
        prop_assert_eq!(metrics.in_progress_count, 0);
        prop_assert_eq!(metrics.error_count, failing_in_range.len());
        prop_assert_eq!(metrics.success_count + metrics.error_count, metrics.finished_count);

        for operation in finished.operations().iter() {
            prop_assert_eq!(operation.is_failed(), failing_in_range.contains(operation.state()));
            prop_assert!(operation.finished_at().unwrap() >= operation.started_at().unwrap());
        }
    }

    /// Property: stopping at any point leaves no operation in progress
    #[test]
    fn stopped_runs_leave_nothing_in_progress(
        count in 1u64..25,
        concurrency in 1usize..5,
        stop_after_ms in 0u64..1500,
    ) {
        let runtime = paused_runtime();

        let finished = runtime.block_on(async {
            let manager = session_manager::<String, u64>(8);
            let session = numbers_session(&manager, "prop-stop", count).await;
            let completion = session
                .start(doubling_options(concurrency, Duration::from_millis(200)))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(stop_after_ms)).await;
            session.stop();
            completion.await.unwrap()
        });

        let metrics = finished.metrics();
        prop_assert_eq!(metrics.in_progress_count, 0);
        prop_assert!(metrics.error_count <= concurrency);
        prop_assert!(metrics.finished_count as u64 <= count);
        prop_assert_eq!(finished.status(), OperationStatus::Finished);
    }
}
