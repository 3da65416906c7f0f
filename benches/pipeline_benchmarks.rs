use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tasker_sessions::config::SessionManagerConfig;
use tasker_sessions::execution::{executor_fn, ExecutionOptions, NoopTracer};
use tasker_sessions::models::{Operation, OperationId, Session};
use tasker_sessions::orchestration::{InMemorySessionStorage, Services, SessionManager};
use tasker_sessions::pipeline::{Pipeline, StepSettings};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn benchmark_pipeline_throughput(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("pipeline_throughput");

    for parallelism in [1_usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(parallelism),
            &parallelism,
            |b, &parallelism| {
                b.iter(|| rt.block_on(async move {
                    let pipeline = Pipeline::new()
                        .add_sync_step(
                            |n: u64| Ok(n.wrapping_mul(31)),
                            StepSettings::new().with_max_parallelism(parallelism),
                        )
                        .add_sync_action(
                            |n: u64| {
                                black_box(n);
                                Ok(())
                            },
                            StepSettings::new(),
                        );
                    pipeline.input().post_many(0..1_000);
                    pipeline.complete_and_wait().await.unwrap();
                }));
            },
        );
    }
    group.finish();
}

fn benchmark_session_run(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("session_run_500_operations", |b| {
        b.iter(|| rt.block_on(async {
            let manager: SessionManager<(), u64> = SessionManager::new(
                SessionManagerConfig::default().with_max_concurrency_level(8),
                Arc::new(InMemorySessionStorage::new()),
                Services::default().with_tracer(Arc::new(NoopTracer)),
            )
            .unwrap();
            let session = manager
                .create_operation_manager(OperationId::new("bench").unwrap(), (), None)
                .await
                .unwrap();
            for n in 0..500_u64 {
                session.create_operation(OperationId::new(n.to_string()).unwrap(), n, None);
            }

            let options = ExecutionOptions::new()
                .with_max_concurrency_level(8)
                .with_executor(executor_fn(
                    |_session: Session<(), u64>, operation: Operation<u64>, _token| async move {
                        let next = operation.state().wrapping_add(1);
                        Ok(operation.with_state(next))
                    },
                ));
            let finished = session.start(options).await.unwrap().await.unwrap();
            black_box(finished.metrics());
        }));
    });
}

criterion_group!(benches, benchmark_pipeline_throughput, benchmark_session_run);
criterion_main!(benches);
