#![allow(clippy::cast_possible_wrap)]

//! Criterion benchmark for the pool's borrow/return path.
//!
//! Uses the in-memory driver so the numbers reflect pool bookkeeping and row
//! materialization rather than network round trips. Each iteration fans a
//! batch of single-row lookups out across concurrent tasks sharing one pool.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mssql_middleware::test_utils::{MockConnector, MockSession, test_config};
use mssql_middleware::{Pool, PoolConfig, PoolError, Query, execute};
use std::hint::black_box;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinSet;

const LOOKUPS_PER_ITER: usize = 64;

static TOKIO_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("create tokio runtime"));

fn build_pool(size: usize) -> Pool<MockSession> {
    TOKIO_RUNTIME
        .block_on(Pool::initialize(
            &MockConnector::new(),
            &test_config(),
            PoolConfig::new(size),
        ))
        .expect("mock pool")
}

/// One lookup; an exhausted pool is retried after a yield, like a caller
/// that backs off instead of failing.
async fn lookup(pool: &Pool<MockSession>, id: i64) {
    let query = Query::new("select @id as id, 'name' as name").bind("id", id);
    loop {
        match execute(pool, &query).await {
            Ok(rows) => {
                black_box(rows);
                return;
            }
            Err(mssql_middleware::ExecError::Pool(PoolError::Exhausted { .. })) => {
                tokio::task::yield_now().await;
            }
            Err(e) => panic!("lookup failed: {e}"),
        }
    }
}

fn bench_checkout(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_checkout");
    group.throughput(Throughput::Elements(LOOKUPS_PER_ITER as u64));

    for (pool_size, workers) in [(1, 1), (4, 4), (4, 16), (16, 16)] {
        let pool = build_pool(pool_size);
        group.bench_function(
            BenchmarkId::new(format!("pool{pool_size}"), format!("workers{workers}")),
            |b| {
                let pool = pool.clone();
                b.to_async(&*TOKIO_RUNTIME).iter_custom(move |iters| {
                    let pool = pool.clone();
                    async move {
                        let mut total = Duration::ZERO;
                        for _ in 0..iters {
                            let start = Instant::now();
                            let mut set = JoinSet::new();
                            for worker in 0..workers {
                                let pool = pool.clone();
                                set.spawn(async move {
                                    for n in (worker..LOOKUPS_PER_ITER).step_by(workers) {
                                        lookup(&pool, n as i64).await;
                                    }
                                });
                            }
                            while let Some(joined) = set.join_next().await {
                                joined.expect("worker panicked");
                            }
                            total += start.elapsed();
                        }
                        total
                    }
                });
            },
        );
        TOKIO_RUNTIME.block_on(pool.close());
    }
    group.finish();
}

criterion_group!(benches, bench_checkout);
criterion_main!(benches);
