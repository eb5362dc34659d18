//! Micro-operation benchmarks for every policy and the incremental table.
//!
//! Run with: `cargo bench --bench ops`
//!
//! Measures per-operation latency for get and put across all policies under
//! identical conditions, and incremental-table growth against `HashMap`.

use std::collections::HashMap;
use std::hint::black_box;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use shardkv::builder::{CacheBuilder, PolicyCache, PolicyKind};
use shardkv::ds::IncrementalHashTable;
use shardkv::storage::{ReclaimConfig, StorageGateway};
use shardkv::traits::EvictionPolicy;

const CAPACITY: usize = 16_384;
const OPS: u64 = 100_000;
const TTL: Duration = Duration::from_secs(3600);

fn filled(kind: PolicyKind) -> PolicyCache<u64, u64> {
    let mut cache = CacheBuilder::new(CAPACITY).ttl(TTL).seed(42).build(kind);
    for i in 0..CAPACITY as u64 {
        cache.put(i, i);
    }
    cache
}

// ============================================================================
// Get Hit Latency
// ============================================================================

fn bench_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_hit");
    group.throughput(Throughput::Elements(OPS));

    for kind in PolicyKind::ALL {
        group.bench_function(BenchmarkId::from_parameter(kind), |b| {
            b.iter_custom(|iters| {
                let mut cache = filled(kind);
                let start = Instant::now();
                for _ in 0..iters {
                    for i in 0..OPS {
                        black_box(cache.get(&(i % CAPACITY as u64)));
                    }
                }
                start.elapsed()
            })
        });
    }
    group.finish();
}

// ============================================================================
// Put With Reclamation
// ============================================================================

/// Keys cycle through twice the capacity; `evict` runs the way the
/// reclamation loop would, after every put.
fn bench_put_evict(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_evict");
    group.throughput(Throughput::Elements(OPS));

    for kind in PolicyKind::ALL {
        group.bench_function(BenchmarkId::from_parameter(kind), |b| {
            b.iter_custom(|iters| {
                let mut cache = filled(kind);
                let start = Instant::now();
                for _ in 0..iters {
                    for i in 0..OPS {
                        cache.put(i % (2 * CAPACITY as u64), i);
                        while cache.needs_eviction() && cache.evict() > 0 {}
                    }
                }
                start.elapsed()
            })
        });
    }
    group.finish();
}

// ============================================================================
// Gateway (lock + String keys)
// ============================================================================

fn bench_gateway(c: &mut Criterion) {
    let mut group = c.benchmark_group("gateway_get_put");
    group.throughput(Throughput::Elements(OPS));

    let keys: Vec<String> = (0..CAPACITY).map(|i| format!("key:{i}")).collect();
    for kind in [PolicyKind::Lru, PolicyKind::Arc] {
        group.bench_function(BenchmarkId::from_parameter(kind), |b| {
            b.iter_custom(|iters| {
                let gateway = StorageGateway::with_policy(kind, CAPACITY, TTL, ReclaimConfig::default());
                let start = Instant::now();
                for _ in 0..iters {
                    for i in 0..OPS as usize {
                        let key = &keys[i % CAPACITY];
                        if i % 4 == 0 {
                            gateway.put(key, "value");
                        } else {
                            black_box(gateway.get(key));
                        }
                    }
                }
                start.elapsed()
            })
        });
    }
    group.finish();
}

// ============================================================================
// Table Growth
// ============================================================================

fn bench_table_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_insert_from_empty");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("incremental", |b| {
        b.iter(|| {
            let mut table = IncrementalHashTable::new();
            for i in 0..OPS {
                table.insert_or_assign(i, i);
            }
            black_box(table.len())
        })
    });

    group.bench_function("std_hashmap", |b| {
        b.iter(|| {
            let mut map = HashMap::new();
            for i in 0..OPS {
                map.insert(i, i);
            }
            black_box(map.len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_get_hit, bench_put_evict, bench_gateway, bench_table_growth);
criterion_main!(benches);
