//! Throughput benchmarks: petek deques vs a mutex-guarded VecDeque.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use petek_deque::{ArrayDeque, Deque};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

const OPS: usize = 10_000;
const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

fn bench_bounded_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_add_take");
    group.throughput(Throughput::Elements(OPS as u64));

    group.bench_function("array_deque", |b| {
        let deque = ArrayDeque::new(1024);
        b.iter(|| {
            for i in 0..OPS {
                let _ = deque.add_back(black_box(i));
                let _ = deque.try_take_back();
            }
        });
    });

    group.bench_function("mutex_vecdeque", |b| {
        let deque = Mutex::new(VecDeque::with_capacity(1024));
        b.iter(|| {
            for i in 0..OPS {
                deque.lock().unwrap().push_back(black_box(i));
                let _ = deque.lock().unwrap().pop_back();
            }
        });
    });

    group.finish();
}

fn bench_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("growth_from_cold");
    group.throughput(Throughput::Elements(OPS as u64));

    group.bench_function("deque", |b| {
        b.iter(|| {
            let deque = Deque::new(2);
            for i in 0..OPS {
                deque.add_back(black_box(i));
            }
            deque.len()
        });
    });

    group.bench_function("mutex_vecdeque", |b| {
        b.iter(|| {
            let deque = Mutex::new(VecDeque::new());
            for i in 0..OPS {
                deque.lock().unwrap().push_back(black_box(i));
            }
            deque.lock().unwrap().len()
        });
    });

    group.finish();
}

fn bench_concurrent_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_mix");

    for &threads in THREAD_COUNTS {
        group.throughput(Throughput::Elements((OPS * threads) as u64));

        group.bench_with_input(BenchmarkId::new("deque", threads), &threads, |b, &threads| {
            b.iter(|| {
                let deque: Arc<Deque<usize>> = Arc::new(Deque::new(64));
                let mut handles = vec![];
                for _ in 0..threads {
                    let deque = deque.clone();
                    handles.push(thread::spawn(move || {
                        for i in 0..OPS {
                            deque.add_back(i);
                            if i % 2 == 0 {
                                let _ = deque.try_take_front();
                            }
                        }
                    }));
                }
                for h in handles {
                    h.join().unwrap();
                }
            });
        });

        group.bench_with_input(
            BenchmarkId::new("mutex_vecdeque", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let deque = Arc::new(Mutex::new(VecDeque::new()));
                    let mut handles = vec![];
                    for _ in 0..threads {
                        let deque = deque.clone();
                        handles.push(thread::spawn(move || {
                            for i in 0..OPS {
                                deque.lock().unwrap().push_back(i);
                                if i % 2 == 0 {
                                    let _ = deque.lock().unwrap().pop_front();
                                }
                            }
                        }));
                    }
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_bounded_cycle, bench_growth, bench_concurrent_mix);
criterion_main!(benches);
