use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringkit::Pool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

fn bench_submit_wait_done(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_submit_wait_done");

    for workers in [2, 4, 8].iter() {
        let tasks = 50_000u64;
        group.throughput(Throughput::Elements(tasks));

        group.bench_with_input(BenchmarkId::from_parameter(format!("{workers}_workers")), workers, |b, &workers| {
            b.iter(|| {
                let pool = Pool::new(workers, 200);
                let total = Arc::new(AtomicU64::new(0));

                for i in 0..tasks {
                    let total = Arc::clone(&total);
                    loop {
                        if pool
                            .submit(move || {
                                black_box(total.fetch_add(i, Ordering::Relaxed));
                            })
                            .is_ok()
                        {
                            break;
                        }
                        std::hint::spin_loop();
                    }
                }

                pool.wait_done();
            });
        });
    }

    group.finish();
}

fn bench_concurrent_submitters(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_concurrent_submitters");

    for submitters in [2, 4, 8].iter() {
        let per_submitter = 10_000u64;
        let total = per_submitter * (*submitters as u64);
        group.throughput(Throughput::Elements(total));

        group.bench_with_input(BenchmarkId::from_parameter(format!("{submitters}_submitters")), submitters, |b, &submitters| {
            b.iter(|| {
                let pool = Arc::new(Pool::new(8, 200));
                let total_done = Arc::new(AtomicU64::new(0));

                let handles: Vec<_> = (0..submitters)
                    .map(|_| {
                        let pool = Arc::clone(&pool);
                        let total_done = Arc::clone(&total_done);
                        thread::spawn(move || {
                            for i in 0..per_submitter {
                                let total_done = Arc::clone(&total_done);
                                loop {
                                    if pool
                                        .submit(move || {
                                            total_done.fetch_add(1, Ordering::Relaxed);
                                            black_box(i);
                                        })
                                        .is_ok()
                                    {
                                        break;
                                    }
                                    std::hint::spin_loop();
                                }
                            }
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.join().unwrap();
                }
                pool.wait_done();
            });
        });
    }

    group.finish();
}

fn bench_submit_to_targeted(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_submit_to");
    let tasks = 50_000u64;
    group.throughput(Throughput::Elements(tasks));

    group.bench_function("round_robin_by_hand", |b| {
        b.iter(|| {
            let pool = Pool::new(4, 200);
            let total = Arc::new(AtomicU64::new(0));

            for i in 0..tasks {
                let total = Arc::clone(&total);
                let worker = (i as usize) % pool.worker_count();
                loop {
                    if pool
                        .submit_to(worker, move || {
                            black_box(total.fetch_add(i, Ordering::Relaxed));
                        })
                        .is_ok()
                    {
                        break;
                    }
                    std::hint::spin_loop();
                }
            }

            pool.wait_done();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_submit_wait_done, bench_concurrent_submitters, bench_submit_to_targeted);
criterion_main!(benches);
