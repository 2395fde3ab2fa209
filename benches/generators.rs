/*
 * Copyright © 2023 Archer <archer@nefarious.dev>
 * Licensed under the Apache License, Version 2.0 (the "Licence");
 * you may not use this file except in compliance with the Licence.
 * You may obtain a copy of the Licence at
 *     https://www.apache.org/licenses/LICENSE-2.0
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the Licence is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the Licence for the specific language governing permissions and
 * limitations under the Licence.
 */

//! A benchmark comparing the blocking guard with the lock-free guard.
//!
//! The layout below dedicates most bits to the sequence number so the generators rarely have to wait for the next
//! millisecond. Waiting would measure the clock instead of the guards.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parking_lot::{Condvar, Mutex};
use snowstamp::{Generator, Guard, IdentifierLayout, LayoutConfig, SystemClock};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const THREADS: usize = 10;

fn layout() -> IdentifierLayout {
    IdentifierLayout::new(LayoutConfig {
        // The first millisecond of 2023
        epoch: 1672531200000,
        timestamp_bits: 41,
        datacenter_bits: 0,
        worker_bits: 0,
        // 4,194,304 identifiers per millisecond, i.e. one every ~0.24 ns before we'd exhaust the sequence
        sequence_bits: 22,
    })
    .unwrap()
}

/// Issues `iters` identifiers on each of [`THREADS`] threads and measures the time until all of them finished.
///
/// Workers park on a gate until every thread exists, so spawning them isn't part of the measurement.
fn bench_generator(iters: u64, guard: Guard) -> Duration {
    let generator = Generator::with_guard(layout(), 0, 0, SystemClock, guard).unwrap();
    let gate = Arc::new((Mutex::new(false), Condvar::new()));
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let generator = generator.clone();
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let (open, opened) = &*gate;
                {
                    let mut open = open.lock();
                    while !*open {
                        opened.wait(&mut open);
                    }
                }
                for _ in 0..iters {
                    black_box(generator.generate().unwrap());
                }
            })
        })
        .collect();

    let (open, opened) = &*gate;
    let mut gate_open = open.lock();
    let start = Instant::now();
    *gate_open = true;
    drop(gate_open);
    opened.notify_all();
    for worker in workers {
        worker.join().unwrap();
    }
    start.elapsed()
}

fn generators(c: &mut Criterion) {
    let mut group = c.benchmark_group("Generators");
    group.bench_function("blocking (10 threads)", |b| {
        b.iter_custom(|iters| bench_generator(iters, Guard::Blocking))
    });
    group.bench_function("lock-free (10 threads)", |b| {
        b.iter_custom(|iters| bench_generator(iters, Guard::LockFree))
    });
}

fn generators_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("Generators (sequential)");
    let blocking = Generator::with_guard(layout(), 0, 0, SystemClock, Guard::Blocking).unwrap();
    group.bench_function("blocking", |b| b.iter(|| black_box(blocking.generate())));
    let lock_free = Generator::with_guard(layout(), 0, 0, SystemClock, Guard::LockFree).unwrap();
    group.bench_function("lock-free", |b| b.iter(|| black_box(lock_free.generate())));
}

criterion_group!(benches, generators, generators_sequential);
criterion_main!(benches);
