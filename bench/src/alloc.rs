// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Counting allocator used to track the allocations made while
//! decoding and executing learning actions, with `criterion`
//! integration.
//!
//! Execution runs on the packet path, so the number of allocations a
//! learn action costs per packet matters as much as its wall time.

use super::MeasurementInfo;
use criterion::Criterion;
use criterion::Throughput;
use criterion::measurement::Measurement;
use criterion::measurement::ValueFormatter;
use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[global_allocator]
static BENCH_ALLOC: CountingAlloc = CountingAlloc {
    allocs: AtomicU64::new(0),
    bytes: AtomicU64::new(0),
};

// Criterion runs one benchmark at a time, so global counters are
// enough.
struct CountingAlloc {
    allocs: AtomicU64,
    bytes: AtomicU64,
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size() as u64, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

/// A counter read from the allocator.
pub trait AllocCounter {
    fn read() -> u64;
    fn unit() -> &'static str;
    fn label() -> &'static str;
}

/// The number of allocations made.
pub struct Allocs;

/// The number of bytes allocated.
pub struct AllocBytes;

impl AllocCounter for Allocs {
    fn read() -> u64 {
        BENCH_ALLOC.allocs.load(Ordering::Relaxed)
    }

    fn unit() -> &'static str {
        ""
    }

    fn label() -> &'static str {
        "alloc_ct"
    }
}

impl AllocCounter for AllocBytes {
    fn read() -> u64 {
        BENCH_ALLOC.bytes.load(Ordering::Relaxed)
    }

    fn unit() -> &'static str {
        "B"
    }

    fn label() -> &'static str {
        "alloc_sz"
    }
}

/// Counts never need scaling; only the unit differs.
struct UnitFormatter(&'static str);

impl ValueFormatter for UnitFormatter {
    fn scale_values(&self, _typical: f64, _values: &mut [f64]) -> &'static str {
        self.0
    }

    fn scale_throughputs(
        &self,
        _typical: f64,
        _throughput: &Throughput,
        _values: &mut [f64],
    ) -> &'static str {
        self.0
    }

    fn scale_for_machines(&self, _values: &mut [f64]) -> &'static str {
        self.0
    }
}

/// A [`Measurement`] of one allocator counter.
pub struct AllocMeasure<T> {
    fmt: UnitFormatter,
    _counter: T,
}

impl<T: AllocCounter> AllocMeasure<T> {
    pub fn new(counter: T) -> Self {
        Self { fmt: UnitFormatter(T::unit()), _counter: counter }
    }
}

impl<T: AllocCounter> Measurement for AllocMeasure<T> {
    type Intermediate = u64;
    type Value = u64;

    fn start(&self) -> Self::Intermediate {
        T::read()
    }

    fn end(&self, start: Self::Intermediate) -> Self::Value {
        T::read() - start
    }

    fn add(&self, v1: &Self::Value, v2: &Self::Value) -> Self::Value {
        v1 + v2
    }

    fn zero(&self) -> Self::Value {
        0
    }

    fn to_f64(&self, value: &Self::Value) -> f64 {
        *value as f64
    }

    fn formatter(&self) -> &dyn ValueFormatter {
        &self.fmt
    }
}

impl<T: AllocCounter> MeasurementInfo for AllocMeasure<T> {
    fn label() -> &'static str {
        T::label()
    }
}

/// Create a new [`Criterion`] instance tuned for counting
/// allocations.
pub fn new_crit<T: AllocCounter>(counter: T) -> Criterion<AllocMeasure<T>> {
    Criterion::default()
        .with_measurement(AllocMeasure::new(counter))
        .sample_size(10)
        .warm_up_time(Duration::from_nanos(1))
        .measurement_time(Duration::from_micros(10))
        .nresamples(1)
        // Every sample of a deterministic case has the same value,
        // which the plotting backend does not cope with.
        .without_plots()
}
