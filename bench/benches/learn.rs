// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use criterion::BatchSize;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use flowlearn_bench::MeasurementInfo;
use flowlearn_bench::alloc::*;
use flowlearn_test_utils::*;
use std::hint::black_box;

fn cases() -> [(&'static str, LearnAction); 3] {
    [
        ("mac-learning", mac_learning()),
        ("tcp-reverse", tcp_reverse()),
        ("nested", nested_learn()),
    ]
}

pub fn decode<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut c = c.benchmark_group(format!("decode/{}", M::label()));

    for (name, learn) in cases() {
        let bytes = learn.to_bytes().unwrap();
        c.bench_function(name, |b| {
            b.iter(|| LearnAction::decode(black_box(&bytes), 0))
        });
    }
}

pub fn encode<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut c = c.benchmark_group(format!("encode/{}", M::label()));

    for (name, learn) in cases() {
        c.bench_function(name, |b| b.iter(|| black_box(&learn).to_bytes()));
    }
}

pub fn execute<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut c = c.benchmark_group(format!("execute/{}", M::label()));
    let ectx = ectx();
    let counters = AtomicCounters::new();
    let flow = tcp_flow();
    let pkt = PacketCtx { flow: &flow, rule_table_id: 0 };

    // Each execution ages deferrals, so every iteration gets a fresh
    // copy of the action.
    for (name, learn) in cases() {
        c.bench_function(name, |b| {
            b.iter_batched_ref(
                || learn.clone(),
                |learn| learn.execute(&ectx, &counters, black_box(&pkt)),
                BatchSize::SmallInput,
            )
        });
    }
}

pub fn parse<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut c = c.benchmark_group(format!("parse/{}", M::label()));

    for (name, learn) in cases() {
        let text = learn.to_string();
        c.bench_function(name, |b| {
            b.iter(|| black_box(text.as_str()).parse::<LearnAction>())
        });
    }
}

criterion_group!(wall, decode, encode, execute, parse);
criterion_group!(
    name = allocs;
    config = new_crit(Allocs);
    targets = decode, execute
);
criterion_group!(
    name = alloc_bytes;
    config = new_crit(AllocBytes);
    targets = decode, execute
);
criterion_main!(wall, allocs, alloc_bytes);
