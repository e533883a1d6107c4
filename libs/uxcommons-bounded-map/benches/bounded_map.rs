// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::{criterion_group, criterion_main, Criterion};
use std::time::Duration;
use uxcommons_bounded_map::BoundedMap;

fn insert_find(c: &mut Criterion) {
    let map: BoundedMap<u64, u64> = BoundedMap::new(10_000, Duration::from_secs(60));
    c.bench_function("bounded_map_insert", |b| {
        let mut i = 0u64;
        b.iter(|| {
            map.insert(i, i);
            i += 1;
        });
    });
    for i in 0..10_000 {
        map.insert(i, i);
    }
    c.bench_function("bounded_map_find_hit", |b| {
        b.iter(|| map.find(&5000));
    });
}

criterion_group!(benches, insert_find);
criterion_main!(benches);
