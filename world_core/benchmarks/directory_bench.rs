use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use world_core::{GeoProjector, GridBox, InMemoryGeoIndex, MapObject, ObjectDirectory, ObjectId};

fn populated_directory(objects: u64) -> ObjectDirectory {
    let directory = ObjectDirectory::new(
        Arc::new(InMemoryGeoIndex::new()),
        Arc::new(GeoProjector::new(1000, 1000)),
    );
    for id in 0..objects {
        let x = ((id * 7_919) % 1000) as u32;
        let y = ((id * 104_729) % 1000) as u32;
        directory
            .add(MapObject::new(ObjectId(id), x, y, 1, 1))
            .unwrap();
    }
    directory
}

fn bench_area_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_all_objects_in_area");

    for objects in [1_000u64, 10_000] {
        let directory = populated_directory(objects);
        group.bench_with_input(BenchmarkId::new("objects", objects), &objects, |b, _| {
            b.iter(|| directory.get_all_objects_in_area(500, 500, 50));
        });
    }

    group.finish();
}

fn bench_box_query(c: &mut Criterion) {
    let directory = populated_directory(10_000);
    c.bench_function("objects_in_box/100x100", |b| {
        b.iter(|| directory.objects_in_box(GridBox::new(450, 450, 549, 549)));
    });
}

fn bench_add_remove(c: &mut Criterion) {
    let directory = populated_directory(1_000);
    let mut next = 1_000u64;
    c.bench_function("add_remove", |b| {
        b.iter(|| {
            let id = ObjectId(next);
            next += 1;
            directory
                .add(MapObject::new(id, (next % 1000) as u32, 10, 1, 1))
                .unwrap();
            directory.remove(id).unwrap();
        });
    });
}

criterion_group!(directory_benches, bench_area_query, bench_box_query, bench_add_remove);
criterion_main!(directory_benches);
