use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use world_core::{
    generate_map, LocalGrid, Locked, MapGenConfig, SharedGrid, TerritoryId, Tile, TileType,
    Unsynchronized,
};

fn bench_fill_area(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_area");
    let tile = Tile::new(TileType::FOREST, TerritoryId(7)).unwrap();

    for size in [64u32, 256, 1024] {
        group.bench_with_input(BenchmarkId::new("locked", size), &size, |b, &size| {
            let grid = SharedGrid::new(size, size).unwrap();
            b.iter(|| grid.fill_area(0, 0, size, size, tile));
        });
        group.bench_with_input(BenchmarkId::new("unsynchronized", size), &size, |b, &size| {
            let grid = LocalGrid::new(size, size).unwrap();
            b.iter(|| grid.fill_area(0, 0, size, size, tile));
        });
    }

    group.finish();
}

fn bench_can_place(c: &mut Criterion) {
    let mut group = c.benchmark_group("can_place_in_area");
    let map = generate_map::<Locked>(&MapGenConfig::new(1024, 1024, 64).with_seed(42)).unwrap();

    for extent in [4u32, 32, 128] {
        group.bench_with_input(BenchmarkId::new("extent", extent), &extent, |b, &extent| {
            b.iter(|| map.grid.can_place_in_area(500, 500, extent, extent));
        });
    }

    group.finish();
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_map");
    group.sample_size(10);

    for size in [128u32, 512] {
        group.bench_with_input(BenchmarkId::new("grid", size), &size, |b, &size| {
            b.iter_batched(
                || MapGenConfig::new(size, size, 50).with_seed(9),
                |config| generate_map::<Unsynchronized>(&config).unwrap(),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(grid_benches, bench_fill_area, bench_can_place, bench_generate);
criterion_main!(grid_benches);
