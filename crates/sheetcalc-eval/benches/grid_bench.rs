use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sheetcalc_eval::{CellGrid, CellTransformer, IntervalMap, Point, Rect, Size, Slot};

#[derive(Default)]
struct Mover(Slot<u64>);

impl CellTransformer<u64> for Mover {
    fn modifies_missing_source(&self) -> bool {
        false
    }
    fn modifies_missing_destination(&self) -> bool {
        self.0.is_some()
    }
    fn get(&mut self, slot: &mut Slot<u64>) {
        self.0 = slot.take();
    }
    fn set(&mut self, slot: &mut Slot<u64>) {
        *slot = self.0.take();
    }
}

fn filled_grid(n: u32) -> CellGrid<u64> {
    let mut grid = CellGrid::new();
    for y in 0..n {
        for x in 0..8 {
            let value = (y * 8 + x) as u64;
            grid.modify_cell(Point::new(x, y), &mut |slot: &mut Slot<u64>| *slot = Some(Box::new(value)));
        }
    }
    grid
}

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("CellGrid");

    for n in [1000u32, 10_000] {
        group.bench_with_input(BenchmarkId::new("Fill", n), &n, |b, &n| b.iter(|| filled_grid(black_box(n))));

        let grid = filled_grid(n);
        group.bench_with_input(BenchmarkId::new("Get/Scattered", n), &n, |b, &n| {
            b.iter(|| {
                let mut sum = 0u64;
                for y in (0..n).step_by(7) {
                    if let Some(v) = grid.get(Point::new(y % 8, y)) {
                        sum += *v;
                    }
                }
                sum
            })
        });

        // Rows shift through every tile below the edit.
        group.bench_with_input(BenchmarkId::new("DeleteRows", n), &n, |b, &n| {
            b.iter_batched(
                || filled_grid(n),
                |mut g| {
                    g.delete_rows(black_box(n / 2), 16, &mut Mover::default());
                    g
                },
                BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("ClearRect", n), &n, |b, &n| {
            b.iter_batched(
                || filled_grid(n),
                |mut g| {
                    g.modify_cells(Rect::new(Point::default(), Size::new(8, n / 2)), &mut |slot: &mut Slot<u64>| {
                        *slot = None
                    });
                    g
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_interval_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("IntervalMap");

    for n in [1000u32, 10_000] {
        group.bench_with_input(BenchmarkId::new("Modify/Alternating", n), &n, |b, &n| {
            b.iter(|| {
                let mut map = IntervalMap::new();
                for i in 0..n {
                    map.modify_value(i * 2, i * 2 + 1, |_| Some(i % 3));
                }
                map
            })
        });

        let mut map = IntervalMap::new();
        for i in 0..n {
            map.modify_value(i * 2, i * 2 + 1, |_| Some(i % 3));
        }
        group.bench_with_input(BenchmarkId::new("Query/Point", n), &n, |b, &n| {
            b.iter(|| map.get_value_with_default(black_box(n), &0))
        });
        group.bench_with_input(BenchmarkId::new("InsertIndices", n), &n, |b, &n| {
            b.iter_batched(
                || map.clone(),
                |mut m| {
                    m.insert_indices(black_box(n), 5);
                    m
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_grid, bench_interval_map);
criterion_main!(benches);
