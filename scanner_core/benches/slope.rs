use criterion::{Criterion, black_box, criterion_group, criterion_main};
use scanner_core::motor::{MotorSlope, StepType};
use scanner_core::slope::{MAX_SLOPE_TABLE_SIZE, create_slope_table, create_slope_table_fastest};

fn bench_slope_tables(c: &mut Criterion) {
    let slope = MotorSlope::create_from_steps(44_000, 1_500, 250);

    c.bench_function("scan_table_300dpi_half", |b| {
        b.iter(|| {
            create_slope_table(
                black_box(&slope),
                black_box(300),
                black_box(11_000),
                1200,
                StepType::Half,
                2,
                MAX_SLOPE_TABLE_SIZE,
            )
        })
    });

    c.bench_function("fastest_table_quarter", |b| {
        b.iter(|| {
            create_slope_table_fastest(black_box(&slope), StepType::Quarter, 2, MAX_SLOPE_TABLE_SIZE)
        })
    });
}

criterion_group!(benches, bench_slope_tables);
criterion_main!(benches);
