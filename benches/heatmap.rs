/// Benchmarks for heatmap construction and PAM statistics.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spnet_stats::heatmap::{HeatmapMatrix, MatrixInfo};
use spnet_stats::pam::Pam;
use spnet_stats::stacked::StackedRecord;
use spnet_stats::table::{AnalysisDimension, TableType, OCCURRENCE_COUNT_FLD};

fn get_test_info() -> MatrixInfo {
    MatrixInfo::new(
        TableType::matrix(AnalysisDimension::County).unwrap(),
        "2024_02_01",
        OCCURRENCE_COUNT_FLD,
    )
}

/// Stacked records spread over 3000 counties and 10000 species, about 1% dense.
fn get_test_records(count: usize) -> Vec<StackedRecord> {
    (0..count)
        .map(|i| {
            let county = format!("county{}", (i * 7919) % 3000);
            let species = format!("sp{}", (i * 104729) % 10000);
            StackedRecord::new(i, &county, &species, (i % 50) as i64 + 1).unwrap()
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    for size_k in [16, 64, 256] {
        let records = get_test_records(size_k * 1024);
        let name = format!("build({})", size_k * 1024);
        c.bench_function(&name, |b| {
            b.iter(|| {
                HeatmapMatrix::build(
                    black_box(&records).iter().cloned().map(Ok),
                    get_test_info(),
                )
                .unwrap();
            })
        });
        for partitions in [2, 8] {
            let name = format!("build_parallel({}, {})", size_k * 1024, partitions);
            c.bench_function(&name, |b| {
                b.iter(|| {
                    HeatmapMatrix::build_parallel(black_box(&records), partitions, get_test_info())
                        .unwrap();
                })
            });
        }
        let heatmap =
            HeatmapMatrix::build(records.iter().cloned().map(Ok), get_test_info()).unwrap();
        let name = format!("pam_stats({})", size_k * 1024);
        c.bench_function(&name, |b| {
            b.iter(|| {
                let mut pam = Pam::from_heatmap(black_box(&heatmap), 10).unwrap();
                pam.calc_all_stats();
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
