//! Coordinator benchmarks

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use kb_uploadr::upload::memory::MemoryBackend;
use kb_uploadr::upload::{
    CoordinatorOptions, ProgressEstimator, SimulatedRamp, UploadCoordinator, UploadFile,
};
use std::sync::Arc;

fn benchmark_batch_sizes(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("submit_batch");

    for files in [1usize, 10, 50].iter() {
        group.throughput(Throughput::Elements(*files as u64));
        group.bench_with_input(format!("{}_files", files), files, |b, &files| {
            b.to_async(&runtime).iter(|| async move {
                let coordinator = UploadCoordinator::builder()
                    .backend(Arc::new(MemoryBackend::new()))
                    .options(CoordinatorOptions::new("kb-bench", "bench"))
                    .build()
                    .unwrap();
                let batch = (0..files)
                    .map(|i| {
                        UploadFile::new(
                            format!("doc-{}.pdf", i),
                            "application/pdf",
                            Bytes::from(vec![0u8; 64 * 1024]),
                        )
                    })
                    .collect();
                black_box(coordinator.submit(batch).await);
            });
        });
    }

    group.finish();
}

fn benchmark_progress_ramp(c: &mut Criterion) {
    let ramp = SimulatedRamp::default();
    c.bench_function("simulated_ramp_to_cap", |b| {
        b.iter(|| {
            let mut progress = 0u8;
            for _ in 0..12 {
                progress = ramp.advance(black_box(progress));
            }
            progress
        });
    });
}

criterion_group!(benches, benchmark_batch_sizes, benchmark_progress_ramp);
criterion_main!(benches);
