//! Benchmarks for tile dispatch
//!
//! Measures a complete run (prepare, dispatch, drain, aggregate) on host
//! devices for both wait strategies and a growing number of devices.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sumsq_backends::{list_devices, BackendType, DeviceOptions, KernelProgram};
use sumsq_core::{run_search, SchedulerConfig, SearchConfig, SearchSpace, TileGeometry, TilePartitioner, WaitMode};

fn config(wait: WaitMode) -> SearchConfig {
    SearchConfig {
        x: 601,
        y: 602,
        scheduler: SchedulerConfig {
            kernel_span: 16,
            grid_width: 8,
            wait,
            poll_interval_ms: 1,
            ..SchedulerConfig::default()
        },
    }
}

fn benchmark_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let space = SearchSpace::new(601, 602).unwrap();
    let points = (space.max_xy + 1) * (space.max_xy + 1);

    for wait in [WaitMode::Signal, WaitMode::Poll] {
        for devices in [1usize, 2, 4] {
            let config = config(wait);
            group.throughput(Throughput::Elements(points));
            group.bench_with_input(
                BenchmarkId::new(format!("{wait:?}").to_lowercase(), devices),
                &devices,
                |b, &devices| {
                    let options = DeviceOptions {
                        cpu_devices: devices,
                        ..DeviceOptions::default()
                    };
                    b.iter(|| {
                        let devices = list_devices(BackendType::Cpu, &options).unwrap();
                        run_search(&config, devices, &KernelProgram::default()).unwrap()
                    });
                },
            );
        }
    }

    group.finish();
}

fn benchmark_partition(c: &mut Criterion) {
    let geometry = TileGeometry::new(128, 128).unwrap();
    c.bench_function("partition_default_inputs", |b| {
        let partitioner = TilePartitioner::new(84_855, geometry);
        b.iter(|| partitioner.tiles().count());
    });
}

criterion_group!(benches, benchmark_dispatch, benchmark_partition);
criterion_main!(benches);
