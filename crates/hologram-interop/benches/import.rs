//! Import path benchmarks
//!
//! Measures native program import against the reference backend:
//! - Already-executable programs (no reconciliation work)
//! - Unbuilt programs (per-device build)
//! - Library programs (per-device link)
//! - Kernel import from a single-image bundle

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hologram_interop::{import, Backend, BackendRegistry, BundleState, Context};
use hologram_native::sim::{SimBackend, SimConfig};
use hologram_native::{NativeHandle, ProgramBinaryType};
use std::hint::black_box;
use std::sync::Arc;

struct Setup {
    sim: SimBackend,
    registry: BackendRegistry,
    devices: Vec<NativeHandle>,
    context: Context,
}

fn setup(config: SimConfig, backend: Backend, device_count: usize) -> Setup {
    let sim = SimBackend::new(config);
    let registry = BackendRegistry::builder()
        .register(backend, Arc::new(sim.clone()))
        .build();
    let platform = sim.create_platform();
    let devices: Vec<_> = (0..device_count)
        .map(|_| sim.create_device(platform).expect("device"))
        .collect();
    let native_context = sim.create_context(&devices).expect("context");
    let context = import::make_context(&registry, native_context, backend).expect("import context");
    Setup {
        sim,
        registry,
        devices,
        context,
    }
}

fn benchmark_import_program(c: &mut Criterion) {
    let mut group = c.benchmark_group("import_program");

    for device_count in [1, 4, 16] {
        for (label, stage) in [
            ("executable", ProgramBinaryType::Executable),
            ("unbuilt", ProgramBinaryType::None),
            ("library", ProgramBinaryType::Library),
        ] {
            let s = setup(SimConfig::cuda(), Backend::Cuda, device_count);
            group.bench_with_input(BenchmarkId::new(label, device_count), &device_count, |b, _| {
                b.iter(|| {
                    let native = s.sim.create_program(&s.devices, stage, &["k"]).expect("program");
                    let bundle = import::import_program(
                        &s.registry,
                        native,
                        &s.context,
                        false,
                        BundleState::Executable,
                        Backend::Cuda,
                    )
                    .expect("import");
                    black_box(bundle);
                    s.sim.clear_calls();
                });
            });
        }
    }

    group.finish();
}

fn benchmark_legacy_fallback(c: &mut Criterion) {
    let mut group = c.benchmark_group("legacy_fallback");

    for (label, config) in [("extended", SimConfig::cuda()), ("legacy_only", SimConfig::cuda().legacy_only())] {
        let s = setup(config, Backend::Cuda, 4);
        group.bench_function(label, |b| {
            b.iter(|| {
                let native = s
                    .sim
                    .create_program(&s.devices, ProgramBinaryType::None, &["k"])
                    .expect("program");
                let target = BundleState::Executable;
                let bundle = import::import_program(&s.registry, native, &s.context, false, target, Backend::Cuda)
                    .expect("import");
                black_box(bundle);
                s.sim.clear_calls();
            });
        });
    }

    group.finish();
}

fn benchmark_import_kernel(c: &mut Criterion) {
    let s = setup(SimConfig::level_zero(), Backend::LevelZero, 1);
    let native_program = s
        .sim
        .create_program(&s.devices, ProgramBinaryType::Executable, &["k"])
        .expect("program");
    let bundle = import::import_program(
        &s.registry,
        native_program,
        &s.context,
        true,
        BundleState::Executable,
        Backend::LevelZero,
    )
    .expect("import");

    c.bench_function("import_kernel", |b| {
        b.iter(|| {
            let native = s.sim.create_kernel(native_program, "k").expect("kernel");
            let kernel = import::import_kernel(&s.registry, &s.context, &bundle, native, false, Backend::LevelZero)
                .expect("import");
            black_box(kernel);
            s.sim.clear_calls();
        });
    });
}

criterion_group!(
    benches,
    benchmark_import_program,
    benchmark_legacy_fallback,
    benchmark_import_kernel
);
criterion_main!(benches);
