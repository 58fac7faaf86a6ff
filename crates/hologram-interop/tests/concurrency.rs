//! Concurrent import tests

use hologram_interop::{import, Backend, BackendRegistry, BundleState, Device};
use hologram_native::sim::{SimBackend, SimConfig, SimOp};
use hologram_native::ProgramBinaryType;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;

#[test]
fn test_concurrent_make_device_yields_one_object() {
    let sim = SimBackend::new(SimConfig::cuda());
    let registry = BackendRegistry::builder()
        .register(Backend::Cuda, Arc::new(sim.clone()))
        .build();
    let platform = sim.create_platform();
    let native = sim.create_device(platform).unwrap();

    let devices: Vec<Device> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| scope.spawn(|| import::make_device(&registry, native, Backend::Cuda).unwrap()))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert!(devices.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_concurrent_program_imports() {
    let sim = SimBackend::new(SimConfig::level_zero());
    let registry = BackendRegistry::builder()
        .register(Backend::LevelZero, Arc::new(sim.clone()))
        .build();
    let platform = sim.create_platform();
    let devices = vec![sim.create_device(platform).unwrap(), sim.create_device(platform).unwrap()];
    let context = import::make_context(&registry, sim.create_context(&devices).unwrap(), Backend::LevelZero).unwrap();

    let natives: Vec<_> = (0..THREADS)
        .map(|i| {
            let stage = if i % 2 == 0 {
                ProgramBinaryType::None
            } else {
                ProgramBinaryType::Library
            };
            sim.create_program(&devices, stage, &["k"]).unwrap()
        })
        .collect();

    thread::scope(|scope| {
        for &native in &natives {
            let (registry, context, sim, devices) = (&registry, &context, &sim, &devices);
            scope.spawn(move || {
                let target = BundleState::Executable;
                let bundle = import::import_program(registry, native, context, false, target, Backend::LevelZero)
                    .unwrap();
                assert_eq!(bundle.devices().len(), 2);
                assert!(bundle.has_kernel("k").unwrap());
                let program = sim.program_native(bundle.images()[0].program_handle()).unwrap();
                for &device in devices {
                    assert_eq!(sim.program_stage(program, device), Some(ProgramBinaryType::Executable));
                }
            });
        }
    });

    // Half the programs build per device, the other half link per device.
    assert_eq!(sim.call_count(SimOp::ProgramBuildExp), THREADS / 2 * devices.len());
    assert_eq!(sim.call_count(SimOp::ProgramLinkExp), THREADS / 2 * devices.len());
    assert!(natives.iter().all(|&native| !sim.is_alive(native)));
}
