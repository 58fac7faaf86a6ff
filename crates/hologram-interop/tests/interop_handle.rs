//! Integration tests for native handle access inside a command

use hologram_interop::{import, Backend, BackendRegistry, InteropError, Queue, QueueProperties, RequirementId};
use hologram_native::sim::{SimBackend, SimConfig};
use hologram_native::{MemHandle, NativeError, NativeHandle};
use std::sync::Arc;

struct Fixture {
    sim: SimBackend,
    device: NativeHandle,
    context: NativeHandle,
    queue_native: NativeHandle,
    queue: Queue,
}

fn fixture() -> Fixture {
    let sim = SimBackend::new(SimConfig::level_zero());
    let registry = BackendRegistry::builder()
        .register(Backend::LevelZero, Arc::new(sim.clone()))
        .build();
    let platform = sim.create_platform();
    let device = sim.create_device(platform).unwrap();
    let context = sim.create_context(&[device]).unwrap();
    let queue_native = sim.create_queue(device).unwrap();

    let managed_context = import::make_context(&registry, context, Backend::LevelZero).unwrap();
    let queue = import::make_queue(
        &registry,
        queue_native,
        7,
        &managed_context,
        None,
        true,
        &QueueProperties::in_order(),
        Backend::LevelZero,
    )
    .unwrap();

    Fixture {
        sim,
        device,
        context,
        queue_native,
        queue,
    }
}

#[test]
fn test_native_objects_of_the_queue() {
    let f = fixture();

    f.queue.with_interop_handle(&[], |handle| {
        assert_eq!(handle.backend(), Backend::LevelZero);
        assert_eq!(handle.native_device().unwrap(), f.device);
        assert_eq!(handle.native_context().unwrap(), f.context);

        let mut native_desc = 0;
        assert_eq!(handle.native_queue(&mut native_desc).unwrap(), f.queue_native);
        assert_eq!(native_desc, 7);
    });
}

#[test]
fn test_native_mem_for_known_requirement() {
    let f = fixture();
    let input = f.sim.create_mem();
    let output = f.sim.create_mem();
    let mem_objects: [(RequirementId, MemHandle); 2] = [(RequirementId(1), input), (RequirementId(2), output)];

    let (a, b) = f.queue.with_interop_handle(&mem_objects, |handle| {
        (
            handle.native_mem(RequirementId(1)).unwrap(),
            handle.native_mem(RequirementId(2)).unwrap(),
        )
    });

    assert_ne!(a, b);
    assert!(f.sim.is_alive(a));
    assert!(f.sim.is_alive(b));
}

#[test]
fn test_native_mem_for_unknown_requirement() {
    let f = fixture();
    let mem_objects = [(RequirementId(1), f.sim.create_mem())];

    let err = f
        .queue
        .with_interop_handle(&mem_objects, |handle| handle.native_mem(RequirementId(9)))
        .unwrap_err();

    assert!(matches!(err, InteropError::InvalidNativeObject(_)));
    assert!(err.to_string().contains("invalid memory object used inside interop"));
}

#[test]
fn test_native_mem_backend_failure_propagates() {
    let f = fixture();
    let stale = MemHandle::new(0xdead);
    let mem_objects = [(RequirementId(3), stale)];

    let result = f
        .queue
        .with_interop_handle(&mem_objects, |handle| handle.native_mem(RequirementId(3)));

    assert!(matches!(
        result,
        Err(InteropError::Native(NativeError::InvalidMemObject(0xdead)))
    ));
}
