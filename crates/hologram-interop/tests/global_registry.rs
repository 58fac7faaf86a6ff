//! Integration tests for the process-wide registry and the crate-root entry points
//!
//! The registry is installed once for this test binary; every test runs
//! serially because they share the reference backend's call log.

use hologram_interop::registry::{self, BackendRegistry};
use hologram_interop::{Backend, BundleState, InteropConfig, InteropError, QueueProperties};
use hologram_native::sim::{SimBackend, SimConfig, SimOp};
use hologram_native::ProgramBinaryType;
use serial_test::serial;
use std::sync::{Arc, OnceLock};

static SIM: OnceLock<SimBackend> = OnceLock::new();

/// Reference backend behind the installed process-wide registry
fn installed() -> &'static SimBackend {
    SIM.get_or_init(|| {
        let sim = SimBackend::new(SimConfig::opencl());
        let registry = BackendRegistry::builder()
            .register(Backend::OpenCl, Arc::new(sim.clone()))
            .config(InteropConfig::default().with_compile_options("-DGLOBAL=1"))
            .build();
        registry::install(registry).expect("first install");
        sim
    })
}

#[test]
#[serial]
fn test_second_install_rejected() {
    installed();

    let result = registry::install(BackendRegistry::builder().build());

    assert!(matches!(result, Err(InteropError::RegistryAlreadyInstalled)));
    assert_eq!(registry::global().backends(), vec![Backend::OpenCl]);
}

#[test]
#[serial]
fn test_resolve_backend() {
    installed();

    let plugin = hologram_interop::resolve_backend(Backend::OpenCl).unwrap();
    assert_eq!(plugin.backend(), Backend::OpenCl);
    assert!(plugin.traits().needs_explicit_retain_on_import);
    assert!(plugin.same_table(&registry::global().resolve(Backend::OpenCl).unwrap()));

    assert!(matches!(
        hologram_interop::resolve_backend(Backend::All),
        Err(InteropError::UnsupportedBackend(Backend::All))
    ));
    assert!(matches!(
        hologram_interop::resolve_backend(Backend::Cuda),
        Err(InteropError::UnsupportedBackend(Backend::Cuda))
    ));
}

#[test]
#[serial]
fn test_crate_root_entry_points() -> hologram_interop::Result<()> {
    let sim = installed();
    let platform = sim.create_platform();
    let native_device = sim.create_device(platform)?;

    let platform = hologram_interop::make_platform(platform, Backend::OpenCl)?;
    let device = hologram_interop::make_device(native_device, Backend::OpenCl)?;
    assert_eq!(device.platform(), &platform);

    let context = hologram_interop::make_context(sim.create_context(&[native_device])?, Backend::OpenCl)?;
    let queue = hologram_interop::make_queue(
        sim.create_queue(native_device)?,
        0,
        &context,
        Some(&device),
        true,
        &QueueProperties::in_order(),
        Backend::OpenCl,
    )?;
    assert_eq!(queue.device(), &device);

    let event = hologram_interop::make_event(sim.create_event(), &context, true, Backend::OpenCl)?;
    assert_eq!(event.context(), &context);

    sim.clear_calls();
    let native_program = sim.create_program(&[native_device], ProgramBinaryType::None, &["fill"])?;
    let bundle =
        hologram_interop::import_program(native_program, &context, true, BundleState::Executable, Backend::OpenCl)?;
    assert_eq!(sim.call_count(SimOp::ProgramBuild), 1);
    assert_eq!(sim.last_options().as_deref(), Some("-DGLOBAL=1"));
    assert!(bundle.has_kernel("fill")?);

    let native_kernel = sim.create_kernel(native_program, "fill")?;
    let kernel = hologram_interop::import_kernel(&context, &bundle, native_kernel, true, Backend::OpenCl)?;
    assert_eq!(kernel.native_handle()?, native_kernel);

    let native_kernel = sim.create_kernel(native_program, "fill")?;
    let owned_kernel = hologram_interop::make_kernel(native_kernel, &context, Backend::OpenCl)?;
    assert!(owned_kernel.bundle().is_empty());
    Ok(())
}
