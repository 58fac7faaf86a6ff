//! Program build-state reconciliation
//!
//! For every device of an imported program, the reconciler reads the
//! program's binary type and drives it toward the requested [`BundleState`]:
//!
//! | discovered \ target      | Input    | Object   | Executable |
//! |--------------------------|----------|----------|------------|
//! | None                     | -        | compile  | build      |
//! | CompiledObject / Library | mismatch | -        | link       |
//! | Executable               | mismatch | mismatch | -          |
//!
//! Each operation first tries the per-device extended entry point and falls
//! back to the whole-program legacy one only when the extended one reports
//! "unsupported". Link produces a new program; it replaces the current one
//! for the remaining devices and for the resulting image, while the replaced
//! handle stays owned until the image is dropped.
//!
//! Devices are processed in order and nothing is rolled back: when device
//! `k` fails, devices before it stay mutated.

use crate::bundle::{BundleState, ImportedProgram, ReconciledProgram};
use crate::config::InteropConfig;
use crate::error::{BuildOperation, InteropError, Result};
use crate::objects::Context;
use crate::registry::Plugin;
use hologram_native::{DeviceHandle, NativeResult, ProgramBinaryType, ProgramHandle};

/// What to do for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildAction {
    /// Already in the requested state
    Keep,
    Compile,
    Build,
    Link,
    /// The requested state cannot be reached
    Mismatch,
}

impl BuildAction {
    /// Whether the action calls into the backend to change the program
    pub const fn mutates(self) -> bool {
        matches!(self, Self::Compile | Self::Build | Self::Link)
    }
}

/// Transition from a discovered binary type to a requested bundle state
pub const fn plan_transition(discovered: ProgramBinaryType, target: BundleState) -> BuildAction {
    use BundleState as T;
    use ProgramBinaryType as D;

    match (discovered, target) {
        (D::None, T::Input) => BuildAction::Keep,
        (D::None, T::Object) => BuildAction::Compile,
        (D::None, T::Executable) => BuildAction::Build,
        (D::CompiledObject | D::Library, T::Input) => BuildAction::Mismatch,
        (D::CompiledObject | D::Library, T::Object) => BuildAction::Keep,
        (D::CompiledObject | D::Library, T::Executable) => BuildAction::Link,
        (D::Executable, T::Input | T::Object) => BuildAction::Mismatch,
        (D::Executable, T::Executable) => BuildAction::Keep,
    }
}

/// Run `extended`, and `legacy` once if `extended` is unsupported
fn with_legacy_fallback<T>(
    operation: BuildOperation,
    device: DeviceHandle,
    extended: impl FnOnce() -> NativeResult<T>,
    legacy: impl FnOnce() -> NativeResult<T>,
) -> Result<T> {
    let result = match extended() {
        Err(error) if error.is_unsupported() => {
            tracing::debug!(%operation, %device, "extended entry point unsupported, using legacy");
            legacy()
        }
        other => other,
    };
    result.map_err(|source| InteropError::BuildFailed {
        operation,
        device,
        source,
    })
}

/// Reconciles one imported program
pub(crate) struct Reconciler<'a> {
    plugin: &'a Plugin,
    context: &'a Context,
    config: &'a InteropConfig,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(plugin: &'a Plugin, context: &'a Context, config: &'a InteropConfig) -> Self {
        Self {
            plugin,
            context,
            config,
        }
    }

    /// Drive `program` to `target` on every device, in order
    pub(crate) fn reconcile(
        &self,
        program: ImportedProgram,
        devices: &[DeviceHandle],
        target: BundleState,
    ) -> Result<ReconciledProgram> {
        let mut current = program;
        let mut superseded = Vec::new();

        for &device in devices {
            let discovered = self.plugin.api().program_binary_type(current.handle(), device)?;
            let action = plan_transition(discovered, target);
            tracing::debug!(
                program = %current.handle(),
                %device,
                %discovered,
                %target,
                ?action,
                "reconcile device"
            );

            match action {
                BuildAction::Keep => {}
                BuildAction::Mismatch => {
                    return Err(InteropError::BuildStateMismatch { discovered, target });
                }
                BuildAction::Compile => self.compile(current.handle(), device)?,
                BuildAction::Build => self.build(current.handle(), device)?,
                BuildAction::Link => {
                    let linked = self.link(current.handle(), device)?;
                    tracing::debug!(from = %current.handle(), to = %linked, %device, "link replaced program");
                    let replaced = std::mem::replace(&mut current, ImportedProgram::new(linked, self.plugin.clone()));
                    superseded.push(replaced);
                }
            }
        }

        Ok(ReconciledProgram { current, superseded })
    }

    fn compile(&self, program: ProgramHandle, device: DeviceHandle) -> Result<()> {
        let api = self.plugin.api();
        let options = self.config.compile_options();
        with_legacy_fallback(
            BuildOperation::Compile,
            device,
            || api.program_compile_exp(program, &[device], options),
            || api.program_compile(self.context.handle(), program, options),
        )
    }

    fn build(&self, program: ProgramHandle, device: DeviceHandle) -> Result<()> {
        let api = self.plugin.api();
        let options = self.config.compile_options();
        with_legacy_fallback(
            BuildOperation::Build,
            device,
            || api.program_build_exp(program, &[device], options),
            || api.program_build(self.context.handle(), program, options),
        )
    }

    fn link(&self, program: ProgramHandle, device: DeviceHandle) -> Result<ProgramHandle> {
        let api = self.plugin.api();
        let context = self.context.handle();
        let options = self.config.link_options();
        with_legacy_fallback(
            BuildOperation::Link,
            device,
            || api.program_link_exp(context, &[device], &[program], options),
            || api.program_link(context, &[program], options),
        )
    }
}
