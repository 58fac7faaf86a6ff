//! Native compute-backend function table for hologram interop
//!
//! This crate provides:
//! - **Handles**: opaque native handles and typed plugin-level handles
//! - **Function Table**: the [`NativeApi`] trait every backend implements
//! - **Result Codes**: [`NativeError`], including "entry point not supported"
//! - **Reference Backend**: [`sim::SimBackend`], an in-process native layer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  hologram-interop                        │
//! │   (resolver, ownership, reconciler, bundle assembly)     │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │  NativeApi
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  native function table                   │
//! └─────────────────────┬───────────────────────────────────┘
//!         ┌─────────────┼─────────────┬─────────────┐
//!         ▼             ▼             ▼             ▼
//!   ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐
//!   │ OpenCL  │  │  Level  │  │  CUDA   │  │   HIP   │
//!   │         │  │  Zero   │  │         │  │         │
//!   └─────────┘  └─────────┘  └─────────┘  └─────────┘
//! ```

pub mod api;
pub mod error;
pub mod handle;
pub mod sim;
pub mod types;

// Re-export public API
pub use api::NativeApi;
pub use error::{NativeError, NativeResult};
pub use handle::{
    ContextHandle, DeviceHandle, EventHandle, KernelHandle, MemHandle, NativeHandle, PlatformHandle, ProgramHandle,
    QueueHandle,
};
pub use types::{
    LegacyPlatformBackend, NativePlatformBackend, NativeProperties, ProgramBinaryType, QueueFlags,
    QueueNativeProperties,
};
