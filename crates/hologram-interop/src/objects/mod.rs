//! Managed runtime objects wrapping plugin handles
//!
//! Every wrapper that owns a plugin reference releases it exactly once, when
//! its last clone is dropped. Platforms and devices are never released; they
//! are cached so that one native object maps to one managed object.

pub mod context;
pub mod device;
pub mod event;
pub mod kernel;
pub mod platform;
pub mod queue;

pub use context::Context;
pub use device::Device;
pub use event::Event;
pub use kernel::Kernel;
pub use platform::Platform;
pub use queue::{Queue, QueueProperties};
