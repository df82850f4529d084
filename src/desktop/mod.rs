//! Platform desktop backends.
//!
//! Each platform provides an [`ActionExecutor`](crate::actions::ActionExecutor)
//! and a [`PointerBackend`](crate::core::mouse::PointerBackend). Helper
//! commands they shell out to run through [`process`] with a time limit.

pub mod process;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod input;

#[cfg(target_os = "macos")]
pub use macos::{MacOSExecutor, MacOSPointer};

/// Platform-agnostic executor type alias
#[cfg(target_os = "macos")]
pub type DesktopExecutor = MacOSExecutor;

/// Platform-agnostic pointer type alias
#[cfg(target_os = "macos")]
pub type DesktopPointer = MacOSPointer;

#[cfg(not(target_os = "macos"))]
pub use input::{InputExecutor, InputPointer};

/// Platform-agnostic executor type alias
#[cfg(not(target_os = "macos"))]
pub type DesktopExecutor = InputExecutor;

/// Platform-agnostic pointer type alias
#[cfg(not(target_os = "macos"))]
pub type DesktopPointer = InputPointer;
