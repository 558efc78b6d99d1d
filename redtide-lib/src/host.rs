//! Host collaborators the service delegates to.

#[cfg(target_os = "linux")]
mod linux;
pub mod simulated;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
pub use self::linux::{LinuxHost, LinuxProcess};
pub use self::simulated::SimulatedHost;
#[cfg(target_os = "windows")]
pub use self::windows::{WindowsHost, WindowsProcess};

use crate::{Caller, Direction};

/// Host backend for the running platform.
#[cfg(target_os = "linux")]
pub type NativeHost = LinuxHost;
#[cfg(target_os = "windows")]
pub type NativeHost = WindowsHost;

pub trait CapabilityCheck {
    /// Whether `caller` may trace or inspect other processes.
    fn is_privileged(&self, caller: &Caller) -> bool;
}

pub trait ProcessTable {
    type Handle;

    /// Looks `pid` up afresh. `None` when no live process has that id.
    fn resolve_process(&self, pid: i32) -> Option<Self::Handle>;
}

pub trait ForeignMemory: ProcessTable {
    /// Copies between `buffer` and the address space of `process` at
    /// `address`. A Read fills `buffer`, a Write sources it.
    ///
    /// Returns the number of bytes moved, which may be short of
    /// `buffer.len()` but never exceeds it. Zero or a negative errno means
    /// nothing was moved.
    fn transfer(
        &self,
        process: &Self::Handle,
        address: u64,
        buffer: &mut [u8],
        direction: Direction,
    ) -> isize;
}

pub trait Host: CapabilityCheck + ForeignMemory {}

impl<T> Host for T where T: CapabilityCheck + ForeignMemory {}
