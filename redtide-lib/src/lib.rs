//! Cross-process memory access for privileged controllers.
//!
//! [`MemoryAccessService`] performs one read or write against another running
//! process per request. Everything host-specific (capability queries, process
//! lookup, the foreign address space copy) sits behind the traits in [`host`].

mod caller_buffer;
mod error;
pub mod host;
pub mod ipc;
mod request;
mod service;
mod staging;

pub use crate::caller_buffer::{BufferFault, CallerBuffer};
pub use crate::error::ErrorKind;
pub use crate::request::{Caller, Command, Direction, Request, MAX_TRANSFER_SIZE};
pub use crate::service::{validate_length, MemoryAccessService};
pub use crate::staging::StagingBuffer;
