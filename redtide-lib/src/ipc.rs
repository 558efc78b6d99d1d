//! Local wire protocol between a controller and the daemon.

mod buffer;
mod channel;
mod client;
mod message;

pub use buffer::InlineBuffer;
pub use channel::{
    read_frame, write_frame, AsyncReadWriteChannel, ClientChannel, FrameError, ServerChannel,
    MAX_FRAME_LEN,
};
pub use client::{Client, ClientError};
pub use message::{IpcRequest, IpcResponse, TransferRequest};

#[cfg(unix)]
pub const DEFAULT_ENDPOINT: &str = "/run/redtide.sock";
#[cfg(windows)]
pub const DEFAULT_ENDPOINT: &str = r"\\.\pipe\redtide";
