use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Command, ErrorKind, Request};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TransferRequest {
    pub command: Command,
    pub target_process_id: i32,
    pub virtual_address: u64,
    pub length: i32,
    /// Size of the controller's destination buffer.
    pub capacity: u32,
    /// Source bytes for a Write.
    pub payload: Bytes,
}

impl TransferRequest {
    pub fn read(target_process_id: i32, virtual_address: u64, length: i32) -> Self {
        Self {
            command: Command::READ,
            target_process_id,
            virtual_address,
            length,
            capacity: length.max(0) as u32,
            payload: Bytes::new(),
        }
    }

    pub fn write(target_process_id: i32, virtual_address: u64, payload: Bytes) -> Self {
        Self {
            command: Command::WRITE,
            target_process_id,
            virtual_address,
            length: i32::try_from(payload.len()).unwrap_or(i32::MAX),
            capacity: 0,
            payload,
        }
    }

    pub fn to_request(&self) -> Request {
        Request::new(
            self.command,
            self.target_process_id,
            self.virtual_address,
            self.length,
        )
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub enum IpcRequest {
    Version,
    Transfer(TransferRequest),
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub enum IpcResponse {
    Version(String),
    Transferred { bytes_transferred: usize, data: Bytes },
    Failed(ErrorKind),
}

impl From<Result<(usize, Bytes), ErrorKind>> for IpcResponse {
    fn from(result: Result<(usize, Bytes), ErrorKind>) -> Self {
        match result {
            Ok((bytes_transferred, data)) => IpcResponse::Transferred {
                bytes_transferred,
                data,
            },
            Err(err) => IpcResponse::Failed(err),
        }
    }
}
