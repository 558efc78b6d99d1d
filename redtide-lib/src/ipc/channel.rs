use std::io;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{IpcRequest, IpcResponse};

/// Upper bound for one encoded message. A full page of payload plus the
/// request header fits comfortably.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("frame of {0} bytes exceeds the limit")]
    TooLarge(usize),
}

/// Writes `msg` as a little-endian `u32` length followed by its MessagePack body.
pub async fn write_frame<W, M>(writer: &mut W, msg: &M) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    let body = rmp_serde::to_vec(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(body.len()));
    }
    writer.write_u32_le(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. `None` when the peer closed the stream between frames.
pub async fn read_frame<R, M>(reader: &mut R) -> Result<Option<M>, FrameError>
where
    R: AsyncRead + Unpin,
    M: DeserializeOwned,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len as usize,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(rmp_serde::from_slice(&body)?))
}

#[async_trait]
pub trait ServerChannel {
    async fn recv(&mut self) -> Result<Option<IpcRequest>, FrameError>;
    async fn send(&mut self, msg: IpcResponse) -> Result<(), FrameError>;
}

#[async_trait]
pub trait ClientChannel {
    async fn send(&mut self, msg: IpcRequest) -> Result<(), FrameError>;
    async fn recv(&mut self) -> Result<Option<IpcResponse>, FrameError>;
}

pub struct AsyncReadWriteChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    read_write: T,
}

impl<T> AsyncReadWriteChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(read_write: T) -> Self {
        Self { read_write }
    }
}

#[async_trait]
impl<T> ServerChannel for AsyncReadWriteChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn recv(&mut self) -> Result<Option<IpcRequest>, FrameError> {
        read_frame(&mut self.read_write).await
    }

    async fn send(&mut self, msg: IpcResponse) -> Result<(), FrameError> {
        write_frame(&mut self.read_write, &msg).await
    }
}

#[async_trait]
impl<T> ClientChannel for AsyncReadWriteChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn send(&mut self, msg: IpcRequest) -> Result<(), FrameError> {
        write_frame(&mut self.read_write, &msg).await
    }

    async fn recv(&mut self) -> Result<Option<IpcResponse>, FrameError> {
        read_frame(&mut self.read_write).await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::duplex;

    use super::*;
    use crate::{ipc::TransferRequest, ErrorKind};

    #[tokio::test]
    async fn frames_cross_a_stream() {
        let (mut a, mut b) = duplex(1024);
        let request = TransferRequest::write(7, 0x1000, Bytes::from_static(&[1, 2, 3]));
        write_frame(&mut a, &IpcRequest::Transfer(request.clone()))
            .await
            .unwrap();
        let received: Option<IpcRequest> = read_frame(&mut b).await.unwrap();
        let Some(IpcRequest::Transfer(received)) = received else {
            panic!("unexpected frame");
        };
        assert_eq!(received, request);
    }

    #[tokio::test]
    async fn closed_stream_reads_as_none() {
        let (a, mut b) = duplex(64);
        drop(a);
        let received: Option<IpcResponse> = read_frame(&mut b).await.unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected_before_reading_the_body() {
        let (mut a, mut b) = duplex(64);
        a.write_u32_le(MAX_FRAME_LEN as u32 + 1).await.unwrap();
        let result: Result<Option<IpcResponse>, _> = read_frame(&mut b).await;
        assert!(matches!(result, Err(FrameError::TooLarge(_))));
    }

    #[tokio::test]
    async fn channels_pair_up() {
        let (a, b) = duplex(1024);
        let mut client = AsyncReadWriteChannel::new(a);
        let mut server = AsyncReadWriteChannel::new(b);

        ClientChannel::send(&mut client, IpcRequest::Version)
            .await
            .unwrap();
        assert!(matches!(
            ServerChannel::recv(&mut server).await.unwrap(),
            Some(IpcRequest::Version)
        ));
        ServerChannel::send(&mut server, IpcResponse::Failed(ErrorKind::NoSuchProcess))
            .await
            .unwrap();
        assert_eq!(
            ClientChannel::recv(&mut client).await.unwrap(),
            Some(IpcResponse::Failed(ErrorKind::NoSuchProcess))
        );
    }
}
