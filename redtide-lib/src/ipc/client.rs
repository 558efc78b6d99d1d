use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use super::{
    AsyncReadWriteChannel, ClientChannel, FrameError, IpcRequest, IpcResponse, TransferRequest,
};
use crate::ErrorKind;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("connection closed by the server")]
    Closed,
    #[error("unexpected response: {0:?}")]
    UnexpectedResponse(IpcResponse),
    #[error(transparent)]
    Service(#[from] ErrorKind),
}

/// Controller side of the endpoint.
pub struct Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    channel: AsyncReadWriteChannel<T>,
}

#[cfg(unix)]
impl Client<tokio::net::UnixStream> {
    pub async fn connect(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(Self::new(tokio::net::UnixStream::connect(path).await?))
    }
}

#[cfg(windows)]
impl Client<tokio::net::windows::named_pipe::NamedPipeClient> {
    pub async fn connect(name: &str) -> std::io::Result<Self> {
        let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(name)?;
        Ok(Self::new(pipe))
    }
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(stream: T) -> Self {
        Self {
            channel: AsyncReadWriteChannel::new(stream),
        }
    }

    async fn call(&mut self, request: IpcRequest) -> Result<IpcResponse, ClientError> {
        self.channel.send(request).await?;
        self.channel.recv().await?.ok_or(ClientError::Closed)
    }

    pub async fn version(&mut self) -> Result<String, ClientError> {
        match self.call(IpcRequest::Version).await? {
            IpcResponse::Version(version) => Ok(version),
            res => Err(ClientError::UnexpectedResponse(res)),
        }
    }

    /// Sends one transfer and returns the byte count with any bytes read.
    pub async fn transfer(
        &mut self,
        request: TransferRequest,
    ) -> Result<(usize, Bytes), ClientError> {
        trace!(
            "{:?} pid={} addr={:#x} len={}",
            request.command,
            request.target_process_id,
            request.virtual_address,
            request.length
        );
        match self.call(IpcRequest::Transfer(request)).await? {
            IpcResponse::Transferred {
                bytes_transferred,
                data,
            } => Ok((bytes_transferred, data)),
            IpcResponse::Failed(err) => Err(err.into()),
            res => Err(ClientError::UnexpectedResponse(res)),
        }
    }

    /// Reads up to `len` bytes. The result may be shorter when the range
    /// runs into unmapped memory.
    pub async fn read(
        &mut self,
        target_process_id: i32,
        virtual_address: u64,
        len: usize,
    ) -> Result<Vec<u8>, ClientError> {
        let length = i32::try_from(len).unwrap_or(i32::MAX);
        let request = TransferRequest::read(target_process_id, virtual_address, length);
        let (_, data) = self.transfer(request).await?;
        Ok(data.to_vec())
    }

    /// Writes `data` and returns how many bytes reached the target.
    pub async fn write(
        &mut self,
        target_process_id: i32,
        virtual_address: u64,
        data: &[u8],
    ) -> Result<usize, ClientError> {
        let request =
            TransferRequest::write(target_process_id, virtual_address, Bytes::copy_from_slice(data));
        let (bytes_transferred, _) = self.transfer(request).await?;
        Ok(bytes_transferred)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;
    use crate::ipc::ServerChannel;

    #[tokio::test]
    async fn service_errors_surface_as_error_kinds() {
        let (a, b) = duplex(1024);
        let mut client = Client::new(a);
        let server = tokio::spawn(async move {
            let mut server = AsyncReadWriteChannel::new(b);
            let Some(IpcRequest::Transfer(request)) = ServerChannel::recv(&mut server).await.unwrap()
            else {
                panic!("expected a transfer");
            };
            assert_eq!(request.length, 4);
            assert_eq!(request.capacity, 4);
            ServerChannel::send(&mut server, IpcResponse::Failed(ErrorKind::PermissionDenied))
                .await
                .unwrap();
        });

        let result = client.read(1, 0x1000, 4).await;
        assert!(matches!(
            result,
            Err(ClientError::Service(ErrorKind::PermissionDenied))
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn closed_server_is_reported() {
        let (a, b) = duplex(1024);
        let mut client = Client::new(a);
        let server = tokio::spawn(async move {
            let mut server = AsyncReadWriteChannel::new(b);
            let _ = ServerChannel::recv(&mut server).await;
        });
        assert!(matches!(client.version().await, Err(ClientError::Closed)));
        server.await.unwrap();
    }
}
