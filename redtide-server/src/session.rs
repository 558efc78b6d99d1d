use std::sync::Arc;

use anyhow::Result;
use redtide_lib::{
    host::Host,
    ipc::{
        AsyncReadWriteChannel, InlineBuffer, IpcRequest, IpcResponse, ServerChannel,
        TransferRequest,
    },
    Caller, MemoryAccessService,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
};
use tracing::{debug, info_span, Instrument};

fn transfer<H>(
    service: &MemoryAccessService<H>,
    caller: &Caller,
    request: TransferRequest,
) -> IpcResponse
where
    H: Host,
{
    let mut buffer = InlineBuffer::new(&request.payload, request.capacity as usize);
    service
        .handle(caller, &request.to_request(), &mut buffer)
        .map(|count| (count, buffer.into_reply()))
        .into()
}

async fn respond<H>(
    service: &Arc<MemoryAccessService<H>>,
    caller: Caller,
    request: IpcRequest,
) -> Result<IpcResponse>
where
    H: Host + Send + Sync + 'static,
{
    Ok(match request {
        IpcRequest::Version => IpcResponse::Version(env!("CARGO_PKG_VERSION").to_owned()),
        IpcRequest::Transfer(request) => {
            let service = service.clone();
            task::spawn_blocking(move || transfer(&service, &caller, request)).await?
        }
    })
}

async fn run_session<H, T>(
    service: Arc<MemoryAccessService<H>>,
    caller: Caller,
    stream: T,
) -> Result<()>
where
    H: Host + Send + Sync + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    debug!("connected");
    let mut channel = AsyncReadWriteChannel::new(stream);
    while let Some(request) = channel.recv().await? {
        let response = respond(&service, caller, request).await?;
        channel.send(response).await?;
    }
    debug!("disconnected");
    Ok(())
}

/// Serves requests from one connected controller until it hangs up.
pub async fn serve_connection<H, T>(
    service: Arc<MemoryAccessService<H>>,
    caller: Caller,
    stream: T,
) -> Result<()>
where
    H: Host + Send + Sync + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    let span = info_span!("conn", pid = ?caller.pid(), uid = ?caller.uid());
    run_session(service, caller, stream).instrument(span).await
}
