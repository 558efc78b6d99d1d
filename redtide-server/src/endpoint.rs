use std::sync::Arc;

use anyhow::Result;
use redtide_lib::{host::Host, Caller, MemoryAccessService};
use tracing::error;

use crate::{config::Config, session::serve_connection};

fn spawn_session<H, T>(service: &Arc<MemoryAccessService<H>>, caller: Caller, stream: T)
where
    H: Host + Send + Sync + 'static,
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + Sync + 'static,
{
    let service = service.clone();
    tokio::spawn(async move {
        if let Err(err) = serve_connection(service, caller, stream).await {
            error!("connection aborted: {}", err);
        }
    });
}

#[cfg(unix)]
mod unix_socket {
    use std::{
        fs::{self, Permissions},
        io,
        os::unix::fs::{FileTypeExt, PermissionsExt},
        path::Path,
        sync::Arc,
    };

    use anyhow::{bail, Result};
    use redtide_lib::{host::Host, Caller, MemoryAccessService};
    use tokio::net::{UnixListener, UnixStream};
    use tracing::{error, info, warn};

    use super::spawn_session;
    use crate::config::Config;

    fn peer(stream: &UnixStream) -> Caller {
        match stream.peer_cred() {
            Ok(cred) => Caller::new(cred.pid(), Some(cred.uid())),
            Err(err) => {
                warn!("peer credentials unavailable: {}", err);
                Caller::default()
            }
        }
    }

    /// Socket file that is unlinked again when dropped.
    pub struct BoundSocket {
        listener: UnixListener,
        path: String,
    }

    impl BoundSocket {
        pub fn bind(config: &Config) -> Result<Self> {
            let path = Path::new(&config.endpoint);
            match fs::symlink_metadata(path) {
                Ok(meta) if meta.file_type().is_socket() => {
                    fs::remove_file(path)?;
                    info!("removed stale socket {}", path.display());
                }
                Ok(_) => bail!("{} exists and is not a socket", path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            let listener = UnixListener::bind(path)?;
            fs::set_permissions(path, Permissions::from_mode(config.socket_mode))?;
            info!("listening on {}", path.display());
            Ok(Self {
                listener,
                path: config.endpoint.clone(),
            })
        }

        /// Never returns on its own; dropping the future unlinks the socket.
        pub async fn serve<H>(self, service: Arc<MemoryAccessService<H>>) -> Result<()>
        where
            H: Host + Send + Sync + 'static,
        {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        let caller = peer(&stream);
                        spawn_session(&service, caller, stream);
                    }
                    // Typically descriptor exhaustion; the listener itself is still fine.
                    Err(err) => error!("accept failed: {}", err),
                }
            }
        }
    }

    impl Drop for BoundSocket {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(windows)]
mod named_pipe {
    use std::{os::windows::io::AsRawHandle, sync::Arc};

    use anyhow::Result;
    use redtide_lib::{host::Host, Caller, MemoryAccessService};
    use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};
    use tracing::{info, warn};
    use windows::Win32::{Foundation::HANDLE, System::Pipes::GetNamedPipeClientProcessId};

    use super::spawn_session;
    use crate::config::Config;

    fn peer(pipe: &NamedPipeServer) -> Caller {
        let mut pid = 0u32;
        match unsafe { GetNamedPipeClientProcessId(HANDLE(pipe.as_raw_handle()), &mut pid) } {
            Ok(()) => Caller::new(i32::try_from(pid).ok(), None),
            Err(err) => {
                warn!("client process id unavailable: {}", err);
                Caller::default()
            }
        }
    }

    pub struct BoundSocket {
        name: String,
        first: NamedPipeServer,
    }

    impl BoundSocket {
        pub fn bind(config: &Config) -> Result<Self> {
            let first = ServerOptions::new()
                .first_pipe_instance(true)
                .create(&config.endpoint)?;
            info!("listening on {}", config.endpoint);
            Ok(Self {
                name: config.endpoint.clone(),
                first,
            })
        }

        pub async fn serve<H>(self, service: Arc<MemoryAccessService<H>>) -> Result<()>
        where
            H: Host + Send + Sync + 'static,
        {
            let mut pipe = self.first;
            loop {
                pipe.connect().await?;
                // A connected instance belongs to its client; listen on a fresh one.
                let connected = pipe;
                pipe = ServerOptions::new().create(&self.name)?;
                let caller = peer(&connected);
                spawn_session(&service, caller, connected);
            }
        }
    }
}

#[cfg(windows)]
pub use named_pipe::BoundSocket;
#[cfg(unix)]
pub use unix_socket::BoundSocket;

/// Binds the configured endpoint and serves it until the process is interrupted.
pub async fn run<H>(service: Arc<MemoryAccessService<H>>, config: &Config) -> Result<()>
where
    H: Host + Send + Sync + 'static,
{
    let socket = BoundSocket::bind(config)?;
    tokio::select! {
        result = socket.serve(service) => result,
        result = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(result?)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use redtide_lib::{host::SimulatedHost, ipc::Client};

    use super::*;

    #[tokio::test]
    async fn serves_over_a_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            endpoint: dir.path().join("rt.sock").to_string_lossy().into_owned(),
            ..Config::default()
        };

        let host = SimulatedHost::new();
        host.grant_pid(std::process::id() as i32);
        host.map(7, 0x1000, &[0x11, 0x22, 0x33, 0x44], true);
        let service = Arc::new(MemoryAccessService::new(host));

        let socket = BoundSocket::bind(&config).unwrap();
        let mode = std::fs::metadata(&config.endpoint).unwrap().permissions();
        assert_eq!(std::os::unix::fs::PermissionsExt::mode(&mode) & 0o777, 0o600);
        let server = tokio::spawn(socket.serve(service));

        let mut client = Client::connect(&config.endpoint).await.unwrap();
        assert_eq!(
            client.read(7, 0x1000, 4).await.unwrap(),
            [0x11, 0x22, 0x33, 0x44]
        );
        server.abort();
    }

    #[tokio::test]
    async fn stale_socket_files_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rt.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());
        let config = Config {
            endpoint: path.to_string_lossy().into_owned(),
            ..Config::default()
        };
        let socket = BoundSocket::bind(&config).unwrap();
        drop(socket);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn regular_files_at_the_endpoint_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("important.db");
        std::fs::write(&path, b"keep me").unwrap();
        let config = Config {
            endpoint: path.to_string_lossy().into_owned(),
            ..Config::default()
        };

        assert!(BoundSocket::bind(&config).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    }
}
