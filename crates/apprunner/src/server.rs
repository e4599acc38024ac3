//! Listener setup and lifecycle for the gRPC and admin servers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::runner::AppRunner;
use crate::service::{DEFAULT_HEARTBEAT_INTERVAL, RuntimeService};

/// Where and how to serve.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub grpc_listen: SocketAddr,
    /// Additional Unix socket for the contract.
    pub grpc_socket: Option<PathBuf>,
    /// Admin HTTP API listener; `None` disables it.
    pub admin_listen: Option<SocketAddr>,
    pub heartbeat_interval: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            grpc_listen: SocketAddr::from(([127, 0, 0, 1], 9190)),
            grpc_socket: None,
            admin_listen: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Bound listeners, ready to serve.
pub struct Server {
    runner: Arc<AppRunner>,
    heartbeat_interval: Duration,
    grpc: TcpListener,
    #[cfg(unix)]
    grpc_unix: Option<(PathBuf, tokio::net::UnixListener)>,
    admin: Option<TcpListener>,
}

impl Server {
    /// Bind every configured listener. Port 0 picks an ephemeral port.
    pub async fn bind(runner: Arc<AppRunner>, options: ServerOptions) -> Result<Self> {
        let grpc = TcpListener::bind(options.grpc_listen)
            .await
            .with_context(|| format!("binding gRPC listener on {}", options.grpc_listen))?;

        #[cfg(unix)]
        let grpc_unix = match options.grpc_socket {
            Some(path) => Some(bind_unix(path)?),
            None => None,
        };
        #[cfg(not(unix))]
        if options.grpc_socket.is_some() {
            warn!("Unix sockets are not supported on this platform, ignoring grpc.socket");
        }

        let admin = match options.admin_listen {
            Some(addr) => Some(
                TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("binding admin listener on {addr}"))?,
            ),
            None => None,
        };

        Ok(Self {
            runner,
            heartbeat_interval: options.heartbeat_interval,
            grpc,
            #[cfg(unix)]
            grpc_unix,
            admin,
        })
    }

    pub fn grpc_addr(&self) -> Result<SocketAddr> {
        self.grpc.local_addr().context("reading gRPC listener address")
    }

    pub fn admin_addr(&self) -> Result<Option<SocketAddr>> {
        self.admin
            .as_ref()
            .map(|listener| listener.local_addr().context("reading admin listener address"))
            .transpose()
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// Cancellation stops every running application first, which closes the
    /// open event streams so the servers can drain.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let service = RuntimeService::new(self.runner.clone())
            .with_heartbeat_interval(self.heartbeat_interval);

        let runner = self.runner.clone();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            stopper.cancelled().await;
            runner.stop_all().await;
        });

        info!("gRPC listening on {}", self.grpc_addr()?);
        let tcp = tonic::transport::Server::builder()
            .add_service(service.clone().into_server())
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(self.grpc),
                shutdown.clone().cancelled_owned(),
            );

        #[cfg(unix)]
        let unix = {
            let listener = self.grpc_unix;
            let service = service.clone();
            let shutdown = shutdown.clone();
            async move {
                let Some((path, listener)) = listener else {
                    return Ok(());
                };
                info!("gRPC listening on unix:{}", path.display());
                let result = tonic::transport::Server::builder()
                    .add_service(service.into_server())
                    .serve_with_incoming_shutdown(
                        tokio_stream::wrappers::UnixListenerStream::new(listener),
                        shutdown.cancelled_owned(),
                    )
                    .await;
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("Failed to remove socket {}: {}", path.display(), e);
                }
                result
            }
        };
        #[cfg(not(unix))]
        let unix = async { Ok::<(), tonic::transport::Error>(()) };

        let admin = {
            let listener = self.admin;
            let runner = self.runner.clone();
            let shutdown = shutdown.clone();
            async move {
                let Some(listener) = listener else {
                    return Ok(());
                };
                info!("Admin API listening on http://{}", listener.local_addr()?);
                let app = api::create_router(AppState::new(runner));
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown.cancelled_owned())
                    .await
            }
        };

        let (tcp, unix, admin) = tokio::join!(tcp, unix, admin);
        tcp.context("running gRPC server")?;
        unix.context("running gRPC unix socket server")?;
        admin.context("running admin server")?;

        info!("Shutdown complete");
        Ok(())
    }
}

#[cfg(unix)]
fn bind_unix(path: PathBuf) -> Result<(PathBuf, tokio::net::UnixListener)> {
    if path.exists() {
        // left behind by an unclean exit
        std::fs::remove_file(&path)
            .with_context(|| format!("removing stale socket {}", path.display()))?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating socket directory {}", parent.display()))?;
    }
    let listener = tokio::net::UnixListener::bind(&path)
        .with_context(|| format!("binding unix socket {}", path.display()))?;
    Ok((path, listener))
}
