//! Client for the application runtime contract.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use apprunner_protocol::proto;
use apprunner_protocol::{
    ApplicationRuntimeClient, EventTrigger, MethodInvocation, MethodResult, PageRef, ResolvedPage,
    StreamUpdate,
};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::RwLock;
use tonic::transport::Channel;

/// Where the runtime server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEndpoint {
    /// `http://host:port`
    Tcp(String),
    /// `unix:/path/to.sock`
    Unix(PathBuf),
}

impl RuntimeEndpoint {
    pub fn parse(value: &str) -> Result<Self> {
        if let Some(path) = value.strip_prefix("unix:") {
            if path.is_empty() {
                anyhow::bail!("unix endpoint needs a socket path");
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if value.starts_with("http://") || value.starts_with("https://") {
            return Ok(Self::Tcp(value.to_string()));
        }
        anyhow::bail!("unsupported endpoint {value:?}: expected http://host:port or unix:/path")
    }
}

impl std::fmt::Display for RuntimeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(url) => f.write_str(url),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Lazily connected contract client.
///
/// Errors are returned as-is. A call failing with `Unavailable` drops the
/// cached channel so the next call reconnects. The tonic `Status` of a failed call can be recovered
/// with `err.downcast_ref::<tonic::Status>()`.
#[derive(Clone)]
pub struct RuntimeClient {
    endpoint: RuntimeEndpoint,
    inner: Arc<RwLock<Option<ApplicationRuntimeClient<Channel>>>>,
}

impl RuntimeClient {
    /// Create a new client (not connected yet).
    pub fn new(endpoint: RuntimeEndpoint) -> Self {
        Self {
            endpoint,
            inner: Arc::new(RwLock::new(None)),
        }
    }

    pub fn endpoint(&self) -> &RuntimeEndpoint {
        &self.endpoint
    }

    pub async fn connect(&self) -> Result<()> {
        self.ensure_connected().await.map(|_| ())
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.is_some()
    }

    async fn ensure_connected(&self) -> Result<ApplicationRuntimeClient<Channel>> {
        {
            let guard = self.inner.read().await;
            if let Some(client) = guard.as_ref() {
                return Ok(client.clone());
            }
        }

        let channel = match &self.endpoint {
            RuntimeEndpoint::Tcp(url) => Channel::from_shared(url.clone())
                .context("invalid endpoint URL")?
                .connect()
                .await
                .with_context(|| format!("connecting to {url}"))?,
            RuntimeEndpoint::Unix(path) => connect_unix(path).await?,
        };
        tracing::debug!("Connected to application runtime at {}", self.endpoint);

        let client = ApplicationRuntimeClient::new(channel);
        *self.inner.write().await = Some(client.clone());
        Ok(client)
    }

    async fn handle_status(&self, status: tonic::Status) -> anyhow::Error {
        if status.code() == tonic::Code::Unavailable {
            *self.inner.write().await = None;
        }
        anyhow::Error::new(status)
    }

    pub async fn resolve_page(&self, page: PageRef) -> Result<ResolvedPage> {
        let mut client = self.ensure_connected().await?;
        let request = proto::ResolveApplicationPageRequest::from(page);
        let response = match client.resolve_application_page(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => return Err(self.handle_status(status).await),
        };
        ResolvedPage::try_from(response).context("decoding resolved page")
    }

    /// Open the event stream of a page.
    pub async fn consume_events(
        &self,
        page: PageRef,
    ) -> Result<BoxStream<'static, Result<StreamUpdate>>> {
        let mut client = self.ensure_connected().await?;
        let request = proto::ConsumeApplicationEventStreamRequest::from(page);
        let stream = match client.consume_application_events(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => return Err(self.handle_status(status).await),
        };

        Ok(stream
            .map(|item| {
                let update = item.map_err(anyhow::Error::new)?;
                StreamUpdate::try_from(update).context("decoding stream update")
            })
            .boxed())
    }

    pub async fn invoke_method(&self, invocation: MethodInvocation) -> Result<MethodResult> {
        let mut client = self.ensure_connected().await?;
        let request = proto::ApplicationServerMethodRequest::from(invocation);
        match client.application_server_method(request).await {
            Ok(response) => Ok(response.into_inner().into()),
            Err(status) => Err(self.handle_status(status).await),
        }
    }

    pub async fn trigger_event(&self, trigger: EventTrigger) -> Result<()> {
        let mut client = self.ensure_connected().await?;
        let request = proto::TriggerApplicationEventRequest::from(trigger);
        match client.trigger_application_event(request).await {
            Ok(_) => Ok(()),
            Err(status) => Err(self.handle_status(status).await),
        }
    }
}

#[cfg(unix)]
async fn connect_unix(socket_path: &Path) -> Result<Channel> {
    use hyper_util::rt::TokioIo;
    use tokio::net::UnixStream;
    use tonic::transport::Endpoint;

    let socket_path = socket_path.to_path_buf();
    let display = socket_path.display().to_string();

    let channel = Endpoint::from_static("http://[::]:0")
        .connect_with_connector(tower::service_fn(move |_: tonic::transport::Uri| {
            let path = socket_path.clone();
            async move {
                let stream = UnixStream::connect(path).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await
        .with_context(|| format!("connecting to unix:{display}"))?;

    Ok(channel)
}

#[cfg(not(unix))]
async fn connect_unix(socket_path: &Path) -> Result<Channel> {
    anyhow::bail!(
        "unix sockets are not supported on this platform: {}",
        socket_path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoints() {
        assert_eq!(
            RuntimeEndpoint::parse("http://127.0.0.1:9190").unwrap(),
            RuntimeEndpoint::Tcp("http://127.0.0.1:9190".into())
        );
        assert_eq!(
            RuntimeEndpoint::parse("unix:/run/apprunner.sock").unwrap(),
            RuntimeEndpoint::Unix(PathBuf::from("/run/apprunner.sock"))
        );
        assert!(RuntimeEndpoint::parse("unix:").is_err());
        assert!(RuntimeEndpoint::parse("127.0.0.1:9190").is_err());
    }

    #[test]
    fn test_endpoint_display_round_trips() {
        for raw in ["http://localhost:9190", "unix:/tmp/a.sock"] {
            assert_eq!(RuntimeEndpoint::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[tokio::test]
    async fn test_client_starts_disconnected() {
        let client = RuntimeClient::new(RuntimeEndpoint::parse("http://127.0.0.1:1").unwrap());
        assert!(!client.is_connected().await);
    }
}
