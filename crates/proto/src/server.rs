//! gRPC bootstrap: binds the CSI endpoint and routes the identity,
//! controller and node services into a single plugin value.

use crate::{controller::Controller, node::Node, proto, ControllerService, NodeService};
use futures::TryStreamExt;
use std::{
  fmt, io,
  net::SocketAddr,
  path::{Path, PathBuf},
  pin::Pin,
  str::FromStr,
  sync::Arc,
  task::{Context, Poll},
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::{server::Connected, Server};
use tracing::{info, warn};

/// Where the plugin listens. CSI endpoints are written as URLs, usually
/// `unix:///csi/csi.sock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
  Unix(PathBuf),
  Tcp(SocketAddr),
}

impl FromStr for Endpoint {
  type Err = ServeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || ServeError::InvalidEndpoint(s.to_owned());

    if let Some(path) = s.strip_prefix("unix://") {
      if path.is_empty() {
        return Err(invalid());
      }

      return Ok(Endpoint::Unix(PathBuf::from(path)));
    }

    if let Some(addr) = s.strip_prefix("tcp://") {
      return addr.parse().map(Endpoint::Tcp).map_err(|_| invalid());
    }

    if s.starts_with('/') {
      return Ok(Endpoint::Unix(PathBuf::from(s)));
    }

    Err(invalid())
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
      Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ServeError {
  #[error("unsupported endpoint `{0}`, expected unix://<path> or tcp://<addr>")]
  InvalidEndpoint(String),

  #[error("failed to prepare socket {}", path.display())]
  Socket {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Transport(#[from] tonic::transport::Error),
}

#[derive(Debug)]
struct UnixStream(tokio::net::UnixStream);

impl Connected for UnixStream {
  fn remote_addr(&self) -> Option<SocketAddr> {
    None
  }
}

impl AsyncRead for UnixStream {
  fn poll_read(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_read(cx, buf)
  }
}

impl AsyncWrite for UnixStream {
  fn poll_write(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    Pin::new(&mut self.0).poll_write(cx, buf)
  }

  fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_flush(cx)
  }

  fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_shutdown(cx)
  }
}

fn remove_stale_socket(path: &Path) -> Result<(), ServeError> {
  match std::fs::remove_file(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(ServeError::Socket {
      path: path.to_path_buf(),
      source,
    }),
  }
}

/// Serve `plugin` on `endpoint` until `signal` resolves.
pub async fn serve<T, F>(plugin: Arc<T>, endpoint: &Endpoint, signal: F) -> Result<(), ServeError>
where
  T: ControllerService + NodeService,
  F: std::future::Future<Output = ()>,
{
  let router = Server::builder()
    .add_service(proto::identity_server::IdentityServer::new(Controller(
      plugin.clone(),
    )))
    .add_service(proto::controller_server::ControllerServer::new(
      Controller(plugin.clone()),
    ))
    .add_service(proto::node_server::NodeServer::new(Node(plugin)));

  match endpoint {
    Endpoint::Tcp(addr) => {
      info!(%endpoint, "listening");
      router.serve_with_shutdown(*addr, signal).await?;
    }

    Endpoint::Unix(path) => {
      remove_stale_socket(path)?;
      let listener =
        tokio::net::UnixListener::bind(path).map_err(|source| ServeError::Socket {
          path: path.clone(),
          source,
        })?;

      info!(%endpoint, "listening");
      let incoming = UnixListenerStream::new(listener).map_ok(UnixStream);
      let result = router.serve_with_incoming_shutdown(incoming, signal).await;

      if let Err(e) = remove_stale_socket(path) {
        warn!(error = %e, "failed to clean up socket");
      }

      result?;
    }
  }

  info!("server stopped");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[test_case("unix:///tmp/csi.sock" => Endpoint::Unix(PathBuf::from("/tmp/csi.sock")))]
  #[test_case("/csi/csi.sock" => Endpoint::Unix(PathBuf::from("/csi/csi.sock")))]
  #[test_case("tcp://127.0.0.1:10000" => Endpoint::Tcp("127.0.0.1:10000".parse().unwrap()))]
  fn parses(s: &str) -> Endpoint {
    s.parse().unwrap()
  }

  #[test_case("unix://")]
  #[test_case("http://localhost:1234")]
  #[test_case("tcp://localhost")]
  #[test_case("csi.sock")]
  fn rejects(s: &str) {
    assert!(matches!(
      s.parse::<Endpoint>(),
      Err(ServeError::InvalidEndpoint(_))
    ));
  }

  #[test]
  fn display_round_trips_unix() {
    let endpoint = Endpoint::Unix(PathBuf::from("/tmp/csi.sock"));
    assert_eq!(endpoint.to_string(), "unix:///tmp/csi.sock");
  }
}
