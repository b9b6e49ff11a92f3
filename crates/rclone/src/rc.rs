//! Transport to the rclone remote control API.
//!
//! Every rc method is an HTTP POST of a JSON object to
//! `http://<host>:<port>/<method>`. A call fails when the status is not 200,
//! or when the body carries a non-empty top-level `error` string.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

pub const DEFAULT_RC_PORT: u16 = 5572;

#[async_trait]
pub trait RemoteControl: Send + Sync + 'static {
  async fn call(&self, method: &str, params: Value) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct HttpRemoteControl {
  client: reqwest::Client,
  base: String,
}

impl HttpRemoteControl {
  pub fn new(port: u16) -> Self {
    Self::with_base(format!("http://localhost:{}", port))
  }

  pub fn with_base(base: impl Into<String>) -> Self {
    HttpRemoteControl {
      client: reqwest::Client::new(),
      base: base.into(),
    }
  }
}

/// Splits a finished response into a result, using the rc error convention.
fn classify(method: &str, status: u16, body: String) -> Result<Value> {
  let failed = || Error::ControlPlane {
    method: method.to_owned(),
    status,
    body: body.clone(),
  };

  if status != 200 {
    return Err(failed());
  }

  let value: Value = serde_json::from_str(&body).map_err(Error::serialization(method))?;
  match value.get("error").and_then(Value::as_str) {
    Some(e) if !e.is_empty() => Err(failed()),
    _ => Ok(value),
  }
}

#[async_trait]
impl RemoteControl for HttpRemoteControl {
  #[instrument(level = "debug", skip(self, params))]
  async fn call(&self, method: &str, params: Value) -> Result<Value> {
    let transport = |source| Error::Transport {
      method: method.to_owned(),
      source,
    };

    let response = self
      .client
      .post(format!("{}/{}", self.base, method))
      .json(&params)
      .send()
      .await
      .map_err(transport)?;

    let status = response.status().as_u16();
    let body = response.text().await.map_err(transport)?;
    debug!(status, "rc call finished");

    classify(method, status, body)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::oneshot,
  };

  /// Answers a single request with `status` and `body`, handing back the
  /// request line and JSON body it received.
  async fn respond_once(status: &'static str, body: &'static str) -> (u16, oneshot::Receiver<(String, Value)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
      let (mut stream, _) = listener.accept().await.unwrap();
      let mut buf = Vec::new();
      let mut chunk = [0u8; 1024];

      let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
          break pos + 4;
        }
      };

      let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
      let length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.trim().parse::<usize>().unwrap())
        .unwrap_or(0);

      while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before body");
        buf.extend_from_slice(&chunk[..n]);
      }

      let request_line = head.lines().next().unwrap_or_default().to_owned();
      let request_body = serde_json::from_slice(&buf[header_end..header_end + length]).unwrap();
      let _ = tx.send((request_line, request_body));

      let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
      );
      stream.write_all(response.as_bytes()).await.unwrap();
      stream.shutdown().await.unwrap();
    });

    (port, rx)
  }

  #[tokio::test]
  async fn posts_json_to_method_path() {
    let (port, rx) = respond_once("200 OK", r#"{"remotes":["a"]}"#).await;
    let rc = HttpRemoteControl::with_base(format!("http://127.0.0.1:{}", port));

    let value = rc
      .call("operations/about", json!({ "fs": "a:" }))
      .await
      .unwrap();
    assert_eq!(value["remotes"][0], "a");

    let (line, body) = rx.await.unwrap();
    assert!(line.starts_with("POST /operations/about "));
    assert_eq!(body, json!({ "fs": "a:" }));
  }

  #[tokio::test]
  async fn non_200_is_control_plane_error() {
    let (port, _rx) = respond_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
    let rc = HttpRemoteControl::with_base(format!("http://127.0.0.1:{}", port));

    match rc.call("mount/mount", json!({})).await {
      Err(Error::ControlPlane { method, status, body }) => {
        assert_eq!(method, "mount/mount");
        assert_eq!(status, 500);
        assert!(body.contains("boom"));
      }
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[tokio::test]
  async fn error_field_with_200_is_control_plane_error() {
    let (port, _rx) = respond_once("200 OK", r#"{"error":"didn't find section"}"#).await;
    let rc = HttpRemoteControl::with_base(format!("http://127.0.0.1:{}", port));

    let err = rc.call("config/create", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::ControlPlane { status: 200, .. }));
  }

  #[tokio::test]
  async fn unreachable_plane_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let rc = HttpRemoteControl::with_base(format!("http://127.0.0.1:{}", port));
    let err = rc.call("core/quit", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
  }

  #[test]
  fn empty_error_field_is_success() {
    let value = classify("core/quit", 200, r#"{"error":""}"#.to_owned()).unwrap();
    assert_eq!(value["error"], "");
  }

  #[test]
  fn non_json_body_is_serialization_error() {
    let err = classify("core/quit", 200, "not json".to_owned()).unwrap_err();
    assert!(matches!(err, Error::Serialization { .. }));
  }
}
