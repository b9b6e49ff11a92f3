//! Per-volume configuration carried in the CSI volume context.

use crate::error::{Error, Result};
use serde_json::{json, Map, Value};
use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  time::Duration,
};
use tracing::debug;

pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);

const KEY_TYPE: &str = "type";
const KEY_PATH: &str = "path";
const KEY_PARAMETERS: &str = "parameters";
const KEY_VFS: &str = "vfs";
const KEY_MOUNT: &str = "mount";
const KEY_WAIT: &str = "wait";

/// Recognised volume context keys. Option blobs stay raw until they are
/// needed, so a malformed `vfs` never stops the remote from being created.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeContext {
  backend_type: Option<String>,
  path: String,
  parameters: Option<String>,
  vfs: Option<String>,
  mount: Option<String>,
  wait: Duration,
}

impl Default for VolumeContext {
  fn default() -> Self {
    VolumeContext {
      backend_type: None,
      path: "/".to_owned(),
      parameters: None,
      vfs: None,
      mount: None,
      wait: DEFAULT_WAIT,
    }
  }
}

impl VolumeContext {
  pub fn parse(context: &HashMap<String, String>) -> Self {
    let mut parsed = VolumeContext::default();

    for (key, value) in context {
      match key.as_str() {
        KEY_TYPE => parsed.backend_type = Some(value.clone()),
        KEY_PATH => parsed.path = value.clone(),
        KEY_PARAMETERS => parsed.parameters = Some(value.clone()),
        KEY_VFS => parsed.vfs = Some(value.clone()),
        KEY_MOUNT => parsed.mount = Some(value.clone()),
        KEY_WAIT => match humantime::parse_duration(value) {
          Ok(wait) => parsed.wait = wait,
          Err(e) => debug!(%value, error = %e, "unparsable wait, using default"),
        },
        _ => debug!(%key, "ignoring unknown volume context key"),
      }
    }

    parsed
  }

  #[inline]
  pub fn path(&self) -> &str {
    &self.path
  }

  #[inline]
  pub fn wait(&self) -> Duration {
    self.wait
  }

  /// Backend configuration for the remote `name`. The `type` inside the
  /// parameters wins over the context `type`.
  pub fn remote_config(&self, name: &str) -> Result<RemoteConfig> {
    let parameters = decode_object(KEY_PARAMETERS, self.parameters.as_deref())?;
    let backend_type = parameters
      .get(KEY_TYPE)
      .and_then(Value::as_str)
      .map(str::to_owned)
      .or_else(|| self.backend_type.clone())
      .unwrap_or_default();

    Ok(RemoteConfig {
      name: name.to_owned(),
      backend_type,
      parameters,
    })
  }

  pub fn vfs_options(&self) -> Result<Map<String, Value>> {
    decode_object(KEY_VFS, self.vfs.as_deref())
  }

  pub fn mount_options(&self) -> Result<Map<String, Value>> {
    decode_object(KEY_MOUNT, self.mount.as_deref())
  }
}

fn decode_object(key: &str, blob: Option<&str>) -> Result<Map<String, Value>> {
  match blob {
    None => Ok(Map::new()),
    Some(blob) if blob.trim().is_empty() => Ok(Map::new()),
    Some(blob) => serde_json::from_str(blob).map_err(Error::serialization(key)),
  }
}

/// A named backend configuration, as accepted by `config/create`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
  pub name: String,
  pub backend_type: String,
  pub parameters: Map<String, Value>,
}

impl RemoteConfig {
  pub(crate) fn to_params(&self) -> Value {
    json!({
      "name": self.name,
      "type": self.backend_type,
      "parameters": self.parameters,
      "opt": { "nonInteractive": true },
    })
  }
}

/// Everything one `mount/mount` call needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MountSession {
  pub remote: String,
  pub remote_path: String,
  pub target: PathBuf,
  pub vfs_options: Map<String, Value>,
  pub mount_options: Map<String, Value>,
}

impl MountSession {
  pub fn new(remote: impl Into<String>, remote_path: impl Into<String>, target: impl Into<PathBuf>) -> Self {
    MountSession {
      remote: remote.into(),
      remote_path: remote_path.into(),
      target: target.into(),
      vfs_options: Map::new(),
      mount_options: Map::new(),
    }
  }

  /// Forces the VFS layer read-only, whatever the options said.
  pub fn force_read_only(&mut self) {
    self
      .vfs_options
      .insert("ReadOnly".to_owned(), Value::Bool(true));
  }

  #[inline]
  pub fn target(&self) -> &Path {
    &self.target
  }

  pub(crate) fn fs(&self) -> String {
    format!("{}:{}", self.remote, self.remote_path)
  }

  pub(crate) fn to_params(&self) -> Value {
    json!({
      "fs": self.fs(),
      "mountPoint": self.target.to_string_lossy(),
      "vfsOpt": Value::Object(self.vfs_options.clone()).to_string(),
      "mountOpt": Value::Object(self.mount_options.clone()).to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  fn context(pairs: &[(&str, &str)]) -> VolumeContext {
    let map = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    VolumeContext::parse(&map)
  }

  #[test]
  fn defaults() {
    let ctx = context(&[]);
    assert_eq!(ctx.path(), "/");
    assert_eq!(ctx.wait(), DEFAULT_WAIT);
    assert!(ctx.vfs_options().unwrap().is_empty());
    assert!(ctx.mount_options().unwrap().is_empty());
  }

  #[test_case("1ms" => Duration::from_millis(1))]
  #[test_case("30s" => Duration::from_secs(30))]
  #[test_case("1m" => Duration::from_secs(60))]
  #[test_case("soon" => DEFAULT_WAIT)]
  #[test_case("" => DEFAULT_WAIT)]
  fn wait(value: &str) -> Duration {
    context(&[("wait", value)]).wait()
  }

  #[test]
  fn unknown_keys_are_ignored() {
    let ctx = context(&[
      ("csi.storage.k8s.io/pod.name", "web-0"),
      ("path", "/bucket"),
    ]);

    assert_eq!(ctx.path(), "/bucket");
    assert_eq!(ctx, VolumeContext {
      path: "/bucket".to_owned(),
      ..VolumeContext::default()
    });
  }

  #[test]
  fn parameters_type_wins() {
    let ctx = context(&[
      ("type", "sftp"),
      ("parameters", r#"{"type":"s3","provider":"Minio"}"#),
    ]);

    let config = ctx.remote_config("vol").unwrap();
    assert_eq!(config.name, "vol");
    assert_eq!(config.backend_type, "s3");
    assert_eq!(config.parameters["provider"], "Minio");
  }

  #[test]
  fn context_type_is_fallback() {
    let config = context(&[("type", "sftp")]).remote_config("vol").unwrap();
    assert_eq!(config.backend_type, "sftp");
    assert!(config.parameters.is_empty());
  }

  #[test_case("parameters", "[1,2]")]
  #[test_case("parameters", "{")]
  #[test_case("vfs", "\"ReadOnly\"")]
  #[test_case("mount", "{\"AllowOther\":")]
  fn malformed_blob_is_serialization_error(key: &str, value: &str) {
    let ctx = context(&[(key, value)]);
    let result = match key {
      "parameters" => ctx.remote_config("vol").map(|_| ()),
      "vfs" => ctx.vfs_options().map(|_| ()),
      _ => ctx.mount_options().map(|_| ()),
    };

    match result {
      Err(Error::Serialization { key: k, .. }) => assert_eq!(k, key),
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[test]
  fn read_only_overrides_vfs() {
    let ctx = context(&[("vfs", r#"{"ReadOnly":false,"CacheMode":"full"}"#)]);
    let mut session = MountSession::new("vol", "/", "/mnt/vol");
    session.vfs_options = ctx.vfs_options().unwrap();
    session.force_read_only();

    assert_eq!(session.vfs_options["ReadOnly"], Value::Bool(true));
    assert_eq!(session.vfs_options["CacheMode"], "full");
  }

  #[test]
  fn mount_params_encode_options_as_strings() {
    let mut session = MountSession::new("vol", "/data", "/mnt/vol");
    session.force_read_only();

    let params = session.to_params();
    assert_eq!(params["fs"], "vol:/data");
    assert_eq!(params["mountPoint"], "/mnt/vol");
    assert_eq!(params["mountOpt"], "{}");

    let vfs: Value = serde_json::from_str(params["vfsOpt"].as_str().unwrap()).unwrap();
    assert_eq!(vfs["ReadOnly"], true);
  }

  #[test]
  fn create_params_are_non_interactive() {
    let params = context(&[("parameters", r#"{"type":"memory"}"#)])
      .remote_config("vol")
      .unwrap()
      .to_params();

    assert_eq!(params["type"], "memory");
    assert_eq!(params["opt"]["nonInteractive"], true);
    assert_eq!(params["parameters"]["type"], "memory");
  }
}
