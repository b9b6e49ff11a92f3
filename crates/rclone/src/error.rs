use csi_mount_utils::MountError;
use std::{io, path::PathBuf, result, sync::Arc};
use thiserror::Error;

pub type Result<T> = result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
  /// A required startup parameter is missing or malformed.
  #[error("invalid configuration: {0}")]
  Configuration(String),

  /// The control plane answered, but reported a failure.
  #[error("{method} failed with status {status}: {body}")]
  ControlPlane {
    method: String,
    status: u16,
    body: String,
  },

  /// The request never got a response.
  #[error("{method} request failed")]
  Transport {
    method: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("filesystem operation on {} failed", path.display())]
  Filesystem {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  MountTable(#[from] MountError),

  #[error("`{key}` is not a valid JSON object")]
  Serialization {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  /// A mount task failed while its publish call was still waiting.
  #[error("mount on {} failed: {source}", target.display())]
  Mount { target: PathBuf, source: Arc<Error> },
}

impl Error {
  pub(crate) fn filesystem(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
    let path = path.into();
    move |source| Error::Filesystem { path, source }
  }

  pub(crate) fn serialization(key: impl Into<String>) -> impl FnOnce(serde_json::Error) -> Self {
    let key = key.into();
    move |source| Error::Serialization { key, source }
  }
}

impl From<Error> for tonic::Status {
  fn from(value: Error) -> Self {
    use tonic::{Code, Status};

    let code = match &value {
      Error::Configuration(_) => Code::FailedPrecondition,
      Error::ControlPlane { .. } => Code::Internal,
      Error::Transport { .. } => Code::Unavailable,
      Error::Filesystem { .. } => Code::Internal,
      Error::MountTable(_) => Code::Internal,
      Error::Serialization { .. } => Code::InvalidArgument,
      Error::Mount { .. } => Code::Internal,
    };

    Status::new(code, value.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;
  use tonic::Code;

  fn json_error() -> serde_json::Error {
    serde_json::from_str::<serde_json::Value>("{").unwrap_err()
  }

  #[test_case(Error::Configuration("no node id".into()) => Code::FailedPrecondition)]
  #[test_case(Error::ControlPlane { method: "mount/mount".into(), status: 500, body: "{}".into() } => Code::Internal)]
  #[test_case(Error::Serialization { key: "vfs".into(), source: json_error() } => Code::InvalidArgument)]
  #[test_case(Error::Filesystem { path: "/mnt".into(), source: io::Error::from(io::ErrorKind::PermissionDenied) } => Code::Internal)]
  fn maps_to_status(error: Error) -> Code {
    tonic::Status::from(error).code()
  }

  #[test]
  fn mount_failure_keeps_cause_in_message() {
    let cause = Arc::new(Error::ControlPlane {
      method: "mount/mount".into(),
      status: 500,
      body: "boom".into(),
    });
    let error = Error::Mount {
      target: "/mnt/a".into(),
      source: cause,
    };

    let status = tonic::Status::from(error);
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("boom"));
  }
}
