use crate::proto;
use std::{
  convert::TryFrom,
  path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug)]
pub struct NodeUnpublishVolumeRequest {
  volume_id: String,
  target_path: PathBuf,
}

impl NodeUnpublishVolumeRequest {
  /// The ID of the volume. This field is REQUIRED.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// The path at which the volume was published. Always absolute. It
  /// may already be gone, in which case unpublishing is a no-op.
  #[inline]
  pub fn target_path(&self) -> &Path {
    &self.target_path
  }
}

impl TryFrom<proto::NodeUnpublishVolumeRequest> for NodeUnpublishVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::NodeUnpublishVolumeRequest) -> Result<Self, Self::Error> {
    let volume_id = match value.volume_id {
      v if v.is_empty() => {
        return Err(tonic::Status::invalid_argument(
          "NodeUnpublishVolumeRequest.volume_id is empty",
        ))
      }
      v => v,
    };

    let target_path = match value.target_path {
      v if v.is_empty() => {
        return Err(tonic::Status::invalid_argument(
          "NodeUnpublishVolumeRequest.target_path is empty",
        ))
      }
      v => match PathBuf::from(v) {
        v if !v.is_absolute() => {
          return Err(tonic::Status::invalid_argument(
            "NodeUnpublishVolumeRequest.target_path is not absolute",
          ))
        }
        v => v,
      },
    };

    Ok(NodeUnpublishVolumeRequest {
      volume_id,
      target_path,
    })
  }
}

#[derive(Debug, Error)]
pub enum NodeUnpublishVolumeError {
  /// Indicates that a volume corresponding to the specified `volume_id` does not exist.
  #[error("Volume does not exist: {0}")]
  VolumeNotFound(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

use tonic::{Code, Status};
impl From<NodeUnpublishVolumeError> for tonic::Status {
  fn from(value: NodeUnpublishVolumeError) -> Self {
    match value {
      NodeUnpublishVolumeError::Other(v) => v,
      value @ NodeUnpublishVolumeError::VolumeNotFound(_) => {
        Status::new(Code::NotFound, value.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_target_is_accepted() {
    let request = proto::NodeUnpublishVolumeRequest {
      volume_id: "remote".to_owned(),
      target_path: "/does/not/exist/mnt".to_owned(),
    };

    let request = NodeUnpublishVolumeRequest::try_from(request).unwrap();
    assert_eq!(request.target_path(), Path::new("/does/not/exist/mnt"));
  }

  #[test]
  fn empty_volume_id_is_rejected() {
    let request = proto::NodeUnpublishVolumeRequest {
      volume_id: String::new(),
      target_path: "/mnt".to_owned(),
    };

    let err = NodeUnpublishVolumeRequest::try_from(request).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }
}
