use crate::{proto, secrets::Secrets, volume::VolumeCapability};
use std::{
  collections::HashMap,
  convert::{TryFrom, TryInto},
  path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug)]
pub struct NodePublishVolumeRequest {
  volume_id: String,
  publish_context: HashMap<String, String>,
  target_path: PathBuf,
  volume_capability: VolumeCapability,
  readonly: bool,
  secrets: Secrets,
  volume_context: HashMap<String, String>,
}

impl NodePublishVolumeRequest {
  /// The ID of the volume to publish. This field is REQUIRED.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// Set by the CO to the value returned by `ControllerPublishVolume`
  /// when the controller has `PUBLISH_UNPUBLISH_VOLUME`, empty otherwise.
  #[inline]
  pub fn publish_context(&self) -> &HashMap<String, String> {
    &self.publish_context
  }

  /// The path to which the volume will be published. It is an absolute
  /// path whose parent directory exists; creating the path itself is
  /// the responsibility of the SP.
  #[inline]
  pub fn target_path(&self) -> &Path {
    &self.target_path
  }

  /// Volume capability describing how the CO intends to use this volume.
  #[inline]
  pub fn volume_capability(&self) -> &VolumeCapability {
    &self.volume_capability
  }

  /// Indicates SP MUST publish the volume in readonly mode.
  #[inline]
  pub fn readonly(&self) -> bool {
    self.readonly
  }

  #[inline]
  pub fn secrets(&self) -> &HashMap<String, String> {
    self.secrets.as_ref()
  }

  /// Volume context as returned by SP in
  /// CreateVolumeResponse.Volume.volume_context, or as written in a
  /// pre-provisioned volume definition.
  #[inline]
  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }
}

impl TryFrom<proto::NodePublishVolumeRequest> for NodePublishVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::NodePublishVolumeRequest) -> Result<Self, Self::Error> {
    let volume_id = match value.volume_id {
      v if v.is_empty() => {
        return Err(tonic::Status::invalid_argument(
          "NodePublishVolumeRequest.volume_id is empty",
        ))
      }
      v => v,
    };

    let target_path = match value.target_path {
      v if v.is_empty() => {
        return Err(tonic::Status::invalid_argument(
          "NodePublishVolumeRequest.target_path is empty",
        ))
      }
      v => match PathBuf::from(v) {
        v if !v.is_absolute() => {
          return Err(tonic::Status::invalid_argument(
            "NodePublishVolumeRequest.target_path is not absolute",
          ))
        }
        v if !v.parent().map(|p| p.is_dir()).unwrap_or(false) => {
          return Err(tonic::Status::invalid_argument(
            "NodePublishVolumeRequest.target_path has no parent directory",
          ))
        }
        v => v,
      },
    };

    let volume_capability = match value.volume_capability {
      None => {
        return Err(tonic::Status::invalid_argument(
          "NodePublishVolumeRequest.volume_capability missing",
        ))
      }
      Some(v) => v.try_into()?,
    };

    Ok(NodePublishVolumeRequest {
      volume_id,
      publish_context: value.publish_context,
      target_path,
      volume_capability,
      readonly: value.readonly,
      secrets: value.secrets.into(),
      volume_context: value.volume_context,
    })
  }
}

#[derive(Debug, Error)]
pub enum NodePublishVolumeError {
  /// Indicates that a volume corresponding to the specified `volume_id` does not exist.
  #[error("Volume does not exist: {0}")]
  VolumeNotFound(String),

  /// Indicates that a volume corresponding to the specified `volume_id` has already
  /// been published at the specified `target_path` but is incompatible with the specified
  /// `volume_capability` or `readonly` flag.
  #[error("Volume published but is incompatible: {0}")]
  IncompatibleVolumePublished(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

use tonic::{Code, Status};
impl From<NodePublishVolumeError> for tonic::Status {
  fn from(value: NodePublishVolumeError) -> Self {
    match value {
      NodePublishVolumeError::Other(v) => v,
      value => {
        let code = match &value {
          NodePublishVolumeError::VolumeNotFound(_) => Code::NotFound,
          NodePublishVolumeError::IncompatibleVolumePublished(_) => Code::AlreadyExists,
          NodePublishVolumeError::Other(_) => unreachable!(),
        };

        Status::new(code, value.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::volume::AccessMode;

  fn request(target_path: &Path) -> proto::NodePublishVolumeRequest {
    proto::NodePublishVolumeRequest {
      volume_id: "remote".to_owned(),
      target_path: target_path.to_string_lossy().into_owned(),
      volume_capability: Some(VolumeCapability::mount(AccessMode::SingleNodeWriter).into()),
      readonly: true,
      ..Default::default()
    }
  }

  #[test]
  fn target_may_not_exist_yet() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("mnt");

    let request = NodePublishVolumeRequest::try_from(request(&target)).unwrap();
    assert_eq!(request.target_path(), target);
    assert!(request.readonly());
    assert!(request.volume_capability().access_type().is_mount());
  }

  #[test]
  fn relative_target_is_rejected() {
    let err = NodePublishVolumeRequest::try_from(request(Path::new("mnt"))).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }

  #[test]
  fn missing_parent_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing").join("mnt");

    let err = NodePublishVolumeRequest::try_from(request(&target)).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }

  #[test]
  fn missing_capability_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut request = request(dir.path());
    request.volume_capability = None;

    let err = NodePublishVolumeRequest::try_from(request).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }
}
