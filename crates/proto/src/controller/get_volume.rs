use crate::{proto, volume::Volume, volume::VolumeStatus};
use std::convert::{TryFrom, TryInto};
use thiserror::Error;

#[derive(Debug)]
pub struct ControllerGetVolumeRequest {
  volume_id: String,
}

impl ControllerGetVolumeRequest {
  /// The ID of the volume to fetch current volume information for.
  /// This field is REQUIRED.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }
}

impl TryFrom<proto::ControllerGetVolumeRequest> for ControllerGetVolumeRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::ControllerGetVolumeRequest) -> Result<Self, Self::Error> {
    let volume_id = match value.volume_id {
      v if v.is_empty() => {
        return Err(tonic::Status::invalid_argument(
          "ControllerGetVolumeRequest.volume_id is empty",
        ))
      }
      v => v,
    };

    Ok(ControllerGetVolumeRequest { volume_id })
  }
}

#[derive(Debug)]
pub struct ControllerGetVolumeResponse {
  volume: Volume,
  status: VolumeStatus,
}

impl ControllerGetVolumeResponse {
  pub fn new(volume: Volume, status: VolumeStatus) -> Self {
    ControllerGetVolumeResponse { volume, status }
  }

  #[inline]
  pub fn volume(&self) -> &Volume {
    &self.volume
  }
}

impl TryFrom<ControllerGetVolumeResponse> for proto::ControllerGetVolumeResponse {
  type Error = tonic::Status;

  fn try_from(value: ControllerGetVolumeResponse) -> Result<Self, Self::Error> {
    let volume = Some(value.volume.try_into()?);
    let status = Some(value.status.into());

    Ok(proto::ControllerGetVolumeResponse { volume, status })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ControllerGetVolumeError {
  #[error("Volume does not exist: {0}")]
  VolumeNotFound(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

impl From<ControllerGetVolumeError> for tonic::Status {
  fn from(value: ControllerGetVolumeError) -> Self {
    use tonic::{Code, Status};

    match value {
      ControllerGetVolumeError::VolumeNotFound(v) => Status::new(Code::NotFound, v),
      ControllerGetVolumeError::Other(v) => v,
    }
  }
}
