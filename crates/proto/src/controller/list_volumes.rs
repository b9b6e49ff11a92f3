use crate::{proto, volume::Volume, volume::VolumeStatus};
use std::{
  convert::{TryFrom, TryInto},
  num::NonZeroU32,
};
use thiserror::Error;

#[derive(Debug)]
pub struct ListVolumesRequest {
  max_entries: Option<NonZeroU32>,
  starting_token: Option<String>,
}

impl ListVolumesRequest {
  /// If specified (non-zero), the Plugin MUST NOT return more entries
  /// than this number in the response. Plugins that cannot page may
  /// ignore it and return everything.
  #[inline]
  pub fn max_entries(&self) -> Option<NonZeroU32> {
    self.max_entries
  }

  /// A token to specify where to start paginating. Set this field to
  /// the `next_token` returned by a previous `ListVolumes` call.
  #[inline]
  pub fn starting_token(&self) -> Option<&str> {
    self.starting_token.as_deref()
  }
}

impl TryFrom<proto::ListVolumesRequest> for ListVolumesRequest {
  type Error = tonic::Status;

  fn try_from(value: proto::ListVolumesRequest) -> Result<Self, Self::Error> {
    let max_entries = match value.max_entries {
      v if v < 0 => {
        return Err(tonic::Status::invalid_argument(
          "ListVolumesRequest.max_entries was less than 0",
        ))
      }
      v => NonZeroU32::new(v as u32),
    };

    let starting_token = match value.starting_token {
      v if v.is_empty() => None,
      v => Some(v),
    };

    Ok(ListVolumesRequest {
      max_entries,
      starting_token,
    })
  }
}

#[derive(Debug)]
pub struct VolumeListEntry {
  volume: Volume,
  status: Option<VolumeStatus>,
}

impl VolumeListEntry {
  pub fn new(volume: Volume) -> Self {
    VolumeListEntry {
      volume,
      status: None,
    }
  }

  #[inline]
  pub fn volume(&self) -> &Volume {
    &self.volume
  }
}

impl TryFrom<VolumeListEntry> for proto::list_volumes_response::Entry {
  type Error = tonic::Status;

  fn try_from(value: VolumeListEntry) -> Result<Self, Self::Error> {
    let volume = Some(value.volume.try_into()?);
    let status = value.status.map(Into::into);

    Ok(proto::list_volumes_response::Entry { volume, status })
  }
}

#[derive(Debug)]
pub struct ListVolumesResponse {
  entries: Vec<VolumeListEntry>,
  next_token: Option<String>,
}

impl ListVolumesResponse {
  /// A complete, unpaginated listing.
  pub fn new(entries: Vec<VolumeListEntry>) -> Self {
    ListVolumesResponse {
      entries,
      next_token: None,
    }
  }

  #[inline]
  pub fn entries(&self) -> &[VolumeListEntry] {
    &self.entries
  }
}

impl TryFrom<ListVolumesResponse> for proto::ListVolumesResponse {
  type Error = tonic::Status;

  fn try_from(value: ListVolumesResponse) -> Result<Self, Self::Error> {
    let entries = value
      .entries
      .into_iter()
      .map(TryInto::try_into)
      .collect::<Result<_, _>>()?;
    let next_token = value.next_token.unwrap_or_default();

    Ok(proto::ListVolumesResponse {
      entries,
      next_token,
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ListVolumesError {
  #[error("Invalid `starting_token`: {0}")]
  InvalidStartingToken(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] tonic::Status),
}

use tonic::{Code, Status};
impl From<ListVolumesError> for tonic::Status {
  fn from(value: ListVolumesError) -> Self {
    match value {
      ListVolumesError::Other(v) => v,
      value @ ListVolumesError::InvalidStartingToken(_) => {
        Status::new(Code::Aborted, value.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn negative_max_entries_is_rejected() {
    let request = proto::ListVolumesRequest {
      max_entries: -1,
      starting_token: String::new(),
    };

    let err = ListVolumesRequest::try_from(request).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
  }

  #[test]
  fn entries_keep_their_order() {
    let response = ListVolumesResponse::new(vec![
      VolumeListEntry::new(Volume::new("a", 100)),
      VolumeListEntry::new(Volume::new("b", 200)),
    ]);

    let response = proto::ListVolumesResponse::try_from(response).unwrap();
    let ids: Vec<_> = response
      .entries
      .iter()
      .filter_map(|e| e.volume.as_ref())
      .map(|v| (v.volume_id.as_str(), v.capacity_bytes))
      .collect();

    assert_eq!(ids, vec![("a", 100), ("b", 200)]);
    assert!(response.next_token.is_empty());
  }
}
