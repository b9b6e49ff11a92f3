use std::{
  collections::HashMap,
  convert::TryFrom,
  fmt,
  num::NonZeroU64,
};

use crate::proto;

#[derive(Debug)]
pub struct Volume {
  capacity_bytes: Option<NonZeroU64>,
  volume_id: String,
  volume_context: HashMap<String, String>,
}

impl Volume {
  /// A volume with unknown (`0`) capacity is reported without one.
  pub fn new(volume_id: impl Into<String>, capacity_bytes: u64) -> Self {
    Volume {
      capacity_bytes: NonZeroU64::new(capacity_bytes),
      volume_id: volume_id.into(),
      volume_context: HashMap::new(),
    }
  }

  pub fn with_context(mut self, volume_context: HashMap<String, String>) -> Self {
    self.volume_context = volume_context;
    self
  }

  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  #[inline]
  pub fn capacity_bytes(&self) -> Option<NonZeroU64> {
    self.capacity_bytes
  }
}

impl TryFrom<Volume> for proto::Volume {
  type Error = tonic::Status;

  fn try_from(value: Volume) -> Result<Self, Self::Error> {
    let capacity_bytes = match value.capacity_bytes {
      None => 0,
      Some(v) => i64::try_from(v.get())
        .map_err(|_| tonic::Status::out_of_range("Volume.capacity_bytes overflows int64"))?,
    };

    Ok(proto::Volume {
      capacity_bytes,
      volume_id: value.volume_id,
      volume_context: value.volume_context,
      content_source: None,
      accessible_topology: Vec::new(),
    })
  }
}

#[derive(Debug)]
pub struct VolumeCapability {
  access_mode: AccessMode,
  access_type: AccessType,
}

impl VolumeCapability {
  pub fn new(access_mode: AccessMode, access_type: AccessType) -> Self {
    VolumeCapability {
      access_mode,
      access_type,
    }
  }

  /// A filesystem capability with no fs type or mount flags.
  pub fn mount(access_mode: AccessMode) -> Self {
    Self::new(access_mode, AccessType::Mount(MountVolume::default()))
  }

  #[inline]
  pub fn access_mode(&self) -> AccessMode {
    self.access_mode
  }

  #[inline]
  pub fn access_type(&self) -> &AccessType {
    &self.access_type
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AccessMode {
  Unknown,
  /// Can only be published once as read/write on a single node, at
  /// any given time.
  SingleNodeWriter,
  /// Can only be published once as readonly on a single node, at
  /// any given time.
  SingleNodeReaderOnly,
  /// Can be published as readonly at multiple nodes simultaneously.
  MultiNodeReaderOnly,
  /// Can be published at multiple nodes simultaneously. Only one of
  /// the node can be used as read/write. The rest will be readonly.
  MultiNodeSingleWriter,
  /// Can be published as read/write at multiple nodes
  /// simultaneously.
  MultiNodeMultiWriter,
}

use proto::volume_capability::access_mode::Mode;

impl From<proto::volume_capability::AccessMode> for AccessMode {
  fn from(value: proto::volume_capability::AccessMode) -> Self {
    match Mode::from_i32(value.mode) {
      Some(Mode::SingleNodeWriter) => AccessMode::SingleNodeWriter,
      Some(Mode::SingleNodeReaderOnly) => AccessMode::SingleNodeReaderOnly,
      Some(Mode::MultiNodeReaderOnly) => AccessMode::MultiNodeReaderOnly,
      Some(Mode::MultiNodeSingleWriter) => AccessMode::MultiNodeSingleWriter,
      Some(Mode::MultiNodeMultiWriter) => AccessMode::MultiNodeMultiWriter,
      _ => AccessMode::Unknown,
    }
  }
}

impl From<AccessMode> for proto::volume_capability::AccessMode {
  fn from(value: AccessMode) -> Self {
    let mode = match value {
      AccessMode::Unknown => Mode::Unknown,
      AccessMode::SingleNodeWriter => Mode::SingleNodeWriter,
      AccessMode::SingleNodeReaderOnly => Mode::SingleNodeReaderOnly,
      AccessMode::MultiNodeReaderOnly => Mode::MultiNodeReaderOnly,
      AccessMode::MultiNodeSingleWriter => Mode::MultiNodeSingleWriter,
      AccessMode::MultiNodeMultiWriter => Mode::MultiNodeMultiWriter,
    } as i32;

    proto::volume_capability::AccessMode { mode }
  }
}

impl fmt::Display for AccessMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      AccessMode::Unknown => "UNKNOWN",
      AccessMode::SingleNodeWriter => "SINGLE_NODE_WRITER",
      AccessMode::SingleNodeReaderOnly => "SINGLE_NODE_READER_ONLY",
      AccessMode::MultiNodeReaderOnly => "MULTI_NODE_READER_ONLY",
      AccessMode::MultiNodeSingleWriter => "MULTI_NODE_SINGLE_WRITER",
      AccessMode::MultiNodeMultiWriter => "MULTI_NODE_MULTI_WRITER",
    };

    f.write_str(name)
  }
}

#[derive(Debug)]
pub enum AccessType {
  /// Indicate that the volume will be accessed via the block device API.
  Block,

  /// Indicate that the volume will be accessed via the filesystem API.
  Mount(MountVolume),
}

impl AccessType {
  #[inline]
  pub fn is_mount(&self) -> bool {
    matches!(self, AccessType::Mount(_))
  }
}

impl From<proto::volume_capability::AccessType> for AccessType {
  fn from(value: proto::volume_capability::AccessType) -> Self {
    match value {
      proto::volume_capability::AccessType::Block(_) => AccessType::Block,
      proto::volume_capability::AccessType::Mount(v) => AccessType::Mount(v.into()),
    }
  }
}

impl From<AccessType> for proto::volume_capability::AccessType {
  fn from(value: AccessType) -> Self {
    match value {
      AccessType::Block => {
        proto::volume_capability::AccessType::Block(proto::volume_capability::BlockVolume {})
      }
      AccessType::Mount(v) => proto::volume_capability::AccessType::Mount(v.into()),
    }
  }
}

#[derive(Default)]
pub struct MountVolume {
  fs_type: Option<String>,
  mount_flags: Vec<String>,
}

impl MountVolume {
  /// The filesystem type.
  #[inline]
  pub fn fs_type(&self) -> Option<&str> {
    self.fs_type.as_deref()
  }

  /// The mount options that can be used for the volume. This field is
  /// OPTIONAL. `mount_flags` MAY contain sensitive information.
  /// Therefore, the CO and the Plugin MUST NOT leak this information
  /// to untrusted entities. The total size of this repeated field
  /// SHALL NOT exceed 4 KiB.
  pub fn mount_flags(&self) -> impl Iterator<Item = &str> + ExactSizeIterator {
    self.mount_flags.iter().map(|v| &**v)
  }
}

impl From<proto::volume_capability::MountVolume> for MountVolume {
  fn from(value: proto::volume_capability::MountVolume) -> Self {
    let fs_type = match value.fs_type {
      v if v.is_empty() => None,
      v => Some(v),
    };

    MountVolume {
      fs_type,
      mount_flags: value.mount_flags,
    }
  }
}

impl From<MountVolume> for proto::volume_capability::MountVolume {
  fn from(value: MountVolume) -> Self {
    proto::volume_capability::MountVolume {
      fs_type: value.fs_type.unwrap_or_default(),
      mount_flags: value.mount_flags,
    }
  }
}

impl fmt::Debug for MountVolume {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MountVolume")
      .field("fs_type", &self.fs_type)
      .field(
        "mount_flags",
        &format!("REDACTED ({} items)", self.mount_flags.len()),
      )
      .finish()
  }
}

impl TryFrom<proto::VolumeCapability> for VolumeCapability {
  type Error = tonic::Status;

  fn try_from(value: proto::VolumeCapability) -> Result<Self, Self::Error> {
    let access_mode = value
      .access_mode
      .ok_or_else(|| tonic::Status::invalid_argument("Missing access_mode for VolumeCapability"))?
      .into();

    let access_type = value
      .access_type
      .ok_or_else(|| tonic::Status::invalid_argument("Missing access_type for VolumeCapability"))?
      .into();

    Ok(VolumeCapability {
      access_mode,
      access_type,
    })
  }
}

impl From<VolumeCapability> for proto::VolumeCapability {
  fn from(value: VolumeCapability) -> Self {
    proto::VolumeCapability {
      access_mode: Some(value.access_mode.into()),
      access_type: Some(value.access_type.into()),
    }
  }
}

#[derive(Debug)]
pub struct VolumeCondition {
  /// Normal volumes are available for use and operating optimally.
  /// An abnormal volume does not meet these criteria.
  abnormal: bool,
  /// The message describing the condition of the volume.
  /// This field is REQUIRED.
  message: String,
}

impl VolumeCondition {
  pub fn new(abnormal: bool, message: impl Into<String>) -> Self {
    VolumeCondition {
      abnormal,
      message: message.into(),
    }
  }
}

impl From<VolumeCondition> for proto::VolumeCondition {
  fn from(value: VolumeCondition) -> Self {
    proto::VolumeCondition {
      abnormal: value.abnormal,
      message: value.message,
    }
  }
}

#[derive(Debug, Default)]
pub struct VolumeStatus {
  /// A list of all `node_id` of nodes that the volume in this entry
  /// is controller published on. Only meaningful with the
  /// LIST_VOLUMES_PUBLISHED_NODES controller capability.
  published_node_ids: Vec<String>,

  /// Information about the current condition of the volume.
  /// Required with the VOLUME_CONDITION controller capability.
  volume_condition: Option<VolumeCondition>,
}

impl VolumeStatus {
  pub fn with_condition(mut self, condition: VolumeCondition) -> Self {
    self.volume_condition = Some(condition);
    self
  }
}

impl From<VolumeStatus> for proto::list_volumes_response::VolumeStatus {
  fn from(value: VolumeStatus) -> Self {
    proto::list_volumes_response::VolumeStatus {
      published_node_ids: value.published_node_ids,
      volume_condition: value.volume_condition.map(Into::into),
    }
  }
}

impl From<VolumeStatus> for proto::controller_get_volume_response::VolumeStatus {
  fn from(value: VolumeStatus) -> Self {
    proto::controller_get_volume_response::VolumeStatus {
      published_node_ids: value.published_node_ids,
      volume_condition: value.volume_condition.map(Into::into),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::convert::TryInto;
  use test_case::test_case;

  #[test_case(Mode::SingleNodeWriter => AccessMode::SingleNodeWriter)]
  #[test_case(Mode::MultiNodeMultiWriter => AccessMode::MultiNodeMultiWriter)]
  #[test_case(Mode::Unknown => AccessMode::Unknown)]
  fn access_mode_from_proto(mode: Mode) -> AccessMode {
    proto::volume_capability::AccessMode { mode: mode as i32 }.into()
  }

  #[test]
  fn out_of_range_mode_is_unknown() {
    let mode = proto::volume_capability::AccessMode { mode: 42 };
    assert_eq!(AccessMode::from(mode), AccessMode::Unknown);
  }

  #[test]
  fn capability_requires_access_type() {
    let cap = proto::VolumeCapability {
      access_mode: Some(AccessMode::SingleNodeWriter.into()),
      access_type: None,
    };

    let err = VolumeCapability::try_from(cap).unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);
  }

  #[test]
  fn zero_capacity_is_unset() {
    assert_eq!(Volume::new("remote", 0).capacity_bytes(), None);

    let volume: proto::Volume = Volume::new("remote", 100).try_into().unwrap();
    assert_eq!(volume.capacity_bytes, 100);
    assert_eq!(volume.volume_id, "remote");
  }

  #[test]
  fn mount_flags_are_redacted() {
    let volume = MountVolume::from(proto::volume_capability::MountVolume {
      fs_type: String::new(),
      mount_flags: vec!["password=hunter2".to_owned()],
    });

    let printed = format!("{:?}", volume);
    assert!(!printed.contains("hunter2"));
    assert_eq!(volume.mount_flags().len(), 1);
    assert_eq!(volume.fs_type(), None);
  }
}
