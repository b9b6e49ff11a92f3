use crate::{client::Rclone, error::Result, rc::RemoteControl};
use csi_mount_utils::Mounter;
use csi_proto::volume::{AccessMode, Volume, VolumeCapability};
use std::{fmt::Write, sync::Arc};
use tracing::debug;

/// Access modes a remote can be mounted with. Multi-writer is refused,
/// rclone has no cross-node locking.
pub const SUPPORTED_MODES: [AccessMode; 4] = [
  AccessMode::SingleNodeReaderOnly,
  AccessMode::SingleNodeWriter,
  AccessMode::MultiNodeReaderOnly,
  AccessMode::MultiNodeSingleWriter,
];

#[derive(Debug)]
pub enum Validation {
  Confirmed(Vec<VolumeCapability>),
  Rejected(String),
}

pub struct VolumeInfoTranslator<R, M> {
  client: Arc<Rclone<R, M>>,
}

impl<R: RemoteControl, M: Mounter> VolumeInfoTranslator<R, M> {
  pub fn new(client: Arc<Rclone<R, M>>) -> Self {
    VolumeInfoTranslator { client }
  }

  /// Every configured remote with its total size. One failing remote
  /// fails the whole listing.
  pub async fn list_volumes(&self) -> Result<Vec<Volume>> {
    let remotes = self.client.remote_list().await?;
    let mut volumes = Vec::with_capacity(remotes.len());

    for remote in remotes {
      let about = self.client.remote_about(&remote, "").await?;
      volumes.push(Volume::new(remote, about.total.unwrap_or_default()));
    }

    debug!(count = volumes.len(), "listed volumes");
    Ok(volumes)
  }

  pub async fn get_volume(&self, volume_id: &str) -> Result<Volume> {
    let about = self.client.remote_about(volume_id, "").await?;
    Ok(Volume::new(volume_id, about.total.unwrap_or_default()))
  }
}

/// Checks every requested capability. Each unsupported one adds a line to
/// the rejection message.
pub fn validate_capabilities(volume_id: &str, capabilities: &[VolumeCapability]) -> Validation {
  let mut message = String::new();

  for capability in capabilities {
    if !capability.access_type().is_mount() {
      let _ = writeln!(message, "[{}]: volume must be mount", volume_id);
      continue;
    }

    let mode = capability.access_mode();
    if !SUPPORTED_MODES.contains(&mode) {
      let _ = writeln!(message, "[{}]: unsupported AccessMode {}", volume_id, mode);
    }
  }

  if message.is_empty() {
    Validation::Confirmed(
      SUPPORTED_MODES
        .iter()
        .map(|mode| VolumeCapability::mount(*mode))
        .collect(),
    )
  } else {
    Validation::Rejected(message)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use csi_proto::volume::AccessType;

  fn modes(validation: &Validation) -> Vec<AccessMode> {
    match validation {
      Validation::Confirmed(caps) => caps.iter().map(|c| c.access_mode()).collect(),
      Validation::Rejected(message) => panic!("rejected: {}", message),
    }
  }

  #[test]
  fn supported_modes_confirm_all_four() {
    let requested: Vec<_> = SUPPORTED_MODES
      .iter()
      .map(|m| VolumeCapability::mount(*m))
      .collect();

    let validation = validate_capabilities("vol", &requested);
    assert_eq!(modes(&validation), SUPPORTED_MODES.to_vec());
  }

  #[test]
  fn single_supported_mode_still_confirms_all_four() {
    let validation = validate_capabilities("vol", &[VolumeCapability::mount(AccessMode::SingleNodeWriter)]);
    assert_eq!(modes(&validation).len(), 4);
  }

  #[test]
  fn multi_writer_is_rejected() {
    let validation = validate_capabilities(
      "vol",
      &[
        VolumeCapability::mount(AccessMode::SingleNodeWriter),
        VolumeCapability::mount(AccessMode::MultiNodeMultiWriter),
      ],
    );

    match validation {
      Validation::Rejected(message) => {
        assert_eq!(message, "[vol]: unsupported AccessMode MULTI_NODE_MULTI_WRITER\n")
      }
      other => panic!("unexpected: {:?}", other),
    }
  }

  #[test]
  fn block_access_is_rejected_once_per_capability() {
    let block = || VolumeCapability::new(AccessMode::MultiNodeMultiWriter, AccessType::Block);
    let validation = validate_capabilities("vol", &[block(), block()]);

    match validation {
      Validation::Rejected(message) => assert_eq!(
        message,
        "[vol]: volume must be mount\n[vol]: volume must be mount\n"
      ),
      other => panic!("unexpected: {:?}", other),
    }
  }
}
