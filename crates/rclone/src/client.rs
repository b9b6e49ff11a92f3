use crate::{
  context::{MountSession, RemoteConfig},
  directory::VolumeDirectoryManager,
  error::{Error, Result},
  rc::RemoteControl,
};
use csi_mount_utils::Mounter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Subset of `operations/about`. Backends that cannot report a field
/// leave it out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct About {
  #[serde(default)]
  pub total: Option<u64>,
  #[serde(default)]
  pub used: Option<u64>,
  #[serde(default)]
  pub free: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteList {
  #[serde(default)]
  remotes: Vec<String>,
}

/// Typed operations on the rclone control plane.
pub struct Rclone<R, M> {
  rc: R,
  mounter: M,
  dirs: VolumeDirectoryManager,
}

impl<R: RemoteControl, M: Mounter> Rclone<R, M> {
  pub fn new(rc: R, mounter: M) -> Self {
    Rclone {
      rc,
      mounter,
      dirs: VolumeDirectoryManager,
    }
  }

  /// Configured remote names, in the order rclone reports them.
  pub async fn remote_list(&self) -> Result<Vec<String>> {
    let value = self.rc.call("config/listremotes", json!({})).await?;
    let list: RemoteList = serde_json::from_value(value)
      .map_err(Error::serialization("config/listremotes"))?;
    Ok(list.remotes)
  }

  pub async fn remote_about(&self, remote: &str, path: &str) -> Result<About> {
    let fs = format!("{}:{}", remote, path);
    let value = self
      .rc
      .call("operations/about", json!({ "fs": fs }))
      .await?;
    serde_json::from_value(value).map_err(Error::serialization("operations/about"))
  }

  /// Creates or replaces the remote. Never prompts.
  #[instrument(skip(self, config), fields(remote = %config.name, backend = %config.backend_type))]
  pub async fn remote_create(&self, config: &RemoteConfig) -> Result<()> {
    self.rc.call("config/create", config.to_params()).await?;
    debug!("remote configured");
    Ok(())
  }

  /// Unmounts whatever sits on the target, then mounts the session there.
  #[instrument(skip(self, session), fields(fs = %session.fs(), target = %session.target.display()))]
  pub async fn remote_mount(&self, session: &MountSession) -> Result<()> {
    self.remote_umount(Some(&session.target)).await?;
    self.rc.call("mount/mount", session.to_params()).await?;
    info!("mounted");
    Ok(())
  }

  /// Unmounts `target`, or every rclone mount when no target is given.
  /// A target that is missing or not a mountpoint is left alone.
  pub async fn remote_umount(&self, target: Option<&Path>) -> Result<()> {
    let target = match target {
      None => {
        self.rc.call("mount/unmountall", json!({})).await?;
        info!("unmounted all");
        return Ok(());
      }
      Some(target) => target,
    };

    if !self.dirs.exists(target).await? {
      debug!(target = %target.display(), "target missing, nothing to unmount");
      return Ok(());
    }

    match self.mounter.is_mount_point(target).await {
      Ok(true) => (),
      Ok(false) => {
        debug!(target = %target.display(), "not a mountpoint, nothing to unmount");
        return Ok(());
      }
      Err(e) if e.is_not_found() => return Ok(()),
      Err(e) => return Err(e.into()),
    }

    let mount_point = target.to_string_lossy();
    self
      .rc
      .call("mount/unmount", json!({ "mountPoint": mount_point }))
      .await?;
    info!(target = %target.display(), "unmounted");
    Ok(())
  }

  pub async fn core_quit(&self) -> Result<()> {
    self.rc.call("core/quit", json!({})).await?;
    Ok(())
  }
}

impl<R, M> Rclone<R, M> {
  #[inline]
  pub fn rc(&self) -> &R {
    &self.rc
  }

  #[inline]
  pub fn mounter(&self) -> &M {
    &self.mounter
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn about_tolerates_missing_fields() {
    let about: About = serde_json::from_value(json!({ "total": 100, "other": 1 })).unwrap();
    assert_eq!(about.total, Some(100));
    assert_eq!(about.free, None);

    let about: About = serde_json::from_value(json!({})).unwrap();
    assert_eq!(about, About::default());
  }

  #[test]
  fn remote_list_defaults_to_empty() {
    let list: RemoteList = serde_json::from_value(json!({})).unwrap();
    assert!(list.remotes.is_empty());
  }
}
