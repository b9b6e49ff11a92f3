use crate::{
  client::Rclone, directory::VolumeDirectoryManager, error::Result, rc::RemoteControl,
  tasks::MountTasks,
};
use csi_mount_utils::Mounter;
use std::{path::Path, sync::Arc};
use tracing::{debug, instrument};

pub struct UnpublishCoordinator<R, M> {
  client: Arc<Rclone<R, M>>,
  dirs: VolumeDirectoryManager,
  tasks: MountTasks,
}

impl<R: RemoteControl, M: Mounter> UnpublishCoordinator<R, M> {
  pub fn new(client: Arc<Rclone<R, M>>, tasks: MountTasks) -> Self {
    UnpublishCoordinator {
      client,
      dirs: VolumeDirectoryManager,
      tasks,
    }
  }

  /// Tears down the mount on `target`. Missing or unmounted targets are
  /// already unpublished.
  #[instrument(skip(self), fields(target = %target.display()))]
  pub async fn unpublish(&self, target: &Path) -> Result<()> {
    if let Some(mount) = self.tasks.pending(target) {
      debug!("waiting for pending mount before unmounting");
      // Its failure was already reported, or logged.
      let _ = mount.await;
    }

    if !self.dirs.exists(target).await? {
      debug!("target missing, already unpublished");
      return Ok(());
    }

    self.client.remote_umount(Some(target)).await
  }
}
