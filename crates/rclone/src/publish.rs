use crate::{
  client::Rclone,
  context::{MountSession, VolumeContext},
  directory::VolumeDirectoryManager,
  error::{Error, Result},
  rc::RemoteControl,
  tasks::MountTasks,
};
use csi_mount_utils::Mounter;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, instrument};

#[derive(Debug)]
pub struct PublishRequest {
  pub volume_id: String,
  pub target: PathBuf,
  pub read_only: bool,
  pub context: VolumeContext,
}

pub struct PublishOrchestrator<R, M> {
  client: Arc<Rclone<R, M>>,
  dirs: VolumeDirectoryManager,
  tasks: MountTasks,
}

impl<R: RemoteControl, M: Mounter> PublishOrchestrator<R, M> {
  pub fn new(client: Arc<Rclone<R, M>>, tasks: MountTasks) -> Self {
    PublishOrchestrator {
      client,
      dirs: VolumeDirectoryManager,
      tasks,
    }
  }

  /// Configures the remote and mounts it on the target. Returns once the
  /// mount finished or the context's `wait` elapsed, whichever is first.
  /// In the latter case the mount keeps running in the background and
  /// its outcome is only logged.
  #[instrument(skip(self, request), fields(volume_id = %request.volume_id, target = %request.target.display()))]
  pub async fn publish(&self, request: PublishRequest) -> Result<()> {
    let PublishRequest {
      volume_id,
      target,
      read_only,
      context,
    } = request;

    self.dirs.ensure(&target).await?;

    let config = context.remote_config(&volume_id)?;
    self.client.remote_create(&config).await?;

    let mut session = MountSession::new(volume_id, context.path(), target.clone());
    session.vfs_options = context.vfs_options()?;
    session.mount_options = context.mount_options()?;
    if read_only {
      session.force_read_only();
    }

    let client = self.client.clone();
    let mount = self
      .tasks
      .spawn(target.clone(), async move { client.remote_mount(&session).await });

    let wait = context.wait();
    match tokio::time::timeout(wait, mount).await {
      Ok(result) => result.map_err(|source| Error::Mount { target, source }),
      Err(_) => {
        info!(?wait, "mount still running, acknowledging publish");
        Ok(())
      }
    }
  }
}
