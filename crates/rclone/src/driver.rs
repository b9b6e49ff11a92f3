use crate::{
  client::Rclone,
  context::VolumeContext,
  daemon::RcDaemon,
  error::Result,
  info::{self, Validation, VolumeInfoTranslator},
  publish::{PublishOrchestrator, PublishRequest},
  rc::{HttpRemoteControl, RemoteControl},
  tasks::MountTasks,
  unpublish::UnpublishCoordinator,
};
use async_trait::async_trait;
use csi_mount_utils::{DefaultMounter, Mounter};
use csi_proto::{
  controller::{
    ControllerCapabilities, ControllerGetVolumeError, ControllerGetVolumeRequest,
    ControllerGetVolumeResponse, Confirmed, ListVolumesError, ListVolumesRequest,
    ListVolumesResponse, ValidateVolumeCapabilitiesError, ValidateVolumeCapabilitiesRequest,
    ValidateVolumeCapabilitiesResponse, VolumeListEntry, VolumeStatus,
  },
  node::{
    NodePublishVolumeError, NodePublishVolumeRequest, NodeUnpublishVolumeError,
    NodeUnpublishVolumeRequest,
  },
  ControllerService, IdentityService, NodeService,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub const PLUGIN_NAME: &str = "csi-rclone";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Grace period for pending mounts and for `core/quit` on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Driver<R = HttpRemoteControl, M = DefaultMounter> {
  node_id: String,
  client: Arc<Rclone<R, M>>,
  tasks: MountTasks,
  publisher: PublishOrchestrator<R, M>,
  unpublisher: UnpublishCoordinator<R, M>,
  volumes: VolumeInfoTranslator<R, M>,
  daemon: Option<RcDaemon>,
}

impl<R: RemoteControl, M: Mounter> Driver<R, M> {
  pub fn new(node_id: impl Into<String>, client: Rclone<R, M>) -> Self {
    let client = Arc::new(client);
    let tasks = MountTasks::new();

    Driver {
      node_id: node_id.into(),
      publisher: PublishOrchestrator::new(client.clone(), tasks.clone()),
      unpublisher: UnpublishCoordinator::new(client.clone(), tasks.clone()),
      volumes: VolumeInfoTranslator::new(client.clone()),
      client,
      tasks,
      daemon: None,
    }
  }

  /// Ties readiness and shutdown to a running `rclone rcd`.
  pub fn with_daemon(mut self, daemon: RcDaemon) -> Self {
    self.daemon = Some(daemon);
    self
  }

  #[inline]
  pub fn client(&self) -> &Rclone<R, M> {
    &self.client
  }

  #[inline]
  pub fn tasks(&self) -> &MountTasks {
    &self.tasks
  }

  pub async fn publish(&self, request: PublishRequest) -> Result<()> {
    self.publisher.publish(request).await
  }

  pub async fn unpublish(&self, target: &std::path::Path) -> Result<()> {
    self.unpublisher.unpublish(target).await
  }

  /// Lets pending mounts settle, then stops the daemon.
  pub async fn shutdown(&self, grace: Duration) -> Result<()> {
    let left = self.tasks.drain(grace).await;
    if left > 0 {
      warn!(count = left, "stopping with mounts still pending");
    }

    match &self.daemon {
      Some(daemon) => daemon.stop(&self.client, grace).await,
      None => Ok(()),
    }
  }
}

impl<R: RemoteControl, M: Mounter> IdentityService for Driver<R, M> {
  fn name(&self) -> &str {
    PLUGIN_NAME
  }

  fn version(&self) -> &str {
    PLUGIN_VERSION
  }

  fn ready(&self) -> bool {
    self.daemon.as_ref().map_or(true, RcDaemon::is_running)
  }
}

#[async_trait]
impl<R: RemoteControl, M: Mounter> ControllerService for Driver<R, M> {
  fn capabilities(&self) -> ControllerCapabilities {
    ControllerCapabilities::LIST_VOLUMES | ControllerCapabilities::GET_VOLUME
  }

  async fn validate_volume_capabilities(
    &self,
    request: ValidateVolumeCapabilitiesRequest,
  ) -> std::result::Result<ValidateVolumeCapabilitiesResponse, ValidateVolumeCapabilitiesError> {
    let response =
      match info::validate_capabilities(request.volume_id(), request.volume_capabilities()) {
        Validation::Confirmed(caps) => ValidateVolumeCapabilitiesResponse::Confirmed(Confirmed::new(caps)),
        Validation::Rejected(message) => ValidateVolumeCapabilitiesResponse::Message(message),
      };

    Ok(response)
  }

  async fn list_volumes(
    &self,
    _request: ListVolumesRequest,
  ) -> std::result::Result<ListVolumesResponse, ListVolumesError> {
    let volumes = self
      .volumes
      .list_volumes()
      .await
      .map_err(tonic::Status::from)?;

    Ok(ListVolumesResponse::new(
      volumes.into_iter().map(VolumeListEntry::new).collect(),
    ))
  }

  async fn controller_get_volume(
    &self,
    request: ControllerGetVolumeRequest,
  ) -> std::result::Result<ControllerGetVolumeResponse, ControllerGetVolumeError> {
    let volume = self
      .volumes
      .get_volume(request.volume_id())
      .await
      .map_err(tonic::Status::from)?;

    Ok(ControllerGetVolumeResponse::new(volume, VolumeStatus::default()))
  }
}

#[async_trait]
impl<R: RemoteControl, M: Mounter> NodeService for Driver<R, M> {
  fn node_id(&self) -> &str {
    &self.node_id
  }

  async fn node_publish_volume(
    &self,
    request: NodePublishVolumeRequest,
  ) -> std::result::Result<(), NodePublishVolumeError> {
    let request = PublishRequest {
      volume_id: request.volume_id().to_owned(),
      target: request.target_path().to_owned(),
      read_only: request.readonly(),
      context: VolumeContext::parse(request.volume_context()),
    };

    self.publish(request).await.map_err(tonic::Status::from)?;
    info!("volume published");
    Ok(())
  }

  async fn node_unpublish_volume(
    &self,
    request: NodeUnpublishVolumeRequest,
  ) -> std::result::Result<(), NodeUnpublishVolumeError> {
    self
      .unpublish(request.target_path())
      .await
      .map_err(tonic::Status::from)?;
    info!("volume unpublished");
    Ok(())
  }
}
