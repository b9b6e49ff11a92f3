mod capabilities;
mod get_info;
mod publish_volume;
mod unpublish_volume;

use crate::{
  proto,
  utils::{record_error, record_request, Record},
  IdentityService,
};
use async_trait::async_trait;
use std::{convert::TryInto, sync::Arc};
use tracing::{debug, instrument};

pub use crate::volume::*;
pub use capabilities::*;
pub use get_info::*;
pub use publish_volume::*;
pub use unpublish_volume::*;

#[async_trait]
pub trait NodeService: IdentityService {
  /// Identifier of the node this plugin instance serves.
  fn node_id(&self) -> &str;

  /// Get the set of services provided by this node. Plugins without
  /// `STAGE_UNSTAGE_VOLUME` have stage and unstage answered as no-ops.
  #[inline]
  fn node_capabilities(&self) -> NodeCapabilities {
    NodeCapabilities::empty()
  }

  /// Make the volume available at the request's target path. This
  /// operation MUST be idempotent.
  async fn node_publish_volume(
    &self,
    request: NodePublishVolumeRequest,
  ) -> Result<(), NodePublishVolumeError>;

  /// Undo the work of `node_publish_volume`. If the volume is not
  /// published at the target path this MUST succeed.
  async fn node_unpublish_volume(
    &self,
    request: NodeUnpublishVolumeRequest,
  ) -> Result<(), NodeUnpublishVolumeError>;
}

pub(crate) struct Node<T: NodeService>(pub(crate) Arc<T>);

#[async_trait]
impl<T: NodeService> proto::node_server::Node for Node<T> {
  #[instrument(name = "node.node_stage_volume", skip(self, request))]
  async fn node_stage_volume(
    &self,
    request: tonic::Request<proto::NodeStageVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeStageVolumeResponse>, tonic::Status> {
    debug!(volume_id = %request.get_ref().volume_id, "stage is a no-op");
    Ok(tonic::Response::new(proto::NodeStageVolumeResponse {}))
  }

  #[instrument(name = "node.node_unstage_volume", skip(self, request))]
  async fn node_unstage_volume(
    &self,
    request: tonic::Request<proto::NodeUnstageVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeUnstageVolumeResponse>, tonic::Status> {
    debug!(volume_id = %request.get_ref().volume_id, "unstage is a no-op");
    Ok(tonic::Response::new(proto::NodeUnstageVolumeResponse {}))
  }

  #[instrument(
    name = "node.node_publish_volume",
    skip(self, request),
    fields(request)
  )]
  async fn node_publish_volume(
    &self,
    request: tonic::Request<proto::NodePublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodePublishVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    record_error(self.0.node_publish_volume(request).await)?;
    Ok(tonic::Response::new(proto::NodePublishVolumeResponse {}))
  }

  #[instrument(
    name = "node.node_unpublish_volume",
    skip(self, request),
    fields(request)
  )]
  async fn node_unpublish_volume(
    &self,
    request: tonic::Request<proto::NodeUnpublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeUnpublishVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    record_error(self.0.node_unpublish_volume(request).await)?;
    Ok(tonic::Response::new(proto::NodeUnpublishVolumeResponse {}))
  }

  #[instrument(name = "node.node_get_volume_stats", skip(self, _request))]
  async fn node_get_volume_stats(
    &self,
    _request: tonic::Request<proto::NodeGetVolumeStatsRequest>,
  ) -> Result<tonic::Response<proto::NodeGetVolumeStatsResponse>, tonic::Status> {
    unsupported!("NodeGetVolumeStats")
  }

  #[instrument(name = "node.node_expand_volume", skip(self, _request))]
  async fn node_expand_volume(
    &self,
    _request: tonic::Request<proto::NodeExpandVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeExpandVolumeResponse>, tonic::Status> {
    unsupported!("NodeExpandVolume")
  }

  #[instrument(name = "node.node_get_capabilities", skip(self), fields(response))]
  async fn node_get_capabilities(
    &self,
    _: tonic::Request<proto::NodeGetCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::NodeGetCapabilitiesResponse>, tonic::Status> {
    let response = self.0.node_capabilities().record_response().try_into()?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "node.node_get_info", skip(self), fields(response))]
  async fn node_get_info(
    &self,
    _: tonic::Request<proto::NodeGetInfoRequest>,
  ) -> Result<tonic::Response<proto::NodeGetInfoResponse>, tonic::Status> {
    let response = NodeGetInfoResponse::new(self.0.node_id())
      .record_response()
      .try_into()?;
    Ok(tonic::Response::new(response))
  }
}
