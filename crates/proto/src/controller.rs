mod capabilities;
mod get_volume;
mod list_volumes;
mod validate_volume_capabilities;

use crate::{
  plugin, proto,
  utils::{record_error, record_request, Record},
  IdentityService,
};
use async_trait::async_trait;
use std::{convert::TryInto, sync::Arc};
use tracing::instrument;

pub use crate::volume::*;
pub use capabilities::*;
pub use get_volume::*;
pub use list_volumes::*;
pub use validate_volume_capabilities::*;

#[async_trait]
pub trait ControllerService: IdentityService {
  /// Get the set of services provided by this controller.
  #[inline]
  fn capabilities(&self) -> ControllerCapabilities {
    ControllerCapabilities::empty()
  }

  /// A Controller Plugin MUST implement this RPC call. This RPC will be called by the
  /// CO to check if a pre-provisioned volume has all the capabilities that the CO wants.
  /// This RPC call SHALL return confirmed only if all the volume capabilities specified
  /// in the request are supported. This operation MUST be idempotent.
  async fn validate_volume_capabilities(
    &self,
    request: ValidateVolumeCapabilitiesRequest,
  ) -> Result<ValidateVolumeCapabilitiesResponse, ValidateVolumeCapabilitiesError>;

  /// A Controller Plugin MUST implement this RPC call if it has LIST_VOLUMES capability.
  /// The Plugin SHALL return the information about all the volumes that it knows about.
  #[allow(unused_variables)]
  async fn list_volumes(
    &self,
    request: ListVolumesRequest,
  ) -> Result<ListVolumesResponse, ListVolumesError> {
    unsupported!("ListVolumes")
  }

  /// A Controller Plugin MUST implement this RPC call if it has GET_VOLUME capability.
  /// It returns the current information about a single volume.
  #[allow(unused_variables)]
  async fn controller_get_volume(
    &self,
    request: ControllerGetVolumeRequest,
  ) -> Result<ControllerGetVolumeResponse, ControllerGetVolumeError> {
    unsupported!("ControllerGetVolume")
  }
}

pub(crate) struct Controller<T: ControllerService>(pub(crate) Arc<T>);

#[async_trait]
impl<T: ControllerService> proto::identity_server::Identity for Controller<T> {
  #[instrument(
    name = "identity.get_plugin_info",
    skip(self, _request),
    fields(name, vendor_version, manifest)
  )]
  async fn get_plugin_info(
    &self,
    _request: tonic::Request<proto::GetPluginInfoRequest>,
  ) -> Result<tonic::Response<proto::GetPluginInfoResponse>, tonic::Status> {
    let response = proto::GetPluginInfoResponse {
      name: self.0.name().record_field("name").into(),
      vendor_version: self.0.version().record_field("vendor_version").into(),
      manifest: self.0.manifest().record_field("manifest").clone(),
    };

    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "identity.get_plugin_capabilities",
    skip(self, _request),
    fields(response)
  )]
  async fn get_plugin_capabilities(
    &self,
    _request: tonic::Request<proto::GetPluginCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::GetPluginCapabilitiesResponse>, tonic::Status> {
    let mut response = plugin::get_capabilities(&*self.0);
    response.capabilities.push(plugin::service(
      proto::plugin_capability::service::Type::ControllerService,
    ));

    Ok(tonic::Response::new(response.record_response()))
  }

  #[instrument(name = "identity.probe", skip(self, _request), fields(ready))]
  async fn probe(
    &self,
    _request: tonic::Request<proto::ProbeRequest>,
  ) -> Result<tonic::Response<proto::ProbeResponse>, tonic::Status> {
    let response = proto::ProbeResponse {
      ready: Some(self.0.ready().record_field("ready")),
    };

    Ok(tonic::Response::new(response))
  }
}

#[async_trait]
impl<T: ControllerService> proto::controller_server::Controller for Controller<T> {
  #[instrument(name = "controller.create_volume", skip(self, _request))]
  async fn create_volume(
    &self,
    _request: tonic::Request<proto::CreateVolumeRequest>,
  ) -> Result<tonic::Response<proto::CreateVolumeResponse>, tonic::Status> {
    unsupported!("CreateVolume")
  }

  #[instrument(name = "controller.delete_volume", skip(self, _request))]
  async fn delete_volume(
    &self,
    _request: tonic::Request<proto::DeleteVolumeRequest>,
  ) -> Result<tonic::Response<proto::DeleteVolumeResponse>, tonic::Status> {
    unsupported!("DeleteVolume")
  }

  #[instrument(name = "controller.controller_publish_volume", skip(self, _request))]
  async fn controller_publish_volume(
    &self,
    _request: tonic::Request<proto::ControllerPublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerPublishVolumeResponse>, tonic::Status> {
    unsupported!("ControllerPublishVolume")
  }

  #[instrument(name = "controller.controller_unpublish_volume", skip(self, _request))]
  async fn controller_unpublish_volume(
    &self,
    _request: tonic::Request<proto::ControllerUnpublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerUnpublishVolumeResponse>, tonic::Status> {
    unsupported!("ControllerUnpublishVolume")
  }

  #[instrument(
    name = "controller.validate_volume_capabilities",
    skip(self, request),
    fields(request, response)
  )]
  async fn validate_volume_capabilities(
    &self,
    request: tonic::Request<proto::ValidateVolumeCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::ValidateVolumeCapabilitiesResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    let response = record_error(self.0.validate_volume_capabilities(request).await)?
      .record_response()
      .try_into()?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.list_volumes",
    skip(self, request),
    fields(request, response)
  )]
  async fn list_volumes(
    &self,
    request: tonic::Request<proto::ListVolumesRequest>,
  ) -> Result<tonic::Response<proto::ListVolumesResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    let response = record_error(self.0.list_volumes(request).await)?
      .record_response()
      .try_into()?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "controller.get_capacity", skip(self, _request))]
  async fn get_capacity(
    &self,
    _request: tonic::Request<proto::GetCapacityRequest>,
  ) -> Result<tonic::Response<proto::GetCapacityResponse>, tonic::Status> {
    unsupported!("GetCapacity")
  }

  #[instrument(
    name = "controller.controller_get_capabilities",
    skip(self),
    fields(response)
  )]
  async fn controller_get_capabilities(
    &self,
    _: tonic::Request<proto::ControllerGetCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::ControllerGetCapabilitiesResponse>, tonic::Status> {
    let response = self.0.capabilities().record_response().try_into()?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "controller.create_snapshot", skip(self, _request))]
  async fn create_snapshot(
    &self,
    _request: tonic::Request<proto::CreateSnapshotRequest>,
  ) -> Result<tonic::Response<proto::CreateSnapshotResponse>, tonic::Status> {
    unsupported!("CreateSnapshot")
  }

  #[instrument(name = "controller.delete_snapshot", skip(self, _request))]
  async fn delete_snapshot(
    &self,
    _request: tonic::Request<proto::DeleteSnapshotRequest>,
  ) -> Result<tonic::Response<proto::DeleteSnapshotResponse>, tonic::Status> {
    unsupported!("DeleteSnapshot")
  }

  #[instrument(name = "controller.list_snapshots", skip(self, _request))]
  async fn list_snapshots(
    &self,
    _request: tonic::Request<proto::ListSnapshotsRequest>,
  ) -> Result<tonic::Response<proto::ListSnapshotsResponse>, tonic::Status> {
    unsupported!("ListSnapshots")
  }

  #[instrument(name = "controller.controller_expand_volume", skip(self, _request))]
  async fn controller_expand_volume(
    &self,
    _request: tonic::Request<proto::ControllerExpandVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerExpandVolumeResponse>, tonic::Status> {
    unsupported!("ControllerExpandVolume")
  }

  #[instrument(
    name = "controller.controller_get_volume",
    skip(self, request),
    fields(request, response)
  )]
  async fn controller_get_volume(
    &self,
    request: tonic::Request<proto::ControllerGetVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerGetVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    let response = record_error(self.0.controller_get_volume(request).await)?
      .record_response()
      .try_into()?;
    Ok(tonic::Response::new(response))
  }
}
