mod common;

use common::driver;
use csi_proto::{
  controller::{
    ControllerCapabilities, ControllerGetVolumeRequest, ListVolumesRequest,
    ValidateVolumeCapabilitiesRequest, ValidateVolumeCapabilitiesResponse,
  },
  proto,
  volume::{AccessMode, AccessType, MountVolume, VolumeCapability},
  ControllerService, IdentityService, NodeService,
};
use serde_json::json;
use std::convert::TryFrom;

fn list_request() -> ListVolumesRequest {
  ListVolumesRequest::try_from(proto::ListVolumesRequest::default()).unwrap()
}

fn validate_request(caps: Vec<VolumeCapability>) -> ValidateVolumeCapabilitiesRequest {
  ValidateVolumeCapabilitiesRequest::try_from(proto::ValidateVolumeCapabilitiesRequest {
    volume_id: "vol".to_owned(),
    volume_capabilities: caps.into_iter().map(Into::into).collect(),
    ..Default::default()
  })
  .unwrap()
}

#[tokio::test]
async fn lists_remotes_in_order_with_capacity() {
  let (driver, plane, _) = driver();
  plane.on("config/listremotes", |_| Ok(json!({ "remotes": ["a", "b"] })));
  plane.about(&[("a", 100), ("b", 200)]);

  let response = driver.list_volumes(list_request()).await.unwrap();
  let response = proto::ListVolumesResponse::try_from(response).unwrap();

  let entries: Vec<_> = response
    .entries
    .into_iter()
    .filter_map(|e| e.volume)
    .map(|v| (v.volume_id, v.capacity_bytes))
    .collect();
  assert_eq!(entries, vec![("a".to_owned(), 100), ("b".to_owned(), 200)]);

  let fs: Vec<_> = plane
    .params("operations/about")
    .into_iter()
    .map(|p| p["fs"].clone())
    .collect();
  assert_eq!(fs, vec![json!("a:"), json!("b:")]);
}

#[tokio::test]
async fn one_failing_remote_fails_the_listing() {
  let (driver, plane, _) = driver();
  plane.on("config/listremotes", |_| Ok(json!({ "remotes": ["a", "gone", "b"] })));
  plane.about(&[("a", 100), ("b", 200)]);

  let err = driver.list_volumes(list_request()).await.unwrap_err();
  assert_eq!(tonic::Status::from(err).code(), tonic::Code::Internal);
  assert_eq!(
    plane.methods(),
    vec!["config/listremotes", "operations/about", "operations/about"]
  );
}

#[tokio::test]
async fn empty_listing() {
  let (driver, _, _) = driver();

  let response = driver.list_volumes(list_request()).await.unwrap();
  assert!(response.entries().is_empty());
}

#[tokio::test]
async fn get_volume_reports_capacity_and_empty_status() {
  let (driver, plane, _) = driver();
  plane.about(&[("vol", 4096)]);

  let request = ControllerGetVolumeRequest::try_from(proto::ControllerGetVolumeRequest {
    volume_id: "vol".to_owned(),
  })
  .unwrap();
  let response = driver.controller_get_volume(request).await.unwrap();
  let response = proto::ControllerGetVolumeResponse::try_from(response).unwrap();

  let volume = response.volume.unwrap();
  assert_eq!(volume.volume_id, "vol");
  assert_eq!(volume.capacity_bytes, 4096);

  let status = response.status.unwrap();
  assert!(status.published_node_ids.is_empty());
  assert!(status.volume_condition.is_none());
}

#[tokio::test]
async fn unknown_volume_is_an_error() {
  let (driver, plane, _) = driver();
  plane.about(&[]);

  let request = ControllerGetVolumeRequest::try_from(proto::ControllerGetVolumeRequest {
    volume_id: "missing".to_owned(),
  })
  .unwrap();
  assert!(driver.controller_get_volume(request).await.is_err());
}

#[tokio::test]
async fn validation_confirms_supported_modes() {
  let (driver, plane, _) = driver();
  let request = validate_request(vec![
    VolumeCapability::mount(AccessMode::SingleNodeReaderOnly),
    VolumeCapability::mount(AccessMode::MultiNodeSingleWriter),
  ]);

  match driver.validate_volume_capabilities(request).await.unwrap() {
    ValidateVolumeCapabilitiesResponse::Confirmed(confirmed) => {
      let modes: Vec<_> = confirmed
        .volume_capabilities()
        .iter()
        .map(|c| c.access_mode())
        .collect();
      assert_eq!(
        modes,
        vec![
          AccessMode::SingleNodeReaderOnly,
          AccessMode::SingleNodeWriter,
          AccessMode::MultiNodeReaderOnly,
          AccessMode::MultiNodeSingleWriter,
        ]
      );
      assert!(confirmed
        .volume_capabilities()
        .iter()
        .all(|c| c.access_type().is_mount()));
    }
    other => panic!("unexpected: {:?}", other),
  }

  assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn validation_rejects_multi_writer_and_block() {
  let (driver, _, _) = driver();
  let request = validate_request(vec![
    VolumeCapability::new(
      AccessMode::MultiNodeMultiWriter,
      AccessType::Mount(MountVolume::default()),
    ),
    VolumeCapability::new(AccessMode::SingleNodeWriter, AccessType::Block),
  ]);

  let response = driver.validate_volume_capabilities(request).await.unwrap();
  let response = proto::ValidateVolumeCapabilitiesResponse::try_from(response).unwrap();

  assert!(response.confirmed.is_none());
  assert_eq!(
    response.message,
    "[vol]: unsupported AccessMode MULTI_NODE_MULTI_WRITER\n[vol]: volume must be mount\n"
  );
}

#[test]
fn identity_and_capabilities() {
  let (driver, _, _) = driver();

  assert_eq!(driver.name(), "csi-rclone");
  assert_eq!(driver.version(), env!("CARGO_PKG_VERSION"));
  assert_eq!(driver.node_id(), "node-1");
  assert!(driver.ready());
  assert_eq!(
    ControllerService::capabilities(&driver),
    ControllerCapabilities::LIST_VOLUMES | ControllerCapabilities::GET_VOLUME
  );
  assert!(driver.node_capabilities().is_empty());
}
