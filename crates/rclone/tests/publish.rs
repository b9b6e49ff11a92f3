mod common;

use common::{driver, volume_context};
use csi_mount_utils::FakeAction;
use csi_proto::{
  node::{NodePublishVolumeRequest, NodeUnpublishVolumeRequest},
  proto,
  volume::{AccessMode, VolumeCapability},
  NodeService,
};
use serde_json::Value;
use std::{
  convert::TryFrom,
  path::Path,
  time::{Duration, Instant},
};

fn publish_request(
  volume_id: &str,
  target: &Path,
  readonly: bool,
  context: &[(&str, &str)],
) -> NodePublishVolumeRequest {
  NodePublishVolumeRequest::try_from(proto::NodePublishVolumeRequest {
    volume_id: volume_id.to_owned(),
    target_path: target.to_string_lossy().into_owned(),
    volume_capability: Some(VolumeCapability::mount(AccessMode::SingleNodeWriter).into()),
    readonly,
    volume_context: volume_context(context),
    ..Default::default()
  })
  .unwrap()
}

fn unpublish_request(target: &Path) -> NodeUnpublishVolumeRequest {
  NodeUnpublishVolumeRequest::try_from(proto::NodeUnpublishVolumeRequest {
    volume_id: "vol".to_owned(),
    target_path: target.to_string_lossy().into_owned(),
  })
  .unwrap()
}

#[tokio::test]
async fn publish_configures_then_mounts() {
  let (driver, plane, mounter) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");

  let request = publish_request(
    "vol",
    &target,
    false,
    &[
      ("parameters", r#"{"type":"s3","provider":"Minio"}"#),
      ("path", "/bucket"),
      ("mount", r#"{"AllowOther":true}"#),
    ],
  );
  driver.node_publish_volume(request).await.unwrap();

  assert!(target.is_dir());
  assert_eq!(plane.methods(), vec!["config/create", "mount/mount"]);

  let create = &plane.params("config/create")[0];
  assert_eq!(create["name"], "vol");
  assert_eq!(create["type"], "s3");
  assert_eq!(create["parameters"]["provider"], "Minio");
  assert_eq!(create["opt"]["nonInteractive"], true);

  let mount = &plane.params("mount/mount")[0];
  assert_eq!(mount["fs"], "vol:/bucket");
  assert_eq!(mount["mountPoint"], target.to_str().unwrap());
  let mount_opt: Value = serde_json::from_str(mount["mountOpt"].as_str().unwrap()).unwrap();
  assert_eq!(mount_opt["AllowOther"], true);

  assert!(matches!(
    mounter.get_log().as_slice(),
    [FakeAction::Mount { .. }]
  ));
}

#[tokio::test]
async fn failed_create_never_mounts() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");
  plane.fail("config/create", 500, r#"{"error":"unknown backend"}"#);

  let err = driver
    .node_publish_volume(publish_request("vol", &target, false, &[("type", "nope")]))
    .await
    .unwrap_err();

  assert_eq!(tonic::Status::from(err).code(), tonic::Code::Internal);
  assert_eq!(plane.methods(), vec!["config/create"]);
  assert!(plane.params("mount/mount").is_empty());
}

#[tokio::test]
async fn malformed_options_abort_after_create() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");

  let err = driver
    .node_publish_volume(publish_request("vol", &target, false, &[("vfs", "{not json")]))
    .await
    .unwrap_err();

  assert_eq!(tonic::Status::from(err).code(), tonic::Code::InvalidArgument);
  assert_eq!(plane.methods(), vec!["config/create"]);
}

#[tokio::test]
async fn malformed_parameters_abort_before_any_call() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");

  let err = driver
    .node_publish_volume(publish_request("vol", &target, false, &[("parameters", "[]")]))
    .await
    .unwrap_err();

  assert_eq!(tonic::Status::from(err).code(), tonic::Code::InvalidArgument);
  assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn unusable_target_fails_before_any_call() {
  let (driver, plane, _) = driver();
  let file = tempfile::NamedTempFile::new().unwrap();

  // The parent is a directory but the target itself is a regular file.
  let err = driver
    .node_publish_volume(publish_request("vol", file.path(), false, &[]))
    .await
    .unwrap_err();

  assert_eq!(tonic::Status::from(err).code(), tonic::Code::Internal);
  assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn read_only_overrides_vfs_options() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");

  let request = publish_request(
    "vol",
    &target,
    true,
    &[("vfs", r#"{"ReadOnly":false,"CacheMode":"writes"}"#)],
  );
  driver.node_publish_volume(request).await.unwrap();

  let mount = &plane.params("mount/mount")[0];
  let vfs: Value = serde_json::from_str(mount["vfsOpt"].as_str().unwrap()).unwrap();
  assert_eq!(vfs["ReadOnly"], true);
  assert_eq!(vfs["CacheMode"], "writes");
}

#[tokio::test]
async fn stale_mount_is_unmounted_before_mounting() {
  let (driver, plane, mounter) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");
  std::fs::create_dir(&target).unwrap();
  mounter.mount("rclone", &target, "fuse.rclone");

  driver
    .node_publish_volume(publish_request("vol", &target, false, &[]))
    .await
    .unwrap();

  assert_eq!(
    plane.methods(),
    vec!["config/create", "mount/unmount", "mount/mount"]
  );
}

#[tokio::test]
async fn mount_failure_within_wait_is_returned() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");
  plane.fail("mount/mount", 500, r#"{"error":"mount failed"}"#);

  let err = driver
    .node_publish_volume(publish_request("vol", &target, false, &[]))
    .await
    .unwrap_err();

  let status = tonic::Status::from(err);
  assert_eq!(status.code(), tonic::Code::Internal);
  assert!(status.message().contains("mount failed"));
  assert!(driver.tasks().is_empty());
}

#[tokio::test]
async fn slow_mount_is_acknowledged_after_wait() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");
  plane.delay("mount/mount", Duration::from_secs(1));

  let started = Instant::now();
  driver
    .node_publish_volume(publish_request("vol", &target, false, &[("wait", "1ms")]))
    .await
    .unwrap();

  assert!(started.elapsed() < Duration::from_millis(500));
  assert_eq!(plane.finished("mount/mount"), 0);
  assert!(driver.tasks().pending(&target).is_some());

  // The detached mount still completes.
  let pending = driver.tasks().pending(&target).unwrap();
  pending.await.unwrap();
  assert_eq!(plane.finished("mount/mount"), 1);
}

#[tokio::test]
async fn unpublish_waits_for_pending_mount() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");
  plane.delay("mount/mount", Duration::from_millis(200));

  driver
    .node_publish_volume(publish_request("vol", &target, false, &[("wait", "1ms")]))
    .await
    .unwrap();
  driver
    .node_unpublish_volume(unpublish_request(&target))
    .await
    .unwrap();

  assert_eq!(
    plane.methods(),
    vec!["config/create", "mount/mount", "mount/unmount"]
  );
  assert_eq!(plane.finished("mount/mount"), 1);
}

#[tokio::test]
async fn shutdown_drains_pending_mounts() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");
  plane.delay("mount/mount", Duration::from_millis(100));

  driver
    .node_publish_volume(publish_request("vol", &target, false, &[("wait", "1ms")]))
    .await
    .unwrap();
  driver.shutdown(Duration::from_secs(5)).await.unwrap();

  assert_eq!(plane.finished("mount/mount"), 1);
  assert!(driver.tasks().is_empty());
}
