mod common;

use common::driver;
use csi_mount_utils::MountError;
use std::io;

#[tokio::test]
async fn missing_target_is_already_unpublished() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("mount");
  std::fs::create_dir(&target).unwrap();

  driver.unpublish(&target).await.unwrap();
  std::fs::remove_dir(&target).unwrap();
  plane.reset();

  driver.unpublish(&target).await.unwrap();
  assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn target_below_a_file_is_already_unpublished() {
  let (driver, plane, _) = driver();
  let file = tempfile::NamedTempFile::new().unwrap();
  let target = file.path().join("mount");

  driver.unpublish(&target).await.unwrap();
  driver.client().remote_umount(Some(&target)).await.unwrap();
  assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn unmounted_target_needs_no_call() {
  let (driver, plane, _) = driver();
  let dir = tempfile::tempdir().unwrap();

  driver.unpublish(dir.path()).await.unwrap();
  driver.unpublish(dir.path()).await.unwrap();
  assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn mounted_target_is_unmounted_once() {
  let (driver, plane, mounter) = driver();
  let dir = tempfile::tempdir().unwrap();
  mounter.mount("rclone", dir.path(), "fuse.rclone");

  driver.unpublish(dir.path()).await.unwrap();
  driver.unpublish(dir.path()).await.unwrap();

  assert_eq!(plane.methods(), vec!["mount/unmount"]);
  assert_eq!(
    plane.params("mount/unmount")[0]["mountPoint"],
    dir.path().to_str().unwrap()
  );
}

#[tokio::test]
async fn corrupted_mount_is_still_unmounted() {
  let (driver, plane, mounter) = driver();
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().to_owned();
  mounter.fail_checks_for(dir.path(), move || {
    MountError::Corrupted(
      path.clone(),
      io::Error::new(io::ErrorKind::Other, "transport endpoint is not connected"),
    )
  });

  driver.unpublish(dir.path()).await.unwrap();
  assert_eq!(plane.methods(), vec!["mount/unmount"]);
}

#[tokio::test]
async fn unmount_failure_is_surfaced() {
  let (driver, plane, mounter) = driver();
  let dir = tempfile::tempdir().unwrap();
  mounter.mount("rclone", dir.path(), "fuse.rclone");
  plane.fail("mount/unmount", 500, r#"{"error":"device busy"}"#);

  let err = driver.unpublish(dir.path()).await.unwrap_err();
  assert!(err.to_string().contains("device busy"));
}

#[tokio::test]
async fn unmount_all_always_calls() {
  let (driver, plane, _) = driver();

  driver.client().remote_umount(None).await.unwrap();
  assert_eq!(plane.methods(), vec!["mount/unmountall"]);
}
