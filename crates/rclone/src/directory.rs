use crate::error::{Error, Result};
use csi_mount_utils::{is_corrupted_mount_error, is_missing_path_error};
use std::{fs::Metadata, io, path::Path};
use tokio::fs;
use tracing::warn;

/// Creates and checks mount target directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeDirectoryManager;

impl VolumeDirectoryManager {
  /// Creates `path` and its parents (mode `0755`) unless it already exists.
  pub async fn ensure(&self, path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);

    builder
      .create(path)
      .await
      .map_err(Error::filesystem(path))
  }

  /// Whether something sits at `path`. A broken mount counts: its stat
  /// fails, yet it still has to be torn down.
  pub async fn exists(&self, path: &Path) -> Result<bool> {
    presence(path, fs::metadata(path).await)
  }
}

fn presence(path: &Path, stat: io::Result<Metadata>) -> Result<bool> {
  match stat {
    Ok(_) => Ok(true),
    Err(e) if is_missing_path_error(&e) => Ok(false),
    Err(e) if is_corrupted_mount_error(&e) => {
      warn!(path = %path.display(), error = %e, "target looks like a broken mount");
      Ok(true)
    }
    Err(e) => Err(Error::filesystem(path)(e)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[tokio::test]
  async fn ensure_creates_parents_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("pods").join("vol").join("mount");
    let dirs = VolumeDirectoryManager;

    assert!(!dirs.exists(&target).await.unwrap());
    dirs.ensure(&target).await.unwrap();
    dirs.ensure(&target).await.unwrap();
    assert!(target.is_dir());
    assert!(dirs.exists(&target).await.unwrap());
  }

  #[tokio::test]
  async fn ensure_fails_below_a_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let target = file.path().join("mount");

    match VolumeDirectoryManager.ensure(&target).await {
      Err(Error::Filesystem { path, .. }) => assert_eq!(path, target),
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[tokio::test]
  async fn path_below_a_file_does_not_exist() {
    let file = tempfile::NamedTempFile::new().unwrap();

    assert!(!VolumeDirectoryManager
      .exists(&file.path().join("mount"))
      .await
      .unwrap());
  }

  #[test_case(libc::ENOTCONN => true ; "disconnected mount")]
  #[test_case(libc::ESTALE => true ; "stale handle")]
  #[test_case(libc::EIO => true ; "io error")]
  #[test_case(libc::ENOENT => false ; "missing")]
  #[test_case(libc::ENOTDIR => false ; "below a file")]
  fn stat_failures(errno: i32) -> bool {
    presence(Path::new("/mnt/a"), Err(io::Error::from_raw_os_error(errno))).unwrap()
  }

  #[test]
  fn other_stat_failures_are_surfaced() {
    let err = presence(Path::new("/mnt/a"), Err(io::Error::from_raw_os_error(libc::ELOOP)));
    assert!(matches!(err, Err(Error::Filesystem { .. })));
  }
}
