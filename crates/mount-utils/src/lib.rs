//! Read-only view of the host mount table.
//!
//! The driver never mounts anything itself; the control plane does. What it
//! needs from the host is an answer to "is this directory currently backed by
//! a mount?", which decides whether an unmount request has to be forwarded at
//! all. Probing the filesystem can block (a dead FUSE server hangs `stat`), so
//! every probe is run on a dedicated dispatcher thread and handed back as a
//! future.

cfg_if::cfg_if! {
  if #[cfg(unix)] {
    mod unix;
    use unix::*;
    pub use unix::{is_corrupted_mount_error, is_missing_path_error};
  } else {
    compile_error!("Only cfg(unix) is supported at this time")
  }
}

mod fake;
mod runner;

pub use fake::FakeAction;

use futures::future::BoxFuture;
use runner::{run_inst, MounterImpl, MounterWrapper};
use static_assertions::assert_impl_all;
use std::{
  fmt, io,
  path::{Path, PathBuf},
  result,
  sync::Arc,
};
use thiserror::Error;

pub type Result<T> = result::Result<T, MountError>;
pub type FutureResult<T> = BoxFuture<'static, Result<T>>;

/// Async facade over a mount table.
pub trait Mounter: Send + Sync + 'static {
  /// List returns a list of all mounted filesystems. This can be large.
  /// Reading `/proc/mounts` is retried until two consecutive reads agree.
  fn list(&self) -> FutureResult<Vec<MountPoint>>;

  /// Uses the device-number heuristic to decide if a directory is not a
  /// mountpoint. Errors with `NotFound` when the directory does not exist.
  /// Bind mounts on the same device are not detected.
  fn is_likely_not_mount_point<P>(&self, file: P) -> FutureResult<bool>
  where
    P: Into<PathBuf>;

  /// Reports whether `file` is an active mountpoint. Falls back to scanning
  /// the mount table when the heuristic says no. A mount whose backing
  /// server went away (`ENOTCONN`, `ESTALE`, ...) still counts as mounted,
  /// it has to be torn down.
  fn is_mount_point<P>(&self, file: P) -> FutureResult<bool>
  where
    P: Into<PathBuf>;
}

/// MountPoint represents a single line in /proc/mounts.
#[derive(Clone, PartialEq)]
pub struct MountPoint {
  device: PathBuf,
  path: PathBuf,
  ty: String,
  opts: Vec<String>,
  freq: isize,
  pass: isize,
}

impl fmt::Debug for MountPoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MountPoint")
      .field("device", &self.device)
      .field("path", &self.path)
      .field("type", &self.ty)
      .field("opts", &format!("length={}", self.opts.len()))
      .field("freq", &self.freq)
      .field("pass", &self.pass)
      .finish()
  }
}

impl MountPoint {
  pub fn new(device: impl Into<PathBuf>, path: impl Into<PathBuf>, ty: impl Into<String>) -> Self {
    MountPoint {
      device: device.into(),
      path: path.into(),
      ty: ty.into(),
      opts: Vec::new(),
      freq: 0,
      pass: 0,
    }
  }

  #[inline]
  pub fn device(&self) -> &Path {
    &self.device
  }

  #[inline]
  pub fn path(&self) -> &Path {
    &self.path
  }

  #[inline]
  pub fn mount_type(&self) -> &str {
    &self.ty
  }

  #[inline]
  pub fn opts(&self) -> &[String] {
    &self.opts
  }

  #[inline]
  pub fn freq(&self) -> isize {
    self.freq
  }

  #[inline]
  pub fn pass(&self) -> isize {
    self.pass
  }

  /// True if this entry is mounted on `dir`, including entries the kernel
  /// marked as deleted.
  pub fn matches(&self, dir: &Path) -> bool {
    is_mount_point_match(self, dir)
  }
}

#[derive(Debug, Error)]
pub enum MountError {
  /// The path exists but its mount is unusable (stale handle, disconnected
  /// FUSE server, ...).
  #[error("Corrupted mount at {0}")]
  Corrupted(PathBuf, #[source] io::Error),
  #[error("Unknown mount error: {0}")]
  UnknownMountError(
    #[from]
    #[source]
    io::Error,
  ),
}

impl MountError {
  fn io(&self) -> &io::Error {
    match self {
      MountError::Corrupted(_, e) => e,
      MountError::UnknownMountError(e) => e,
    }
  }

  pub fn is_permission_error(&self) -> bool {
    matches!(self.io().kind(), io::ErrorKind::PermissionDenied)
  }

  pub fn is_not_found(&self) -> bool {
    !self.is_corrupted() && is_missing_path_error(self.io())
  }

  pub fn is_corrupted(&self) -> bool {
    matches!(self, MountError::Corrupted(..))
  }

  fn new(msg: impl Into<String>) -> Self {
    MountError::UnknownMountError(io::Error::new(io::ErrorKind::Other, msg.into()))
  }
}

impl<T> Mounter for T
where
  T: MounterWrapper + Send + Sync + 'static,
{
  fn list(&self) -> FutureResult<Vec<MountPoint>> {
    Box::pin(run_inst(self.mounter().clone(), move |mounter| {
      mounter.list()
    }))
  }

  fn is_likely_not_mount_point<P>(&self, file: P) -> FutureResult<bool>
  where
    P: Into<PathBuf>,
  {
    let file = file.into();

    Box::pin(run_inst(self.mounter().clone(), move |mounter| {
      mounter.is_likely_not_mount_point(&file)
    }))
  }

  fn is_mount_point<P>(&self, file: P) -> FutureResult<bool>
  where
    P: Into<PathBuf>,
  {
    let file = file.into();

    Box::pin(run_inst(self.mounter().clone(), move |mounter| {
      mounter.is_mount_point(&file)
    }))
  }
}

assert_impl_all!(OsMounter: MounterImpl);
assert_impl_all!(fake::FakeMounter: MounterImpl);

/// Mount table of the host, read from `/proc/mounts`.
#[derive(Clone)]
pub struct DefaultMounter(Arc<OsMounter>);

impl DefaultMounter {
  pub fn new() -> Self {
    DefaultMounter(Arc::new(OsMounter::new(PROC_MOUNTS_PATH)))
  }
}

impl Default for DefaultMounter {
  fn default() -> Self {
    Self::new()
  }
}

impl MounterWrapper for DefaultMounter {
  type Mounter = OsMounter;

  #[inline]
  fn mounter(&self) -> &Arc<Self::Mounter> {
    &self.0
  }
}

/// In-memory mount table for tests.
#[derive(Clone)]
pub struct FakeMounter(Arc<fake::FakeMounter>);

impl FakeMounter {
  pub fn new(mps: impl IntoIterator<Item = MountPoint>) -> Self {
    FakeMounter(Arc::new(fake::FakeMounter::new(mps)))
  }

  /// Records `source` as mounted on `target`.
  pub fn mount(&self, source: impl Into<PathBuf>, target: impl Into<PathBuf>, fs_type: &str) {
    self.0.mount(source.into(), target.into(), fs_type)
  }

  /// Drops any entry mounted on `target`.
  pub fn unmount(&self, target: impl Into<PathBuf>) {
    self.0.unmount(target.into())
  }

  /// Makes every probe of `target` fail with the error built by `factory`.
  pub fn fail_checks_for(
    &self,
    target: impl Into<PathBuf>,
    factory: impl Fn() -> MountError + Send + 'static,
  ) {
    self.0.fail_checks_for(target.into(), Box::new(factory))
  }

  pub fn get_log(&self) -> Vec<FakeAction> {
    self.0.get_log()
  }

  pub fn reset_log(&self) {
    self.0.reset_log()
  }
}

impl Default for FakeMounter {
  fn default() -> Self {
    Self::new(None)
  }
}

impl MounterWrapper for FakeMounter {
  type Mounter = fake::FakeMounter;

  #[inline]
  fn mounter(&self) -> &Arc<Self::Mounter> {
    &self.0
  }
}
