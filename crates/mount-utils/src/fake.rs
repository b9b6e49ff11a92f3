use crate::{runner::MounterImpl, MountError, MountPoint, Result};
use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{Mutex, MutexGuard},
};
use tracing::info;

#[derive(Clone, Debug, PartialEq)]
pub enum FakeAction {
  Mount {
    target: PathBuf,
    source: PathBuf,
    fs_type: String,
  },

  Unmount {
    target: PathBuf,
  },
}

type ErrorFactory = Box<dyn Fn() -> MountError + Send>;

struct FakeMounterInner {
  mount_points: Vec<MountPoint>,
  log: Vec<FakeAction>,
  mount_check_errors: HashMap<PathBuf, ErrorFactory>,
}

pub struct FakeMounter(Mutex<FakeMounterInner>);

// If target is a symlink, get its absolute path
fn resolve(path: PathBuf) -> PathBuf {
  path.canonicalize().unwrap_or(path)
}

impl FakeMounter {
  pub fn new(mps: impl IntoIterator<Item = MountPoint>) -> Self {
    let mount_points = mps.into_iter().collect();
    let inner = FakeMounterInner {
      mount_points,
      log: Vec::new(),
      mount_check_errors: HashMap::new(),
    };

    Self(Mutex::new(inner))
  }

  fn inner(&self) -> MutexGuard<'_, FakeMounterInner> {
    // a panicking test must not cascade into every other probe
    self.0.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn mount(&self, source: PathBuf, target: PathBuf, fs_type: &str) {
    let target = resolve(target);
    let mut inner = self.inner();
    inner
      .mount_points
      .push(MountPoint::new(source.clone(), target.clone(), fs_type));
    info!(
      "Fake mounter: mounted {} to {}",
      source.display(),
      target.display()
    );
    inner.log.push(FakeAction::Mount {
      target,
      source,
      fs_type: fs_type.to_owned(),
    });
  }

  pub fn unmount(&self, target: PathBuf) {
    let orig_target = target.clone();
    let target = resolve(target);
    let mut inner = self.inner();

    if let Some(i) = inner.mount_points.iter().position(|mp| mp.path == target) {
      let mp = inner.mount_points.remove(i);
      info!(
        "Fake mounter: unmounted {} from {}",
        mp.device.display(),
        target.display()
      );
    }

    inner.log.push(FakeAction::Unmount { target });
    inner.mount_check_errors.remove(&orig_target);
  }

  pub fn fail_checks_for(&self, target: PathBuf, factory: ErrorFactory) {
    self.inner().mount_check_errors.insert(target, factory);
  }

  pub fn reset_log(&self) {
    self.inner().log.clear();
  }

  pub fn get_log(&self) -> Vec<FakeAction> {
    self.inner().log.clone()
  }
}

impl MounterImpl for FakeMounter {
  fn list(&self) -> Result<Vec<MountPoint>> {
    Ok(self.inner().mount_points.clone())
  }

  fn is_likely_not_mount_point(&self, file: &Path) -> Result<bool> {
    let inner = self.inner();

    if let Some(err_factory) = inner.mount_check_errors.get(file) {
      return Err(err_factory());
    }

    let _ = file.metadata()?;
    let file = resolve(file.to_owned());

    for mp in &inner.mount_points {
      if mp.path == file {
        info!(
          "isLikelyNotMountPoint for {}: mounted {}, false",
          file.display(),
          mp.path.display()
        );
        return Ok(false);
      }
    }

    info!("isLikelyNotMountPoint for {}: true", file.display());
    Ok(true)
  }
}
