//! Mounts that outlive the publish call that started them.
//!
//! A publish only waits a bounded time for its mount. The mount keeps
//! running on the runtime, registered here under its target path, so that
//! a later unpublish or the shutdown path can wait for it instead of racing
//! it.

use crate::error::Error;
use futures::{
  future::{self, BoxFuture, Shared},
  FutureExt,
};
use std::{
  collections::HashMap,
  future::Future,
  path::{Path, PathBuf},
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
  },
  time::Duration,
};
use tracing::{debug, warn};

pub type MountResult = Result<(), Arc<Error>>;
pub type PendingMount = Shared<BoxFuture<'static, MountResult>>;

struct Entry {
  id: u64,
  mount: PendingMount,
}

#[derive(Clone, Default)]
pub struct MountTasks {
  inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
  next_id: AtomicU64,
  pending: Mutex<HashMap<PathBuf, Entry>>,
}

impl Inner {
  fn pending(&self) -> MutexGuard<'_, HashMap<PathBuf, Entry>> {
    match self.pending.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

impl MountTasks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Runs `mount` to completion on the runtime and returns a handle to its
  /// outcome. The entry for `target` is dropped once the mount finishes. A
  /// newer mount on the same target replaces the older entry.
  pub fn spawn<F>(&self, target: PathBuf, mount: F) -> PendingMount
  where
    F: Future<Output = Result<(), Error>> + Send + 'static,
  {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    let inner = self.inner.clone();
    let key = target.clone();

    let task = async move {
      let result = mount.await.map_err(Arc::new);
      match &result {
        Ok(()) => debug!(target = %key.display(), "mount task finished"),
        Err(e) => warn!(target = %key.display(), error = %e, "mount task failed"),
      }

      let mut pending = inner.pending();
      if pending.get(&key).map(|e| e.id) == Some(id) {
        pending.remove(&key);
      }

      result
    }
    .boxed()
    .shared();

    // Registered before it can run, so removal never precedes insertion.
    self.inner.pending().insert(
      target,
      Entry {
        id,
        mount: task.clone(),
      },
    );
    tokio::spawn(task.clone().map(|_| ()));

    task
  }

  /// The unfinished mount on `target`, if any.
  pub fn pending(&self, target: &Path) -> Option<PendingMount> {
    self.inner.pending().get(target).map(|e| e.mount.clone())
  }

  pub fn len(&self) -> usize {
    self.inner.pending().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Waits for every unfinished mount, giving up after `grace`. Returns
  /// how many were still running.
  pub async fn drain(&self, grace: Duration) -> usize {
    let mounts: Vec<_> = self
      .inner
      .pending()
      .values()
      .map(|e| e.mount.clone())
      .collect();

    if mounts.is_empty() {
      return 0;
    }

    debug!(count = mounts.len(), "waiting for pending mounts");
    match tokio::time::timeout(grace, future::join_all(mounts)).await {
      Ok(_) => 0,
      Err(_) => {
        let left = self.len();
        warn!(count = left, "pending mounts did not finish in time");
        left
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::sync::oneshot;

  #[tokio::test]
  async fn entry_removed_after_completion() {
    let tasks = MountTasks::new();
    let (tx, rx) = oneshot::channel::<()>();

    let mount = tasks.spawn(PathBuf::from("/mnt/a"), async move {
      let _ = rx.await;
      Ok(())
    });

    assert!(tasks.pending(Path::new("/mnt/a")).is_some());
    tx.send(()).unwrap();
    mount.await.unwrap();
    assert!(tasks.pending(Path::new("/mnt/a")).is_none());
    assert!(tasks.is_empty());
  }

  #[tokio::test]
  async fn runs_without_being_awaited() {
    let tasks = MountTasks::new();
    let (tx, rx) = oneshot::channel();

    drop(tasks.spawn(PathBuf::from("/mnt/a"), async move {
      let _ = tx.send(());
      Ok(())
    }));

    rx.await.unwrap();
  }

  #[tokio::test]
  async fn failure_is_shared_by_all_waiters() {
    let tasks = MountTasks::new();
    let mount = tasks.spawn(PathBuf::from("/mnt/a"), async {
      Err(Error::Configuration("boom".into()))
    });

    let first = mount.clone().await.unwrap_err();
    let second = mount.await.unwrap_err();
    assert!(Arc::ptr_eq(&first, &second));
  }

  #[tokio::test]
  async fn older_mount_does_not_remove_newer_entry() {
    let tasks = MountTasks::new();
    let (old_tx, old_rx) = oneshot::channel::<()>();
    let (_new_tx, new_rx) = oneshot::channel::<()>();

    let old = tasks.spawn(PathBuf::from("/mnt/a"), async move {
      let _ = old_rx.await;
      Ok(())
    });
    let _new = tasks.spawn(PathBuf::from("/mnt/a"), async move {
      let _ = new_rx.await;
      Ok(())
    });

    old_tx.send(()).unwrap();
    old.await.unwrap();
    assert_eq!(tasks.len(), 1);
  }

  #[tokio::test]
  async fn drain_reports_stragglers() {
    let tasks = MountTasks::new();
    let (_tx, rx) = oneshot::channel::<()>();

    let _mount = tasks.spawn(PathBuf::from("/mnt/a"), async move {
      let _ = rx.await;
      Ok(())
    });

    assert_eq!(tasks.drain(Duration::from_millis(10)).await, 1);
  }

  #[tokio::test]
  async fn drain_waits_for_running_mounts() {
    let tasks = MountTasks::new();
    let _mount = tasks.spawn(PathBuf::from("/mnt/a"), async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok(())
    });

    assert_eq!(tasks.drain(Duration::from_secs(5)).await, 0);
    assert!(tasks.is_empty());
  }
}
