use crate::{MountError, MountPoint, Result};
use futures::channel::oneshot::{channel as oneshot, Receiver, Sender};
use once_cell::sync::OnceCell;
use std::{
  fs,
  future::Future,
  panic::{catch_unwind, RefUnwindSafe, UnwindSafe},
  path::Path,
  sync::Arc,
};
use tracing::{error, warn, Span};

struct MounterMessage {
  span: Span,
  run: Box<dyn FnOnce(Span) + Send + UnwindSafe + RefUnwindSafe>,
}

impl MounterMessage {
  fn new(span: Span, f: impl FnOnce(Span) + Send + UnwindSafe + RefUnwindSafe + 'static) -> Self {
    Self {
      span,
      run: Box::new(f),
    }
  }
}

// Span isn't unwindsafe due to dyn content - but it should be unwind safe in practice (missing some bounds)
impl UnwindSafe for MounterMessage {}

type MounterDispatcher = crossbeam::channel::Sender<MounterMessage>;

// Note: All these methods are to be run in a separate thread, ensuring
// that only one runs at once, and that it does not block async processing.
pub trait MounterImpl: Sized + Send + Sync + UnwindSafe + RefUnwindSafe + 'static {
  /// List returns a list of all mounted filesystems.
  fn list(&self) -> Result<Vec<MountPoint>>;

  /// Heuristic "not a mountpoint" check. Must fail with a `NotFound` error
  /// when the file does not exist.
  fn is_likely_not_mount_point(&self, file: &Path) -> Result<bool>;

  fn is_mount_point(&self, file: &Path) -> Result<bool> {
    // is_likely_not_mount_point provides a quick check
    // to determine whether file IS A mountpoint.
    let not_mnt = match self.is_likely_not_mount_point(file) {
      Ok(v) => v,
      Err(e) if e.is_corrupted() => {
        warn!(
          "{} looks like a corrupted mount, treating it as mounted: {}",
          file.display(),
          e
        );
        return Ok(true);
      }
      Err(e) if e.is_permission_error() => {
        // We were not allowed to do the simple stat() check, e.g. on NFS with
        // root_squash. Fall back to /proc/mounts check below.
        true
      }
      Err(e) => return Err(e),
    };

    // identified as mountpoint, so return this fact.
    if !not_mnt {
      return Ok(true);
    }

    // Resolve any symlinks in file, kernel would do the same and use the resolved path in /proc/mounts.
    let resolved_file = match fs::canonicalize(file) {
      Ok(v) => v,
      Err(_) => return Ok(false),
    };

    // check all mountpoints since is_likely_not_mount_point
    // is not reliable for some mountpoint types.
    Ok(self.list()?.iter().any(|mp| mp.matches(&resolved_file)))
  }
}

static DISPATCHER: OnceCell<MounterDispatcher> = OnceCell::new();

fn dispatcher() -> Result<&'static MounterDispatcher> {
  DISPATCHER
    .get_or_try_init(|| {
      let (sender, receiver) = crossbeam::channel::unbounded::<MounterMessage>();

      std::thread::Builder::new()
        .name("mount-utils:dispatch".into())
        .spawn(move || {
          while let Ok(msg) = receiver.recv() {
            if let Err(e) = catch_unwind(move || {
              let MounterMessage { span, run } = msg;
              run(span)
            }) {
              error!("Failed to run mount function in dispatcher: {:?}", e);
            }
          }
        })
        .map(|_| sender)
    })
    .map_err(|e| MountError::new(format!("failed to spawn dispatcher: {:?}", e)))
}

pub(crate) fn run<R: 'static, F: 'static>(f: F) -> impl Future<Output = Result<R>>
where
  F: FnOnce() -> Result<R> + Send + UnwindSafe + RefUnwindSafe,
  R: UnwindSafe + RefUnwindSafe + Send,
{
  struct OuterMsg<R, F>
  where
    F: FnOnce() -> Result<R> + Send + UnwindSafe + RefUnwindSafe,
    R: UnwindSafe + RefUnwindSafe,
  {
    run: F,
    sender: Sender<Result<R>>,
  }

  impl<R, F> UnwindSafe for OuterMsg<R, F>
  where
    F: FnOnce() -> Result<R> + Send + UnwindSafe + RefUnwindSafe,
    R: UnwindSafe + RefUnwindSafe,
  {
  }

  impl<R, F> RefUnwindSafe for OuterMsg<R, F>
  where
    F: FnOnce() -> Result<R> + Send + UnwindSafe + RefUnwindSafe,
    R: UnwindSafe + RefUnwindSafe,
  {
  }

  let span = Span::current();
  let (sender, receiver) = oneshot();

  match dispatcher() {
    Ok(dispatch) => {
      let msg = OuterMsg { run: f, sender };

      // A failed send drops the sender, which `read` reports as cancelled.
      let _ = dispatch.send(MounterMessage::new(span, move |span| {
        let OuterMsg { run, sender } = msg;
        let result = {
          let _enter = span.enter();
          run()
        };

        let _ = sender.send(result);
      }));
    }
    Err(e) => {
      let _ = sender.send(Err(e));
    }
  };

  read(receiver)
}

pub(crate) fn run_inst<T: MounterImpl, R: 'static, F: 'static>(
  mounter: Arc<T>,
  f: F,
) -> impl Future<Output = Result<R>>
where
  F: FnOnce(&T) -> Result<R> + Send + UnwindSafe + RefUnwindSafe,
  R: UnwindSafe + RefUnwindSafe + Send,
{
  run(move || f(&*mounter))
}

async fn read<R>(receiver: Receiver<Result<R>>) -> Result<R> {
  match receiver.await {
    Ok(r) => r,
    Err(_) => Err(MountError::new("request was cancelled (thread paniced?)")),
  }
}

pub trait MounterWrapper {
  type Mounter: MounterImpl;

  fn mounter(&self) -> &Arc<Self::Mounter>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fake::FakeMounter;
  use std::io;

  #[test]
  fn mount_point_found_by_heuristic() {
    let dir = tempfile::tempdir().unwrap();
    let mounter = FakeMounter::new(None);
    mounter.mount("remote:".into(), dir.path().to_owned(), "fuse.rclone");

    assert!(mounter.is_mount_point(dir.path()).unwrap());
  }

  #[test]
  fn plain_directory_is_not_mount_point() {
    let dir = tempfile::tempdir().unwrap();
    let mounter = FakeMounter::new(None);

    assert!(!mounter.is_mount_point(dir.path()).unwrap());
  }

  #[test]
  fn corrupted_mount_counts_as_mounted() {
    let dir = tempfile::tempdir().unwrap();
    let mounter = FakeMounter::new(None);
    let path = dir.path().to_owned();
    mounter.fail_checks_for(
      dir.path().to_owned(),
      Box::new(move || {
        MountError::Corrupted(
          path.clone(),
          io::Error::new(io::ErrorKind::Other, "transport endpoint is not connected"),
        )
      }),
    );

    assert!(mounter.is_mount_point(dir.path()).unwrap());
  }

  #[test]
  fn permission_error_falls_back_to_mount_table() {
    let dir = tempfile::tempdir().unwrap();
    let mounter = FakeMounter::new(None);
    mounter.fail_checks_for(
      dir.path().to_owned(),
      Box::new(|| MountError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))),
    );
    assert!(!mounter.is_mount_point(dir.path()).unwrap());

    mounter.mount("remote:".into(), dir.path().to_owned(), "fuse.rclone");
    assert!(mounter.is_mount_point(dir.path()).unwrap());
  }

  #[test]
  fn missing_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mounter = FakeMounter::new(None);

    let err = mounter
      .is_mount_point(&dir.path().join("missing"))
      .unwrap_err();
    assert!(err.is_not_found());
  }
}
