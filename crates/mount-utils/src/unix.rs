use crate::{runner::MounterImpl, MountError, MountPoint, Result};
use smallvec::SmallVec;
use std::{
  fs, io,
  num::NonZeroUsize,
  os::unix::fs::MetadataExt,
  path::{Path, PathBuf},
};
use tracing::debug;

pub(crate) const PROC_MOUNTS_PATH: &str = "/proc/mounts";
const MAX_LIST_TRIES: NonZeroUsize = unsafe { NonZeroUsize::new_unchecked(3) };
const EXPECTED_FIELDS_PER_MOUNTS_LINE: usize = 6;

pub struct OsMounter {
  mounts_path: PathBuf,
}

impl OsMounter {
  pub(crate) fn new(mounts_path: impl Into<PathBuf>) -> Self {
    OsMounter {
      mounts_path: mounts_path.into(),
    }
  }
}

impl MounterImpl for OsMounter {
  fn list(&self) -> Result<Vec<MountPoint>> {
    list_proc_mounts(&self.mounts_path)
  }

  fn is_likely_not_mount_point(&self, file: &Path) -> Result<bool> {
    let file_stat = stat(file)?;
    let parent = file
      .parent()
      .ok_or_else(|| MountError::new("file does not have parent"))?;
    let parent_stat = stat(parent)?;
    // If the directory has a different device as parent, then it is a mountpoint.
    if file_stat.dev() != parent_stat.dev() {
      debug!("{} is on a different device than its parent", file.display());
      return Ok(false);
    }

    Ok(true)
  }
}

fn stat(path: &Path) -> Result<fs::Metadata> {
  fs::metadata(path).map_err(|e| classify(path, e))
}

/// Errors a broken mount produces when stat'ed.
pub fn is_corrupted_mount_error(e: &io::Error) -> bool {
  matches!(
    e.raw_os_error(),
    Some(libc::ENOTCONN) | Some(libc::ESTALE) | Some(libc::EIO) | Some(libc::EACCES)
  )
}

/// Stat errors meaning nothing lives at the path, including a path that
/// runs through a regular file.
pub fn is_missing_path_error(e: &io::Error) -> bool {
  e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENOTDIR)
}

// ENOENT stays a plain io error so callers can tell "gone" from "broken".
fn classify(path: &Path, e: io::Error) -> MountError {
  if is_corrupted_mount_error(&e) {
    MountError::Corrupted(path.to_owned(), e)
  } else {
    e.into()
  }
}

pub(crate) fn is_mount_point_match(mp: &MountPoint, dir: &Path) -> bool {
  let deleted_dir = format!("{}\\040(deleted)", dir.display());
  let deleted_dir: &Path = deleted_dir.as_ref();
  mp.path() == dir || mp.path() == deleted_dir
}

fn list_proc_mounts(mount_file_path: &Path) -> Result<Vec<MountPoint>> {
  let content = consistent_read(mount_file_path, MAX_LIST_TRIES)?;

  parse_proc_mounts(&content)
}

/// ConsistentRead repeatedly reads a file until it gets the same content twice. This is useful when reading files
/// in /proc that are larger than page size and kernel may modify them between individual read() syscalls.
fn consistent_read(path: &Path, attempts: NonZeroUsize) -> io::Result<Vec<u8>> {
  let mut old_content = fs::read(path)?;

  for _ in 0..attempts.get() {
    let new_content = fs::read(path)?;
    if new_content == old_content {
      return Ok(new_content);
    }

    // Files are different, continue reading
    old_content = new_content;
  }

  Err(io::Error::new(
    io::ErrorKind::Other,
    format!(
      "could not get consistent content of '{}' after {} attempts",
      path.display(),
      attempts.get()
    ),
  ))
}

fn parse_proc_mounts(content: &[u8]) -> Result<Vec<MountPoint>> {
  let mut out = Vec::new();
  let s = std::str::from_utf8(content)
    .map_err(|_| MountError::new("proc mounts contain invalid UTF8"))?;
  for line in s.lines() {
    if line.is_empty() {
      continue;
    }

    let fields = line
      .split_whitespace()
      .collect::<SmallVec<[&str; EXPECTED_FIELDS_PER_MOUNTS_LINE]>>();
    if fields.len() != EXPECTED_FIELDS_PER_MOUNTS_LINE {
      return Err(MountError::new(format!(
        "wrong number of fields (expected {}, got {})",
        EXPECTED_FIELDS_PER_MOUNTS_LINE,
        fields.len()
      )));
    }

    let opts = fields[3].split(',').map(str::to_owned).collect();
    let freq = fields[4]
      .parse()
      .map_err(|e| MountError::new(format!("invalid freq: {:?}", e)))?;
    let pass = fields[5]
      .parse()
      .map_err(|e| MountError::new(format!("invalid pass: {:?}", e)))?;

    out.push(MountPoint {
      device: PathBuf::from(fields[0]),
      path: PathBuf::from(fields[1]),
      ty: fields[2].to_owned(),
      opts,
      freq,
      pass,
    })
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::{is_corrupted_mount_error, is_missing_path_error, parse_proc_mounts, OsMounter};
  use crate::{runner::MounterImpl, MountPoint};
  use std::{
    io::{self, Write},
    path::Path,
  };
  use test_case::test_case;

  #[test]
  fn read_proc_mounts() {
    let success_case = "
/dev/0 /path/to/0 type0 flags 0 0
/dev/1    /path/to/1   type1	flags 1 1
remote: /var/lib/kubelet/pods/x/mount fuse.rclone rw,nosuid,nodev,user_id=0 0 0
";

    let mounts = parse_proc_mounts(success_case.as_ref()).expect("parse succeeded");
    assert_eq!(mounts.len(), 3);
    assert_eq!(
      mounts[0],
      MountPoint {
        device: "/dev/0".into(),
        path: "/path/to/0".into(),
        ty: "type0".into(),
        opts: vec!["flags".into()],
        freq: 0,
        pass: 0,
      }
    );
    assert_eq!(mounts[1].freq(), 1);
    assert_eq!(mounts[1].pass(), 1);
    assert_eq!(mounts[2].device(), Path::new("remote:"));
    assert_eq!(mounts[2].mount_type(), "fuse.rclone");
    assert_eq!(
      mounts[2].opts(),
      &["rw", "nosuid", "nodev", "user_id=0"][..]
    );

    let error_cases = &[
      "/dev/0 /path/to/mount\n",
      "/dev/1 /path/to/mount type flags a 0\n",
      "/dev/2 /path/to/mount type flags 0 b\n",
    ];
    for ec in error_cases {
      parse_proc_mounts(ec.as_ref()).expect_err(&format!("Error case '{}' should fail", ec.trim()));
    }
  }

  #[test_case("/mnt/a", "/mnt/a" => true ; "exact")]
  #[test_case("/mnt/a\\040(deleted)", "/mnt/a" => true ; "deleted")]
  #[test_case("/mnt/ab", "/mnt/a" => false ; "prefix")]
  #[test_case("/mnt", "/mnt/a" => false ; "parent")]
  fn matches(mounted: &str, dir: &str) -> bool {
    MountPoint::new("remote:", mounted, "fuse.rclone").matches(dir.as_ref())
  }

  #[test]
  fn lists_from_configured_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "remote: /mnt/target fuse.rclone rw 0 0").unwrap();
    let mounter = OsMounter::new(file.path());

    let mounts = mounter.list().unwrap();
    assert_eq!(mounts.len(), 1);
    assert!(mounts[0].matches("/mnt/target".as_ref()));
  }

  #[test]
  fn temp_dir_is_not_mount_point() {
    let dir = tempfile::tempdir().unwrap();
    let mounter = OsMounter::new("/proc/mounts");

    assert!(mounter.is_likely_not_mount_point(dir.path()).unwrap());
  }

  #[test]
  fn missing_dir_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mounter = OsMounter::new("/proc/mounts");

    let err = mounter
      .is_likely_not_mount_point(&dir.path().join("missing"))
      .unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_corrupted());
  }

  #[test]
  fn path_below_a_file_is_not_found() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mounter = OsMounter::new("/proc/mounts");

    let err = mounter
      .is_likely_not_mount_point(&file.path().join("mount"))
      .unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_corrupted());
  }

  #[test_case(libc::ENOTCONN => (true, false) ; "disconnected")]
  #[test_case(libc::ESTALE => (true, false) ; "stale")]
  #[test_case(libc::EIO => (true, false) ; "io")]
  #[test_case(libc::ENOENT => (false, true) ; "missing")]
  #[test_case(libc::ENOTDIR => (false, true) ; "below file")]
  #[test_case(libc::ELOOP => (false, false) ; "loop")]
  fn stat_error_kinds(errno: i32) -> (bool, bool) {
    let e = io::Error::from_raw_os_error(errno);
    (is_corrupted_mount_error(&e), is_missing_path_error(&e))
  }
}
