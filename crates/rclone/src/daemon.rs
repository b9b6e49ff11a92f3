use crate::{
  client::Rclone,
  config::DriverConfig,
  error::{Error, Result},
  rc::RemoteControl,
};
use csi_mount_utils::Mounter;
use std::{ffi::OsString, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// The `rclone rcd` process backing the control plane.
pub struct RcDaemon {
  handle: Arc<duct::Handle>,
}

impl RcDaemon {
  /// Spawns `rclone rcd` listening on the configured rc port. Its output
  /// goes to ours.
  pub fn start(config: &DriverConfig) -> Result<Self> {
    let program = which::which(&config.rclone).map_err(|e| {
      Error::Configuration(format!(
        "rclone binary {} not found: {}",
        config.rclone.display(),
        e
      ))
    })?;

    let args = rcd_args(config);
    info!(program = %program.display(), ?args, "starting rclone rcd");

    let handle = duct::cmd(&program, &args)
      .unchecked()
      .start()
      .map_err(Error::filesystem(&program))?;

    Ok(RcDaemon {
      handle: Arc::new(handle),
    })
  }

  /// Non-blocking liveness check.
  pub fn is_running(&self) -> bool {
    matches!(self.handle.try_wait(), Ok(None))
  }

  /// Unmounts everything and asks the daemon to quit, each bounded by
  /// `grace`. A daemon that does not answer is killed. Then waits for the
  /// process to exit, however long that takes.
  pub async fn stop<R, M>(&self, client: &Rclone<R, M>, grace: Duration) -> Result<()>
  where
    R: RemoteControl,
    M: Mounter,
  {
    if !self.is_running() {
      warn!("rclone rcd already exited");
      return self.reap(false).await;
    }

    match tokio::time::timeout(grace, client.remote_umount(None)).await {
      Ok(Ok(())) => (),
      Ok(Err(e)) => warn!(error = %e, "failed to unmount all before quitting"),
      Err(_) => warn!(?grace, "mount/unmountall timed out"),
    }

    let (quit, kill) = match tokio::time::timeout(grace, client.core_quit()).await {
      Ok(Ok(())) => (Ok(()), false),
      Ok(Err(e)) => {
        warn!(error = %e, "core/quit failed, killing rclone rcd");
        (Err(e), true)
      }
      Err(_) => {
        warn!(?grace, "core/quit timed out, killing rclone rcd");
        (Ok(()), true)
      }
    };

    self.reap(kill).await?;
    quit
  }

  // `Handle::kill` waits for the child too, so both run off the runtime.
  async fn reap(&self, kill: bool) -> Result<()> {
    let handle = self.handle.clone();
    let waited = tokio::task::spawn_blocking(move || {
      if kill {
        if let Err(e) = handle.kill() {
          warn!(error = %e, "failed to kill rclone rcd");
        }
      }

      handle.wait().map(|output| output.status)
    })
    .await;

    match waited {
      Ok(Ok(status)) => {
        info!(%status, "rclone rcd exited");
        Ok(())
      }
      Ok(Err(e)) => Err(Error::filesystem("rclone")(e)),
      Err(e) => {
        debug!(error = %e, "reaper task did not finish");
        Ok(())
      }
    }
  }
}

fn rcd_args(config: &DriverConfig) -> Vec<OsString> {
  let mut args: Vec<OsString> = vec![
    "rcd".into(),
    "--rc-no-auth".into(),
    "--rc-addr".into(),
    format!("localhost:{}", config.rc_port).into(),
    "--log-level=INFO".into(),
  ];

  if let Some(path) = &config.rclone_config {
    args.push("--config".into());
    args.push(path.into());
  }

  args
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use csi_mount_utils::FakeMounter;
  use serde_json::Value;
  use std::path::PathBuf;

  fn config() -> DriverConfig {
    DriverConfig {
      endpoint: "unix:///tmp/csi.sock".to_owned(),
      node_id: "node-1".to_owned(),
      rclone_config: None,
      rc_port: 5572,
      rclone: PathBuf::from("rclone"),
    }
  }

  #[test]
  fn args_without_config_file() {
    assert_eq!(
      rcd_args(&config()),
      vec!["rcd", "--rc-no-auth", "--rc-addr", "localhost:5572", "--log-level=INFO"]
    );
  }

  #[test]
  fn args_pass_config_file() {
    let config = DriverConfig {
      rclone_config: Some(PathBuf::from("/etc/rclone.conf")),
      rc_port: 6000,
      ..config()
    };

    let args = rcd_args(&config);
    assert_eq!(&args[3], "localhost:6000");
    assert_eq!(&args[5..], &["--config", "/etc/rclone.conf"]);
  }

  #[test]
  fn missing_binary_is_configuration_error() {
    let config = DriverConfig {
      rclone: PathBuf::from("definitely-not-rclone-3f9a"),
      ..config()
    };

    assert!(matches!(RcDaemon::start(&config), Err(Error::Configuration(_))));
  }

  #[tokio::test]
  async fn reaps_an_exited_process() {
    let handle = duct::cmd!("true").unchecked().start().unwrap();
    let daemon = RcDaemon {
      handle: Arc::new(handle),
    };

    daemon.reap(false).await.unwrap();
    assert!(!daemon.is_running());
  }

  struct Unresponsive;

  #[async_trait]
  impl RemoteControl for Unresponsive {
    async fn call(&self, _method: &str, _params: Value) -> Result<Value> {
      futures::future::pending::<Result<Value>>().await
    }
  }

  #[tokio::test]
  async fn unresponsive_daemon_is_killed() {
    let handle = duct::cmd!("sleep", "30").unchecked().start().unwrap();
    let daemon = RcDaemon {
      handle: Arc::new(handle),
    };
    let client = Rclone::new(Unresponsive, FakeMounter::default());

    let stopped = tokio::time::timeout(
      Duration::from_secs(10),
      daemon.stop(&client, Duration::from_millis(50)),
    )
    .await;

    assert!(matches!(stopped, Ok(Ok(()))));
    assert!(!daemon.is_running());
  }
}
