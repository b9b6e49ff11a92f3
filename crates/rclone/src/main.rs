use anyhow::Context;
use clap::Parser;
use csi_mount_utils::DefaultMounter;
use csi_rclone::{Args, Driver, DriverConfig, HttpRemoteControl, RcDaemon, Rclone, SHUTDOWN_GRACE};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(filter: Option<&str>) {
  let filter = match filter {
    Some(filter) => EnvFilter::new(filter),
    None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
  };

  tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
  let mut terminate = match signal(SignalKind::terminate()) {
    Ok(terminate) => terminate,
    Err(e) => {
      warn!(error = %e, "cannot listen for SIGTERM");
      let _ = tokio::signal::ctrl_c().await;
      return;
    }
  };

  tokio::select! {
    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
    _ = terminate.recv() => info!("received SIGTERM"),
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let args = Args::parse();
  init_tracing(args.log_filter.as_deref());

  let config = DriverConfig::from(args);
  config.validate().context("invalid configuration")?;
  let endpoint = config.parsed_endpoint()?;

  let daemon = RcDaemon::start(&config).context("failed to start rclone rcd")?;
  let client = Rclone::new(HttpRemoteControl::new(config.rc_port), DefaultMounter::new());
  let driver = Arc::new(Driver::new(config.node_id.clone(), client).with_daemon(daemon));

  info!(node_id = %config.node_id, %endpoint, "starting csi-rclone");
  let served = csi_proto::serve(driver.clone(), &endpoint, shutdown_signal()).await;

  let stopped = driver.shutdown(SHUTDOWN_GRACE).await;
  served.context("gRPC server failed")?;
  stopped.context("failed to stop rclone rcd")?;

  info!("bye");
  Ok(())
}
