use crate::{
  error::{Error, Result},
  rc::DEFAULT_RC_PORT,
};
use clap::Parser;
use csi_proto::Endpoint;
use std::path::PathBuf;

/// CSI driver mounting rclone remotes through `rclone rcd`.
#[derive(Debug, Parser)]
#[command(name = "csi-rclone", version, about)]
pub struct Args {
  /// CSI endpoint, `unix://<path>` or `tcp://<addr>`.
  #[arg(long, env = "CSI_ENDPOINT", default_value = "unix:///tmp/csi.sock")]
  pub endpoint: String,

  /// Identifier of this node.
  #[arg(long = "nodeid", env = "NODE_ID", default_value = "")]
  pub node_id: String,

  /// rclone config file handed to the daemon.
  #[arg(long = "config", env = "RCLONE_CONFIG")]
  pub rclone_config: Option<PathBuf>,

  /// Port the rclone remote control listens on.
  #[arg(long, default_value_t = DEFAULT_RC_PORT)]
  pub rc_port: u16,

  /// rclone binary, looked up on PATH.
  #[arg(long, default_value = "rclone")]
  pub rclone: PathBuf,

  /// Log filter, in `RUST_LOG` syntax. Overrides `RUST_LOG`.
  #[arg(long)]
  pub log_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
  pub endpoint: String,
  pub node_id: String,
  pub rclone_config: Option<PathBuf>,
  pub rc_port: u16,
  pub rclone: PathBuf,
}

impl From<Args> for DriverConfig {
  fn from(args: Args) -> Self {
    DriverConfig {
      endpoint: args.endpoint,
      node_id: args.node_id,
      rclone_config: args.rclone_config,
      rc_port: args.rc_port,
      rclone: args.rclone,
    }
  }
}

impl DriverConfig {
  pub fn validate(&self) -> Result<()> {
    if self.node_id.is_empty() {
      return Err(Error::Configuration("no node id provided".to_owned()));
    }

    if self.endpoint.is_empty() {
      return Err(Error::Configuration("no driver endpoint provided".to_owned()));
    }

    self.parsed_endpoint().map(|_| ())
  }

  pub fn parsed_endpoint(&self) -> Result<Endpoint> {
    self
      .endpoint
      .parse()
      .map_err(|e: csi_proto::ServeError| Error::Configuration(e.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  fn parse(args: &[&str]) -> DriverConfig {
    let argv = std::iter::once("csi-rclone").chain(args.iter().copied());
    Args::try_parse_from(argv).unwrap().into()
  }

  #[test]
  fn defaults() {
    let config = parse(&["--nodeid", "node-1"]);

    assert_eq!(config.endpoint, "unix:///tmp/csi.sock");
    assert_eq!(config.rc_port, 5572);
    assert_eq!(config.rclone, PathBuf::from("rclone"));
    assert_eq!(config.rclone_config, None);
    config.validate().unwrap();
  }

  #[test]
  fn config_file_is_optional_flag() {
    let config = parse(&["--nodeid", "n", "--config", "/etc/rclone.conf", "--rc-port", "6000"]);

    assert_eq!(config.rclone_config, Some(PathBuf::from("/etc/rclone.conf")));
    assert_eq!(config.rc_port, 6000);
  }

  #[test_case(&["--endpoint", "unix:///csi/csi.sock"] ; "missing node id")]
  #[test_case(&["--nodeid", "n", "--endpoint", ""] ; "empty endpoint")]
  #[test_case(&["--nodeid", "n", "--endpoint", "http://localhost:80"] ; "unsupported scheme")]
  fn invalid(args: &[&str]) {
    assert!(matches!(
      parse(args).validate(),
      Err(Error::Configuration(_))
    ));
  }
}
