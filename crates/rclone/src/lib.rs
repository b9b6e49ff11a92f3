//! CSI driver for rclone remotes.
//!
//! Volumes are rclone remotes. Publishing a volume configures the remote
//! from its volume context and mounts it through the remote control API of
//! a local `rclone rcd`; unpublishing asks the same daemon to unmount. The
//! driver keeps no volume state of its own, the daemon's mount table is the
//! only source of truth.

pub mod client;
pub mod config;
pub mod context;
pub mod daemon;
pub mod directory;
pub mod driver;
pub mod error;
pub mod info;
pub mod publish;
pub mod rc;
pub mod tasks;
pub mod unpublish;

pub use client::{About, Rclone};
pub use config::{Args, DriverConfig};
pub use context::{MountSession, RemoteConfig, VolumeContext};
pub use daemon::RcDaemon;
pub use driver::{Driver, PLUGIN_NAME, SHUTDOWN_GRACE};
pub use error::{Error, Result};
pub use publish::PublishRequest;
pub use rc::{HttpRemoteControl, RemoteControl};
pub use tasks::MountTasks;
