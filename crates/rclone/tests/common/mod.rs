#![allow(dead_code)]

use async_trait::async_trait;
use csi_mount_utils::FakeMounter;
use csi_rclone::{Driver, Error, Rclone, RemoteControl, Result};
use serde_json::{json, Value};
use std::{
  collections::HashMap,
  path::PathBuf,
  sync::{Arc, Mutex, MutexGuard},
  time::Duration,
};

type Handler = Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

#[derive(Default)]
struct State {
  calls: Vec<(String, Value)>,
  finished: Vec<String>,
  handlers: HashMap<String, Handler>,
  delays: HashMap<String, Duration>,
}

/// In-process rclone control plane. Records every call, answers `{}`
/// unless told otherwise, and keeps a `FakeMounter` in step with
/// `mount/*` calls.
#[derive(Clone)]
pub struct FakeControlPlane {
  state: Arc<Mutex<State>>,
  mounter: FakeMounter,
}

impl FakeControlPlane {
  pub fn new(mounter: FakeMounter) -> Self {
    FakeControlPlane {
      state: Arc::default(),
      mounter,
    }
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn on(&self, method: &str, handler: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static) {
    self
      .state()
      .handlers
      .insert(method.to_owned(), Box::new(handler));
  }

  pub fn fail(&self, method: &str, status: u16, body: &str) {
    let owned = method.to_owned();
    let body = body.to_owned();
    self.on(method, move |_| {
      Err(Error::ControlPlane {
        method: owned.clone(),
        status,
        body: body.clone(),
      })
    });
  }

  pub fn delay(&self, method: &str, delay: Duration) {
    self.state().delays.insert(method.to_owned(), delay);
  }

  /// `operations/about` answers with these totals, keyed by remote name.
  pub fn about(&self, totals: &[(&str, u64)]) {
    let totals: HashMap<String, u64> = totals.iter().map(|(r, t)| (r.to_string(), *t)).collect();
    self.on("operations/about", move |params| {
      let fs = params["fs"].as_str().unwrap_or_default();
      let remote = fs.split(':').next().unwrap_or_default();
      match totals.get(remote) {
        Some(total) => Ok(json!({ "total": total, "used": 0, "free": total })),
        None => Err(Error::ControlPlane {
          method: "operations/about".to_owned(),
          status: 500,
          body: format!(r#"{{"error":"didn't find section in config file: {}"}}"#, remote),
        }),
      }
    });
  }

  pub fn calls(&self) -> Vec<(String, Value)> {
    self.state().calls.clone()
  }

  pub fn methods(&self) -> Vec<String> {
    self.state().calls.iter().map(|(m, _)| m.clone()).collect()
  }

  pub fn params(&self, method: &str) -> Vec<Value> {
    self
      .state()
      .calls
      .iter()
      .filter(|(m, _)| m == method)
      .map(|(_, p)| p.clone())
      .collect()
  }

  pub fn finished(&self, method: &str) -> usize {
    self.state().finished.iter().filter(|m| *m == method).count()
  }

  pub fn reset(&self) {
    let mut state = self.state();
    state.calls.clear();
    state.finished.clear();
  }
}

#[async_trait]
impl RemoteControl for FakeControlPlane {
  async fn call(&self, method: &str, params: Value) -> Result<Value> {
    let delay = {
      let mut state = self.state();
      state.calls.push((method.to_owned(), params.clone()));
      state.delays.get(method).copied()
    };

    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let result = {
      let state = self.state();
      match state.handlers.get(method) {
        Some(handler) => handler(&params),
        None => Ok(json!({})),
      }
    };

    if result.is_ok() {
      let target = params["mountPoint"].as_str().map(PathBuf::from);
      match (method, target) {
        ("mount/mount", Some(target)) => self.mounter.mount("rclone", target, "fuse.rclone"),
        ("mount/unmount", Some(target)) => self.mounter.unmount(target),
        _ => (),
      }
    }

    self.state().finished.push(method.to_owned());
    result
  }
}

pub fn driver() -> (Driver<FakeControlPlane, FakeMounter>, FakeControlPlane, FakeMounter) {
  let mounter = FakeMounter::default();
  let plane = FakeControlPlane::new(mounter.clone());
  let driver = Driver::new("node-1", Rclone::new(plane.clone(), mounter.clone()));
  (driver, plane, mounter)
}

pub fn volume_context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
  pairs
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
