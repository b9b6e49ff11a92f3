use crate::proto;
use std::{collections::HashMap, convert::TryFrom, num::NonZeroU64};

#[derive(Debug)]
pub struct NodeGetInfoResponse {
  /// The identifier of the node as understood by the SP. It is used
  /// by the CO in subsequent calls to refer to this node, and must not
  /// exceed 192 bytes.
  node_id: String,

  /// Maximum number of volumes that controller can publish to the node.
  /// Unset means the CO decides.
  max_volumes_per_node: Option<NonZeroU64>,

  /// Where (regions, zones, racks, etc.) the node is accessible from.
  accessible_topology: Option<HashMap<String, String>>,
}

impl NodeGetInfoResponse {
  pub fn new(node_id: impl Into<String>) -> Self {
    NodeGetInfoResponse {
      node_id: node_id.into(),
      max_volumes_per_node: None,
      accessible_topology: None,
    }
  }

  #[inline]
  pub fn node_id(&self) -> &str {
    &self.node_id
  }
}

impl TryFrom<NodeGetInfoResponse> for proto::NodeGetInfoResponse {
  type Error = tonic::Status;

  fn try_from(value: NodeGetInfoResponse) -> Result<Self, Self::Error> {
    if value.node_id.len() > 192 {
      return Err(tonic::Status::internal(
        "NodeGetInfoResponse.node_id exceeds 192 bytes",
      ));
    }

    let max_volumes_per_node = match value.max_volumes_per_node {
      None => 0,
      Some(v) => i64::try_from(v.get()).map_err(|_| {
        tonic::Status::out_of_range("NodeGetInfoResponse.max_volumes_per_node overflows int64")
      })?,
    };
    let accessible_topology = value
      .accessible_topology
      .map(|segments| proto::Topology { segments });

    Ok(proto::NodeGetInfoResponse {
      node_id: value.node_id,
      max_volumes_per_node,
      accessible_topology,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_node_id_is_set() {
    let response = proto::NodeGetInfoResponse::try_from(NodeGetInfoResponse::new("node-1")).unwrap();

    assert_eq!(response.node_id, "node-1");
    assert_eq!(response.max_volumes_per_node, 0);
    assert!(response.accessible_topology.is_none());
  }

  #[test]
  fn oversized_node_id_is_rejected() {
    let response = NodeGetInfoResponse::new("n".repeat(193));
    assert!(proto::NodeGetInfoResponse::try_from(response).is_err());
  }
}
