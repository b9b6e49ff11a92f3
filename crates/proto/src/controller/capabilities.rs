use std::convert::TryFrom;

use bitflags::bitflags;

use crate::proto;

#[rustfmt::skip]
bitflags! {
  pub struct ControllerCapabilities: u32 {
    const CREATE_DELETE_VOLUME         = 0b_0000_0000_0000_0001;
    const PUBLISH_UNPUBLISH_VOLUME     = 0b_0000_0000_0000_0010;
    const LIST_VOLUMES                 = 0b_0000_0000_0000_0100;
    const GET_CAPACITY                 = 0b_0000_0000_0000_1000;
    const PUBLISH_READONLY             = 0b_0000_0000_1000_0000;
    const VOLUME_CONDITION             = 0b_0000_0100_0000_0000;
    const GET_VOLUME                   = 0b_0000_1000_0000_0000;
  }
}

use proto::controller_service_capability::rpc::Type;

const MAPPING: [(ControllerCapabilities, Type); 7] = [
  (ControllerCapabilities::CREATE_DELETE_VOLUME, Type::CreateDeleteVolume),
  (ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME, Type::PublishUnpublishVolume),
  (ControllerCapabilities::LIST_VOLUMES, Type::ListVolumes),
  (ControllerCapabilities::GET_CAPACITY, Type::GetCapacity),
  (ControllerCapabilities::PUBLISH_READONLY, Type::PublishReadonly),
  (ControllerCapabilities::VOLUME_CONDITION, Type::VolumeCondition),
  (ControllerCapabilities::GET_VOLUME, Type::GetVolume),
];

impl TryFrom<ControllerCapabilities> for proto::ControllerGetCapabilitiesResponse {
  type Error = tonic::Status;

  fn try_from(value: ControllerCapabilities) -> Result<Self, Self::Error> {
    let capabilities = MAPPING
      .iter()
      .filter(|(flag, _)| value.contains(*flag))
      .map(|(_, ty)| proto::ControllerServiceCapability {
        r#type: Some(proto::controller_service_capability::Type::Rpc(
          proto::controller_service_capability::Rpc { r#type: *ty as i32 },
        )),
      })
      .collect();

    Ok(proto::ControllerGetCapabilitiesResponse { capabilities })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn types(caps: ControllerCapabilities) -> Vec<i32> {
    proto::ControllerGetCapabilitiesResponse::try_from(caps)
      .unwrap()
      .capabilities
      .into_iter()
      .map(|c| match c.r#type {
        Some(proto::controller_service_capability::Type::Rpc(rpc)) => rpc.r#type,
        None => panic!("capability without type"),
      })
      .collect()
  }

  #[test]
  fn empty_set_has_no_capabilities() {
    assert!(types(ControllerCapabilities::empty()).is_empty());
  }

  #[test]
  fn listed_in_declaration_order() {
    let caps = ControllerCapabilities::GET_VOLUME | ControllerCapabilities::LIST_VOLUMES;
    assert_eq!(
      types(caps),
      vec![Type::ListVolumes as i32, Type::GetVolume as i32]
    );
  }
}
