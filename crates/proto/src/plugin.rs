use crate::{proto, IdentityService, VolumeExpansionSupport};
use proto::plugin_capability::{service, volume_expansion};
use tracing::debug;

#[inline]
pub(crate) fn service(ty: service::Type) -> proto::PluginCapability {
  proto::PluginCapability {
    r#type: Some(proto::plugin_capability::Type::Service(
      proto::plugin_capability::Service { r#type: ty.into() },
    )),
  }
}

#[inline]
fn volume_expansion(ty: volume_expansion::Type) -> proto::PluginCapability {
  proto::PluginCapability {
    r#type: Some(proto::plugin_capability::Type::VolumeExpansion(
      proto::plugin_capability::VolumeExpansion { r#type: ty.into() },
    )),
  }
}

/// Plugin capabilities common to every service a plugin registers.
pub(crate) fn get_capabilities(s: &impl IdentityService) -> proto::GetPluginCapabilitiesResponse {
  let mut response = proto::GetPluginCapabilitiesResponse::default();

  let volume_accessibility_constraints_support = s.volume_accessibility_constraints_support();
  if volume_accessibility_constraints_support {
    response
      .capabilities
      .push(service(service::Type::VolumeAccessibilityConstraints));
  }

  let volume_expansion_support = s.volume_expansion_support();
  match volume_expansion_support {
    VolumeExpansionSupport::None => (),
    VolumeExpansionSupport::Offline => response
      .capabilities
      .push(volume_expansion(volume_expansion::Type::Offline)),
    VolumeExpansionSupport::Online => response
      .capabilities
      .push(volume_expansion(volume_expansion::Type::Online)),
  }

  debug!(
    ?volume_accessibility_constraints_support,
    ?volume_expansion_support
  );
  response
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Plain;

  impl IdentityService for Plain {
    fn name(&self) -> &str {
      "plain"
    }

    fn version(&self) -> &str {
      "0.0.0"
    }
  }

  struct Expanding;

  impl IdentityService for Expanding {
    fn name(&self) -> &str {
      "expanding"
    }

    fn version(&self) -> &str {
      "0.0.0"
    }

    fn volume_expansion_support(&self) -> VolumeExpansionSupport {
      VolumeExpansionSupport::Online
    }
  }

  #[test]
  fn defaults_advertise_nothing() {
    assert!(get_capabilities(&Plain).capabilities.is_empty());
  }

  #[test]
  fn online_expansion_is_advertised() {
    let response = get_capabilities(&Expanding);
    assert_eq!(response.capabilities, vec![volume_expansion(volume_expansion::Type::Online)]);
  }
}
