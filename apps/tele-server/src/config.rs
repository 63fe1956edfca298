use std::net::SocketAddr;

use anyhow::Context;
use tracing::{info, warn};

use tele_actions::ActionTypeRegistry;
use tele_protocol::{CapabilityBinding, MovementParams, RobotProfile};

pub fn bind_addr() -> anyhow::Result<SocketAddr> {
    let raw = std::env::var("TELE_BIND").unwrap_or_else(|_| "127.0.0.1:8090".to_string());
    raw.parse()
        .with_context(|| format!("TELE_BIND `{raw}` is not a socket address"))
}

/// Action type registry: built-ins plus `TELE_ACTION_TYPES` overrides.
/// A bad registry file is a startup error, not a call-time surprise.
pub fn load_registry() -> anyhow::Result<ActionTypeRegistry> {
    match std::env::var("TELE_ACTION_TYPES") {
        Ok(path) if !path.trim().is_empty() => {
            let registry = ActionTypeRegistry::load(std::path::Path::new(&path))
                .with_context(|| format!("load action type registry from {path}"))?;
            info!(target: "config", path, tags = registry.len(), "loaded action type registry");
            Ok(registry)
        }
        _ => Ok(ActionTypeRegistry::with_defaults()),
    }
}

/// Capability descriptor from `TELE_PROFILE`, or the stock profile. An
/// unreadable file degrades to the default with a warning; capabilities
/// flagged without a binding are reported and treated as unavailable by
/// callers.
pub fn load_profile() -> RobotProfile {
    let profile = match std::env::var("TELE_PROFILE") {
        Ok(path) if !path.trim().is_empty() => match std::fs::read_to_string(&path) {
            Ok(text) => match toml::from_str::<RobotProfile>(&text) {
                Ok(profile) => {
                    info!(target: "config", path, robot = %profile.name, "loaded robot profile");
                    profile
                }
                Err(err) => {
                    warn!(target: "config", path, "failed to parse robot profile: {err}");
                    default_profile()
                }
            },
            Err(err) => {
                warn!(target: "config", path, "failed to read robot profile: {err}");
                default_profile()
            }
        },
        _ => default_profile(),
    };
    for capability in profile.unbound_capabilities() {
        warn!(
            target: "config",
            capability,
            "capability flagged without a binding; treating as unavailable"
        );
    }
    profile
}

fn default_profile() -> RobotProfile {
    let mut profile = RobotProfile {
        name: "stretch".into(),
        movement: MovementParams {
            linear_speed: 0.15,
            angular_speed: 0.5,
            step_duration_ms: 400,
        },
        action_labels: vec![
            "wave".into(),
            "nod".into(),
            "look_left".into(),
            "look_right".into(),
            "greet".into(),
        ],
        ..Default::default()
    };
    for (capability, action_name, action_type) in [
        ("arm", "/arm/move", "ArmMove"),
        ("head", "/head/pose", "HeadPose"),
        ("base", "/base/drive", "BaseDrive"),
        ("gripper", "/gripper/command", "GripperCommand"),
        ("speech", "/speech/say", "SpeechSay"),
        ("behaviors", "/behaviors/play", "BehaviorPlay"),
    ] {
        profile.capabilities.insert(capability.into(), true);
        profile.bindings.insert(
            capability.into(),
            CapabilityBinding {
                action_name: action_name.into(),
                action_type: action_type.into(),
            },
        );
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_fully_bound() {
        let profile = default_profile();
        assert!(profile.unbound_capabilities().is_empty());
        let arm = profile.binding("arm").expect("arm bound");
        assert_eq!(arm.action_name, "/arm/move");
    }

    #[test]
    fn default_profile_tags_resolve_in_default_registry() {
        let profile = default_profile();
        let registry = ActionTypeRegistry::with_defaults();
        for (capability, _) in profile.capabilities.iter() {
            let binding = profile.binding(capability).expect("bound");
            assert!(
                registry.resolve(&binding.action_type).is_ok(),
                "{capability} binding resolves"
            );
        }
    }
}
