use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::GatewayError;

/// One resolvable action type: the dashboard-facing tag plus the binding
/// the bridge needs to reach the remote handler.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionTypeDescriptor {
    pub tag: String,
    /// Fully-qualified remote action type, e.g.
    /// `teleop_interfaces/action/ArmMove`.
    pub remote_type: String,
    /// Per-type override of the gateway's result timeout.
    #[serde(default)]
    pub result_timeout_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate action type tag `{0}`")]
    Duplicate(String),
    #[error("action type `{0}` has an empty tag or remote type")]
    EmptyField(String),
    #[error("failed to read registry config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse registry config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Deserialize)]
struct RegistryConfig {
    #[serde(default)]
    action_types: Vec<ActionTypeDescriptor>,
}

/// Startup-validated map from action type tags to remote bindings.
///
/// Tag resolution happens here, once, with an explicit unknown-tag error
/// path; the gateway never reflects on payloads to guess a type.
#[derive(Debug, Clone, Default)]
pub struct ActionTypeRegistry {
    entries: HashMap<String, ActionTypeDescriptor>,
}

impl ActionTypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Built-in bindings covering the stock robot capabilities. A config
    /// file extends or overrides these per deployment.
    pub fn with_defaults() -> Self {
        let mut builder = RegistryBuilder::default();
        for (tag, remote_type) in [
            ("ArmMove", "teleop_interfaces/action/ArmMove"),
            ("ArmPreset", "teleop_interfaces/action/ArmPreset"),
            ("HeadPose", "teleop_interfaces/action/HeadPose"),
            ("BaseDrive", "teleop_interfaces/action/BaseDrive"),
            ("GripperCommand", "teleop_interfaces/action/GripperCommand"),
            ("SpeechSay", "teleop_interfaces/action/SpeechSay"),
            ("BehaviorPlay", "teleop_interfaces/action/BehaviorPlay"),
        ] {
            builder
                .register(ActionTypeDescriptor {
                    tag: tag.to_string(),
                    remote_type: remote_type.to_string(),
                    result_timeout_ms: None,
                })
                .expect("built-in registry entries are valid");
        }
        builder.build()
    }

    /// Defaults merged with `[[action_types]]` entries from a TOML file.
    /// Config entries win over the built-ins for the same tag.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RegistryError> {
        let config: RegistryConfig = toml::from_str(text)?;
        let mut registry = Self::with_defaults();
        for descriptor in config.action_types {
            if descriptor.tag.trim().is_empty() || descriptor.remote_type.trim().is_empty() {
                return Err(RegistryError::EmptyField(descriptor.tag));
            }
            registry.entries.insert(descriptor.tag.clone(), descriptor);
        }
        Ok(registry)
    }

    pub fn resolve(&self, tag: &str) -> Result<&ActionTypeDescriptor, GatewayError> {
        self.entries
            .get(tag)
            .ok_or_else(|| GatewayError::UnresolvableType(tag.to_string()))
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, ActionTypeDescriptor>,
}

impl RegistryBuilder {
    /// Register one descriptor. Duplicates and empty fields are rejected
    /// here so a bad registry fails at startup, not at call time.
    pub fn register(&mut self, descriptor: ActionTypeDescriptor) -> Result<&mut Self, RegistryError> {
        if descriptor.tag.trim().is_empty() || descriptor.remote_type.trim().is_empty() {
            return Err(RegistryError::EmptyField(descriptor.tag));
        }
        if self.entries.contains_key(&descriptor.tag) {
            return Err(RegistryError::Duplicate(descriptor.tag));
        }
        self.entries.insert(descriptor.tag.clone(), descriptor);
        Ok(self)
    }

    pub fn build(self) -> ActionTypeRegistry {
        ActionTypeRegistry {
            entries: self.entries,
        }
    }
}
