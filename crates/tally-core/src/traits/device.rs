use crate::constants::{property_keys, LIB_NAME, VERSION};
use crate::network::NetworkType;
use crate::value::{Properties, Value};

/// Device and context collaborator, consulted for every event build.
pub trait DeviceInfo: Send + Sync {
    /// Environment-derived properties (lowest enrichment precedence).
    fn preset_properties(&self) -> Properties;

    /// A stable device identifier, if the host has one.
    fn device_id(&self) -> Option<String>;

    /// The network the host is currently on.
    fn network_type(&self) -> NetworkType;
}

/// Device info for hosts without a platform probe: library and OS presets,
/// no device id, and a fixed network type.
#[derive(Debug, Clone)]
pub struct StaticDeviceInfo {
    presets: Properties,
    device_id: Option<String>,
    network: NetworkType,
}

impl StaticDeviceInfo {
    pub fn new() -> Self {
        let mut presets = Properties::new();
        presets.insert(property_keys::LIB.to_string(), Value::from(LIB_NAME));
        presets.insert(property_keys::LIB_VERSION.to_string(), Value::from(VERSION));
        presets.insert(
            property_keys::OS.to_string(),
            Value::from(std::env::consts::OS),
        );
        Self {
            presets,
            device_id: None,
            network: NetworkType::WIFI,
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_network(mut self, network: NetworkType) -> Self {
        self.network = network;
        self
    }

    pub fn with_preset(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.presets.insert(key.into(), value.into());
        self
    }
}

impl Default for StaticDeviceInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceInfo for StaticDeviceInfo {
    fn preset_properties(&self) -> Properties {
        self.presets.clone()
    }

    fn device_id(&self) -> Option<String> {
        self.device_id.clone()
    }

    fn network_type(&self) -> NetworkType {
        self.network
    }
}
