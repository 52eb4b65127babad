use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Device {
    pub id: u64,
    pub uuid: String,
    pub device_name: String,
    pub device_type: String,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub last_connectivity_event: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceInstall>,
}

/// A service running on a device, as reported by the device state endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceInstall {
    pub service_id: u64,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Service {
    pub id: u64,
    pub service_name: String,
}
