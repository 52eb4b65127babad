//! Lookups memoized for the lifetime of one CLI invocation.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use fleetos_shared::device::{Device, Service};
use tracing::debug;

#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn device_by_uuid(&self, uuid: &str) -> Result<Device>;

    async fn service_by_id(&self, service_id: u64) -> Result<Service>;
}

/// Caches devices by UUID and service names by service id.
///
/// Entries are never invalidated; create a new cache per command run. Failed
/// lookups are not cached.
#[derive(Default)]
pub struct SessionCache {
    devices: HashMap<String, Device>,
    service_names: HashMap<u64, String>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn device(&mut self, api: &dyn DirectoryApi, uuid: &str) -> Result<&Device> {
        if !self.devices.contains_key(uuid) {
            debug!("fetching device {}", uuid);
            let device = api.device_by_uuid(uuid).await?;
            self.devices.insert(uuid.to_string(), device);
        }
        Ok(&self.devices[uuid])
    }

    pub async fn service_name(&mut self, api: &dyn DirectoryApi, service_id: u64) -> Result<String> {
        if let Some(name) = self.service_names.get(&service_id) {
            return Ok(name.clone());
        }
        debug!("fetching service {}", service_id);
        let service = api.service_by_id(service_id).await?;
        self.service_names
            .insert(service_id, service.service_name.clone());
        Ok(service.service_name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;

    #[derive(Default)]
    pub struct FakeDirectory {
        pub device_calls: Mutex<Vec<String>>,
        pub service_calls: Mutex<Vec<u64>>,
    }

    pub fn device(uuid: &str, services: &[u64]) -> Device {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "uuid": uuid,
            "device_name": "quiet-forest",
            "device_type": "raspberrypi4-64",
            "is_online": true,
            "os_version": "2.88.4.prod",
            "services": services
                .iter()
                .map(|id| serde_json::json!({ "service_id": id, "status": "Running" }))
                .collect::<Vec<_>>(),
        }))
        .unwrap()
    }

    #[async_trait]
    impl DirectoryApi for FakeDirectory {
        async fn device_by_uuid(&self, uuid: &str) -> Result<Device> {
            self.device_calls.lock().unwrap().push(uuid.to_string());
            if uuid == "missing" {
                return Err(anyhow!("Device '{}' not found", uuid));
            }
            Ok(device(uuid, &[10, 20]))
        }

        async fn service_by_id(&self, service_id: u64) -> Result<Service> {
            self.service_calls.lock().unwrap().push(service_id);
            Ok(Service {
                id: service_id,
                service_name: format!("service-{service_id}"),
            })
        }
    }

    #[tokio::test]
    async fn test_device_lookup_is_memoized() {
        let api = FakeDirectory::default();
        let mut cache = SessionCache::new();

        assert_eq!(cache.device(&api, "abc123").await.unwrap().uuid, "abc123");
        assert_eq!(cache.device(&api, "abc123").await.unwrap().uuid, "abc123");
        cache.device(&api, "def456").await.unwrap();

        assert_eq!(*api.device_calls.lock().unwrap(), vec!["abc123", "def456"]);
    }

    #[tokio::test]
    async fn test_service_name_lookup_is_memoized() {
        let api = FakeDirectory::default();
        let mut cache = SessionCache::new();

        assert_eq!(cache.service_name(&api, 10).await.unwrap(), "service-10");
        assert_eq!(cache.service_name(&api, 10).await.unwrap(), "service-10");
        assert_eq!(cache.service_name(&api, 20).await.unwrap(), "service-20");

        assert_eq!(*api.service_calls.lock().unwrap(), vec![10, 20]);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_cached() {
        let api = FakeDirectory::default();
        let mut cache = SessionCache::new();

        assert!(cache.device(&api, "missing").await.is_err());
        assert!(cache.device(&api, "missing").await.is_err());
        assert_eq!(api.device_calls.lock().unwrap().len(), 2);
    }
}
