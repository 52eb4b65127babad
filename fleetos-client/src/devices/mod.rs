use anyhow::Result;

use crate::{
    session::{DirectoryApi, SessionCache},
    util::format,
};

/// Service names and statuses for a device, resolved through the session cache.
pub async fn service_summary(
    api: &dyn DirectoryApi,
    cache: &mut SessionCache,
    uuid: &str,
) -> Result<Vec<(String, Option<String>)>> {
    let installs = cache.device(api, uuid).await?.services.clone();
    let mut summary = Vec::with_capacity(installs.len());
    for install in installs {
        let name = cache.service_name(api, install.service_id).await?;
        summary.push((name, install.status));
    }
    Ok(summary)
}

pub async fn show(api: &dyn DirectoryApi, cache: &mut SessionCache, uuid: &str) -> Result<()> {
    let services = service_summary(api, cache, uuid).await?;
    let device = cache.device(api, uuid).await?;
    format::print_device(device, &services);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::FakeDirectory;

    #[tokio::test]
    async fn test_service_summary_resolves_names_once() {
        let api = FakeDirectory::default();
        let mut cache = SessionCache::new();

        let summary = service_summary(&api, &mut cache, "abc123").await.unwrap();
        assert_eq!(
            summary,
            vec![
                ("service-10".to_string(), Some("Running".to_string())),
                ("service-20".to_string(), Some("Running".to_string())),
            ]
        );

        show(&api, &mut cache, "abc123").await.unwrap();
        assert_eq!(api.device_calls.lock().unwrap().len(), 1);
        assert_eq!(api.service_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_show_unknown_device() {
        let api = FakeDirectory::default();
        let mut cache = SessionCache::new();
        let err = show(&api, &mut cache, "missing").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
