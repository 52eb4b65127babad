use std::sync::Arc;

use fleetos_shared::os::{OsType, OsVersion};
use tracing::debug;

use super::{CatalogSource, OsError};

/// Published OS versions for a device type, split into the default and ESR tracks.
#[derive(Clone)]
pub struct VersionCatalog {
    source: Arc<dyn CatalogSource>,
}

impl VersionCatalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    /// Versions of one track, in the order the platform lists them.
    ///
    /// Fails with [`OsError::NoVersionsFound`] when the track is empty, which usually
    /// means the device type does not exist.
    pub async fn fetch(&self, device_type: &str, esr: bool) -> Result<Vec<OsVersion>, OsError> {
        let os_type = OsType::for_esr(esr);
        let mut all = self
            .source
            .available_os_versions(&[device_type.to_string()])
            .await?;

        let versions: Vec<OsVersion> = all
            .remove(device_type)
            .unwrap_or_default()
            .into_iter()
            .filter(|v| v.os_type == os_type)
            .map(|v| OsVersion {
                formatted_version: format_version(&v.raw_version, &v.formatted_version),
                raw_version: v.raw_version,
                os_type: v.os_type,
                is_recommended: v.is_recommended,
            })
            .collect();

        debug!(
            "{} {:?} versions available for {}",
            versions.len(),
            os_type,
            device_type
        );

        if versions.is_empty() {
            return Err(OsError::NoVersionsFound {
                device_type: device_type.to_string(),
            });
        }
        Ok(versions)
    }
}

/// Display label for a version: `v<raw>` followed by whatever the upstream label
/// carries after its first space (release name, recommendation note).
pub fn format_version(raw_version: &str, upstream_label: &str) -> String {
    match upstream_label.find(' ') {
        Some(idx) => format!("v{}{}", raw_version, &upstream_label[idx..]),
        None => format!("v{}", raw_version),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::testing::{StaticCatalog, remote};

    fn catalog() -> VersionCatalog {
        VersionCatalog::new(Arc::new(StaticCatalog::new(
            "raspberrypi4-64",
            vec![
                remote("2.88.4.prod", "v2.88.4 (recommended)", OsType::Default, true),
                remote("2022.10.1.prod", "v2022.10.1", OsType::Esr, false),
                remote("2.85.2.dev", "v2.85.2.dev", OsType::Default, false),
                remote("2022.7.0.prod", "v2022.7.0 (Jul)", OsType::Esr, false),
            ],
        )))
    }

    #[test]
    fn test_format_version_without_annotation() {
        assert_eq!(format_version("2.88.4.prod", "v2.88.4"), "v2.88.4.prod");
    }

    #[test]
    fn test_format_version_keeps_annotation() {
        assert_eq!(
            format_version("2.88.4.prod", "v2.88.4 (recommended)"),
            "v2.88.4.prod (recommended)"
        );
        assert_eq!(
            format_version("2.88.4.prod", "v2.88.4 codename extra"),
            "v2.88.4.prod codename extra"
        );
    }

    #[tokio::test]
    async fn test_fetch_filters_default_track() {
        let versions = catalog().fetch("raspberrypi4-64", false).await.unwrap();
        let raws: Vec<_> = versions.iter().map(|v| v.raw_version.as_str()).collect();
        assert_eq!(raws, vec!["2.88.4.prod", "2.85.2.dev"]);
        assert!(versions.iter().all(|v| v.os_type == OsType::Default));
        assert!(versions.iter().all(|v| v.formatted_version.starts_with('v')));
        assert_eq!(versions[0].formatted_version, "v2.88.4.prod (recommended)");
    }

    #[tokio::test]
    async fn test_fetch_filters_esr_track() {
        let versions = catalog().fetch("raspberrypi4-64", true).await.unwrap();
        let raws: Vec<_> = versions.iter().map(|v| v.raw_version.as_str()).collect();
        assert_eq!(raws, vec!["2022.10.1.prod", "2022.7.0.prod"]);
        assert_eq!(versions[1].formatted_version, "v2022.7.0.prod (Jul)");
    }

    #[tokio::test]
    async fn test_fetch_unknown_device_type() {
        let err = catalog().fetch("toaster", false).await.unwrap_err();
        match err {
            OsError::NoVersionsFound { device_type } => assert_eq!(device_type, "toaster"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_empty_track() {
        let catalog = VersionCatalog::new(Arc::new(StaticCatalog::new(
            "intel-nuc",
            vec![remote("2.88.4.prod", "v2.88.4", OsType::Default, false)],
        )));
        let err = catalog.fetch("intel-nuc", true).await.unwrap_err();
        assert!(matches!(err, OsError::NoVersionsFound { .. }));
        assert!(err.to_string().contains("intel-nuc"));
    }
}
