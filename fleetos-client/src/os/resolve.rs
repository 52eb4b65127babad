use tracing::debug;

use super::{OsError, picker::InteractiveVersionPicker};

pub const DEFAULT_VERSION: &str = "default";
pub const MENU: &str = "menu";
pub const MENU_ESR: &str = "menu-esr";

/// A `--version` token for one device type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequest {
    pub device_type: String,
    /// `None` when no usable token was given.
    pub token: Option<String>,
}

impl VersionRequest {
    /// Empty or whitespace-only tokens count as absent.
    pub fn new(device_type: impl Into<String>, token: Option<&str>) -> Self {
        Self {
            device_type: device_type.into(),
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        }
    }
}

pub struct VersionResolver {
    picker: InteractiveVersionPicker,
}

impl VersionResolver {
    pub fn new(picker: InteractiveVersionPicker) -> Self {
        Self { picker }
    }

    /// Turns a token into the version string sent to the image store.
    ///
    /// Only `menu` and `menu-esr` touch the catalog. Everything else, semver ranges
    /// included, is normalized locally and matched by the image store.
    pub async fn resolve(&self, device_type: &str, token: &str) -> Result<String, OsError> {
        if token == MENU || token == MENU_ESR {
            return self.picker.pick(device_type, token == MENU_ESR).await;
        }
        let version = normalize_version(token);
        debug!("resolved version token '{}' to '{}'", token, version);
        Ok(version)
    }

    /// Resolves a given token. Without one the store receives [`DEFAULT_VERSION`]
    /// verbatim, with no suffix.
    pub async fn resolve_request(&self, request: &VersionRequest) -> Result<String, OsError> {
        match &request.token {
            Some(token) => self.resolve(&request.device_type, token).await,
            None => Ok(DEFAULT_VERSION.to_string()),
        }
    }
}

/// Strips one leading `v` and appends `.prod` unless the token already ends in
/// `.dev` or `.prod`.
///
/// Keywords are not special here: `latest` becomes `latest.prod`.
pub fn normalize_version(token: &str) -> String {
    let version = token.strip_prefix('v').unwrap_or(token);
    if version.ends_with(".dev") || version.ends_with(".prod") {
        version.to_string()
    } else {
        format!("{version}.prod")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::os::catalog::VersionCatalog;
    use crate::os::picker::tests::AcceptDefault;
    use crate::os::testing::{StaticCatalog, remote};
    use fleetos_shared::os::OsType;

    fn resolver(catalog: Arc<StaticCatalog>) -> VersionResolver {
        let picker = InteractiveVersionPicker::new(
            VersionCatalog::new(catalog),
            Arc::new(AcceptDefault::default()),
        );
        VersionResolver::new(picker)
    }

    fn catalog() -> Arc<StaticCatalog> {
        Arc::new(StaticCatalog::new(
            "raspberrypi3",
            vec![
                remote("A", "vA", OsType::Default, false),
                remote("B", "vB (recommended)", OsType::Default, true),
                remote("E1", "vE1", OsType::Esr, false),
                remote("E2", "vE2", OsType::Esr, false),
            ],
        ))
    }

    #[test]
    fn test_normalize_strips_v_and_appends_prod() {
        assert_eq!(normalize_version("v2.60.1+rev1"), "2.60.1+rev1.prod");
        assert_eq!(normalize_version("2.60.1"), "2.60.1.prod");
    }

    #[test]
    fn test_normalize_keeps_existing_suffix() {
        assert_eq!(normalize_version("2.60.1+rev1.dev"), "2.60.1+rev1.dev");
        assert_eq!(normalize_version("v2.60.1.prod"), "2.60.1.prod");
    }

    #[test]
    fn test_normalize_strips_only_one_v() {
        assert_eq!(normalize_version("vv1.0"), "v1.0.prod");
    }

    #[test]
    fn test_normalize_keywords_are_suffixed() {
        assert_eq!(normalize_version("latest"), "latest.prod");
        assert_eq!(normalize_version("default"), "default.prod");
        assert_eq!(normalize_version("recommended"), "recommended.prod");
    }

    #[test]
    fn test_normalize_passes_ranges_through() {
        assert_eq!(normalize_version("^2.88.0"), "^2.88.0.prod");
        assert_eq!(normalize_version(">=2.80.0"), ">=2.80.0.prod");
    }

    #[test]
    fn test_normalize_always_ends_in_one_suffix() {
        for token in ["1", "v1.2.3", "1.2.3+rev4", "latest", "~2.1"] {
            let out = normalize_version(token);
            assert!(out.ends_with(".prod") || out.ends_with(".dev"), "{out}");
            assert!(!out.ends_with(".prod.prod"), "{out}");
        }
    }

    #[test]
    fn test_request_treats_empty_token_as_absent() {
        assert_eq!(VersionRequest::new("rpi", None).token, None);
        assert_eq!(VersionRequest::new("rpi", Some("")).token, None);
        assert_eq!(VersionRequest::new("rpi", Some("  ")).token, None);
        assert_eq!(
            VersionRequest::new("rpi", Some(" v1.0 ")).token.as_deref(),
            Some("v1.0")
        );
    }

    #[tokio::test]
    async fn test_resolve_request_without_token_sends_default_verbatim() {
        let catalog = catalog();
        let resolver = resolver(catalog.clone());
        for token in [None, Some(""), Some("   ")] {
            let request = VersionRequest::new("raspberrypi3", token);
            assert_eq!(resolver.resolve_request(&request).await.unwrap(), "default");
        }
        assert_eq!(catalog.calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_request_with_default_keyword_is_suffixed() {
        let resolver = resolver(catalog());
        let request = VersionRequest::new("raspberrypi3", Some("default"));
        assert_eq!(
            resolver.resolve_request(&request).await.unwrap(),
            "default.prod"
        );
    }

    #[tokio::test]
    async fn test_resolve_menu_selects_recommended() {
        let catalog = catalog();
        let resolver = resolver(catalog.clone());
        assert_eq!(resolver.resolve("raspberrypi3", "menu").await.unwrap(), "B");
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_menu_esr_uses_esr_track() {
        let resolver = resolver(catalog());
        assert_eq!(
            resolver.resolve("raspberrypi3", "menu-esr").await.unwrap(),
            "E1"
        );
    }

    #[tokio::test]
    async fn test_resolve_exact_skips_catalog() {
        let catalog = catalog();
        let resolver = resolver(catalog.clone());
        let request = VersionRequest::new("raspberrypi3", Some("v2.60.1+rev1"));
        assert_eq!(
            resolver.resolve_request(&request).await.unwrap(),
            "2.60.1+rev1.prod"
        );
        assert_eq!(catalog.calls(), 0);
    }
}
