use serde::{Deserialize, Serialize};

/// Release track of an OS image.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    #[default]
    Default,
    Esr,
}

impl OsType {
    pub fn for_esr(esr: bool) -> Self {
        if esr { OsType::Esr } else { OsType::Default }
    }
}

/// Catalog entry as returned by the platform API.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteOsVersion {
    pub raw_version: String,
    /// Upstream label, e.g. `"v2.88.4 (recommended)"`.
    pub formatted_version: String,
    #[serde(default)]
    pub os_type: OsType,
    #[serde(default)]
    pub is_recommended: bool,
}

/// Normalized catalog entry handed to the CLI.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OsVersion {
    pub raw_version: String,
    pub formatted_version: String,
    pub os_type: OsType,
    pub is_recommended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_os_version_defaults() {
        let json = r#"{"raw_version":"2.88.4.prod","formatted_version":"v2.88.4"}"#;
        let v: RemoteOsVersion = serde_json::from_str(json).unwrap();
        assert_eq!(v.os_type, OsType::Default);
        assert!(!v.is_recommended);
    }

    #[test]
    fn test_os_type_lowercase() {
        let v: OsType = serde_json::from_str("\"esr\"").unwrap();
        assert_eq!(v, OsType::Esr);
        assert_eq!(OsType::for_esr(false), OsType::Default);
    }
}
