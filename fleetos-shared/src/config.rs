use serde::{Deserialize, Serialize};

/// How the inflater is driven while a compressed image is being extracted.
///
/// `NoFlush` lets the decoder buffer freely and only emit output once it has
/// enough input; `SyncFlush` asks it to emit everything decodable after every
/// chunk. Some image servers produce archives that are silently truncated when
/// extracted with sync flushing, hence the default.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FlushMode {
    #[default]
    NoFlush,
    SyncFlush,
}

impl FlushMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushMode::NoFlush => "no-flush",
            FlushMode::SyncFlush => "sync-flush",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DownloadSettings {
    #[serde(default)]
    pub flush_mode: FlushMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_mode_defaults_to_no_flush() {
        assert_eq!(FlushMode::default(), FlushMode::NoFlush);
        assert_eq!(DownloadSettings::default().flush_mode, FlushMode::NoFlush);
    }

    #[test]
    fn test_flush_mode_kebab_case() {
        let json = serde_json::to_string(&FlushMode::SyncFlush).unwrap();
        assert_eq!(json, "\"sync-flush\"");
        let parsed: DownloadSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.flush_mode, FlushMode::NoFlush);
    }
}
