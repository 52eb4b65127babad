//! OS image lookup and download.
//!
//! The pieces stack as follows:
//! - [`catalog`] queries the platform for the versions published for a device type
//! - [`resolve`] turns a `--version` token into one concrete version string
//! - [`picker`] shows the catalog as a menu when the token asks for it
//! - [`download`] streams the image to disk, extracting zip payloads via [`unzip`]
//!
//! Remote access goes through the [`CatalogSource`] and [`ImageStore`] traits so the
//! HTTP client in `server.rs` and the test doubles are interchangeable.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use fleetos_shared::{config::FlushMode, os::RemoteOsVersion};
use thiserror::Error;

pub mod catalog;
pub mod commands;
pub mod download;
pub mod picker;
pub mod resolve;
pub mod unzip;

pub const ZIP_MIME: &str = "application/zip";

#[derive(Debug, Error)]
pub enum OsError {
    #[error("No versions found for device type '{device_type}'. Is the device type valid?")]
    NoVersionsFound { device_type: String },

    #[error("Failed to fetch OS versions: {0}")]
    Catalog(String),

    #[error("Version selection was cancelled")]
    PromptCancelled,

    #[error("Version prompt failed: {0}")]
    Prompt(String),

    #[error("Failed to open image stream: {0}")]
    StreamOpen(String),

    #[error("Image transfer failed: {0}")]
    Transfer(String),

    #[error("Image extraction failed: {0}")]
    Decompression(String),
}

/// Byte counts reported while an image is streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    pub received: u64,
    pub total: Option<u64>,
}

/// One read from an open image stream.
///
/// A well-behaved stream yields exactly one `ResolvedVersion` first, then any mix of
/// `Progress` and `Data`, and finally `End`.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageEvent {
    ResolvedVersion(String),
    Progress(Option<ProgressState>),
    Data(Bytes),
    End,
}

impl ImageEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ImageEvent::ResolvedVersion(_) => "resolved-version",
            ImageEvent::Progress(_) => "progress",
            ImageEvent::Data(_) => "data",
            ImageEvent::End => "end",
        }
    }
}

/// Per-transfer knobs handed down to the store and the extraction stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
    pub flush_mode: FlushMode,
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Published OS versions, keyed by device type.
    async fn available_os_versions(
        &self,
        device_types: &[String],
    ) -> Result<HashMap<String, Vec<RemoteOsVersion>>, OsError>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn open(
        &self,
        device_type: &str,
        version: &str,
        options: &TransferOptions,
    ) -> Result<Box<dyn ImageStream>, OsError>;
}

#[async_trait]
pub trait ImageStream: Send {
    /// Declared content type, known as soon as the stream is open.
    fn mime(&self) -> Option<&str>;

    async fn next_event(&mut self) -> Result<ImageEvent, OsError>;
}

/// Receives download progress for rendering.
pub trait ProgressObserver: Send {
    /// Called once, after the resolved version is known and before any progress.
    fn start(&mut self, version: &str);

    /// `None` means the transfer size is unknown.
    fn update(&mut self, state: Option<&ProgressState>);

    fn finish(&mut self);

    fn abandon(&mut self);
}
