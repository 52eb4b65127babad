//! `fleetos os ...` command handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::{
    TransferOptions,
    catalog::VersionCatalog,
    download::ImageFetchPipeline,
    picker::{InteractiveVersionPicker, TerminalPrompt},
    resolve::VersionResolver,
};
use crate::{config::Config, server::ApiClient, util::format, util::progress::TerminalProgress};

pub async fn versions(config: &Config, device_type: &str, esr: bool) -> Result<()> {
    let api = Arc::new(ApiClient::from_config(config)?);
    let versions = VersionCatalog::new(api).fetch(device_type, esr).await?;
    format::print_os_versions(device_type, esr, &versions);
    Ok(())
}

pub async fn download(
    config: &Config,
    device_type: &str,
    output: &Path,
    version: Option<&str>,
) -> Result<()> {
    let api = Arc::new(ApiClient::from_config(config)?);
    let picker = InteractiveVersionPicker::new(
        VersionCatalog::new(api.clone()),
        Arc::new(TerminalPrompt),
    );
    let pipeline = ImageFetchPipeline::new(
        VersionResolver::new(picker),
        api,
        TransferOptions {
            flush_mode: config.download.flush_mode,
        },
    );

    let mut progress = TerminalProgress::new();
    let outcome = pipeline
        .download(device_type, output, version, &mut progress)
        .await?;
    println!(
        "The image was downloaded to {} (version {})",
        outcome.output.display(),
        outcome.version
    );
    Ok(())
}
