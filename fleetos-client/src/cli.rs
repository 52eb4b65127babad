use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config;
use crate::devices;
use crate::os;
use crate::server::ApiClient;
use crate::session::SessionCache;
use crate::util::logging;

#[derive(Parser)]
#[command(name = "fleetos")]
#[command(version, about = "Manage devices and download OS images from the fleetos platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// OS image commands
    #[command(subcommand)]
    Os(OsCommands),

    /// Download an OS image (same as `os download`)
    Download(DownloadArgs),

    /// Show a device and its services
    Device {
        /// Device UUID
        uuid: String,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum OsCommands {
    /// List the OS versions available for a device type
    Versions {
        /// Device type slug, e.g. raspberrypi4-64
        device_type: String,

        /// List extended support releases instead
        #[arg(long)]
        esr: bool,
    },

    /// Download an OS image for a device type
    Download(DownloadArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Device type slug, e.g. raspberrypi4-64
    device_type: String,

    /// Output path. Zip images are extracted into this directory
    #[arg(short, long)]
    output: PathBuf,

    /// Exact version (e.g. v2.88.4, 2.88.4.dev), semver range, or one of
    /// latest, default, recommended, menu, menu-esr
    #[arg(long)]
    version: Option<String>,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the active configuration
    Show,
    /// Clear all config from the system
    Clear,
}

pub async fn cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("fleetos version {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Config(ConfigCommands::Clear) => {
            config::Config::clear()?;
            println!("Configuration cleared");
            return Ok(());
        }
        _ => {}
    }

    let config = config::Config::load()?;
    logging::init_tracing(&config.log_level);

    match cli.command {
        Commands::Os(OsCommands::Versions { device_type, esr }) => {
            os::commands::versions(&config, &device_type, esr).await?
        }
        Commands::Os(OsCommands::Download(args)) | Commands::Download(args) => {
            os::commands::download(
                &config,
                &args.device_type,
                &args.output,
                args.version.as_deref(),
            )
            .await?
        }
        Commands::Device { uuid } => {
            let api = ApiClient::from_config(&config)?;
            let mut cache = SessionCache::new();
            devices::show(&api, &mut cache, &uuid).await?
        }
        Commands::Config(ConfigCommands::Show) => {
            let mut shown = config.clone();
            if shown.api_token.is_some() {
                shown.api_token = Some("********".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        Commands::Config(ConfigCommands::Clear) | Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "fleetos",
            "os",
            "download",
            "raspberrypi4-64",
            "-o",
            "rpi.img",
            "--version",
            "menu-esr",
        ])
        .unwrap();
        match cli.command {
            Commands::Os(OsCommands::Download(args)) => {
                assert_eq!(args.device_type, "raspberrypi4-64");
                assert_eq!(args.output, PathBuf::from("rpi.img"));
                assert_eq!(args.version.as_deref(), Some("menu-esr"));
            }
            _ => panic!("expected os download"),
        }
    }

    #[test]
    fn test_parse_top_level_download_without_version() {
        let cli =
            Cli::try_parse_from(["fleetos", "download", "intel-nuc", "--output", "nuc.img"])
                .unwrap();
        match cli.command {
            Commands::Download(args) => assert!(args.version.is_none()),
            _ => panic!("expected download"),
        }
    }

    #[test]
    fn test_download_requires_output() {
        assert!(Cli::try_parse_from(["fleetos", "download", "intel-nuc"]).is_err());
    }

    #[test]
    fn test_parse_versions_esr() {
        let cli = Cli::try_parse_from(["fleetos", "os", "versions", "intel-nuc", "--esr"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Os(OsCommands::Versions { esr: true, .. })
        ));
    }
}
