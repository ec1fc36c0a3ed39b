use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::auth::{self, AuthManager};
use crate::config::Config;
use crate::errors::ExpectedError;
use crate::events;
use crate::resolver::{CacheKeyMode, ResolutionCache, Resolver};
use crate::server::ApiClient;
use crate::tui;
use crate::util::logging::init_tracing;

#[derive(Parser)]
#[command(name = "fleet")]
#[command(
    version,
    about = "Command line client for the fleet device-management cloud",
    long_about = None
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an API token after checking it against the cloud
    Login {
        #[arg(short, long)]
        token: String,
    },

    /// Remove the stored API token
    Logout,

    /// Show the user the current token belongs to
    Whoami,

    /// List all applications
    Apps,

    /// List all devices
    Devices,

    /// Single device commands
    #[command(subcommand)]
    Device(DeviceCommands),

    /// Show the name of a service
    Service {
        /// Numeric service id
        id: u64,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum DeviceCommands {
    /// Show a device and, if accessible, its application
    Info {
        /// Device UUID, short or full
        uuid: String,
    },

    /// Show the application a device belongs to
    App {
        /// Device UUID, short or full
        uuid: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the active configuration
    Show,
    /// Change one setting and save it, e.g. `fleet config set analytics_enabled false`
    Set {
        /// Setting name, e.g. `api_url` or `resolver.selection_in_cache_key`
        key: String,
        value: String,
    },
    /// Clear all config from the system
    Clear,
}

impl Commands {
    /// Command template reported to analytics. Never includes argument values.
    fn signature(&self) -> &'static str {
        match self {
            Commands::Login { .. } => "login",
            Commands::Logout => "logout",
            Commands::Whoami => "whoami",
            Commands::Apps => "apps",
            Commands::Devices => "devices",
            Commands::Device(DeviceCommands::Info { .. }) => "device info <uuid>",
            Commands::Device(DeviceCommands::App { .. }) => "device app <uuid>",
            Commands::Service { .. } => "service <id>",
            Commands::Config(ConfigCommands::Show) => "config show",
            Commands::Config(ConfigCommands::Set { .. }) => "config set <key> <value>",
            Commands::Config(ConfigCommands::Clear) => "config clear",
            Commands::Version => "version",
        }
    }

    fn requires_login(&self) -> bool {
        !matches!(
            self,
            Commands::Login { .. } | Commands::Logout | Commands::Config(_) | Commands::Version
        )
    }

    /// Commands that only remove local state, and so must work when that
    /// state is broken.
    fn tolerates_broken_config(&self) -> bool {
        matches!(self, Commands::Logout | Commands::Config(ConfigCommands::Clear))
    }
}

/// The loaded config, or defaults plus the load error for commands that
/// tolerate an unreadable config file.
fn config_for(
    command: &Commands,
    loaded: Result<Config>,
) -> Result<(Config, Option<anyhow::Error>)> {
    match loaded {
        Ok(config) => Ok((config, None)),
        Err(e) if command.tolerates_broken_config() => Ok((Config::default(), Some(e))),
        Err(e) => Err(e),
    }
}

pub async fn cli() -> Result<()> {
    let cli = Cli::parse();
    let (config, load_error) = config_for(&cli.command, Config::load())?;

    init_tracing(if cli.debug { "debug" } else { config.log_level.as_str() });
    if let Some(e) = load_error {
        warn!("Ignoring unreadable config, using defaults: {:#}", e);
    }

    let token = if cli.command.requires_login() {
        Some(AuthManager::require_token()?)
    } else {
        AuthManager::get_token()?
    };
    let client = Arc::new(ApiClient::from_config(&config, token)?);

    if events::analytics_enabled(config.analytics_enabled) {
        events::track_command(&client, config.api_host(), cli.command.signature()).await;
    }

    let resolver = Resolver::new(client.clone(), Arc::new(ResolutionCache::new()))
        .with_key_mode(CacheKeyMode::from(&config.resolver));

    match cli.command {
        Commands::Login { token } => auth::login(&config, &token).await?,
        Commands::Logout => auth::logout().await?,
        Commands::Whoami => auth::whoami(&client).await?,
        Commands::Apps => {
            let apps = client.list_applications().await?;
            tui::devices::print_applications_table(&apps);
        }
        Commands::Devices => {
            let devices = client.list_devices().await?;
            tui::devices::print_devices_table(&devices);
        }
        Commands::Device(cmd) => match cmd {
            DeviceCommands::Info { uuid } => {
                let resolved = resolver
                    .resolve_device_and_maybe_app(&uuid, None, Some(&["id", "app_name", "slug"]))
                    .await?;
                tui::devices::print_device_info(&resolved.device, resolved.application.as_ref());
            }
            DeviceCommands::App { uuid } => {
                let resolved = resolver
                    .resolve_device_and_app(&uuid, Some(&["id", "uuid", "device_name"]), None)
                    .await?;
                println!(
                    "{} -> {} ({})",
                    resolved.device.short_uuid(),
                    resolved.application.display_name(),
                    resolved
                        .application
                        .id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        },
        Commands::Service { id } => match resolver.resolve_service_name(id).await? {
            Some(name) => println!("{}", name),
            None => return Err(ExpectedError::new(format!("Service not found: {}", id)).into()),
        },
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => println!("{}", serde_json::to_string_pretty(&config)?),
            ConfigCommands::Set { key, value } => {
                // env overrides must not end up in the file
                let mut stored = Config::load_stored()?;
                stored.set(&key, &value)?;
                stored.save()?;
            }
            ConfigCommands::Clear => Config::clear()?,
        },
        Commands::Version => {
            println!("fleet version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
