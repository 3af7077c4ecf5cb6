//! Command implementations for the shellyctl CLI

pub mod list;
pub mod upgrade;

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use shellyota_service::config::{load_user_config, user_config_path};
use shellyota_service::{OtaService, OtaServiceConfig};
use tracing::debug;

use crate::error::CliError;

/// Flags shared by every subcommand.
#[derive(Args, Debug)]
pub struct SharedArgs {
    /// Include beta firmwares in the list of available updates
    #[arg(long, global = true)]
    pub beta: bool,

    /// Set the search domain for the local network
    #[arg(long, global = true, default_value = "local")]
    pub domain: String,

    /// Use device IP address(es) instead of device discovery (can be
    /// specified multiple times or be comma-separated)
    #[arg(long = "device", value_name = "HOST[:PORT]", global = true, value_delimiter = ',')]
    pub devices: Vec<String>,

    /// Exclude devices matching glob pattern(s) (can be specified
    /// multiple times or be comma-separated)
    #[arg(long = "exclude", value_name = "GLOB", global = true, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// HTTP port to listen for OTA requests. If not specified, a random
    /// port is chosen
    #[arg(short = 'p', long, global = true, default_value_t = 0)]
    pub http_port: u16,

    /// Output results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Only include devices matching model name(s) (can be specified
    /// multiple times or be comma-separated)
    #[arg(long = "model", value_name = "MODEL", global = true, value_delimiter = ',')]
    pub models: Vec<String>,

    /// Global password for device authentication (fallback when no
    /// .netrc entry exists)
    #[arg(long, global = true, default_value = "")]
    pub password: String,

    /// Additional subnet(s) to scan in CIDR notation
    /// (e.g. 192.168.100.0/24)
    #[arg(long = "subnet", value_name = "CIDR", global = true, value_delimiter = ',')]
    pub subnets: Vec<String>,

    /// Global username for device authentication (fallback when no
    /// .netrc entry exists)
    #[arg(long, global = true, default_value = "")]
    pub username: String,

    /// Duration in [s] to run discovery
    #[arg(short = 'w', long, global = true, default_value_t = 60)]
    pub wait: u64,

    /// Enable verbose mode
    #[arg(long, global = true)]
    pub verbose: bool,
}

/// Builds the orchestrator from the parsed flags.
pub async fn build_service(shared: &SharedArgs, force: bool) -> Result<OtaService> {
    let (username, password) = resolve_default_credentials(shared)?;

    let config = OtaServiceConfig::new()
        .with_beta_versions(shared.beta)
        .with_domain(shared.domain.clone())
        .with_devices(shared.devices.clone())
        .with_exclude_filter(shared.exclude.clone())
        .with_forced_upgrades(force)
        .with_model_filter(shared.models.clone())
        .with_password(password)
        .with_server_port(shared.http_port)
        .with_subnets(shared.subnets.clone())
        .with_username(username)
        .with_wait_time(Duration::from_secs(shared.wait));

    Ok(OtaService::new(config).await?)
}

/// Credentials from the flags, falling back to the user configuration
/// file when neither flag is set.
fn resolve_default_credentials(shared: &SharedArgs) -> Result<(String, String)> {
    if !shared.username.is_empty() || !shared.password.is_empty() {
        return Ok((shared.username.clone(), shared.password.clone()));
    }

    let Some(path) = user_config_path() else {
        return Ok((String::new(), String::new()));
    };

    match load_user_config(&path) {
        Ok(Some(config)) => {
            debug!("Using default credentials from {}", path.display());
            Ok((
                config.global.credentials.username,
                config.global.credentials.password,
            ))
        }
        Ok(None) => Ok((String::new(), String::new())),
        Err(err) => Err(CliError::InvalidConfiguration(err.to_string()).into()),
    }
}
