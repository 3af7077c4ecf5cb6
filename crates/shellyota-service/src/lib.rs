//! Upgrade orchestration
//!
//! [`OtaService`] ties the pieces together: it launches the transient
//! OTA file server, discovers devices, resolves the firmware each one
//! should run (honouring the mandatory stepping-stone policy), and
//! drives the multi-pass upgrade loop: download, per-device handler,
//! OTA trigger, completion wait and post-upgrade verification.
//!
//! The service owns the device index; parallel upgrade cohorts only read
//! cloned device values, so no locking is needed around the index.

#![deny(unused_must_use, clippy::unwrap_used)]
#![warn(rust_2018_idioms)]

pub mod config;
mod error;

pub use error::ServiceError;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dialoguer::{Confirm, Select};
use globset::{Glob, GlobSet, GlobSetBuilder};
use reqwest::Client;
use serde::Serialize;
use shellyota_catalog::{CatalogClient, CatalogConfig, CatalogError};
use shellyota_device::{
    extract_semantic_version, is_version_less_than, needs_manual_upgrade, needs_stepping_stone,
    Device, Gen1Settings, Gen2Settings,
};
use shellyota_discovery::{Browser, BrowserConfig};
use shellyota_server::OtaServer;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A specialized `Result` type for orchestration operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// How long a device has to pull its firmware after the OTA trigger.
const OTA_COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);
/// Timeout for verification polls against the device.
const VERIFY_POLL_TIMEOUT: Duration = Duration::from_secs(5);
/// Backoff schedule for post-upgrade verification.
const VERIFY_DELAYS: [Duration; 5] = [
    Duration::from_secs(10),
    Duration::from_secs(10),
    Duration::from_secs(15),
    Duration::from_secs(15),
    Duration::from_secs(30),
];

/// Configuration for the orchestrator, mirroring the CLI surface.
///
/// Built once via the `with_*` methods and never mutated afterwards.
#[derive(Default)]
pub struct OtaServiceConfig {
    beta: bool,
    domain: Option<String>,
    exclude: Vec<String>,
    force: bool,
    hosts: Vec<String>,
    http_port: u16,
    models: Vec<String>,
    password: String,
    subnets: Vec<String>,
    username: String,
    wait_time: Option<Duration>,
    catalog: Option<Arc<CatalogClient>>,
    download_dir: Option<PathBuf>,
}

impl OtaServiceConfig {
    /// Creates an empty configuration; all options default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable beta channel firmware where available.
    pub fn with_beta_versions(mut self, beta: bool) -> Self {
        self.beta = beta;
        self
    }

    /// Override the mDNS search domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Use explicit device addresses instead of discovery.
    pub fn with_devices(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    /// Exclude devices matching any of the glob patterns.
    pub fn with_exclude_filter(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    /// Skip interactive confirmation prompts.
    pub fn with_forced_upgrades(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Restrict operations to the given model names.
    pub fn with_model_filter(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Global fallback password for device authentication.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Port for the OTA HTTP server; 0 picks a random free port.
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Additional subnets to scan during discovery.
    pub fn with_subnets(mut self, subnets: Vec<String>) -> Self {
        self.subnets = subnets;
        self
    }

    /// Global fallback username for device authentication.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// How long mDNS discovery runs.
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = Some(wait_time);
        self
    }

    /// Inject a pre-configured catalog client (tests, alternate origins).
    pub fn with_catalog_client(mut self, catalog: Arc<CatalogClient>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Override the firmware download directory.
    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = Some(dir);
        self
    }
}

/// Per-device upgrade status for `list` output.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    /// Display name of the device
    pub name: String,
    /// Stable device identifier
    pub id: String,
    /// Model code
    pub model: String,
    /// Firmware version currently reported by the device
    pub current_version: String,
    /// Version the device will be upgraded to; empty when up to date
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target_version: String,
    /// True when no newer firmware is available
    pub up_to_date: bool,
    /// True when the target is the mandatory 1.3.3 intermediate
    pub stepping_stone: bool,
    /// True when the device is below 1.3.3 but no stepping-stone build
    /// exists for its model, so it must be upgraded by hand
    pub manual_upgrade_required: bool,
}

/// The upgrade orchestrator.
pub struct OtaService {
    api: Arc<CatalogClient>,
    browser: Browser,
    devices: Option<HashMap<String, Device>>,
    download_dir: PathBuf,
    exclude_patterns: Vec<String>,
    exclude_set: GlobSet,
    force: bool,
    hosts: Vec<String>,
    http: Client,
    include_betas: bool,
    listener: Option<TcpListener>,
    model_filter: Vec<String>,
    ota: Arc<OtaServer>,
    server_ip: Ipv4Addr,
    server_port: u16,
}

impl OtaService {
    /// Creates the orchestrator: resolves the local server address,
    /// binds the OTA listener and prepares the download directory path.
    ///
    /// Fails when no private address exists or the listener cannot be
    /// bound; without either, no device could ever fetch firmware from
    /// this host.
    pub async fn new(config: OtaServiceConfig) -> Result<Self> {
        let download_dir = match config.download_dir {
            Some(dir) => dir,
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("shellyctl"),
        };

        let server_ip = shellyota_net::server_ip()?;
        let (listener, server_port) = shellyota_net::server_listener(config.http_port).await?;

        let api = match config.catalog {
            Some(api) => api,
            None => Arc::new(CatalogClient::new(
                CatalogConfig::default().with_include_betas(config.beta),
            )?),
        };

        let mut browser_config = BrowserConfig::default()
            .with_subnets(config.subnets)
            .with_credentials(config.username, config.password);
        if let Some(domain) = config.domain {
            browser_config = browser_config.with_domain(domain);
        }
        if let Some(wait_time) = config.wait_time {
            browser_config = browser_config.with_wait_time(wait_time);
        }

        let mut exclude_builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            match Glob::new(pattern) {
                Ok(glob) => {
                    exclude_builder.add(glob);
                }
                Err(err) => warn!("Ignoring invalid exclude pattern {pattern:?}: {err}"),
            }
        }
        let exclude_set = exclude_builder
            .build()
            .unwrap_or_else(|_| GlobSet::empty());

        Ok(Self {
            api,
            browser: Browser::new(browser_config),
            devices: None,
            download_dir,
            exclude_patterns: config.exclude,
            exclude_set,
            force: config.force,
            hosts: config.hosts,
            http: Client::new(),
            include_betas: config.beta,
            listener: Some(listener),
            model_filter: config.models,
            ota: Arc::new(OtaServer::new()),
            server_ip,
            server_port,
        })
    }

    /// The port the OTA server is (or will be) listening on.
    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// Whether upgrades run without interactive confirmation.
    pub fn forced(&self) -> bool {
        self.force
    }

    /// Launches the OTA server, discovers devices and resolves each
    /// device's target firmware.
    pub async fn setup(&mut self) -> Result<()> {
        if let Some(listener) = self.listener.take() {
            self.ota.spawn(listener);
            info!("OTA HTTP server listening on port {}", self.server_port);
        }

        self.discover_devices().await?;
        self.resolve_targets().await
    }

    /// Gracefully stops the OTA server.
    pub async fn shutdown(&self) {
        self.ota.shutdown().await;
    }

    /// Runs discovery once; later calls return the cached index until
    /// [`reset_discovery`](OtaService::reset_discovery).
    pub async fn discover_devices(&mut self) -> Result<()> {
        if self.devices.is_some() {
            return Ok(());
        }

        let found = self.browser.listen_for_announcements(&self.hosts).await?;
        let mut devices = HashMap::new();
        for device in found {
            devices.insert(device.id.clone(), device);
        }

        self.devices = Some(devices);
        Ok(())
    }

    /// Clears the cached device index so the next discovery call runs
    /// fresh.
    pub fn reset_discovery(&mut self) {
        self.devices = None;
    }

    /// The currently discovered devices.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().flat_map(|devices| devices.values())
    }

    /// Resolves the target firmware for every discovered device.
    ///
    /// Stepping-stone requirements short-circuit the version comparison;
    /// otherwise the stable build wins when newer, then the beta build
    /// when beta mode is on.
    pub async fn resolve_targets(&mut self) -> Result<()> {
        self.discover_devices().await?;

        let mut devices = self.devices.take().unwrap_or_default();

        for device in devices.values_mut() {
            device.target_firmware = None;

            let remote = match self.api.get_latest_firmware_available(&device.model).await {
                Ok(remote) => remote,
                Err(CatalogError::FirmwareNotFound(_)) => {
                    warn!(
                        "No remote firmware available for {} (model {}), skipping",
                        device, device.model
                    );
                    continue;
                }
                Err(err) => {
                    self.devices = Some(devices);
                    return Err(err.into());
                }
            };

            if let Some(stepping_stone) = needs_stepping_stone(device) {
                warn!(
                    "{} requires stepping-stone upgrade to {} before upgrading to {}",
                    device, stepping_stone.version, remote.version
                );
                device.target_firmware = Some(stepping_stone);
                continue;
            }

            let device_version = extract_semantic_version(&device.firmware_version);
            let remote_version = extract_semantic_version(&remote.version);
            let remote_beta_version = extract_semantic_version(&remote.beta_version);

            let stable_newer = is_version_less_than(&device_version, &remote_version);
            let beta_newer = self.include_betas
                && !remote_beta_version.is_empty()
                && is_version_less_than(&device_version, &remote_beta_version);

            if stable_newer || beta_newer {
                device.target_firmware = Some(remote);
            }
        }

        self.devices = Some(devices);
        Ok(())
    }

    /// Drops devices excluded by the model filter or the exclude globs.
    pub fn filter_devices(&mut self) {
        if self.model_filter.is_empty() && self.exclude_patterns.is_empty() {
            return;
        }

        let Self {
            devices,
            model_filter,
            exclude_set,
            ..
        } = self;
        let Some(devices) = devices.as_mut() else {
            return;
        };

        devices.retain(|_, device| {
            if !model_filter.is_empty()
                && !model_filter.iter().any(|model| *model == device.model)
            {
                debug!(
                    "Filtering out {}: model {} not in filter",
                    device, device.model
                );
                return false;
            }

            let excluded = exclude_set.is_match(device.to_string())
                || exclude_set.is_match(&device.name)
                || exclude_set.is_match(&device.id);
            if excluded {
                debug!("Filtering out {}: matched exclude pattern", device);
                return false;
            }

            true
        });
    }

    /// Summarises the upgrade state of every discovered device, sorted
    /// by device id for stable output.
    pub fn device_status(&self) -> Vec<DeviceStatus> {
        let mut statuses: Vec<DeviceStatus> = self
            .devices()
            .map(|device| {
                let (target_version, up_to_date, stepping_stone) = match &device.target_firmware {
                    Some(target) => (
                        target.version.clone(),
                        false,
                        needs_stepping_stone(device).is_some(),
                    ),
                    None => (String::new(), true, false),
                };

                DeviceStatus {
                    name: device.to_string(),
                    id: device.id.clone(),
                    model: device.model.clone(),
                    current_version: device.firmware_version.clone(),
                    target_version,
                    up_to_date,
                    stepping_stone,
                    manual_upgrade_required: needs_manual_upgrade(device),
                }
            })
            .collect();

        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Runs upgrade passes until no pass performs a stepping-stone
    /// upgrade. After a stepping-stone pass the device and catalog
    /// caches are cleared so the next pass sees the rebooted devices and
    /// fresh targets.
    pub async fn prompt_for_upgrades(&mut self) -> Result<()> {
        let mut pass = 1u32;

        loop {
            if pass > 1 {
                info!("Re-evaluating devices after stepping-stone upgrades (pass {pass})...");
            }

            let had_stepping_stone = self.upgrade_pass().await?;
            if !had_stepping_stone {
                break;
            }

            self.reset_discovery();
            self.api.reset();
            self.resolve_targets().await?;
            self.filter_devices();
            pass += 1;
        }

        Ok(())
    }

    /// Runs one round of upgrades and reports whether any of them was a
    /// stepping-stone upgrade (signalling that another pass is needed).
    async fn upgrade_pass(&mut self) -> Result<bool> {
        self.discover_devices().await?;

        let devices: Vec<Device> = self.devices().cloned().collect();
        let mut had_stepping_stone = false;
        let mut upgrades = JoinSet::new();

        for device in devices {
            let Some(target) = device.target_firmware.clone() else {
                info!(
                    "Skipping {} as firmware version {} is the latest available",
                    device, device.firmware_version
                );
                continue;
            };

            let use_beta = if self.force {
                self.include_betas
            } else {
                let stepping = needs_stepping_stone(&device).is_some();
                match prompt_for_device(&device, &target, self.include_betas, stepping).await {
                    PromptOutcome::Accepted { beta } => beta,
                    PromptOutcome::Declined => continue,
                    PromptOutcome::Interrupted => break,
                }
            };

            let firmware_file = self
                .api
                .download_firmware(&target, use_beta, &self.download_dir)
                .await?;

            if needs_stepping_stone(&device).is_some() {
                had_stepping_stone = true;
            }

            let context = UpgradeContext {
                http: self.http.clone(),
                ota: Arc::clone(&self.ota),
                server_ip: self.server_ip,
                server_port: self.server_port,
            };
            upgrades.spawn(upgrade_device(context, device, target_version_for(&target, use_beta), firmware_file));
        }

        while upgrades.join_next().await.is_some() {}

        Ok(had_stepping_stone)
    }
}

/// Pieces an upgrade task needs once detached from the service.
struct UpgradeContext {
    http: Client,
    ota: Arc<OtaServer>,
    server_ip: Ipv4Addr,
    server_port: u16,
}

/// The version string the device is expected to report after the chosen
/// channel has been flashed.
fn target_version_for(target: &shellyota_device::RemoteFirmware, beta: bool) -> String {
    if beta {
        target.beta_version.clone()
    } else {
        target.version.clone()
    }
}

/// Outcome of the interactive confirmation for one device.
enum PromptOutcome {
    /// Proceed, on the chosen channel
    Accepted {
        /// Whether the beta build was selected
        beta: bool,
    },
    /// Skip this device
    Declined,
    /// The user interrupted the prompt; abort the pass
    Interrupted,
}

/// Asks the user whether (and, in beta mode, to which channel) a device
/// should be upgraded. Runs on the blocking pool since dialoguer owns
/// the terminal.
async fn prompt_for_device(
    device: &Device,
    target: &shellyota_device::RemoteFirmware,
    include_betas: bool,
    stepping_stone: bool,
) -> PromptOutcome {
    let device_label = device.to_string();
    let current_version = device.firmware_version.clone();
    let stable_version = target.version.clone();
    let beta_version = target.beta_version.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let chosen = if include_betas {
            let options = [stable_version.clone(), beta_version.clone()];
            let selection = Select::new()
                .with_prompt(format!(
                    "Which firmware version would you like to upgrade {device_label} to?"
                ))
                .items(&options)
                .default(0)
                .interact();
            match selection {
                Ok(index) => options[index].clone(),
                Err(_) => return PromptOutcome::Interrupted,
            }
        } else {
            stable_version.clone()
        };

        let beta = !beta_version.is_empty() && chosen == beta_version;

        let message = if stepping_stone {
            format!(
                "Would you like to upgrade {device_label} from {current_version} to {chosen} \
                 (required stepping-stone before latest)?"
            )
        } else {
            format!(
                "Would you like to upgrade {device_label} from {current_version} to {chosen}?"
            )
        };

        match Confirm::new().with_prompt(message).interact() {
            Ok(true) => PromptOutcome::Accepted { beta },
            Ok(false) => PromptOutcome::Declined,
            Err(_) => PromptOutcome::Interrupted,
        }
    })
    .await;

    outcome.unwrap_or(PromptOutcome::Interrupted)
}

/// Triggers one device's OTA pull, waits for it to fetch the firmware
/// and verifies the reported version afterwards.
async fn upgrade_device(
    context: UpgradeContext,
    device: Device,
    expected_version: String,
    firmware_file: PathBuf,
) {
    let url = device.ota_url(
        &context.server_ip.to_string(),
        context.server_port,
        &device.id,
    );

    let mut completed = context.ota.set_handler(&device.id, firmware_file.clone());

    debug!(
        "Making OTA request to {url} to serve local firmware {}",
        firmware_file.display()
    );

    match context.http.get(&url).send().await {
        Ok(response) => match response.text().await {
            Ok(body) => debug!("Received OTA response: {body}"),
            Err(err) => {
                error!("{err}");
                return;
            }
        },
        Err(err) => {
            debug!("{err}");
            return;
        }
    }

    match tokio::time::timeout(OTA_COMPLETION_TIMEOUT, completed.recv()).await {
        Ok(_) => debug!("Completed OTA request"),
        Err(_) => {
            warn!(
                "Device did not complete the OTA request within {} seconds. Network might be \
                 unreachable or the device is too busy to acknowledge the OTA request. Check the \
                 UI at http://{} for more details.",
                OTA_COMPLETION_TIMEOUT.as_secs(),
                device.ip
            );
            return;
        }
    }

    verify_upgrade(&context.http, &device, &expected_version).await;
}

/// Polls a device after OTA to confirm it rebooted into the expected
/// firmware. Exhausting the backoff schedule is a warning, not a
/// failure: devices may reboot later than the verification window.
async fn verify_upgrade(http: &Client, device: &Device, expected_version: &str) {
    info!("Waiting for {device} to reboot and verify firmware...");

    let base_url = format!("http://{}:{}", device.ip, device.port);

    for (attempt, delay) in VERIFY_DELAYS.iter().enumerate() {
        tokio::time::sleep(*delay).await;
        debug!("Verification attempt {} for {device}", attempt + 1);

        let current_version = if device.generation == 1 {
            fetch_gen1_version(http, &base_url).await
        } else {
            fetch_gen2_version(http, &base_url).await
        };

        match current_version {
            None => debug!(
                "Device {device} not yet reachable (attempt {}/{})",
                attempt + 1,
                VERIFY_DELAYS.len()
            ),
            Some(version) if version == expected_version => {
                info!("Verified {device} is now running firmware {version}");
                return;
            }
            Some(version) => debug!(
                "Device {device} reports firmware {version}, expected {expected_version} \
                 (attempt {}/{})",
                attempt + 1,
                VERIFY_DELAYS.len()
            ),
        }
    }

    warn!(
        "Could not verify firmware upgrade for {device}. Expected {expected_version}. Device may \
         still be rebooting."
    );
}

/// Reads the firmware version from a Gen1 device's settings endpoint.
pub async fn fetch_gen1_version(http: &Client, base_url: &str) -> Option<String> {
    let response = http
        .get(format!("{base_url}/settings"))
        .timeout(VERIFY_POLL_TIMEOUT)
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        return None;
    }

    let settings: Gen1Settings = response.json().await.ok()?;
    Some(settings.firmware)
}

/// Reads the firmware version from a Gen2+ device's info RPC.
pub async fn fetch_gen2_version(http: &Client, base_url: &str) -> Option<String> {
    let response = http
        .get(format!("{base_url}/rpc/Shelly.GetDeviceInfo"))
        .timeout(VERIFY_POLL_TIMEOUT)
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        return None;
    }

    let settings: Gen2Settings = response.json().await.ok()?;
    Some(settings.firmware)
}
