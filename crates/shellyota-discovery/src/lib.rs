//! Hybrid device discovery
//!
//! Devices are found two ways and merged into one pipeline:
//!
//! 1. **mDNS mode** (no explicit hosts): browse the configured service
//!    for `waitTime` seconds, classify announcements by their TXT
//!    records, and afterwards sweep every local /24 (plus any `--subnet`
//!    blocks) over HTTP for devices mDNS missed.
//! 2. **Explicit hosts mode**: probe each `host[:port]` entry's
//!    `/shelly` endpoint to classify it, then inject a synthetic
//!    announcement into the same pipeline.
//!
//! Classified announcements flow through a settings-fetch stage that
//! turns them into [`Device`] values, resolving credentials per device
//! (netrc entry, then the global pair, then none).

#![deny(unused_must_use, clippy::unwrap_used)]
#![warn(rust_2018_idioms)]

pub mod credentials;
mod error;
pub mod netrc;

pub use credentials::{netrc_path, CredentialResolver, Credentials};
pub use error::DiscoveryError;

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use reqwest::Client;
use shellyota_device::{Device, DeviceAnnouncement, Gen1Settings, Gen2Settings, ShellyInfo};
use shellyota_net::{all_local_subnets, expand_cidr};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A specialized `Result` type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Workers probing the subnet sweep.
const SCAN_WORKERS: usize = 50;
/// Timeout for the `/shelly` classification probe during the sweep.
const SCAN_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout for settings fetches.
const SETTINGS_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for the `/shelly` probe of explicitly named hosts.
const HOST_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of a discovery run.
///
/// Built once via the `with_*` methods and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// mDNS search domain
    pub domain: String,
    /// mDNS service type, e.g. `_http._tcp.`
    pub service: String,
    /// How long the mDNS browse runs
    pub wait_time: Duration,
    /// Additional CIDR blocks for the subnet sweep
    pub subnets: Vec<String>,
    /// Global fallback username
    pub username: String,
    /// Global fallback password
    pub password: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            domain: "local".to_string(),
            service: "_http._tcp.".to_string(),
            wait_time: Duration::from_secs(60),
            subnets: Vec::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl BrowserConfig {
    /// Override the mDNS search domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Override the mDNS service type.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Override the mDNS browse duration.
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Add explicit CIDR blocks to the subnet sweep.
    pub fn with_subnets(mut self, subnets: Vec<String>) -> Self {
        self.subnets = subnets;
        self
    }

    /// Set the global fallback credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
}

/// Discovers devices on the local network.
pub struct Browser {
    config: BrowserConfig,
    http: Client,
}

impl Browser {
    /// Creates a browser from the given configuration.
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    /// The full mDNS service name, e.g. `_http._tcp.local.`.
    fn service_name(&self) -> String {
        format!("{}{}.", self.config.service, self.config.domain)
    }

    /// Discovers devices and fetches their settings.
    ///
    /// With an empty `hosts` list this browses mDNS and then sweeps the
    /// local subnets; otherwise only the named hosts are probed.
    pub async fn listen_for_announcements(&self, hosts: &[String]) -> Result<Vec<Device>> {
        let resolver = Arc::new(CredentialResolver::from_environment(
            &self.config.username,
            &self.config.password,
        ));

        let (announcement_tx, announcement_rx) = mpsc::channel::<DeviceAnnouncement>(32);
        let (device_tx, mut device_rx) = mpsc::channel::<Device>(32);

        let fetch_stage = tokio::spawn(fetch_settings_stage(
            announcement_rx,
            device_tx,
            Arc::clone(&resolver),
            self.http.clone(),
        ));

        if hosts.is_empty() {
            self.browse_mdns(announcement_tx).await?;
        } else {
            self.probe_explicit_hosts(hosts, announcement_tx).await;
        }

        let mut devices = Vec::new();
        while let Some(device) = device_rx.recv().await {
            devices.push(device);
        }
        let _ = fetch_stage.await;

        debug!("All device settings fetched!");

        // Supplement auto-discovery with an HTTP subnet sweep to find
        // devices (especially Gen2+) that mDNS missed.
        if hosts.is_empty() {
            let seen: HashSet<IpAddr> = devices.iter().map(|d| d.ip).collect();
            match self.scan_subnets(&seen, &resolver).await {
                Ok(extra) if !extra.is_empty() => {
                    info!("Subnet scan found {} additional device(s)", extra.len());
                    devices.extend(extra);
                }
                Ok(_) => {}
                Err(err) => debug!("Subnet scan failed: {err}"),
            }
        }

        Ok(devices)
    }

    /// Browses mDNS until the deadline, forwarding classified
    /// announcements into the pipeline.
    async fn browse_mdns(&self, announcements: mpsc::Sender<DeviceAnnouncement>) -> Result<()> {
        let service_name = self.service_name();
        let daemon = ServiceDaemon::new().map_err(|err| DiscoveryError::Mdns(err.to_string()))?;
        let receiver = daemon
            .browse(&service_name)
            .map_err(|err| DiscoveryError::Mdns(err.to_string()))?;

        info!(
            "Discovering devices on the network for {} seconds...",
            self.config.wait_time.as_secs()
        );

        let deadline = tokio::time::sleep(self.config.wait_time);
        tokio::pin!(deadline);
        let mut progress = tokio::time::interval_at(
            tokio::time::Instant::now() + Duration::from_secs(10),
            Duration::from_secs(10),
        );

        let mut seen = HashSet::new();
        let mut found: u32 = 0;

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = progress.tick() => {
                    info!("Discovery in progress... {found} device(s) found so far");
                }
                event = receiver.recv_async() => match event {
                    Ok(ServiceEvent::ServiceResolved(service)) => {
                        let Some(announcement) = classify_service(&service) else {
                            continue;
                        };

                        if !seen.insert(announcement.ip) {
                            debug!("Skipping duplicate device at {}", announcement.ip);
                            continue;
                        }

                        found += 1;
                        info!(
                            "Found device {} ({}) [{} found]",
                            announcement.hostname, announcement.ip, found
                        );

                        if announcements.send(announcement).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }

        let _ = daemon.stop_browse(&service_name);
        let _ = daemon.shutdown();

        Ok(())
    }

    /// Probes explicitly named hosts and injects synthetic announcements
    /// into the pipeline. Malformed entries are logged and skipped.
    async fn probe_explicit_hosts(
        &self,
        hosts: &[String],
        announcements: mpsc::Sender<DeviceAnnouncement>,
    ) {
        info!("Looking for specific devices {:?}", hosts);

        for host in hosts {
            let (host_part, port) = match split_host_port(host) {
                Ok(parts) => parts,
                Err(reason) => {
                    error!("Host {host} is invalid ({reason}), skipping");
                    continue;
                }
            };

            let ip = match host_part.parse::<IpAddr>() {
                Ok(ip) => ip,
                Err(_) => {
                    debug!("Host {host} does not look like an IP, attempting to resolve as host...");
                    match tokio::net::lookup_host((host_part.as_str(), port)).await {
                        Ok(mut addrs) => match addrs.next() {
                            Some(addr) => addr.ip(),
                            None => {
                                error!("Host {host} did not resolve to any address, skipping...");
                                continue;
                            }
                        },
                        Err(err) => {
                            error!("Host {host} is invalid ({err}), skipping...");
                            continue;
                        }
                    }
                }
            };

            let probe_url = format!("http://{host_part}:{port}/shelly");
            let info = match self
                .http
                .get(&probe_url)
                .timeout(HOST_PROBE_TIMEOUT)
                .send()
                .await
            {
                Ok(response) => match response.json::<ShellyInfo>().await {
                    Ok(info) => info,
                    Err(err) => {
                        debug!("{err}");
                        continue;
                    }
                },
                Err(err) => {
                    debug!("{err}");
                    continue;
                }
            };

            let generation = if info.generation == 0 { 1 } else { info.generation };

            let announcement = DeviceAnnouncement {
                ip,
                hostname: format!("{host_part}:{port}"),
                port,
                generation,
            };

            if announcements.send(announcement).await.is_err() {
                return;
            }
        }
    }

    /// Sweeps every local /24 plus the configured CIDR blocks over HTTP,
    /// skipping addresses already discovered.
    async fn scan_subnets(
        &self,
        seen: &HashSet<IpAddr>,
        resolver: &Arc<CredentialResolver>,
    ) -> Result<Vec<Device>> {
        let (mut ips, local_subnets) = all_local_subnets();

        for subnet in &local_subnets {
            info!("Detected local subnet {subnet}");
        }

        for cidr in &self.config.subnets {
            match expand_cidr(cidr) {
                Ok(extra) => {
                    info!("Adding {} IPs from subnet {}", extra.len(), cidr);
                    ips.extend(extra);
                }
                Err(err) => warn!("Invalid subnet {cidr:?}: {err}"),
            }
        }

        if ips.is_empty() {
            return Err(DiscoveryError::NoSubnets);
        }

        info!("Scanning {} IPs for additional devices...", ips.len());

        let candidates: Vec<Ipv4Addr> = ips
            .into_iter()
            .filter(|ip| !seen.contains(&IpAddr::V4(*ip)))
            .collect();

        let found: Vec<Option<Device>> = stream::iter(candidates)
            .map(|ip| self.probe_subnet_host(ip, Arc::clone(resolver)))
            .buffer_unordered(SCAN_WORKERS)
            .collect()
            .await;

        let devices: Vec<Device> = found.into_iter().flatten().collect();
        debug!(
            "Subnet scan complete, found {} additional device(s)",
            devices.len()
        );
        Ok(devices)
    }

    /// Probes one swept address; all failures are silent at debug level.
    async fn probe_subnet_host(
        &self,
        ip: Ipv4Addr,
        resolver: Arc<CredentialResolver>,
    ) -> Option<Device> {
        let response = self
            .http
            .get(format!("http://{ip}/shelly"))
            .timeout(SCAN_PROBE_TIMEOUT)
            .send()
            .await
            .ok()?;
        let info: ShellyInfo = response.json().await.ok()?;

        let generation = if info.generation == 0 { 1 } else { info.generation };

        let announcement = DeviceAnnouncement {
            ip: IpAddr::V4(ip),
            hostname: format!("{ip}:80"),
            port: 80,
            generation,
        };

        let device =
            fetch_device_settings(&self.http, &resolver, &announcement, Verbosity::Quiet).await?;

        info!("Found device {} ({}) via subnet scan", device, ip);
        Some(device)
    }
}

/// How loudly a settings fetch reports failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    /// mDNS/explicit announcements: failures are warnings or errors
    Loud,
    /// Subnet sweep: failures stay at debug level
    Quiet,
}

/// Consumes classified announcements and fetches each device's settings
/// in its own task.
async fn fetch_settings_stage(
    mut announcements: mpsc::Receiver<DeviceAnnouncement>,
    devices: mpsc::Sender<Device>,
    resolver: Arc<CredentialResolver>,
    http: Client,
) {
    let mut tasks = JoinSet::new();

    while let Some(announcement) = announcements.recv().await {
        let devices = devices.clone();
        let resolver = Arc::clone(&resolver);
        let http = http.clone();

        tasks.spawn(async move {
            if let Some(device) =
                fetch_device_settings(&http, &resolver, &announcement, Verbosity::Loud).await
            {
                let _ = devices.send(device).await;
            }
        });
    }

    while tasks.join_next().await.is_some() {}
}

/// Fetches a device's settings and builds the [`Device`] value,
/// preserving the credentials used for the fetch.
async fn fetch_device_settings(
    http: &Client,
    resolver: &CredentialResolver,
    announcement: &DeviceAnnouncement,
    verbosity: Verbosity,
) -> Option<Device> {
    let credentials = resolver.resolve(&announcement.ip.to_string());

    if verbosity == Verbosity::Loud {
        info!("Fetching settings from {announcement}");
    }

    let url = announcement.device_information_url(&credentials.username, &credentials.password);
    let response = match http.get(&url).timeout(SETTINGS_TIMEOUT).send().await {
        Ok(response) => response,
        Err(err) => {
            match verbosity {
                Verbosity::Loud => warn!("Failed to fetch settings from {announcement}: {err}"),
                Verbosity::Quiet => {
                    debug!("Subnet scan: failed to fetch settings from {announcement}: {err}")
                }
            }
            return None;
        }
    };

    if !response.status().is_success() {
        match verbosity {
            Verbosity::Loud => error!(
                "Unable to fetch settings from {announcement} due to incorrect or missing \
                 username/password"
            ),
            Verbosity::Quiet => debug!("Subnet scan: auth failed for {announcement}"),
        }
        return None;
    }

    let device = if announcement.generation == 1 {
        let settings: Gen1Settings = match response.json().await {
            Ok(settings) => settings,
            Err(err) => {
                if verbosity == Verbosity::Loud {
                    error!("Error parsing JSON: {err}");
                }
                return None;
            }
        };

        Device {
            id: settings.device.hostname,
            name: settings.name,
            model: settings.device.model,
            firmware_version: settings.firmware,
            target_firmware: None,
            generation: announcement.generation,
            ip: announcement.ip,
            port: announcement.port,
            username: credentials.username,
            password: credentials.password,
        }
    } else {
        let settings: Gen2Settings = match response.json().await {
            Ok(settings) => settings,
            Err(err) => {
                if verbosity == Verbosity::Loud {
                    error!("Error parsing JSON: {err}");
                }
                return None;
            }
        };

        Device {
            id: settings.id,
            name: settings.name,
            model: settings.model,
            firmware_version: settings.firmware,
            target_firmware: None,
            generation: announcement.generation,
            ip: announcement.ip,
            port: announcement.port,
            username: credentials.username,
            password: credentials.password,
        }
    };

    debug!("Parsed settings from device {device}");
    Some(device)
}

/// Classifies an mDNS service entry into a device announcement using its
/// TXT records. Non-device services resolve to None.
fn classify_service(service: &ServiceInfo) -> Option<DeviceAnnouncement> {
    let ip = service
        .get_addresses()
        .iter()
        .copied()
        .find(|addr| addr.is_ipv4())?;

    let generation = service.get_properties().iter().find_map(|property| {
        let record = format!("{}={}", property.key(), property.val_str());
        DeviceAnnouncement::generation_from_txt(&record)
    })?;

    Some(DeviceAnnouncement {
        ip,
        hostname: service.get_hostname().to_string(),
        port: service.get_port(),
        generation,
    })
}

/// Splits a `host[:port]` entry, defaulting the port to 80.
fn split_host_port(host: &str) -> std::result::Result<(String, u16), String> {
    match host.rfind(':') {
        None => Ok((host.to_string(), 80)),
        Some(index) => {
            let (name, port) = (&host[..index], &host[index + 1..]);
            if name.is_empty() {
                return Err("missing host".to_string());
            }
            if name.contains(':') {
                return Err("too many colons".to_string());
            }
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port {port:?}"))?;
            Ok((name.to_string(), port))
        }
    }
}
