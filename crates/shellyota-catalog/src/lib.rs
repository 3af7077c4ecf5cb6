//! Vendor firmware catalog client
//!
//! Fetches the merged firmware catalog from the two vendor origins (a
//! single call to the Gen1 endpoint plus a bounded fan-out over the
//! Gen2+ model list) and downloads firmware artifacts exactly once per
//! process, keyed by their channel identifier.
//!
//! The client holds per-process state (the catalog memo and the download
//! cache) and is safe to share behind an `Arc` across the discovery and
//! upgrade cohorts.

#![deny(unused_must_use, clippy::unwrap_used)]
#![warn(rust_2018_idioms)]

mod error;

pub use error::CatalogError;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use shellyota_device::{models, RemoteFirmware};
use tracing::debug;

/// A specialized `Result` type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Number of concurrent Gen2+ catalog requests.
const CATALOG_WORKERS: usize = 10;

/// Configuration for the catalog client.
///
/// Built once via the `with_*` methods and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL of the Gen1 catalog API
    pub base_url: String,
    /// Base URL of the Gen2+ update API
    pub gen2_base_url: String,
    /// Whether beta channel builds participate in upgrade decisions
    pub include_betas: bool,
    /// Timeout applied to every catalog and download request
    pub http_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.shelly.cloud".to_string(),
            gen2_base_url: "https://updates.shelly.cloud".to_string(),
            include_betas: false,
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl CatalogConfig {
    /// Override the Gen1 catalog base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the Gen2+ update API base URL.
    pub fn with_gen2_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.gen2_base_url = base_url.into();
        self
    }

    /// Enable beta channel firmware where available.
    pub fn with_include_betas(mut self, include_betas: bool) -> Self {
        self.include_betas = include_betas;
        self
    }

    /// Override the per-request HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Gen1 catalog response: `{isok, data: {model: {...}}}`.
#[derive(Debug, Deserialize)]
struct Gen1CatalogResponse {
    #[serde(default, rename = "isok")]
    _is_ok: bool,
    #[serde(default)]
    data: HashMap<String, Gen1CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct Gen1CatalogEntry {
    #[serde(default)]
    url: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    beta_url: String,
    #[serde(default, rename = "beta_ver")]
    beta_version: String,
}

/// One channel of a Gen2+ update API response.
#[derive(Debug, Default, Deserialize)]
struct Gen2ChannelInfo {
    #[serde(default)]
    version: String,
    #[serde(default, rename = "build_id")]
    _build_id: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct Gen2AltVariant {
    #[serde(default)]
    stable: Gen2ChannelInfo,
    #[serde(default)]
    beta: Gen2ChannelInfo,
}

/// Gen2+ update API response, including alternate variants (e.g. Zigbee
/// builds) published under their own model names.
#[derive(Debug, Deserialize)]
struct Gen2UpdateResponse {
    #[serde(default)]
    stable: Gen2ChannelInfo,
    #[serde(default)]
    beta: Gen2ChannelInfo,
    #[serde(default)]
    alt: HashMap<String, Gen2AltVariant>,
}

/// Client for the vendor firmware catalog.
pub struct CatalogClient {
    config: CatalogConfig,
    http: Client,
    catalog: RwLock<HashMap<String, RemoteFirmware>>,
    download_cache: RwLock<HashMap<String, PathBuf>>,
}

impl CatalogClient {
    /// Create a catalog client from the given configuration.
    ///
    /// TLS verification is disabled because the vendor CDN terminates
    /// TLS on hosts that do not always match the served certificate.
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.http_timeout)
            .build()
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;

        Ok(Self {
            config,
            http,
            catalog: RwLock::new(HashMap::new()),
            download_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Create a catalog client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(CatalogConfig::default())
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Clears the catalog memo so the next lookup re-fetches both
    /// origins. The download cache survives: artifacts are immutable and
    /// keyed by firmware id.
    pub fn reset(&self) {
        self.catalog.write().clear();
    }

    /// Returns the merged catalog, fetching it on first use.
    ///
    /// The Gen1 origin is fetched first; a transport failure there (or on
    /// any Gen2+ fan-out request) aborts with
    /// [`CatalogError::Unavailable`]. Models whose update API returns a
    /// non-200 status or an empty stable version are skipped.
    pub async fn fetch_versions(&self) -> Result<HashMap<String, RemoteFirmware>> {
        {
            let catalog = self.catalog.read();
            if !catalog.is_empty() {
                return Ok(catalog.clone());
            }
        }

        let gen1_url = format!("{}/files/firmware", self.config.base_url);
        let response = self
            .http
            .get(&gen1_url)
            .send()
            .await
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;
        let decoded: Gen1CatalogResponse = response
            .json()
            .await
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;

        let mut merged = HashMap::new();
        for (model, entry) in decoded.data {
            merged.insert(
                model.clone(),
                RemoteFirmware {
                    model,
                    url: entry.url,
                    version: entry.version,
                    beta_url: entry.beta_url,
                    beta_version: entry.beta_version,
                },
            );
        }

        let results: Vec<Result<Vec<RemoteFirmware>>> =
            stream::iter(models::GEN2_PLUS_MODELS.iter().copied())
                .map(|model| self.fetch_gen2_model(model))
                .buffer_unordered(CATALOG_WORKERS)
                .collect()
                .await;

        for result in results {
            for firmware in result? {
                merged.insert(firmware.model.clone(), firmware);
            }
        }

        *self.catalog.write() = merged.clone();
        Ok(merged)
    }

    /// Fetches the update API entry for one Gen2+ model. Non-200 and
    /// empty-version responses resolve to an empty list; only transport
    /// failures propagate.
    async fn fetch_gen2_model(&self, model: &str) -> Result<Vec<RemoteFirmware>> {
        let api_model = models::api_model_for(model);
        let url = format!("{}/update/{}", self.config.gen2_base_url, api_model);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            debug!(
                "No firmware available from update API for model {} (HTTP {})",
                model,
                response.status()
            );
            return Ok(Vec::new());
        }

        let decoded: Gen2UpdateResponse = match response.json().await {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!("Failed to decode update API response for model {model}: {err}");
                return Ok(Vec::new());
            }
        };

        if decoded.stable.version.is_empty() {
            debug!("No stable firmware version available for model {model}");
            return Ok(Vec::new());
        }

        let mut firmwares = vec![RemoteFirmware {
            model: model.to_string(),
            url: decoded.stable.url,
            version: decoded.stable.version,
            beta_url: decoded.beta.url,
            beta_version: decoded.beta.version,
        }];

        // Alternate variants (e.g. Zigbee builds) are catalogued under
        // their own model names.
        for (alt_name, alt) in decoded.alt {
            if alt.stable.version.is_empty() {
                continue;
            }
            firmwares.push(RemoteFirmware {
                model: alt_name,
                url: alt.stable.url,
                version: alt.stable.version,
                beta_url: alt.beta.url,
                beta_version: alt.beta.version,
            });
        }

        Ok(firmwares)
    }

    /// Returns the most recent firmware available for a model.
    ///
    /// Falls back through the device-alias table (variant → base model)
    /// and the reverse update-API name table (API name → internal name)
    /// before giving up.
    pub async fn get_latest_firmware_available(&self, model: &str) -> Result<RemoteFirmware> {
        let firmwares = self.fetch_versions().await?;

        if let Some(firmware) = firmwares.get(model) {
            return Ok(firmware.clone());
        }

        if let Some(canonical) = models::canonical_model_for(model) {
            if let Some(firmware) = firmwares.get(canonical) {
                return Ok(firmware.clone());
            }
        }

        if let Some(internal) = models::internal_model_for_api_name(model) {
            if let Some(firmware) = firmwares.get(internal) {
                return Ok(firmware.clone());
            }
        }

        Err(CatalogError::FirmwareNotFound(model.to_string()))
    }

    /// Downloads a firmware artifact and returns its local path.
    ///
    /// Artifacts are cached by firmware id (model, version and channel),
    /// so repeated requests for the same build return the cached path
    /// without another HTTP request.
    pub async fn download_firmware(
        &self,
        firmware: &RemoteFirmware,
        beta: bool,
        download_dir: &Path,
    ) -> Result<PathBuf> {
        let (id, url, version) = if beta {
            (firmware.beta_id(), &firmware.beta_url, &firmware.beta_version)
        } else {
            (firmware.stable_id(), &firmware.url, &firmware.version)
        };

        if let Some(path) = self.download_cache.read().get(&id) {
            return Ok(path.clone());
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| CatalogError::DownloadFailed {
                url: url.clone(),
                reason: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CatalogError::DownloadFailed {
                url: url.clone(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| CatalogError::DownloadFailed {
                url: url.clone(),
                reason: err.to_string(),
            })?;

        tokio::fs::create_dir_all(download_dir).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(download_dir, std::fs::Permissions::from_mode(0o700))
                .await?;
        }

        let filename =
            format!("{}{}{}", firmware.model, version, extension_of(url)).replace('/', "-");
        let full_path = download_dir.join(filename);
        tokio::fs::write(&full_path, &body).await?;

        debug!(
            "Downloaded firmware {} for model {} to {}",
            version,
            firmware.model,
            full_path.display()
        );

        self.download_cache.write().insert(id, full_path.clone());
        Ok(full_path)
    }
}

/// Extension of the final path segment of a download URL, including the
/// leading dot; `.zip` when the URL carries none (hash-addressed CDN
/// paths).
fn extension_of(url: &str) -> &str {
    let last_segment = url.rsplit('/').next().unwrap_or(url);
    match last_segment.rfind('.') {
        Some(index) => &last_segment[index..],
        None => ".zip",
    }
}
