//! End-to-end orchestration tests against mocked vendor and device APIs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use shellyota_catalog::{CatalogClient, CatalogConfig};
use shellyota_service::{OtaService, OtaServiceConfig};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn empty_gen2_body() -> serde_json::Value {
    json!({
        "stable": {"version": "", "build_id": "", "url": ""},
        "beta": {"version": "", "build_id": "", "url": ""}
    })
}

/// Catalog origin with one Gen1 model (SHSW-25) and a downloadable
/// artifact; all Gen2+ fan-out requests answer empty.
async fn mount_gen1_catalog(server: &MockServer, stable_version: &str, beta_version: Option<&str>) {
    let mut entry = json!({
        "url": format!("{}/firmware/SHSW-25_build.zip", server.uri()),
        "version": stable_version
    });
    if let Some(beta) = beta_version {
        entry["beta_url"] = json!(format!("{}/firmware/SHSW-25_build_beta.zip", server.uri()));
        entry["beta_ver"] = json!(beta);
    }

    Mock::given(method("GET"))
        .and(path("/files/firmware"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"isok": true, "data": {"SHSW-25": entry}})),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/update/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_gen2_body()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/firmware/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"firmware-data".to_vec()))
        .mount(server)
        .await;
}

/// Catalog origin with a single Gen2+ model served under `api_model`;
/// the Gen1 catalog is empty.
async fn mount_gen2_catalog(server: &MockServer, api_model: &str) {
    Mock::given(method("GET"))
        .and(path("/files/firmware"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isok": true, "data": {}})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/update/{api_model}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stable": {
                "version": "1.5.0",
                "build_id": "build-stable",
                "url": format!("{}/firmware/{}_stable.zip", server.uri(), api_model)
            },
            "beta": {
                "version": "1.6.0-beta",
                "build_id": "build-beta",
                "url": format!("{}/firmware/{}_beta.zip", server.uri(), api_model)
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/update/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_gen2_body()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/firmware/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"firmware-data".to_vec()))
        .mount(server)
        .await;
}

async fn mount_gen1_device(server: &MockServer, model: &str, mac: &str, version: &str) {
    Mock::given(method("GET"))
        .and(path("/shelly"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"gen": 1})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device": {"type": model, "mac": mac, "hostname": format!("shelly-{mac}")},
            "name": "",
            "fw": version,
            "discoverable": false
        })))
        .mount(server)
        .await;
}

async fn mount_gen2_device(server: &MockServer, generation: u8, model: &str, id: &str, version: &str) {
    Mock::given(method("GET"))
        .and(path("/shelly"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"gen": generation, "app": model})),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetDeviceInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "app": model,
            "ver": version,
            "name": ""
        })))
        .mount(server)
        .await;
}

fn catalog_for(server: &MockServer, beta: bool) -> Arc<CatalogClient> {
    let config = CatalogConfig::default()
        .with_base_url(server.uri())
        .with_gen2_base_url(server.uri())
        .with_include_betas(beta)
        .with_http_timeout(Duration::from_secs(5));
    Arc::new(CatalogClient::new(config).expect("catalog client"))
}

fn device_host(server: &MockServer) -> String {
    format!("127.0.0.1:{}", server.address().port())
}

async fn service_for(
    catalog_server: &MockServer,
    device_server: &MockServer,
    download_dir: &TempDir,
    beta: bool,
    force: bool,
) -> OtaService {
    let config = OtaServiceConfig::new()
        .with_catalog_client(catalog_for(catalog_server, beta))
        .with_beta_versions(beta)
        .with_forced_upgrades(force)
        .with_devices(vec![device_host(device_server)])
        .with_download_dir(download_dir.path().to_path_buf())
        .with_wait_time(Duration::from_secs(2));

    OtaService::new(config).await.expect("service")
}

#[tokio::test]
async fn up_to_date_device_has_no_target() {
    let catalog_server = MockServer::start().await;
    mount_gen1_catalog(&catalog_server, "20200309-104051/v1.6.0@43056d58", None).await;
    let device_server = MockServer::start().await;
    mount_gen1_device(
        &device_server,
        "SHSW-25",
        "1CAAB5059F90",
        "20200309-104051/v1.6.0@43056d58",
    )
    .await;
    let download_dir = TempDir::new().expect("tempdir");

    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, false).await;
    service.setup().await.expect("setup");

    let devices: Vec<_> = service.devices().collect();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].firmware_version, "20200309-104051/v1.6.0@43056d58");
    assert!(devices[0].target_firmware.is_none());

    let statuses = service.device_status();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].up_to_date);
    assert!(statuses[0].target_version.is_empty());
    assert!(!statuses[0].stepping_stone);
    assert!(!statuses[0].manual_upgrade_required);

    service.shutdown().await;
}

#[tokio::test]
async fn outdated_gen1_device_targets_catalog_stable() {
    let catalog_server = MockServer::start().await;
    mount_gen1_catalog(&catalog_server, "20200309-104051/v1.6.0@43056d58", None).await;
    let device_server = MockServer::start().await;
    mount_gen1_device(
        &device_server,
        "SHSW-25",
        "1CAAB5059F90",
        "20191127-095418/v1.5.6@0d769d69",
    )
    .await;
    let download_dir = TempDir::new().expect("tempdir");

    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, false).await;
    service.setup().await.expect("setup");

    let devices: Vec<_> = service.devices().collect();
    assert_eq!(devices.len(), 1);
    let target = devices[0].target_firmware.as_ref().expect("target");
    assert_eq!(target.version, "20200309-104051/v1.6.0@43056d58");

    service.shutdown().await;
}

#[tokio::test]
async fn beta_channel_is_carried_on_the_target() {
    let catalog_server = MockServer::start().await;
    mount_gen1_catalog(
        &catalog_server,
        "20200309-104051/v1.6.0@43056d58",
        Some("20210122-154345/v1.10.0-rc1@00eeaa9b"),
    )
    .await;
    let device_server = MockServer::start().await;
    mount_gen1_device(
        &device_server,
        "SHSW-25",
        "1CAAB5059F90",
        "20191127-095418/v1.5.6@0d769d69",
    )
    .await;
    let download_dir = TempDir::new().expect("tempdir");

    let mut service = service_for(&catalog_server, &device_server, &download_dir, true, false).await;
    service.setup().await.expect("setup");

    let devices: Vec<_> = service.devices().collect();
    let target = devices[0].target_firmware.as_ref().expect("target");
    assert_eq!(target.version, "20200309-104051/v1.6.0@43056d58");
    assert_eq!(target.beta_version, "20210122-154345/v1.10.0-rc1@00eeaa9b");

    service.shutdown().await;
}

#[tokio::test]
async fn gen2_device_targets_latest_stable() {
    let catalog_server = MockServer::start().await;
    mount_gen2_catalog(&catalog_server, "Plus1").await;
    let device_server = MockServer::start().await;
    mount_gen2_device(&device_server, 2, "Plus1", "shellyplus1-AABBCC", "1.3.3").await;
    let download_dir = TempDir::new().expect("tempdir");

    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, false).await;
    service.setup().await.expect("setup");

    let devices: Vec<_> = service.devices().collect();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].model, "Plus1");
    assert_eq!(devices[0].generation, 2);
    let target = devices[0].target_firmware.as_ref().expect("target");
    assert_eq!(target.version, "1.5.0");

    service.shutdown().await;
}

#[tokio::test]
async fn gen3_model_resolves_through_api_alias() {
    // 1G3 firmware is published under the API name S1G3; lookup must
    // succeed via reverse aliasing.
    let catalog_server = MockServer::start().await;
    mount_gen2_catalog(&catalog_server, "S1G3").await;
    let device_server = MockServer::start().await;
    mount_gen2_device(&device_server, 3, "1G3", "shelly1g3-DDEEFF", "1.3.3").await;
    let download_dir = TempDir::new().expect("tempdir");

    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, false).await;
    service.setup().await.expect("setup");

    let devices: Vec<_> = service.devices().collect();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].model, "1G3");
    assert_eq!(devices[0].generation, 3);
    let target = devices[0].target_firmware.as_ref().expect("target");
    assert_eq!(target.version, "1.5.0");

    service.shutdown().await;
}

#[tokio::test]
async fn gen4_device_targets_latest_stable() {
    let catalog_server = MockServer::start().await;
    mount_gen2_catalog(&catalog_server, "S1G4").await;
    let device_server = MockServer::start().await;
    mount_gen2_device(&device_server, 4, "1G4", "shelly1g4-112233", "1.3.3").await;
    let download_dir = TempDir::new().expect("tempdir");

    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, false).await;
    service.setup().await.expect("setup");

    let devices: Vec<_> = service.devices().collect();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].generation, 4);
    assert_eq!(
        devices[0].target_firmware.as_ref().expect("target").version,
        "1.5.0"
    );

    service.shutdown().await;
}

#[tokio::test]
async fn stepping_stone_takes_priority_over_latest() {
    let catalog_server = MockServer::start().await;
    mount_gen2_catalog(&catalog_server, "Plus1").await;
    let device_server = MockServer::start().await;
    mount_gen2_device(&device_server, 2, "Plus1", "shellyplus1-AABBCC", "1.0.0").await;
    let download_dir = TempDir::new().expect("tempdir");

    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, false).await;
    service.setup().await.expect("setup");

    let devices: Vec<_> = service.devices().collect();
    assert_eq!(devices.len(), 1);
    let target = devices[0].target_firmware.as_ref().expect("target");
    assert_eq!(target.version, "1.3.3");
    assert!(target.url.contains("fwcdn.shelly.cloud"));

    let statuses = service.device_status();
    assert!(statuses[0].stepping_stone);
    assert!(!statuses[0].up_to_date);

    service.shutdown().await;
}

#[tokio::test]
async fn manual_upgrade_condition_is_surfaced() {
    // A Gen2 model below 1.3.3 with no stepping-stone build and no
    // catalog entry: the status list must flag it rather than hide it.
    let catalog_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/firmware"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isok": true, "data": {}})))
        .mount(&catalog_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/update/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_gen2_body()))
        .mount(&catalog_server)
        .await;

    let device_server = MockServer::start().await;
    mount_gen2_device(&device_server, 2, "PlusHT", "shellyplusht-AABBCC", "1.0.0").await;
    let download_dir = TempDir::new().expect("tempdir");

    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, false).await;
    service.setup().await.expect("setup");

    let statuses = service.device_status();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].up_to_date);
    assert!(statuses[0].manual_upgrade_required);
    assert!(!statuses[0].stepping_stone);

    service.shutdown().await;
}

#[tokio::test]
async fn malformed_hosts_discover_nothing() {
    let catalog_server = MockServer::start().await;
    mount_gen1_catalog(&catalog_server, "20200309-104051/v1.6.0@43056d58", None).await;
    let download_dir = TempDir::new().expect("tempdir");

    let config = OtaServiceConfig::new()
        .with_catalog_client(catalog_for(&catalog_server, false))
        .with_devices(vec!["*".to_string(), "192.168.1.100::80".to_string()])
        .with_download_dir(download_dir.path().to_path_buf())
        .with_wait_time(Duration::from_secs(2));

    let mut service = OtaService::new(config).await.expect("service");
    service.setup().await.expect("setup");

    assert_eq!(service.devices().count(), 0);
    service.shutdown().await;
}

#[tokio::test]
async fn model_filter_and_exclude_patterns_drop_devices() {
    let catalog_server = MockServer::start().await;
    mount_gen2_catalog(&catalog_server, "Plus1").await;
    let device_server = MockServer::start().await;
    mount_gen2_device(&device_server, 2, "Plus1", "shellyplus1-AABBCC", "1.3.3").await;
    let download_dir = TempDir::new().expect("tempdir");

    // Model filter that does not match drops the device.
    let config = OtaServiceConfig::new()
        .with_catalog_client(catalog_for(&catalog_server, false))
        .with_devices(vec![device_host(&device_server)])
        .with_model_filter(vec!["SHSW-25".to_string()])
        .with_download_dir(download_dir.path().to_path_buf())
        .with_wait_time(Duration::from_secs(2));
    let mut service = OtaService::new(config).await.expect("service");
    service.setup().await.expect("setup");
    service.filter_devices();
    assert_eq!(service.devices().count(), 0);
    service.shutdown().await;

    // Exclude glob on the device id drops it too.
    let config = OtaServiceConfig::new()
        .with_catalog_client(catalog_for(&catalog_server, false))
        .with_devices(vec![device_host(&device_server)])
        .with_exclude_filter(vec!["shellyplus1-*".to_string()])
        .with_download_dir(download_dir.path().to_path_buf())
        .with_wait_time(Duration::from_secs(2));
    let mut service = OtaService::new(config).await.expect("service");
    service.setup().await.expect("setup");
    service.filter_devices();
    assert_eq!(service.devices().count(), 0);
    service.shutdown().await;

    // A matching model filter keeps the device.
    let config = OtaServiceConfig::new()
        .with_catalog_client(catalog_for(&catalog_server, false))
        .with_devices(vec![device_host(&device_server)])
        .with_model_filter(vec!["Plus1".to_string()])
        .with_download_dir(download_dir.path().to_path_buf())
        .with_wait_time(Duration::from_secs(2));
    let mut service = OtaService::new(config).await.expect("service");
    service.setup().await.expect("setup");
    service.filter_devices();
    assert_eq!(service.devices().count(), 1);
    service.shutdown().await;
}

#[tokio::test]
async fn reset_discovery_forces_a_fresh_run() {
    let catalog_server = MockServer::start().await;
    mount_gen2_catalog(&catalog_server, "Plus1").await;
    let device_server = MockServer::start().await;
    mount_gen2_device(&device_server, 2, "Plus1", "shellyplus1-AABBCC", "1.3.3").await;
    let download_dir = TempDir::new().expect("tempdir");

    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, false).await;
    service.setup().await.expect("setup");
    assert_eq!(service.devices().count(), 1);

    service.reset_discovery();
    assert_eq!(service.devices().count(), 0);

    service.discover_devices().await.expect("rediscovery");
    assert_eq!(service.devices().count(), 1);

    service.shutdown().await;
}

/// Device info responder that reports 1.0.0 until flipped, then 1.3.3:
/// the state of a Plus1 across a stepping-stone pass.
struct FlippableDeviceInfo {
    upgraded: Arc<AtomicBool>,
}

impl Respond for FlippableDeviceInfo {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let version = if self.upgraded.load(Ordering::SeqCst) {
            "1.3.3"
        } else {
            "1.0.0"
        };
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "shellyplus1-AABBCC",
            "app": "Plus1",
            "ver": version,
            "name": ""
        }))
    }
}

#[tokio::test]
async fn multi_pass_flow_retargets_after_stepping_stone() {
    let catalog_server = MockServer::start().await;
    mount_gen2_catalog(&catalog_server, "Plus1").await;

    let upgraded = Arc::new(AtomicBool::new(false));
    let device_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shelly"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"gen": 2, "app": "Plus1"})))
        .mount(&device_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetDeviceInfo"))
        .respond_with(FlippableDeviceInfo {
            upgraded: Arc::clone(&upgraded),
        })
        .mount(&device_server)
        .await;

    let download_dir = TempDir::new().expect("tempdir");
    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, true).await;
    service.setup().await.expect("setup");

    // Pass 1: the device sits below 1.3.3 and targets the stepping stone.
    {
        let devices: Vec<_> = service.devices().collect();
        assert_eq!(devices.len(), 1);
        assert_eq!(
            devices[0].target_firmware.as_ref().expect("target").version,
            "1.3.3"
        );
    }

    // Simulate the stepping-stone upgrade completing and the device
    // rebooting into 1.3.3, then run the re-evaluation the multi-pass
    // loop performs.
    upgraded.store(true, Ordering::SeqCst);
    service.reset_discovery();
    service.resolve_targets().await.expect("re-resolve");

    let devices: Vec<_> = service.devices().collect();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].firmware_version, "1.3.3");
    assert_eq!(
        devices[0].target_firmware.as_ref().expect("target").version,
        "1.5.0"
    );

    service.shutdown().await;
}

/// OTA trigger responder that records the `url` query parameter handed
/// to the device.
struct OtaTriggerRecorder {
    url: Arc<Mutex<Option<String>>>,
}

impl Respond for OtaTriggerRecorder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let pull_url = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "url")
            .map(|(_, value)| value.into_owned());
        *self.url.lock() = pull_url;
        ResponseTemplate::new(200).set_body_string("Updating...")
    }
}

/// Gen1 settings responder that reports the old firmware until flipped.
struct FlippableGen1Settings {
    upgraded: Arc<AtomicBool>,
}

impl Respond for FlippableGen1Settings {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let version = if self.upgraded.load(Ordering::SeqCst) {
            "20200309-104051/v1.6.0@43056d58"
        } else {
            "20191127-095418/v1.5.6@0d769d69"
        };
        ResponseTemplate::new(200).set_body_json(json!({
            "device": {"type": "SHSW-25", "mac": "1CAAB5059F90", "hostname": "shelly-1CAAB5059F90"},
            "name": "",
            "fw": version
        }))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn forced_upgrade_triggers_exactly_one_ota_pull() {
    let catalog_server = MockServer::start().await;
    mount_gen1_catalog(&catalog_server, "20200309-104051/v1.6.0@43056d58", None).await;

    let upgraded = Arc::new(AtomicBool::new(false));
    let trigger_url: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let device_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shelly"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"gen": 1})))
        .mount(&device_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(FlippableGen1Settings {
            upgraded: Arc::clone(&upgraded),
        })
        .mount(&device_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ota"))
        .respond_with(OtaTriggerRecorder {
            url: Arc::clone(&trigger_url),
        })
        .expect(1)
        .mount(&device_server)
        .await;

    let download_dir = TempDir::new().expect("tempdir");
    let mut service = service_for(&catalog_server, &device_server, &download_dir, false, true).await;
    assert!(service.forced());
    service.setup().await.expect("setup");

    let devices: Vec<_> = service.devices().collect();
    assert_eq!(devices.len(), 1);
    assert!(devices[0].target_firmware.is_some());
    let device_id = devices[0].id.clone();
    let ota_port = service.server_port();

    // Play the device's part: once the OTA trigger lands, pull the
    // firmware from the URL it references and "reboot" into the new
    // version.
    let pull_task = {
        let trigger_url = Arc::clone(&trigger_url);
        let upgraded = Arc::clone(&upgraded);
        tokio::spawn(async move {
            for _ in 0..200 {
                let url = trigger_url.lock().clone();
                if let Some(url) = url {
                    let body = reqwest::get(&url).await.expect("pull").bytes().await.expect("body");
                    assert_eq!(&body[..], b"firmware-data");
                    upgraded.store(true, Ordering::SeqCst);
                    return url;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            panic!("OTA trigger never arrived");
        })
    };

    // force=true: no prompt fires; the pass downloads, triggers and
    // verifies (first verification poll succeeds after the initial
    // backoff).
    service.prompt_for_upgrades().await.expect("upgrade pass");

    let pulled_url = pull_task.await.expect("device pull");
    assert!(
        pulled_url.ends_with(&format!("/{device_id}")),
        "device must be told to pull /{{deviceId}}, got {pulled_url}"
    );
    assert!(pulled_url.contains(&format!(":{ota_port}/")));

    service.shutdown().await;
}
