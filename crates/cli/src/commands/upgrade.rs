//! `shellyctl upgrade` (also the default command)

use anyhow::Result;
use tracing::info;

use crate::commands::{build_service, SharedArgs};
use crate::output;

/// Discover devices and upgrade their firmware.
pub async fn execute(shared: &SharedArgs, force: bool) -> Result<()> {
    let mut service = build_service(shared, force).await?;

    let setup = service.setup().await;
    if let Err(err) = setup {
        service.shutdown().await;
        return Err(err.into());
    }

    service.filter_devices();

    if shared.json {
        let result = output::print_status_json(&service.device_status());
        service.shutdown().await;
        return result;
    }

    let outcome = service.prompt_for_upgrades().await;
    service.shutdown().await;
    outcome?;

    info!("Done!");
    Ok(())
}
