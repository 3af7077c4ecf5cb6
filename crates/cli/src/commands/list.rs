//! `shellyctl list`

use anyhow::Result;

use crate::commands::{build_service, SharedArgs};
use crate::output;

/// Discover devices and list available updates without touching any of
/// them.
pub async fn execute(shared: &SharedArgs) -> Result<()> {
    let mut service = build_service(shared, false).await?;

    let setup = service.setup().await;
    if let Err(err) = setup {
        service.shutdown().await;
        return Err(err.into());
    }

    service.filter_devices();
    let statuses = service.device_status();
    service.shutdown().await;

    if shared.json {
        return output::print_status_json(&statuses);
    }

    output::print_status_table(&statuses);
    Ok(())
}
