//! VNIC management for zone networking
//!
//! Every zone gets its own VNIC over a shared etherstub link; the VNIC name
//! is derived from the zone name so cleanup can always find it.

use tracing::warn;

use crate::cmd;
use crate::error::Result;

pub async fn vnic_exists(name: &str) -> Result<bool> {
    cmd::probe("dladm", &["show-vnic", name]).await
}

pub async fn ensure_vnic_exists(name: &str, link: &str) -> Result<()> {
    if vnic_exists(name).await? {
        return Ok(());
    }
    cmd::run_checked("dladm", &["create-vnic", name, "-l", link]).await?;
    Ok(())
}

/// Best-effort removal; a VNIC that is already gone is not an error.
pub async fn delete_vnic(name: &str) {
    match vnic_exists(name).await {
        Ok(false) => {}
        Ok(true) => {
            if let Err(e) = cmd::run_checked("dladm", &["delete-vnic", name]).await {
                warn!("failed to delete vnic {}: {}", name, e);
            }
        }
        Err(e) => warn!("failed to probe vnic {}: {}", name, e),
    }
}
