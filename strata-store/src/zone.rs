//! Zone lifecycle operations
//!
//! Wraps `zonecfg(8)`, `zoneadm(8)` and `zlogin(1)`. Pipeline environments
//! are pkgsrc-branded zones whose zonepath sits on the pipeline's dataset;
//! attaching a zone to a cloned dataset is what makes run contexts cheap.
//!
//! All teardown paths are tolerant: a half-created zone must never block the
//! cleanup sweep.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::cmd;
use crate::error::{Result, StoreError};

pub async fn exists(zone: &str) -> Result<bool> {
    cmd::probe("zoneadm", &["-z", zone, "list"]).await
}

/// Writes the zone configuration: brand, zonepath, VNIC and resolvers.
pub async fn configure(
    zone: &str,
    zone_path: &str,
    vnic: &str,
    resolvers: &str,
) -> Result<()> {
    let script = format!(
        "create -b; \
         set zonepath={}; \
         set brand=pkgsrc; \
         set autoboot=false; \
         set ip-type=exclusive; \
         add net; set physical={}; end; \
         add attr; set name=resolvers; set type=string; set value=\"{}\"; end",
        zone_path, vnic, resolvers
    );
    cmd::run_checked("zonecfg", &["-z", zone, script.as_str()]).await?;
    Ok(())
}

/// Installs the zone from scratch (base provisioning only; run contexts are
/// attached to cloned datasets instead).
pub async fn install(zone: &str) -> Result<()> {
    cmd::run_checked("zoneadm", &["-z", zone, "install"]).await?;
    Ok(())
}

/// Attaches a configured zone to an existing (cloned) zonepath dataset.
pub async fn attach(zone: &str) -> Result<()> {
    cmd::run_checked("zoneadm", &["-z", zone, "attach", "-F"]).await?;
    Ok(())
}

pub async fn boot(zone: &str) -> Result<()> {
    cmd::run_checked("zoneadm", &["-z", zone, "boot"]).await?;
    Ok(())
}

pub async fn halt(zone: &str) -> Result<()> {
    cmd::run_checked("zoneadm", &["-z", zone, "halt"]).await?;
    Ok(())
}

/// Detaches a halted zone from its zonepath, leaving the dataset's contents
/// in place. Used before promoting a run dataset to the new base.
pub async fn detach(zone: &str) -> Result<()> {
    cmd::run_checked("zoneadm", &["-z", zone, "detach"]).await?;
    Ok(())
}

/// Removes the zone's configuration without touching its zonepath.
pub async fn delete_config(zone: &str) -> Result<()> {
    cmd::run_checked("zonecfg", &["-z", zone, "delete", "-F"]).await?;
    Ok(())
}

/// Polls until the zone can execute commands, or gives up after `timeout`.
/// Booting is only complete once zlogin works; invoking a step script any
/// earlier races the zone's own startup.
pub async fn wait_ready(zone: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        if cmd::probe("zlogin", &[zone, "/usr/bin/true"]).await? {
            debug!("zone {} is ready", zone);
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(StoreError::BootTimeout {
                zone: zone.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
        sleep(Duration::from_secs(2)).await;
    }
}

/// Brings up the zone's network: plumbs the VNIC, assigns the static
/// address and installs the default route.
pub async fn setup_networking(zone: &str, vnic: &str, ip: &str, gateway: &str) -> Result<()> {
    let create_ip = format!("ipadm create-ip {}", vnic);
    let create_addr = format!("ipadm create-addr -T static -a {}/24 {}/v4", ip, vnic);
    let route = format!("route -p add default {}", gateway);

    for command in [&create_ip, &create_addr, &route] {
        exec_ok(zone, command).await?;
    }
    Ok(())
}

/// Runs a command inside the zone to completion, failing on non-zero exit.
/// Used for provisioning work (package installs, repository clones) where
/// output is not streamed to the ledger.
pub async fn exec_ok(zone: &str, command: &str) -> Result<()> {
    cmd::run_checked("zlogin", &[zone, command]).await?;
    Ok(())
}

/// Best-effort teardown of a zone in any state: halt if running, uninstall
/// if installed, drop the configuration. Errors are logged and swallowed so
/// one stuck resource never prevents the rest from being released.
pub async fn teardown(zone: &str) {
    match exists(zone).await {
        Ok(false) => return,
        Ok(true) => {}
        Err(e) => {
            warn!("failed to probe zone {}: {}", zone, e);
            return;
        }
    }

    if let Err(e) = halt(zone).await {
        debug!("halt {} (may not be running): {}", zone, e);
    }
    if let Err(e) = cmd::run_checked("zoneadm", &["-z", zone, "uninstall", "-F"]).await {
        debug!("uninstall {} (may not be installed): {}", zone, e);
    }
    if let Err(e) = delete_config(zone).await {
        warn!("failed to delete configuration of zone {}: {}", zone, e);
    }
}
