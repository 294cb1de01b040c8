//! Execution contexts and the environment store
//!
//! An [`ExecutionContext`] is one isolated environment inside a pipeline's
//! namespace: either the long-lived base or an ephemeral run clone. The
//! [`EnvironmentStore`] owns their lifecycle and serializes every operation
//! that touches a pipeline's base dataset behind a per-pipeline lock, so a
//! clone started during promotion observes either the fully-old or the
//! fully-new base, never a partial state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::{dladm, zfs, zone};

/// Directory inside the zone where repositories are cloned and step scripts
/// are invoked from.
pub const BUILD_DIR: &str = "/build";

const BASE_ID: &str = "base";

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// ZFS pool holding all pipeline datasets.
    pub zpool: String,
    /// Etherstub (or physical link) the per-zone VNICs hang off.
    pub link: String,
    /// Static address assigned inside each booted zone.
    pub zone_ip: String,
    /// Default route inside the zone.
    pub gateway: String,
    /// Comma-separated resolvers passed to the zone.
    pub resolvers: String,
    /// How long to wait for a booted zone to accept commands.
    pub boot_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            zpool: "rpool".to_string(),
            link: "internal0".to_string(),
            zone_ip: "10.0.0.100".to_string(),
            gateway: "10.0.0.1".to_string(),
            resolvers: "8.8.8.8,8.8.4.4".to_string(),
            boot_timeout: Duration::from_secs(120),
        }
    }
}

/// Handle to one isolated environment
///
/// Owned exclusively by a single run for its lifetime; the base context is
/// only held during provisioning and promotion, both of which exclude runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pipeline: String,
    id: String,
}

impl ExecutionContext {
    pub fn base(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            id: BASE_ID.to_string(),
        }
    }

    pub fn run(pipeline: &str, run_id: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            id: run_id.to_string(),
        }
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_base(&self) -> bool {
        self.id == BASE_ID
    }

    pub fn zone_name(&self) -> String {
        format!("ci_{}_{}", self.pipeline, self.id)
    }

    pub fn zone_path(&self) -> String {
        format!("/zones/ci/{}/{}", self.pipeline, self.id)
    }

    /// Dataset backing the zonepath: pool name prepended to the zonepath.
    pub fn dataset(&self, zpool: &str) -> String {
        format!("{}{}", zpool, self.zone_path())
    }

    pub fn vnic(&self) -> String {
        format!("{}_internal0", self.zone_name())
    }

    /// Spawns a command inside the context with piped stdout/stderr, for
    /// callers that stream output line by line. The child is killed if the
    /// handle is dropped mid-flight.
    pub fn spawn(&self, command: &str) -> std::io::Result<Child> {
        Command::new("zlogin")
            .arg(self.zone_name())
            .arg(command)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Owner of all pipeline environments on this host
pub struct EnvironmentStore {
    config: StoreConfig,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EnvironmentStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The lock serializing base-dataset mutations for one pipeline.
    fn pipeline_lock(&self, pipeline: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(pipeline.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn ci_root(&self) -> String {
        format!("{}/zones/ci", self.config.zpool)
    }

    pub async fn base_exists(&self, pipeline: &str) -> Result<bool> {
        let base = ExecutionContext::base(pipeline);
        zfs::dataset_exists(&base.dataset(&self.config.zpool)).await
    }

    /// Provisions the base environment: dataset, VNIC, zone configuration
    /// and a from-scratch zone install. Fails with `BaseAlreadyExists`
    /// unless a refresh was requested, in which case leftovers of the
    /// previous base zone are torn down first.
    pub async fn create_base(&self, pipeline: &str, refresh: bool) -> Result<ExecutionContext> {
        let lock = self.pipeline_lock(pipeline);
        let _guard = lock.lock().await;

        let ctx = ExecutionContext::base(pipeline);
        let dataset = ctx.dataset(&self.config.zpool);

        if zfs::dataset_exists(&dataset).await? {
            if !refresh {
                return Err(StoreError::BaseAlreadyExists(pipeline.to_string()));
            }
            info!("refreshing existing base for pipeline {}", pipeline);
        } else {
            zfs::create_dataset(&dataset).await?;
        }

        zone::teardown(&ctx.zone_name()).await;

        dladm::ensure_vnic_exists(&ctx.vnic(), &self.config.link).await?;
        zone::configure(
            &ctx.zone_name(),
            &ctx.zone_path(),
            &ctx.vnic(),
            &self.config.resolvers,
        )
        .await?;
        zone::install(&ctx.zone_name()).await?;

        info!("base environment for {} installed", pipeline);
        Ok(ctx)
    }

    /// Creates a writable clone of the pipeline's current base. Constant
    /// time in the size of the base: the clone shares unmodified blocks and
    /// only diverges on write.
    ///
    /// Fails with `NotProvisioned` when no base exists and `ContextActive`
    /// when another run dataset is still present (one live context per
    /// pipeline; two promotions racing on the same base must be impossible).
    pub async fn clone_for_run(&self, pipeline: &str, run_id: &str) -> Result<ExecutionContext> {
        let lock = self.pipeline_lock(pipeline);
        let _guard = lock.lock().await;

        let base = ExecutionContext::base(pipeline);
        let base_dataset = base.dataset(&self.config.zpool);

        if !zfs::dataset_exists(&base_dataset).await? || !zone::exists(&base.zone_name()).await? {
            return Err(StoreError::NotProvisioned(pipeline.to_string()));
        }

        let pipeline_root = format!("{}/zones/ci/{}", self.config.zpool, pipeline);
        let live = zfs::list_descendants(&pipeline_root)
            .await?
            .into_iter()
            .any(|name| !name.ends_with("/base"));
        if live {
            return Err(StoreError::ContextActive(pipeline.to_string()));
        }

        let ctx = ExecutionContext::run(pipeline, run_id);
        let run_dataset = ctx.dataset(&self.config.zpool);

        zfs::snapshot(&base_dataset, run_id).await?;
        zfs::clone(&format!("{}@{}", base_dataset, run_id), &run_dataset).await?;

        dladm::ensure_vnic_exists(&ctx.vnic(), &self.config.link).await?;
        zone::configure(
            &ctx.zone_name(),
            &ctx.zone_path(),
            &ctx.vnic(),
            &self.config.resolvers,
        )
        .await?;
        zone::attach(&ctx.zone_name()).await?;

        info!("cloned {} into run context {}", pipeline, ctx.zone_name());
        Ok(ctx)
    }

    /// Boots a context and blocks until it can execute commands and its
    /// network is up. Only then may step scripts be invoked.
    pub async fn boot(&self, ctx: &ExecutionContext) -> Result<()> {
        let name = ctx.zone_name();
        zone::boot(&name).await?;
        zone::wait_ready(&name, self.config.boot_timeout).await?;
        zone::setup_networking(&name, &ctx.vnic(), &self.config.zone_ip, &self.config.gateway)
            .await?;
        Ok(())
    }

    pub async fn halt(&self, ctx: &ExecutionContext) -> Result<()> {
        zone::halt(&ctx.zone_name()).await
    }

    /// Runs a provisioning command inside the booted context, failing on
    /// non-zero exit.
    pub async fn exec_in(&self, ctx: &ExecutionContext, command: &str) -> Result<()> {
        zone::exec_ok(&ctx.zone_name(), command).await
    }

    /// Releases everything a run context holds: zone, dataset, origin
    /// snapshot and VNIC. Called on every exit path of a run; errors are
    /// logged, not raised, because cleanup must always finish.
    pub async fn destroy_context(&self, ctx: &ExecutionContext) {
        if ctx.is_base() {
            warn!("refusing to destroy base context for {}", ctx.pipeline());
            return;
        }

        zone::teardown(&ctx.zone_name()).await;

        let run_dataset = ctx.dataset(&self.config.zpool);
        match zfs::dataset_exists(&run_dataset).await {
            Ok(true) => {
                if let Err(e) = zfs::destroy(&run_dataset).await {
                    warn!("failed to destroy dataset {}: {}", run_dataset, e);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("failed to probe dataset {}: {}", run_dataset, e),
        }

        let base_snapshot = format!(
            "{}@{}",
            ExecutionContext::base(ctx.pipeline()).dataset(&self.config.zpool),
            ctx.id()
        );
        if let Err(e) = zfs::destroy(&base_snapshot).await {
            // Already gone after a promotion, or never created.
            tracing::debug!("snapshot {} not destroyed: {}", base_snapshot, e);
        }

        dladm::delete_vnic(&ctx.vnic()).await;
        info!("destroyed context {}", ctx.zone_name());
    }

    /// Tears down a pipeline's base environment: zone, dataset and VNIC.
    /// Used when first-time provisioning fails partway (so the next attempt
    /// starts clean) and when a pipeline is deleted.
    pub async fn destroy_base(&self, pipeline: &str) {
        let lock = self.pipeline_lock(pipeline);
        let _guard = lock.lock().await;

        let base = ExecutionContext::base(pipeline);
        zone::teardown(&base.zone_name()).await;

        let dataset = base.dataset(&self.config.zpool);
        match zfs::dataset_exists(&dataset).await {
            Ok(true) => {
                if let Err(e) = zfs::destroy(&dataset).await {
                    warn!("failed to destroy base dataset {}: {}", dataset, e);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("failed to probe dataset {}: {}", dataset, e),
        }

        dladm::delete_vnic(&base.vnic()).await;
        info!("destroyed base environment for {}", pipeline);
    }

    /// Atomically replaces the pipeline's base with the context's current
    /// state. Holds the pipeline lock for the whole sequence, so concurrent
    /// `clone_for_run` calls wait and then observe the new base.
    pub async fn promote(&self, ctx: &ExecutionContext) -> Result<()> {
        let lock = self.pipeline_lock(ctx.pipeline());
        let _guard = lock.lock().await;

        let base = ExecutionContext::base(ctx.pipeline());
        let base_dataset = base.dataset(&self.config.zpool);
        let run_dataset = ctx.dataset(&self.config.zpool);

        // Detach (never uninstall) the run zone: its dataset is the payload.
        if let Err(e) = zone::halt(&ctx.zone_name()).await {
            tracing::debug!("halt before promote (may not be running): {}", e);
        }
        zone::detach(&ctx.zone_name()).await?;
        zone::delete_config(&ctx.zone_name()).await?;
        dladm::delete_vnic(&ctx.vnic()).await;

        // Reverse the clone relationship, then swap the datasets: the old
        // base becomes a disposable clone of the run dataset and the run
        // dataset takes the base's place.
        zfs::promote(&run_dataset).await?;
        zone::teardown(&base.zone_name()).await;
        if zfs::dataset_exists(&base_dataset).await? {
            zfs::destroy(&base_dataset).await?;
        }
        zfs::rename(&run_dataset, &base_dataset).await?;
        if let Err(e) = zfs::destroy(&format!("{}@{}", base_dataset, ctx.id())).await {
            tracing::debug!("origin snapshot cleanup after promote: {}", e);
        }

        zone::configure(
            &base.zone_name(),
            &base.zone_path(),
            &base.vnic(),
            &self.config.resolvers,
        )
        .await?;
        zone::attach(&base.zone_name()).await?;

        info!("promoted run {} to new base for {}", ctx.id(), ctx.pipeline());
        Ok(())
    }

    /// Destroys every leftover run context on the host. Called by the
    /// startup reconciliation sweep; a context found here belongs to a run
    /// that crashed mid-flight.
    pub async fn sweep_orphans(&self) -> Result<Vec<String>> {
        let root = self.ci_root();
        let mut destroyed = Vec::new();

        for dataset in zfs::list_descendants(&root).await? {
            let relative = match dataset.strip_prefix(&format!("{}/", root)) {
                Some(r) => r,
                None => continue,
            };
            let mut parts = relative.split('/');
            let (pipeline, id) = match (parts.next(), parts.next(), parts.next()) {
                (Some(pipeline), Some(id), None) if id != BASE_ID => (pipeline, id),
                _ => continue,
            };

            let ctx = ExecutionContext::run(pipeline, id);
            warn!("destroying orphaned context {}", ctx.zone_name());
            self.destroy_context(&ctx).await;
            destroyed.push(ctx.zone_name());
        }

        Ok(destroyed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_context_naming() {
        let ctx = ExecutionContext::base("katarineko");
        assert_eq!(ctx.zone_name(), "ci_katarineko_base");
        assert_eq!(ctx.zone_path(), "/zones/ci/katarineko/base");
        assert_eq!(ctx.dataset("rpool"), "rpool/zones/ci/katarineko/base");
        assert_eq!(ctx.vnic(), "ci_katarineko_base_internal0");
        assert!(ctx.is_base());
    }

    #[test]
    fn test_run_context_naming() {
        let ctx = ExecutionContext::run("katarineko", "a9skl10f");
        assert_eq!(ctx.zone_name(), "ci_katarineko_a9skl10f");
        assert_eq!(ctx.dataset("tank"), "tank/zones/ci/katarineko/a9skl10f");
        assert!(!ctx.is_base());
    }

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.zpool, "rpool");
        assert_eq!(config.boot_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_pipeline_lock_is_shared_per_name() {
        let store = EnvironmentStore::new(StoreConfig::default());
        let a = store.pipeline_lock("web");
        let b = store.pipeline_lock("web");
        let c = store.pipeline_lock("api");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
