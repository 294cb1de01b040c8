//! Strata Environment Store
//!
//! Owns the copy-on-write storage and isolation primitives behind pipeline
//! environments:
//! - ZFS datasets: the base environment and its near-instant run clones
//! - VNICs: per-zone network links over a shared etherstub
//! - Zones: the lightweight OS-level sandbox each run executes in
//!
//! The store is the only component that touches `zfs(8)`, `dladm(8)`,
//! `zonecfg(8)`, `zoneadm(8)` and `zlogin(1)`; everything above it works
//! with [`ExecutionContext`] handles.

mod cmd;
pub mod context;
pub mod dladm;
pub mod error;
pub mod zfs;
pub mod zone;

pub use context::{BUILD_DIR, EnvironmentStore, ExecutionContext, StoreConfig};
pub use error::{Result, StoreError};
