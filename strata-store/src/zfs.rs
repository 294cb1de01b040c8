//! ZFS dataset operations
//!
//! Thin wrappers around the `zfs(8)` CLI. Datasets are the copy-on-write
//! backing store for pipeline environments: the base dataset holds the
//! provisioned image, run datasets are clones of a base snapshot and share
//! unmodified blocks with it, so creating one is constant-time regardless of
//! environment size.

use crate::cmd;
use crate::error::Result;

pub async fn dataset_exists(name: &str) -> Result<bool> {
    cmd::probe("zfs", &["list", "-H", "-o", "name", name]).await
}

pub async fn create_dataset(name: &str) -> Result<()> {
    cmd::run_checked("zfs", &["create", "-p", name]).await?;
    Ok(())
}

/// Takes `dataset@snap`.
pub async fn snapshot(dataset: &str, snap: &str) -> Result<()> {
    let full = format!("{}@{}", dataset, snap);
    cmd::run_checked("zfs", &["snapshot", full.as_str()]).await?;
    Ok(())
}

/// Clones `snapshot` (a full `dataset@snap` name) into `target`.
pub async fn clone(snapshot: &str, target: &str) -> Result<()> {
    cmd::run_checked("zfs", &["clone", snapshot, target]).await?;
    Ok(())
}

/// Reverses the origin relationship between a clone and the dataset it was
/// cloned from. After promotion the former origin depends on `dataset` and
/// can be destroyed independently of it.
pub async fn promote(dataset: &str) -> Result<()> {
    cmd::run_checked("zfs", &["promote", dataset]).await?;
    Ok(())
}

pub async fn rename(from: &str, to: &str) -> Result<()> {
    cmd::run_checked("zfs", &["rename", from, to]).await?;
    Ok(())
}

/// Destroys a dataset (or snapshot) and everything beneath it.
pub async fn destroy(name: &str) -> Result<()> {
    cmd::run_checked("zfs", &["destroy", "-r", name]).await?;
    Ok(())
}

/// Datasets strictly below `root`, one full name per entry. An absent root
/// yields an empty list.
pub async fn list_descendants(root: &str) -> Result<Vec<String>> {
    if !dataset_exists(root).await? {
        return Ok(Vec::new());
    }

    let output = cmd::run_checked("zfs", &["list", "-H", "-o", "name", "-r", root]).await?;
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != root)
        .map(str::to_string)
        .collect())
}
