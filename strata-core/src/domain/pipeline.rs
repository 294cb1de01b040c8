//! Pipeline definition types

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A committed pipeline definition
///
/// Immutable once committed; a new commit produces a new definition and
/// triggers a refresh of the pipeline's base environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub packages: Vec<Package>,
    pub repos: Vec<Repo>,
    pub steps: Vec<Step>,
}

impl Pipeline {
    /// Looks up a step by name.
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Package names grouped by provider, in declaration order.
    ///
    /// Packages carry no ordering semantics; each provider's batch is
    /// installed with a single invocation.
    pub fn packages_by_provider(&self) -> Vec<(Provider, Vec<&str>)> {
        let mut batches: Vec<(Provider, Vec<&str>)> = Vec::new();
        for package in &self.packages {
            match batches.iter_mut().find(|(p, _)| *p == package.provider) {
                Some((_, names)) => names.push(&package.name),
                None => batches.push((package.provider, vec![&package.name])),
            }
        }
        batches
    }
}

/// A package installed into the pipeline's base environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub provider: Provider,
}

/// Package source a package is installed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// The native IPS package system (`pkg install`).
    Pkg,
    /// The pkgsrc binary package manager (`pkgin install`).
    Pkgsrc,
}

impl Provider {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "pkg" => Ok(Provider::Pkg),
            "pkgsrc" => Ok(Provider::Pkgsrc),
            other => Err(ValidationError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Pkg => write!(f, "pkg"),
            Provider::Pkgsrc => write!(f, "pkgsrc"),
        }
    }
}

/// A source repository cloned into the environment's build area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub url: String,
}

impl Repo {
    /// Directory the repository is cloned into, derived from the URL:
    /// the last path segment with any `.git` suffix stripped.
    pub fn checkout_dir(&self) -> String {
        let trimmed = self.url.trim_end_matches('/');
        let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
        let last = last.rsplit(':').next().unwrap_or(last);
        last.trim_end_matches(".git").to_string()
    }
}

/// One build/test step
///
/// The script is a path relative to the environment's build area, invoked
/// inside the execution context. Dependencies name other steps of the same
/// pipeline; the resulting graph must be acyclic (enforced at commit time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub script: String,
    #[serde(default)]
    pub depends: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_dir_strips_git_suffix() {
        let repo = Repo {
            url: "https://example.com/ops/katarineko.git".to_string(),
        };
        assert_eq!(repo.checkout_dir(), "katarineko");
    }

    #[test]
    fn test_checkout_dir_plain_url() {
        let repo = Repo {
            url: "git://example.com/tools/builder/".to_string(),
        };
        assert_eq!(repo.checkout_dir(), "builder");
    }

    #[test]
    fn test_checkout_dir_scp_style() {
        let repo = Repo {
            url: "git@example.com:infra.git".to_string(),
        };
        assert_eq!(repo.checkout_dir(), "infra");
    }

    #[test]
    fn test_packages_batch_per_provider() {
        let pipeline = Pipeline {
            name: "demo".to_string(),
            packages: vec![
                Package {
                    name: "git".to_string(),
                    provider: Provider::Pkg,
                },
                Package {
                    name: "elixir".to_string(),
                    provider: Provider::Pkgsrc,
                },
                Package {
                    name: "gmake".to_string(),
                    provider: Provider::Pkgsrc,
                },
            ],
            repos: vec![],
            steps: vec![],
        };

        let batches = pipeline.packages_by_provider();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], (Provider::Pkg, vec!["git"]));
        assert_eq!(batches[1], (Provider::Pkgsrc, vec!["elixir", "gmake"]));
    }
}
