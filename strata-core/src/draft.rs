//! Draft pipeline model
//!
//! The mutable editing model behind the configuration shell. Draft items
//! hold `Value` fields filled in by `set key=value` commands; they only
//! become a committed [`Pipeline`] through [`DraftPipeline::validate`],
//! which runs the full commit-time checks (field completeness, name
//! uniqueness, dependency resolution, acyclicity).
//!
//! Package, repository and step drafts are a closed set of variants, each
//! with its own attribute schema; an unknown key is rejected at `set` time,
//! missing values at commit time.

use crate::domain::pipeline::{Package, Pipeline, Provider, Repo, Step};
use crate::error::ValidationError;
use crate::graph;

/// An optionally-set draft field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Value<T> {
    #[default]
    Unset,
    Set(T),
}

impl<T: Clone> Value<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Value::Unset => None,
            Value::Set(v) => Some(v),
        }
    }

    /// Resolves the field or reports which one is missing.
    pub fn ensure(&self, field: &'static str) -> Result<T, ValidationError> {
        match self {
            Value::Unset => Err(ValidationError::Incomplete { field }),
            Value::Set(v) => Ok(v.clone()),
        }
    }
}

/// A `key=value` filter used by the editor's `select` command.
#[derive(Debug, Clone)]
pub struct Filter {
    pub key: String,
    pub value: String,
}

fn value_matches(value: &Value<String>, expected: &str) -> bool {
    matches!(value, Value::Set(v) if v == expected)
}

/// Draft of a [`Package`].
#[derive(Debug, Default, Clone)]
pub struct DraftPackage {
    pub name: Value<String>,
    pub provider: Value<String>,
}

impl DraftPackage {
    pub fn set(&mut self, key: &str, value: String) -> Result<(), ValidationError> {
        match key {
            "name" => self.name = Value::Set(value),
            "provider" => self.provider = Value::Set(value),
            _ => {
                return Err(ValidationError::UnknownAttribute {
                    kind: "package",
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, filter: &Filter) -> bool {
        match filter.key.as_str() {
            "name" => value_matches(&self.name, &filter.value),
            "provider" => value_matches(&self.provider, &filter.value),
            _ => false,
        }
    }

    pub fn validate(&self) -> Result<Package, ValidationError> {
        Ok(Package {
            name: self.name.ensure("package name")?,
            provider: Provider::parse(&self.provider.ensure("package provider")?)?,
        })
    }

    /// Short label for the editor prompt.
    pub fn label(&self) -> String {
        match self.name.get() {
            Some(name) => format!("package({})", name),
            None => "package".to_string(),
        }
    }
}

/// Draft of a [`Repo`].
#[derive(Debug, Default, Clone)]
pub struct DraftRepo {
    pub url: Value<String>,
}

impl DraftRepo {
    pub fn set(&mut self, key: &str, value: String) -> Result<(), ValidationError> {
        match key {
            "url" => self.url = Value::Set(value),
            _ => {
                return Err(ValidationError::UnknownAttribute {
                    kind: "repo",
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, filter: &Filter) -> bool {
        match filter.key.as_str() {
            "url" => value_matches(&self.url, &filter.value),
            _ => false,
        }
    }

    pub fn validate(&self) -> Result<Repo, ValidationError> {
        Ok(Repo {
            url: self.url.ensure("repo url")?,
        })
    }

    pub fn label(&self) -> String {
        match self.url.get() {
            Some(url) => format!("repo({})", url),
            None => "repo".to_string(),
        }
    }
}

/// Draft of a [`Step`]. `depends` accepts a comma-separated list.
#[derive(Debug, Default, Clone)]
pub struct DraftStep {
    pub name: Value<String>,
    pub script: Value<String>,
    pub depends: Vec<String>,
}

impl DraftStep {
    pub fn set(&mut self, key: &str, value: String) -> Result<(), ValidationError> {
        match key {
            "name" => self.name = Value::Set(value),
            "script" => self.script = Value::Set(value),
            "depends" => {
                self.depends = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {
                return Err(ValidationError::UnknownAttribute {
                    kind: "step",
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, filter: &Filter) -> bool {
        match filter.key.as_str() {
            "name" => value_matches(&self.name, &filter.value),
            "script" => value_matches(&self.script, &filter.value),
            _ => false,
        }
    }

    pub fn validate(&self) -> Result<Step, ValidationError> {
        Ok(Step {
            name: self.name.ensure("step name")?,
            script: self.script.ensure("step script")?,
            depends: self.depends.clone(),
        })
    }

    pub fn label(&self) -> String {
        match self.name.get() {
            Some(name) => format!("step({})", name),
            None => "step".to_string(),
        }
    }
}

/// The draft pipeline being edited.
#[derive(Debug, Clone)]
pub struct DraftPipeline {
    pub name: String,
    pub packages: Vec<DraftPackage>,
    pub repos: Vec<DraftRepo>,
    pub steps: Vec<DraftStep>,
}

impl DraftPipeline {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            packages: Vec::new(),
            repos: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Reopens a committed definition for editing.
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        Self {
            name: pipeline.name.clone(),
            packages: pipeline
                .packages
                .iter()
                .map(|p| DraftPackage {
                    name: Value::Set(p.name.clone()),
                    provider: Value::Set(p.provider.to_string()),
                })
                .collect(),
            repos: pipeline
                .repos
                .iter()
                .map(|r| DraftRepo {
                    url: Value::Set(r.url.clone()),
                })
                .collect(),
            steps: pipeline
                .steps
                .iter()
                .map(|s| DraftStep {
                    name: Value::Set(s.name.clone()),
                    script: Value::Set(s.script.clone()),
                    depends: s.depends.clone(),
                })
                .collect(),
        }
    }

    pub fn set(&mut self, key: &str, value: String) -> Result<(), ValidationError> {
        match key {
            "name" => {
                self.name = value;
                Ok(())
            }
            _ => Err(ValidationError::UnknownAttribute {
                kind: "pipeline",
                key: key.to_string(),
            }),
        }
    }

    /// Runs the full commit-time validation and produces the immutable
    /// definition. The draft is left untouched on failure.
    pub fn validate(&self) -> Result<Pipeline, ValidationError> {
        let packages = self
            .packages
            .iter()
            .map(DraftPackage::validate)
            .collect::<Result<Vec<_>, _>>()?;
        let repos = self
            .repos
            .iter()
            .map(DraftRepo::validate)
            .collect::<Result<Vec<_>, _>>()?;
        let steps = self
            .steps
            .iter()
            .map(DraftStep::validate)
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = Pipeline {
            name: self.name.clone(),
            packages,
            repos,
            steps,
        };
        graph::validate(&pipeline)?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_with_step(name: &str, script: &str, depends: &str) -> DraftPipeline {
        let mut draft = DraftPipeline::new("katarineko");
        let mut step = DraftStep::default();
        step.set("name", name.to_string()).unwrap();
        step.set("script", script.to_string()).unwrap();
        if !depends.is_empty() {
            step.set("depends", depends.to_string()).unwrap();
        }
        draft.steps.push(step);
        draft
    }

    #[test]
    fn test_unset_field_blocks_commit() {
        let mut draft = DraftPipeline::new("katarineko");
        let mut step = DraftStep::default();
        step.set("name", "build".to_string()).unwrap();
        draft.steps.push(step);

        let err = draft.validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::Incomplete {
                field: "step script"
            }
        );
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let mut package = DraftPackage::default();
        let err = package.set("version", "1.0".to_string()).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_depends_splits_on_commas() {
        let mut step = DraftStep::default();
        step.set("depends", "build, lint".to_string()).unwrap();
        assert_eq!(step.depends, vec!["build", "lint"]);
    }

    #[test]
    fn test_provider_is_validated_at_commit() {
        let mut draft = DraftPipeline::new("katarineko");
        let mut package = DraftPackage::default();
        package.set("name", "git".to_string()).unwrap();
        package.set("provider", "apt".to_string()).unwrap();
        draft.packages.push(package);

        let err = draft.validate().unwrap_err();
        assert_eq!(err, ValidationError::UnknownProvider("apt".to_string()));
    }

    #[test]
    fn test_filter_matches_set_values_only() {
        let mut step = DraftStep::default();
        step.set("name", "build".to_string()).unwrap();

        let hit = Filter {
            key: "name".to_string(),
            value: "build".to_string(),
        };
        let miss = Filter {
            key: "script".to_string(),
            value: "build.sh".to_string(),
        };
        assert!(step.matches(&hit));
        assert!(!step.matches(&miss));
    }

    #[test]
    fn test_valid_draft_commits() {
        let draft = draft_with_step("build", "build.sh", "");
        let pipeline = draft.validate().unwrap();
        assert_eq!(pipeline.name, "katarineko");
        assert_eq!(pipeline.steps.len(), 1);
    }

    #[test]
    fn test_dependency_on_unknown_step_blocks_commit() {
        let draft = draft_with_step("test", "test.sh", "build");
        let err = draft.validate().unwrap_err();
        assert!(matches!(err, ValidationError::UnknownDependency { .. }));
    }
}
