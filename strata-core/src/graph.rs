//! Step dependency graph
//!
//! Commit-time validation of the step graph and derivation of the execution
//! order. The order is a sequence of groups: every step's dependencies live
//! in strictly earlier groups, and steps within a group have no dependency
//! relation to each other, so they are eligible to run concurrently. Groups
//! are sorted lexicographically for deterministic, reproducible ordering in
//! logs and tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::domain::pipeline::{Pipeline, Step};
use crate::error::{ValidationError, validate_pipeline_name};

/// Validates a full pipeline definition: naming constraints, step/package
/// name uniqueness, repository checkout collisions, dependency resolution
/// and acyclicity.
pub fn validate(pipeline: &Pipeline) -> Result<(), ValidationError> {
    validate_pipeline_name(&pipeline.name)?;

    let mut package_names = HashSet::new();
    for package in &pipeline.packages {
        if package.name.is_empty() {
            return Err(ValidationError::EmptyName { kind: "package" });
        }
        if !package_names.insert(package.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                kind: "package",
                name: package.name.clone(),
            });
        }
    }

    let mut checkouts: HashMap<String, &str> = HashMap::new();
    for repo in &pipeline.repos {
        if repo.url.is_empty() {
            return Err(ValidationError::EmptyName { kind: "repo url" });
        }
        let dir = repo.checkout_dir();
        if let Some(first) = checkouts.insert(dir.clone(), &repo.url) {
            return Err(ValidationError::CheckoutCollision {
                first: first.to_string(),
                second: repo.url.clone(),
                dir,
            });
        }
    }

    validate_steps(&pipeline.steps)
}

/// Validates the step set alone: unique names, resolvable dependencies and
/// no cycles.
pub fn validate_steps(steps: &[Step]) -> Result<(), ValidationError> {
    let mut names = HashSet::new();
    for step in steps {
        if step.name.is_empty() {
            return Err(ValidationError::EmptyName { kind: "step" });
        }
        if !names.insert(step.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                kind: "step",
                name: step.name.clone(),
            });
        }
    }

    for step in steps {
        for dep in &step.depends {
            if !names.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    if let Some(cycle) = find_cycle(steps) {
        return Err(ValidationError::CyclicDependency { cycle });
    }

    Ok(())
}

/// Computes the execution order as groups of step names
///
/// Level-grouped Kahn's algorithm: each pass collects every remaining step
/// whose dependencies are all placed. Iteration over a `BTreeMap` keeps each
/// group lexicographically sorted.
///
/// Acyclicity is a commit-time invariant; a cycle reaching this function is
/// still reported rather than looping forever.
pub fn execution_groups(steps: &[Step]) -> Result<Vec<Vec<String>>, ValidationError> {
    let mut remaining: BTreeMap<&str, &Step> =
        steps.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut groups = Vec::new();

    while !remaining.is_empty() {
        let group: Vec<String> = remaining
            .values()
            .filter(|s| s.depends.iter().all(|d| placed.contains(d.as_str())))
            .map(|s| s.name.clone())
            .collect();

        if group.is_empty() {
            let cycle = find_cycle(steps).unwrap_or_default();
            return Err(ValidationError::CyclicDependency { cycle });
        }

        for name in &group {
            if let Some((key, _)) = remaining.remove_entry(name.as_str()) {
                placed.insert(key);
            }
        }
        groups.push(group);
    }

    Ok(groups)
}

/// Finds one dependency cycle and returns its path, first step repeated at
/// the end (`a -> b -> a`). Unknown dependencies are ignored here; they are
/// reported separately.
fn find_cycle(steps: &[Step]) -> Option<Vec<String>> {
    let by_name: HashMap<&str, &Step> = steps.iter().map(|s| (s.name.as_str(), s)).collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        by_name: &HashMap<&'a str, &'a Step>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        path.push(name);

        if let Some(step) = by_name.get(name) {
            for dep in &step.depends {
                if by_name.contains_key(dep.as_str()) {
                    if let Some(cycle) = visit(dep.as_str(), by_name, marks, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        marks.insert(name, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut path = Vec::new();
    for step in steps {
        if let Some(cycle) = visit(step.name.as_str(), &by_name, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, depends: &[&str]) -> Step {
        Step {
            name: name.to_string(),
            script: format!("{}.sh", name),
            depends: depends.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_independent_steps_form_one_group() {
        let steps = vec![step("lint", &[]), step("build", &[])];
        let groups = execution_groups(&steps).unwrap();
        assert_eq!(groups, vec![vec!["build".to_string(), "lint".to_string()]]);
    }

    #[test]
    fn test_dependencies_land_in_earlier_groups() {
        let steps = vec![
            step("deploy", &["test", "package"]),
            step("test", &["build"]),
            step("package", &["build"]),
            step("build", &[]),
        ];
        let groups = execution_groups(&steps).unwrap();
        assert_eq!(
            groups,
            vec![
                vec!["build".to_string()],
                vec!["package".to_string(), "test".to_string()],
                vec!["deploy".to_string()],
            ]
        );

        // Every step's dependencies are placed strictly earlier.
        for (i, group) in groups.iter().enumerate() {
            for name in group {
                let s = steps.iter().find(|s| &s.name == name).unwrap();
                for dep in &s.depends {
                    let dep_group = groups.iter().position(|g| g.contains(dep)).unwrap();
                    assert!(dep_group < i, "{} depends on {} in a later group", name, dep);
                }
            }
        }
    }

    #[test]
    fn test_groups_are_lexicographically_ordered() {
        let steps = vec![step("zeta", &[]), step("alpha", &[]), step("mid", &[])];
        let groups = execution_groups(&steps).unwrap();
        assert_eq!(
            groups[0],
            vec!["alpha".to_string(), "mid".to_string(), "zeta".to_string()]
        );
    }

    #[test]
    fn test_cycle_is_rejected_with_path() {
        let steps = vec![
            step("a", &["c"]),
            step("b", &["a"]),
            step("c", &["b"]),
        ];
        let err = validate_steps(&steps).unwrap_err();
        match err {
            ValidationError::CyclicDependency { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.len() == 4, "expected full cycle path, got {:?}", cycle);
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps = vec![step("loop", &["loop"])];
        let err = validate_steps(&steps).unwrap_err();
        assert!(matches!(err, ValidationError::CyclicDependency { .. }));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let steps = vec![step("test", &["build"])];
        let err = validate_steps(&steps).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownDependency {
                step: "test".to_string(),
                dependency: "build".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_step_name_is_rejected() {
        let steps = vec![step("build", &[]), step("build", &[])];
        let err = validate_steps(&steps).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateName {
                kind: "step",
                name: "build".to_string(),
            }
        );
    }

    #[test]
    fn test_diamond_graph_groups() {
        let steps = vec![
            step("base", &[]),
            step("left", &["base"]),
            step("right", &["base"]),
            step("join", &["left", "right"]),
        ];
        let groups = execution_groups(&steps).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1], vec!["left".to_string(), "right".to_string()]);
    }
}
