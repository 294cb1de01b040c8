//! Strata Core
//!
//! Core types and abstractions for the Strata CI engine.
//!
//! This crate contains:
//! - Domain types: pipeline definitions, run records, log lines, run events
//! - Draft types: the mutable editing model behind the configuration shell
//! - Graph: step dependency validation and topological grouping

pub mod domain;
pub mod draft;
pub mod error;
pub mod graph;

pub use error::ValidationError;
