// src/dag/mod.rs

//! Stage graph and dependency resolution.
//!
//! - [`graph`] builds the stage graph from definitions and renders it.
//! - [`resolver`] turns a requested list of stages into an execution order.

pub mod graph;
pub mod resolver;

pub use graph::{Stage, StageGraph};
