#![doc = include_str!("../README.md")]

//! Network data model.
//!
//! This crate defines IPv4 prefixes, routing protocols, the routing policy
//! AST, router configurations, the topology [`graph::Graph`] derived from
//! them, and name-pattern resolution over the graph.

pub mod config;
pub mod graph;
pub mod patterns;
pub mod policy;
pub mod prefix;
pub mod protocol;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;
