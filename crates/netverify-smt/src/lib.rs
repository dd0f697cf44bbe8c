#![doc = include_str!("../README.md")]

//! SMT terms, solver integration and query contexts for network
//! configuration verification.
//!
//! Encodings are built as solver-agnostic [`terms::SmtTerm`]s inside a
//! [`context::SmtContext`] and replayed into a backend implementing
//! [`solver::SmtSolver`] (Z3 by default).

pub mod backends;
pub mod context;
pub mod solver;
pub mod terms;
