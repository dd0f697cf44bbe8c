#![doc = include_str!("../README.md")]

//! Network verification engine.
//!
//! This crate encodes the control and data planes of a configured network
//! as SMT constraints, prunes the encoding with slice-wide optimizations,
//! instruments it with derived properties and checks them with a solver.

pub mod encoder;
pub mod optimizations;
pub mod property_adder;
pub mod property_checker;
pub mod result;
pub mod settings;
