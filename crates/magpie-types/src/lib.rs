//! Core types for the Magpie long-term memory engine.
//!
//! This crate defines the shared data structures, error taxonomy, and
//! configuration used across the graph client, the memory engine, and the
//! CLI. It contains no business logic.

pub mod config;
pub mod error;
pub mod model;
