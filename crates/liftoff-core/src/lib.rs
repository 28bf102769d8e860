//! Liftoff Core - shared types for the startup task scheduler
//!
//! This crate provides the error types, configuration loading and the small
//! vocabulary types (affinity, strategy, dependency policy) shared by the
//! scheduler library and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ConfigError, LiftoffError, Result};
pub use types::{Affinity, DependencyPolicy, SchedulingStrategy};
