//! Configuration Module
//!
//! Strongly-typed TOML configuration for the control engine, validated once
//! when loaded. Components receive the sections they need by value; nothing
//! in the core reads configuration globally.
//!
//! ## Loading Order
//!
//! 1. `HEATWISE_CONFIG` environment variable (path to TOML file)
//! 2. `heatwise.toml` in the current working directory
//! 3. Built-in defaults (`defaults.rs`)

pub mod defaults;
mod system_config;
pub mod validation;

pub use system_config::*;
