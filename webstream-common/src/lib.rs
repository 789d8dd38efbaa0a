//! Shared plumbing for the webstream workspace
//!
//! Holds the pieces both the engine library and its hosts need: the global
//! tunable parameter registry, TOML configuration loading, and timestamp
//! helpers.

pub mod config;
pub mod error;
pub mod params;
pub mod time;

pub use error::{Error, Result};
