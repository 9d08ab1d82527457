//! # Pharmyrus Common Library
//!
//! Shared code for the Pharmyrus patent fusion service:
//! - Error type used across crates
//! - TOML configuration model and config file resolution
//! - HTTP user-agent string for upstream clients

pub mod config;
pub mod error;

pub use error::{Error, Result};
