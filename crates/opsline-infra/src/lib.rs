//! Infrastructure layer for Opsline.
//!
//! Implementations of the ports defined in `opsline-core`: SQLite
//! repositories, the reqwest-backed HTTP client for API steps, and the
//! `config.toml` loader.

pub mod config;
pub mod http;
pub mod sqlite;
