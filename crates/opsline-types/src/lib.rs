//! Shared domain types for Opsline.
//!
//! This crate contains the core domain types used across the Opsline workspace:
//! pipeline definitions, form schemas, service requests, execution events,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod form;
pub mod pipeline;
pub mod request;
