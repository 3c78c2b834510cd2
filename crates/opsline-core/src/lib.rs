//! Business logic and repository trait definitions for Opsline.
//!
//! This crate defines the "ports" (repository traits, the HTTP client trait)
//! that the infrastructure layer implements, plus the pipeline execution
//! engine itself. It depends only on `opsline-types` -- never on
//! `opsline-infra` or any database/IO crate.

pub mod event;
pub mod execution;
pub mod form;
pub mod pipeline;
pub mod queue;
pub mod repository;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
