//! Pipeline definitions: document parsing and structural validation.
//!
//! - `definition` -- YAML/JSON parsing, filesystem load/save
//! - `validator` -- graph and form schema checks producing `ValidationError`

pub mod definition;
pub mod validator;

pub use validator::validate_pipeline;
