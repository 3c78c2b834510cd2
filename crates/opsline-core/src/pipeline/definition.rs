//! Pipeline document parsing and filesystem operations.
//!
//! Pipelines are authored as YAML (or JSON) documents and converted into the
//! canonical `PipelineDefinition`. Parsing always runs `validate_pipeline`,
//! so a successfully parsed document is structurally valid.

use std::path::Path;

use opsline_types::error::ValidationError;
use opsline_types::pipeline::PipelineDefinition;
use thiserror::Error;

use super::validator::validate_pipeline;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from loading or saving pipeline documents.
#[derive(Debug, Error)]
pub enum PipelineFileError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// The document parsed but is not a valid pipeline.
    #[error("invalid pipeline: {0}")]
    Invalid(#[from] ValidationError),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `PipelineDefinition`.
pub fn parse_pipeline_yaml(yaml: &str) -> Result<PipelineDefinition, PipelineFileError> {
    let def: PipelineDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| PipelineFileError::Parse(e.to_string()))?;
    validate_pipeline(&def)?;
    Ok(def)
}

/// Parse a JSON string into a validated `PipelineDefinition`.
pub fn parse_pipeline_json(json: &str) -> Result<PipelineDefinition, PipelineFileError> {
    let def: PipelineDefinition =
        serde_json::from_str(json).map_err(|e| PipelineFileError::Parse(e.to_string()))?;
    validate_pipeline(&def)?;
    Ok(def)
}

/// Serialize a `PipelineDefinition` to a YAML string.
pub fn serialize_pipeline_yaml(def: &PipelineDefinition) -> Result<String, PipelineFileError> {
    serde_yaml_ng::to_string(def).map_err(|e| PipelineFileError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// Load and validate a pipeline document. `.json` files are read as JSON,
/// everything else as YAML.
pub fn load_pipeline_file(path: &Path) -> Result<PipelineDefinition, PipelineFileError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        parse_pipeline_json(&content)
    } else {
        parse_pipeline_yaml(&content)
    }
}

/// Write a pipeline as YAML, creating parent directories as needed.
pub fn save_pipeline_file(path: &Path, def: &PipelineDefinition) -> Result<(), PipelineFileError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_pipeline_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
