//! Pipeline domain types for Opsline.
//!
//! A `PipelineDefinition` is a named, versioned chain of steps linked by
//! `next_name`/`prev_name` pointers. Definitions are immutable once stored:
//! an edit produces a new version under the same ID.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::FormSchema;

// ---------------------------------------------------------------------------
// Pipeline Definition
// ---------------------------------------------------------------------------

/// A stored pipeline: the graph of steps plus the form its requests must fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// UUIDv7 assigned on first save. Shared by every version.
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    /// Version number, starting at 1 and incremented on each revision.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Human-readable pipeline name.
    #[serde(default)]
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Name of the step execution starts from.
    #[serde(default)]
    pub first_step_name: String,
    /// Steps of the pipeline. Order is irrelevant for execution.
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
    /// Fields a service request must supply.
    #[serde(default)]
    pub form_schema: FormSchema,
    /// When this version was stored.
    #[serde(default = "Utc::now")]
    pub created_on: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl PipelineDefinition {
    /// Look up a step by name.
    ///
    /// Returns exactly the step with that name, or `None`.
    pub fn step(&self, name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// The declared first step, if it exists.
    pub fn first_step(&self) -> Option<&PipelineStep> {
        self.step(&self.first_step_name)
    }

    /// The `(id, version)` pair identifying this definition.
    pub fn reference(&self) -> PipelineRef {
        PipelineRef {
            id: self.id,
            version: self.version,
        }
    }
}

/// Identity of one stored pipeline version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRef {
    pub id: Uuid,
    pub version: u32,
}

impl fmt::Display for PipelineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.id, self.version)
    }
}

/// Lightweight listing entry for the latest version of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: Uuid,
    pub version: u32,
    pub name: String,
    pub step_count: usize,
    pub created_on: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pipeline Step
// ---------------------------------------------------------------------------

/// A single step in a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Step name, unique within a pipeline.
    #[serde(default)]
    pub name: String,
    /// The kind of step.
    pub kind: StepKind,
    /// Step parameters. String values may embed `${token}` placeholders.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Name of the following step. Empty only for terminal steps.
    #[serde(default)]
    pub next_name: String,
    /// Name of the preceding step. Empty only for the first step.
    #[serde(default)]
    pub prev_name: String,
    /// Whether reaching this step ends the pipeline.
    #[serde(default)]
    pub is_terminal: bool,
}

/// The kind of a pipeline step.
///
/// Unknown kind strings deserialize into `Other` so that validation can
/// report them instead of failing at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    /// Outbound HTTP call.
    Api,
    /// Human approval gate.
    WaitForApproval,
    /// A kind this build does not know about.
    Other(String),
}

impl StepKind {
    /// Every kind an executor registry must cover.
    pub const KNOWN: [StepKind; 2] = [StepKind::Api, StepKind::WaitForApproval];

    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Api => "api",
            StepKind::WaitForApproval => "wait_for_approval",
            StepKind::Other(s) => s.as_str(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, StepKind::Other(_))
    }
}

impl From<String> for StepKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "api" | "API" | "Api" => StepKind::Api,
            "wait_for_approval" | "WaitForApproval" | "WAIT_FOR_APPROVAL" => {
                StepKind::WaitForApproval
            }
            _ => StepKind::Other(s),
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{FieldType, FormField};
    use serde_json::json;

    fn step(name: &str, kind: StepKind, next: &str, prev: &str, terminal: bool) -> PipelineStep {
        PipelineStep {
            name: name.to_string(),
            kind,
            parameters: HashMap::new(),
            next_name: next.to_string(),
            prev_name: prev.to_string(),
            is_terminal: terminal,
        }
    }

    fn sample_pipeline() -> PipelineDefinition {
        PipelineDefinition {
            id: Uuid::now_v7(),
            version: 1,
            name: "provision-vm".to_string(),
            description: Some("Create a VM after manager sign-off".to_string()),
            first_step_name: "reserve".to_string(),
            steps: vec![
                step("reserve", StepKind::Api, "approve", "", false),
                step("approve", StepKind::WaitForApproval, "create", "reserve", false),
                step("create", StepKind::Api, "", "approve", true),
            ],
            form_schema: FormSchema {
                fields: vec![FormField {
                    name: "size".to_string(),
                    field_type: FieldType::Dropdown,
                    required: true,
                    allowed_values: vec!["small".to_string(), "large".to_string()],
                }],
            },
            created_on: Utc::now(),
        }
    }

    #[test]
    fn step_lookup_returns_exact_step_or_none() {
        let p = sample_pipeline();
        let found = p.step("approve").expect("step exists");
        assert_eq!(found.name, "approve");
        assert_eq!(found.kind, StepKind::WaitForApproval);
        assert!(p.step("appro").is_none());
        assert!(p.step("").is_none());
        assert_eq!(p.first_step().map(|s| s.name.as_str()), Some("reserve"));
    }

    #[test]
    fn step_kind_parses_known_spellings() {
        let kind: StepKind = serde_json::from_value(json!("API")).unwrap();
        assert_eq!(kind, StepKind::Api);
        let kind: StepKind = serde_json::from_value(json!("WaitForApproval")).unwrap();
        assert_eq!(kind, StepKind::WaitForApproval);
        let kind: StepKind = serde_json::from_value(json!("wait_for_approval")).unwrap();
        assert_eq!(kind, StepKind::WaitForApproval);
    }

    #[test]
    fn step_kind_preserves_unknown_strings() {
        let kind: StepKind = serde_json::from_value(json!("email")).unwrap();
        assert_eq!(kind, StepKind::Other("email".to_string()));
        assert!(!kind.is_known());
        assert_eq!(serde_json::to_value(&kind).unwrap(), json!("email"));
    }

    #[test]
    fn pipeline_yaml_roundtrip() {
        let original = sample_pipeline();
        let yaml = serde_yaml_ng::to_string(&original).expect("serialize to YAML");
        assert!(yaml.contains("kind: wait_for_approval"));
        let parsed: PipelineDefinition = serde_yaml_ng::from_str(&yaml).expect("parse YAML");
        assert_eq!(parsed.id, original.id);
        assert_eq!(parsed.steps.len(), 3);
        assert_eq!(parsed.form_schema.fields.len(), 1);
    }

    #[test]
    fn pipeline_defaults_fill_missing_fields() {
        let yaml = r#"
name: minimal
first_step_name: only
steps:
  - name: only
    kind: api
    is_terminal: true
    parameters:
      url: "https://example.com/${form.host}"
"#;
        let parsed: PipelineDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(parsed.id.is_nil());
        assert_eq!(parsed.version, 1);
        assert!(parsed.form_schema.fields.is_empty());
        assert_eq!(parsed.steps[0].next_name, "");
        assert_eq!(
            parsed.steps[0].parameters["url"],
            json!("https://example.com/${form.host}")
        );
    }

    #[test]
    fn pipeline_ref_display() {
        let r = PipelineRef {
            id: Uuid::nil(),
            version: 3,
        };
        assert!(r.to_string().ends_with("@v3"));
    }
}
