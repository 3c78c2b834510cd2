//! Form schema types.
//!
//! A pipeline declares the form a service request must fill. Submitted form
//! data is a plain JSON object keyed by field name.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Submitted form data: field name -> value. Shape depends on field type.
pub type FormData = HashMap<String, serde_json::Value>;

/// The declared input fields of a pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default)]
    pub fields: Vec<FormField>,
}

impl FormSchema {
    /// Find a field by name (first declaration wins).
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A single form field declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Permitted values for selection fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

/// Input type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text; value must be a string.
    Text,
    /// Single selection; value must be one of `allowed_values`.
    Dropdown,
    /// Multiple selection; value must be a list of `allowed_values` members.
    Checkbox,
    /// Single selection rendered as radio options.
    Option,
}

impl FieldType {
    /// Selection types must declare a non-empty `allowed_values`.
    pub fn requires_allowed_values(self) -> bool {
        matches!(
            self,
            FieldType::Dropdown | FieldType::Checkbox | FieldType::Option
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Text => "text",
            FieldType::Dropdown => "dropdown",
            FieldType::Checkbox => "checkbox",
            FieldType::Option => "option",
        };
        f.write_str(s)
    }
}
