//! Per-field form data validation.
//!
//! `FormDataValidator` dispatches each declared field to a `FieldHandler`
//! keyed by `FieldType`. Default handlers cover every field type; callers may
//! replace any of them at construction time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use opsline_types::error::ValidationError;
use opsline_types::form::{FieldType, FormData, FormField, FormSchema};
use serde_json::Value;

// ---------------------------------------------------------------------------
// FieldHandler
// ---------------------------------------------------------------------------

/// Validates a single present, non-null form value against its declaration.
pub trait FieldHandler: Send + Sync {
    fn validate(&self, field: &FormField, value: &Value) -> Result<(), ValidationError>;
}

/// Free text: any string.
pub struct TextHandler;

impl FieldHandler for TextHandler {
    fn validate(&self, field: &FormField, value: &Value) -> Result<(), ValidationError> {
        match value {
            Value::String(_) => Ok(()),
            _ => Err(ValidationError::InvalidFormDataType {
                field: field.name.clone(),
                expected: "string".to_string(),
            }),
        }
    }
}

/// Single selection (dropdown and option): a string from `allowed_values`.
pub struct SingleSelectHandler;

impl FieldHandler for SingleSelectHandler {
    fn validate(&self, field: &FormField, value: &Value) -> Result<(), ValidationError> {
        let Value::String(selected) = value else {
            return Err(ValidationError::InvalidFormDataType {
                field: field.name.clone(),
                expected: "string".to_string(),
            });
        };
        check_member(field, selected)
    }
}

/// Multiple selection: a list of strings, each from `allowed_values`.
pub struct CheckboxHandler;

impl FieldHandler for CheckboxHandler {
    fn validate(&self, field: &FormField, value: &Value) -> Result<(), ValidationError> {
        let wrong_type = || ValidationError::InvalidFormDataType {
            field: field.name.clone(),
            expected: "[]string".to_string(),
        };

        let Value::Array(items) = value else {
            return Err(wrong_type());
        };

        let mut selected = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(s) => selected.push(s.as_str()),
                _ => return Err(wrong_type()),
            }
        }

        for s in selected {
            check_member(field, s)?;
        }
        Ok(())
    }
}

fn check_member(field: &FormField, selected: &str) -> Result<(), ValidationError> {
    if field.allowed_values.iter().any(|v| v == selected) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSelectedFormData {
            allowed: field.allowed_values.clone(),
            got: selected.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// FormDataValidator
// ---------------------------------------------------------------------------

/// Validates submitted form data against a `FormSchema`.
#[derive(Clone)]
pub struct FormDataValidator {
    handlers: HashMap<FieldType, Arc<dyn FieldHandler>>,
}

impl FormDataValidator {
    /// Validator with the default handler for every field type.
    pub fn new() -> Self {
        let select: Arc<dyn FieldHandler> = Arc::new(SingleSelectHandler);
        let mut handlers: HashMap<FieldType, Arc<dyn FieldHandler>> = HashMap::new();
        handlers.insert(FieldType::Text, Arc::new(TextHandler));
        handlers.insert(FieldType::Dropdown, Arc::clone(&select));
        handlers.insert(FieldType::Option, select);
        handlers.insert(FieldType::Checkbox, Arc::new(CheckboxHandler));
        Self { handlers }
    }

    /// Default handlers with `overrides` replacing the matching entries.
    pub fn with_handlers(overrides: HashMap<FieldType, Arc<dyn FieldHandler>>) -> Self {
        let mut validator = Self::new();
        validator.handlers.extend(overrides);
        validator
    }

    /// Replace the handler for one field type.
    pub fn with_handler(mut self, field_type: FieldType, handler: Arc<dyn FieldHandler>) -> Self {
        self.handlers.insert(field_type, handler);
        self
    }

    /// Validate `data` against `schema`.
    ///
    /// Fields are checked in declaration order and the first failure is
    /// returned. A JSON null counts as absent. Keys that the schema does not
    /// declare are ignored.
    pub fn validate(&self, data: &FormData, schema: &FormSchema) -> Result<(), ValidationError> {
        let mut seen: HashSet<&str> = HashSet::new();

        for field in &schema.fields {
            if !seen.insert(field.name.as_str()) {
                continue;
            }

            let value = data.get(&field.name).filter(|v| !v.is_null());
            let Some(value) = value else {
                if field.required {
                    return Err(ValidationError::missing(field.name.clone()));
                }
                continue;
            };

            if let Some(handler) = self.handlers.get(&field.field_type) {
                handler.validate(field, value)?;
            }
        }

        Ok(())
    }
}

impl Default for FormDataValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FormDataValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormDataValidator")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn field(name: &str, field_type: FieldType, required: bool, allowed: &[&str]) -> FormField {
        FormField {
            name: name.to_string(),
            field_type,
            required,
            allowed_values: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn schema(fields: Vec<FormField>) -> FormSchema {
        FormSchema { fields }
    }

    fn data(value: Value) -> FormData {
        serde_json::from_value(value).unwrap()
    }

    fn checkbox_schema() -> FormSchema {
        schema(vec![field("regions", FieldType::Checkbox, true, &["a", "b"])])
    }

    #[test]
    fn checkbox_accepts_member_list() {
        let v = FormDataValidator::new();
        assert_eq!(
            v.validate(&data(json!({"regions": ["a"]})), &checkbox_schema()),
            Ok(())
        );
    }

    #[test]
    fn checkbox_accepts_every_allowed_value() {
        let v = FormDataValidator::new();
        let s = schema(vec![field("zones", FieldType::Checkbox, true, &["x", "y"])]);
        assert_eq!(v.validate(&data(json!({"zones": ["x", "y"]})), &s), Ok(()));
        assert_eq!(v.validate(&data(json!({"zones": ["y", "x"]})), &s), Ok(()));
    }

    #[test]
    fn checkbox_rejects_non_member() {
        let v = FormDataValidator::new();
        assert_eq!(
            v.validate(&data(json!({"regions": ["a", "c"]})), &checkbox_schema()),
            Err(ValidationError::InvalidSelectedFormData {
                allowed: vec!["a".to_string(), "b".to_string()],
                got: "c".to_string(),
            })
        );
    }

    #[test]
    fn checkbox_rejects_plain_string() {
        let v = FormDataValidator::new();
        assert_eq!(
            v.validate(&data(json!({"regions": "a"})), &checkbox_schema()),
            Err(ValidationError::InvalidFormDataType {
                field: "regions".to_string(),
                expected: "[]string".to_string(),
            })
        );
    }

    #[test]
    fn checkbox_rejects_non_string_elements() {
        let v = FormDataValidator::new();
        assert!(matches!(
            v.validate(&data(json!({"regions": ["a", 1]})), &checkbox_schema()),
            Err(ValidationError::InvalidFormDataType { .. })
        ));
    }

    #[test]
    fn required_field_missing_or_null() {
        let v = FormDataValidator::new();
        let s = schema(vec![field("owner", FieldType::Text, true, &[])]);
        assert_eq!(
            v.validate(&data(json!({})), &s),
            Err(ValidationError::missing("owner"))
        );
        assert_eq!(
            v.validate(&data(json!({"owner": null})), &s),
            Err(ValidationError::missing("owner"))
        );
    }

    #[test]
    fn optional_field_may_be_absent() {
        let v = FormDataValidator::new();
        let s = schema(vec![field("note", FieldType::Text, false, &[])]);
        assert_eq!(v.validate(&data(json!({})), &s), Ok(()));
    }

    #[test]
    fn text_requires_string() {
        let v = FormDataValidator::new();
        let s = schema(vec![field("owner", FieldType::Text, true, &[])]);
        assert_eq!(
            v.validate(&data(json!({"owner": 42})), &s),
            Err(ValidationError::InvalidFormDataType {
                field: "owner".to_string(),
                expected: "string".to_string(),
            })
        );
    }

    #[test]
    fn dropdown_and_option_require_member_string() {
        let v = FormDataValidator::new();
        for ft in [FieldType::Dropdown, FieldType::Option] {
            let s = schema(vec![field("size", ft, true, &["s", "l"])]);
            assert_eq!(v.validate(&data(json!({"size": "s"})), &s), Ok(()));
            assert_eq!(
                v.validate(&data(json!({"size": "m"})), &s),
                Err(ValidationError::InvalidSelectedFormData {
                    allowed: vec!["s".to_string(), "l".to_string()],
                    got: "m".to_string(),
                })
            );
            assert!(matches!(
                v.validate(&data(json!({"size": ["s"]})), &s),
                Err(ValidationError::InvalidFormDataType { .. })
            ));
        }
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let v = FormDataValidator::new();
        let s = schema(vec![field("owner", FieldType::Text, true, &[])]);
        assert_eq!(
            v.validate(&data(json!({"owner": "ops", "extra": [1, 2]})), &s),
            Ok(())
        );
    }

    struct CountingHandler(Arc<AtomicUsize>);

    impl FieldHandler for CountingHandler {
        fn validate(&self, _field: &FormField, _value: &Value) -> Result<(), ValidationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn each_present_field_hits_exactly_one_handler() {
        let text_calls = Arc::new(AtomicUsize::new(0));
        let mut overrides: HashMap<FieldType, Arc<dyn FieldHandler>> = HashMap::new();
        overrides.insert(
            FieldType::Text,
            Arc::new(CountingHandler(Arc::clone(&text_calls))),
        );
        let v = FormDataValidator::with_handlers(overrides);

        let s = schema(vec![
            field("a", FieldType::Text, false, &[]),
            field("b", FieldType::Text, false, &[]),
            field("c", FieldType::Text, false, &[]),
            field("a", FieldType::Text, false, &[]),
            field("size", FieldType::Dropdown, true, &["s"]),
        ]);
        // The override accepts a number where the default would not.
        v.validate(&data(json!({"a": 1, "b": "x", "size": "s"})), &s)
            .unwrap();
        assert_eq!(text_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn with_handler_replaces_single_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let v = FormDataValidator::new()
            .with_handler(FieldType::Checkbox, Arc::new(CountingHandler(Arc::clone(&calls))));
        v.validate(&data(json!({"regions": "not-a-list"})), &checkbox_schema())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
