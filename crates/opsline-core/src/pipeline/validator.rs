//! Structural validation of pipeline definitions.
//!
//! `validate_pipeline` is a pure function of its input. Checks run in a fixed
//! order and the first failure is returned:
//!
//! 1. Required pipeline fields (`name`, `first_step_name`)
//! 2. At least one step
//! 3. Per step: name, kind, uniqueness, `next_name` on non-terminal steps
//! 4. Cycle detection over `next` pointers
//! 5. `next`/`prev` references resolve and agree with each other
//! 6. The first step exists and has no predecessor
//! 7. Form schema fields

use std::collections::{HashMap, HashSet};

use opsline_types::error::ValidationError;
use opsline_types::form::FormSchema;
use opsline_types::pipeline::{PipelineDefinition, PipelineStep};

type StepIndex<'a> = HashMap<&'a str, &'a PipelineStep>;

/// Validate a pipeline definition.
pub fn validate_pipeline(def: &PipelineDefinition) -> Result<(), ValidationError> {
    if def.name.trim().is_empty() {
        return Err(ValidationError::missing("name"));
    }
    if def.first_step_name.is_empty() {
        return Err(ValidationError::missing("first_step_name"));
    }
    if def.steps.is_empty() {
        return Err(ValidationError::ZeroSteps);
    }

    let index = check_steps(&def.steps)?;
    detect_cycles(def, &index)?;
    check_references(&def.steps, &index)?;
    check_first_step(def, &index)?;
    validate_form_schema(&def.form_schema)
}

fn check_steps(steps: &[PipelineStep]) -> Result<StepIndex<'_>, ValidationError> {
    let mut index: StepIndex<'_> = HashMap::with_capacity(steps.len());

    for step in steps {
        if step.name.is_empty() {
            return Err(ValidationError::missing("steps.name"));
        }
        if !step.kind.is_known() {
            return Err(ValidationError::InvalidStepType {
                step: step.name.clone(),
                kind: step.kind.to_string(),
            });
        }
        if index.contains_key(step.name.as_str()) {
            return Err(ValidationError::DuplicateStepName {
                step: step.name.clone(),
            });
        }
        if !step.is_terminal && step.next_name.is_empty() {
            return Err(ValidationError::NoNextStep {
                step: step.name.clone(),
            });
        }
        index.insert(step.name.as_str(), step);
    }

    Ok(index)
}

/// Walk `next` pointers from the first step, then from every step not yet
/// reached, in declared order. Re-entering a step on the current walk is a
/// cycle. Dangling pointers end the walk; the reference pass reports them.
fn detect_cycles(def: &PipelineDefinition, index: &StepIndex<'_>) -> Result<(), ValidationError> {
    let mut visited: HashSet<&str> = HashSet::with_capacity(index.len());

    let starts = std::iter::once(def.first_step_name.as_str())
        .chain(def.steps.iter().map(|s| s.name.as_str()));

    for start in starts {
        if visited.contains(start) || !index.contains_key(start) {
            continue;
        }

        let mut on_path: HashSet<&str> = HashSet::new();
        let mut previous: Option<&str> = None;
        let mut current = start;

        loop {
            if on_path.contains(current) {
                return Err(ValidationError::CircularReference {
                    from: current.to_string(),
                    to: previous.unwrap_or(current).to_string(),
                });
            }
            if !visited.insert(current) {
                // Joined a chain an earlier walk already cleared.
                break;
            }
            on_path.insert(current);

            let Some(step) = index.get(current) else {
                break;
            };
            let next = step.next_name.as_str();
            if next.is_empty() || !index.contains_key(next) {
                break;
            }
            previous = Some(current);
            current = next;
        }
    }

    Ok(())
}

fn check_references(steps: &[PipelineStep], index: &StepIndex<'_>) -> Result<(), ValidationError> {
    for step in steps {
        if !step.next_name.is_empty() {
            match index.get(step.next_name.as_str()) {
                None => {
                    return Err(ValidationError::NoStepNameFound {
                        step: step.name.clone(),
                        reference: step.next_name.clone(),
                    });
                }
                Some(next) if next.prev_name != step.name => {
                    return Err(ValidationError::InvalidStepReference {
                        step: step.name.clone(),
                        reference: step.next_name.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        if !step.prev_name.is_empty() {
            match index.get(step.prev_name.as_str()) {
                None => {
                    return Err(ValidationError::NoStepNameFound {
                        step: step.name.clone(),
                        reference: step.prev_name.clone(),
                    });
                }
                Some(prev) if prev.next_name != step.name => {
                    return Err(ValidationError::InvalidStepReference {
                        step: step.name.clone(),
                        reference: step.prev_name.clone(),
                    });
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

fn check_first_step(def: &PipelineDefinition, index: &StepIndex<'_>) -> Result<(), ValidationError> {
    let first = index
        .get(def.first_step_name.as_str())
        .ok_or_else(|| ValidationError::InvalidFirstStepReference {
            step: def.first_step_name.clone(),
        })?;

    if !first.prev_name.is_empty() {
        return Err(ValidationError::FirstStepContainsPrevStep {
            step: first.name.clone(),
            prev: first.prev_name.clone(),
        });
    }

    // Only the first step may lack a predecessor.
    if let Some(orphan) = def
        .steps
        .iter()
        .find(|s| s.name != def.first_step_name && s.prev_name.is_empty())
    {
        return Err(ValidationError::missing(format!(
            "steps.{}.prev_name",
            orphan.name
        )));
    }

    Ok(())
}

/// Check form field declarations.
///
/// Selection fields (dropdown, checkbox, option) must declare at least one
/// allowed value. Repeated field names are tolerated; lookups use the first.
pub fn validate_form_schema(schema: &FormSchema) -> Result<(), ValidationError> {
    for field in &schema.fields {
        if field.name.is_empty() {
            return Err(ValidationError::missing("form_schema.name"));
        }
        if field.field_type.requires_allowed_values() && field.allowed_values.is_empty() {
            return Err(ValidationError::missing(format!(
                "form_schema.{}.allowed_values",
                field.name
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
