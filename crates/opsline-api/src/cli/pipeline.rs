//! Pipeline subcommands: validate, create, revise, show, list.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use uuid::Uuid;

use opsline_core::pipeline::definition::{load_pipeline_file, serialize_pipeline_yaml};
use opsline_types::pipeline::PipelineDefinition;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum PipelineCommand {
    /// Check a pipeline document without storing it.
    Validate {
        /// Path to a YAML (or .json) pipeline document.
        file: PathBuf,
    },

    /// Store a pipeline document as a new pipeline (version 1).
    Create {
        /// Path to a YAML (or .json) pipeline document.
        file: PathBuf,
    },

    /// Store a document as the next version of an existing pipeline.
    Revise {
        /// Pipeline ID.
        id: Uuid,

        /// Path to a YAML (or .json) pipeline document.
        file: PathBuf,
    },

    /// Show a pipeline (latest version unless --version is given).
    #[command(disable_version_flag = true)]
    Show {
        /// Pipeline ID.
        id: Uuid,

        #[arg(long)]
        version: Option<u32>,

        /// Print the stored document as YAML.
        #[arg(long)]
        yaml: bool,
    },

    /// List the latest version of every pipeline.
    #[command(alias = "ls")]
    List,
}

pub async fn handle_pipeline_command(
    cmd: PipelineCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        PipelineCommand::Validate { file } => handle_validate(&file, json),
        PipelineCommand::Create { file } => handle_create(&file, state, json).await,
        PipelineCommand::Revise { id, file } => handle_revise(id, &file, state, json).await,
        PipelineCommand::Show { id, version, yaml } => {
            handle_show(id, version, yaml, state, json).await
        }
        PipelineCommand::List => handle_list(state, json).await,
    }
}

fn load(file: &Path) -> Result<PipelineDefinition> {
    load_pipeline_file(file).with_context(|| format!("Failed to load {}", file.display()))
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

/// Runs before application state exists: validation needs no database.
pub fn handle_validate(file: &Path, json: bool) -> Result<()> {
    let def = load(file)?;

    if json {
        let out = serde_json::json!({
            "valid": true,
            "name": def.name,
            "steps": def.steps.len(),
            "fields": def.form_schema.fields.len(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} '{}' is valid ({} steps, {} form fields)",
            style("✓").green().bold(),
            style(&def.name).cyan(),
            def.steps.len(),
            def.form_schema.fields.len()
        );
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Create / Revise
// ---------------------------------------------------------------------------

async fn handle_create(file: &Path, state: &AppState, json: bool) -> Result<()> {
    let def = load(file)?;
    let stored = state.pipeline_service.create(def).await?;
    print_stored(&stored, "Created", json)
}

async fn handle_revise(id: Uuid, file: &Path, state: &AppState, json: bool) -> Result<()> {
    let def = load(file)?;
    let stored = state.pipeline_service.revise(id, def).await?;
    print_stored(&stored, "Revised", json)
}

fn print_stored(def: &PipelineDefinition, verb: &str, json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "id": def.id.to_string(),
            "version": def.version,
            "name": def.name,
            "steps": def.steps.len(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} {verb} pipeline '{}'",
            style("*").green().bold(),
            style(&def.name).cyan()
        );
        println!("  ID: {}", def.id);
        println!("  Version: {}", def.version);
        println!("  Steps: {}", def.steps.len());
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

async fn handle_show(
    id: Uuid,
    version: Option<u32>,
    yaml: bool,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let def = state.pipeline_service.get(id, version).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&def)?);
        return Ok(());
    }
    if yaml {
        print!("{}", serialize_pipeline_yaml(&def)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} (v{})",
        style("Pipeline:").bold(),
        style(&def.name).cyan(),
        def.version
    );
    println!("  ID: {}", def.id);
    if let Some(desc) = &def.description {
        println!("  Description: {desc}");
    }
    println!("  Created: {}", def.created_on.format("%Y-%m-%d %H:%M:%S"));
    println!();

    let mut steps = Table::new();
    steps
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Kind"),
            Cell::new("Next"),
        ]);

    // Walk the chain from the first step; stored pipelines are acyclic.
    let mut current = def.first_step();
    while let Some(step) = current {
        let next = if step.is_terminal {
            "(end)".to_string()
        } else {
            step.next_name.clone()
        };
        steps.add_row(vec![
            Cell::new(&step.name),
            Cell::new(step.kind.as_str()),
            Cell::new(next),
        ]);
        current = if step.is_terminal {
            None
        } else {
            def.step(&step.next_name)
        };
    }
    println!("{steps}");

    if !def.form_schema.fields.is_empty() {
        let mut fields = Table::new();
        fields
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Field").fg(Color::Cyan),
                Cell::new("Type"),
                Cell::new("Required"),
                Cell::new("Allowed values"),
            ]);
        for field in &def.form_schema.fields {
            fields.add_row(vec![
                Cell::new(&field.name),
                Cell::new(field.field_type.to_string()),
                Cell::new(if field.required { "yes" } else { "no" }),
                Cell::new(field.allowed_values.join(", ")),
            ]);
        }
        println!();
        println!("{fields}");
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let summaries = state.pipeline_service.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        println!("  No pipelines stored.");
        println!(
            "  Create one with: {}",
            style("opsline pipeline create <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("ID"),
            Cell::new("Version"),
            Cell::new("Steps"),
            Cell::new("Created"),
        ]);

    for s in &summaries {
        table.add_row(vec![
            Cell::new(&s.name),
            Cell::new(s.id),
            Cell::new(s.version),
            Cell::new(s.step_count),
            Cell::new(s.created_on.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
