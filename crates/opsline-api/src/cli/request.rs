//! Service request subcommands: submit, approve, reject, cancel, show, list.
//!
//! Commands that move a request forward run the in-process runtime and drain
//! it before printing, so the printed status is where execution stopped.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use serde_json::Value;
use uuid::Uuid;

use opsline_core::repository::service_request::ServiceRequestRepository;
use opsline_core::repository::step_log::StepLogRepository;
use opsline_types::form::FormData;
use opsline_types::request::{ServiceRequest, ServiceRequestStatus, StepExecutionLog, StepExecutionStatus};

use crate::runtime::Runtime;
use crate::state::AppState;

use super::{request_status_cell, short_id, step_status_cell};

#[derive(Subcommand)]
pub enum RequestCommand {
    /// Submit a service request against a pipeline and start it.
    #[command(disable_version_flag = true)]
    Submit {
        /// Pipeline ID.
        pipeline: Uuid,

        /// Pipeline version (latest when omitted).
        #[arg(long)]
        version: Option<u32>,

        /// Form data as a JSON object.
        #[arg(long)]
        data: Option<String>,

        /// A single form field as KEY=VALUE. VALUE is parsed as JSON when it
        /// can be, otherwise taken as a string. Repeatable.
        #[arg(short, long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },

    /// Approve the approval step a request is waiting at.
    Approve {
        /// Service request ID.
        id: Uuid,

        /// Name of the approval step.
        step: String,

        /// JSON result recorded for the approval step.
        #[arg(long)]
        result: Option<String>,
    },

    /// Reject the approval step a request is waiting at.
    Reject {
        /// Service request ID.
        id: Uuid,

        /// Name of the approval step.
        step: String,

        /// Reason recorded in the request remarks.
        #[arg(long, default_value = "rejected")]
        reason: String,
    },

    /// Cancel a request that has not finished.
    Cancel {
        /// Service request ID.
        id: Uuid,
    },

    /// Show a request and its step log.
    Show {
        /// Service request ID.
        id: Uuid,
    },

    /// List recent requests, newest first.
    #[command(alias = "ls")]
    List {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

pub async fn handle_request_command(
    cmd: RequestCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        RequestCommand::Submit {
            pipeline,
            version,
            data,
            fields,
        } => {
            let form = parse_form_data(data.as_deref(), &fields)?;
            handle_submit(pipeline, version, form, state, json).await
        }
        RequestCommand::Approve { id, step, result } => {
            let result = result
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .context("Invalid JSON for --result")?;
            handle_approve(id, &step, result, state, json).await
        }
        RequestCommand::Reject { id, step, reason } => {
            handle_reject(id, &step, &reason, state, json).await
        }
        RequestCommand::Cancel { id } => handle_cancel(id, state, json).await,
        RequestCommand::Show { id } => handle_show(id, state, json).await,
        RequestCommand::List { limit } => handle_list(limit, state, json).await,
    }
}

/// Merge `--data` and `--field` arguments. Fields override keys from `--data`.
pub(crate) fn parse_form_data(data: Option<&str>, fields: &[String]) -> Result<FormData> {
    let mut form: FormData = match data {
        Some(raw) => serde_json::from_str(raw).context("--data must be a JSON object")?,
        None => FormData::new(),
    };

    for field in fields {
        let (key, raw) = field
            .split_once('=')
            .with_context(|| format!("Invalid --field '{field}', expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Invalid --field '{field}': empty key");
        }
        let value =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        form.insert(key.to_string(), value);
    }
    Ok(form)
}

// ---------------------------------------------------------------------------
// Commands that run the runtime
// ---------------------------------------------------------------------------

async fn handle_submit(
    pipeline_id: Uuid,
    version: Option<u32>,
    form: FormData,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let runtime = Runtime::start(state)?;
    let submitted = runtime.requests.submit(pipeline_id, version, form).await;
    runtime.drain().await;
    let submitted = submitted?;

    report_outcome(submitted.id, "Submitted", state, json).await
}

async fn handle_approve(
    id: Uuid,
    step: &str,
    result: Option<Value>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    // Run the coordinator inline so a rejected approval surfaces as an error.
    let runtime = Runtime::start(state)?;
    let outcome = runtime
        .coordinator
        .approve_with_result(id, step, result)
        .await;
    runtime.drain().await;
    outcome?;

    report_outcome(id, "Approved", state, json).await
}

async fn handle_reject(
    id: Uuid,
    step: &str,
    reason: &str,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let runtime = Runtime::start(state)?;
    let outcome = runtime.coordinator.reject(id, step, reason).await;
    runtime.drain().await;
    outcome?;

    report_outcome(id, "Rejected", state, json).await
}

async fn handle_cancel(id: Uuid, state: &AppState, json: bool) -> Result<()> {
    let runtime = Runtime::start(state)?;
    let outcome = runtime.coordinator.cancel(id).await;
    runtime.drain().await;
    outcome?;

    report_outcome(id, "Canceled", state, json).await
}

async fn report_outcome(id: Uuid, verb: &str, state: &AppState, json: bool) -> Result<()> {
    let request = load_request(id, state).await?;
    let logs = state.step_logs.list_step_logs(&id).await?;
    let waiting_at = waiting_step(&logs);

    if json {
        let out = serde_json::json!({
            "id": request.id.to_string(),
            "status": request.status,
            "waiting_at": waiting_at,
            "remarks": request.remarks,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {verb} request {}",
        style("*").green().bold(),
        style(&request.id).cyan()
    );
    println!("  Status: {}", styled_status(request.status));
    if let Some(step) = waiting_at {
        println!("  Waiting for approval at step '{}'", style(step).yellow());
        println!(
            "  Approve with: {}",
            style(format!("opsline request approve {} {step}", request.id)).dim()
        );
    }
    if let Some(remarks) = &request.remarks {
        println!("  Remarks: {remarks}");
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Read-only commands
// ---------------------------------------------------------------------------

async fn handle_show(id: Uuid, state: &AppState, json: bool) -> Result<()> {
    let request = load_request(id, state).await?;
    let logs = state.step_logs.list_step_logs(&id).await?;

    if json {
        let out = serde_json::json!({
            "request": request,
            "steps": logs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Request:").bold(),
        style(&request.id).cyan()
    );
    println!(
        "  Pipeline: {} (v{})",
        request.pipeline_id, request.pipeline_version
    );
    println!("  Status: {}", styled_status(request.status));
    println!("  Created: {}", request.created_on.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated: {}", request.last_updated.format("%Y-%m-%d %H:%M:%S"));
    if let Some(remarks) = &request.remarks {
        println!("  Remarks: {remarks}");
    }
    if !request.form_data.is_empty() {
        println!("  Form data:");
        let mut keys: Vec<&String> = request.form_data.keys().collect();
        keys.sort();
        for key in keys {
            println!("    {key}: {}", request.form_data[key]);
        }
    }
    println!();

    if logs.is_empty() {
        println!("  No steps executed yet.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Started"),
            Cell::new("Completed"),
            Cell::new("Error"),
        ]);

    for log in &logs {
        let completed = log
            .completed_at
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&log.step_name),
            step_status_cell(log.status),
            Cell::new(log.started_at.format("%H:%M:%S").to_string()),
            Cell::new(completed),
            Cell::new(log.error.as_deref().unwrap_or("")),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}

async fn handle_list(limit: u32, state: &AppState, json: bool) -> Result<()> {
    let requests = state.requests.list(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&requests)?);
        return Ok(());
    }

    if requests.is_empty() {
        println!();
        println!("  No service requests.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Pipeline"),
            Cell::new("Status"),
            Cell::new("Created"),
            Cell::new("Remarks"),
        ]);

    for r in &requests {
        table.add_row(vec![
            Cell::new(short_id(&r.id)),
            Cell::new(format!("{}@v{}", short_id(&r.pipeline_id), r.pipeline_version)),
            request_status_cell(r.status),
            Cell::new(r.created_on.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(r.remarks.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn load_request(id: Uuid, state: &AppState) -> Result<ServiceRequest> {
    state
        .requests
        .get(&id)
        .await?
        .with_context(|| format!("Service request {id} not found"))
}

fn waiting_step(logs: &[StepExecutionLog]) -> Option<&str> {
    logs.last()
        .filter(|log| log.status == StepExecutionStatus::WaitingApproval)
        .map(|log| log.step_name.as_str())
}

fn styled_status(status: ServiceRequestStatus) -> console::StyledObject<&'static str> {
    let s = style(status.as_str());
    match status {
        ServiceRequestStatus::Success => s.green(),
        ServiceRequestStatus::Failure => s.red(),
        ServiceRequestStatus::Running => s.yellow(),
        ServiceRequestStatus::NotStarted | ServiceRequestStatus::Canceled => s.dim(),
    }
}
