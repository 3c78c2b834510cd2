//! CLI command definitions for the `opsline` binary.
//!
//! Uses clap derive macros. Commands follow a noun-verb pattern
//! (`opsline pipeline create`, `opsline request approve`).

pub mod pipeline;
pub mod request;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color};
use opsline_types::request::{ServiceRequestStatus, StepExecutionStatus};

/// Run service request pipelines.
#[derive(Parser)]
#[command(name = "opsline", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed logging (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate, store and inspect pipeline definitions.
    Pipeline {
        #[command(subcommand)]
        action: pipeline::PipelineCommand,
    },

    /// Submit and drive service requests.
    Request {
        #[command(subcommand)]
        action: request::RequestCommand,
    },
}

pub(crate) fn request_status_cell(status: ServiceRequestStatus) -> Cell {
    let color = match status {
        ServiceRequestStatus::NotStarted => Color::Grey,
        ServiceRequestStatus::Running => Color::Yellow,
        ServiceRequestStatus::Success => Color::Green,
        ServiceRequestStatus::Failure => Color::Red,
        ServiceRequestStatus::Canceled => Color::DarkGrey,
    };
    Cell::new(status.as_str()).fg(color)
}

pub(crate) fn step_status_cell(status: StepExecutionStatus) -> Cell {
    let color = match status {
        StepExecutionStatus::Running => Color::Yellow,
        StepExecutionStatus::Completed | StepExecutionStatus::Approved => Color::Green,
        StepExecutionStatus::Failed | StepExecutionStatus::Rejected => Color::Red,
        StepExecutionStatus::WaitingApproval => Color::Cyan,
    };
    Cell::new(status.as_str()).fg(color)
}

pub(crate) fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
