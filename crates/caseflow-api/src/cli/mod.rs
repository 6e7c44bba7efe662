//! CLI command definitions for the `caseflow` binary.
//!
//! Uses clap derive macros. Workflow catalog commands live under
//! `caseflow workflows ...`; `caseflow run` drives one execution through its
//! checkpoints interactively.

pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run case-management workflows with human checkpoints.
#[derive(Parser)]
#[command(name = "caseflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the engine configuration file.
    #[arg(
        long,
        global = true,
        env = "CASEFLOW_CONFIG",
        default_value = caseflow_infra::config::DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, env = "CASEFLOW_LOG_JSON", hide = true)]
    pub log_json: bool,

    /// Export spans through the OpenTelemetry stdout exporter.
    #[arg(long, global = true, env = "CASEFLOW_OTEL", hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Browse the workflow catalog.
    #[command(alias = "wf")]
    Workflows {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Start a workflow and walk it through its checkpoints.
    Run {
        /// Workflow ID (see `caseflow workflows list`).
        workflow_id: String,

        /// Inputs as a JSON object.
        #[arg(long)]
        inputs: Option<String>,

        /// Caller context as a JSON object (e.g. `{"userId": "u-1"}`).
        #[arg(long)]
        context: Option<String>,

        /// Approve every approval checkpoint without prompting.
        #[arg(short, long)]
        yes: bool,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
