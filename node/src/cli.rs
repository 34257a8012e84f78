//! # CLI Interface
//!
//! Command-line arguments for `iou-node`, defined with `clap` derive.
//! Subcommands: `run`, `demo` and `version`.

use clap::{Parser, Subcommand};

use crate::logging::LogFormat;
use iou_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT, DEFAULT_NOTARY_NAME};

/// IOU ledger node.
///
/// Runs an in-process network of IOU ledger parties with a notary, and
/// serves the HTTP API and Prometheus metrics over it.
#[derive(Parser, Debug)]
#[command(
    name = "iou-node",
    about = "IOU ledger node",
    version,
    propagate_version = true
)]
pub struct IouNodeCli {
    /// Log output format.
    #[arg(
        long,
        global = true,
        env = "IOU_LOG_FORMAT",
        value_enum,
        ignore_case = true,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the network and serve the API.
    Run(RunArgs),
    /// Run the issue / transfer / settle scenarios and print the results.
    Demo(DemoArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Port for the REST API.
    #[arg(long, env = "IOU_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "IOU_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Comma-separated legal names of the parties to start.
    #[arg(
        long,
        env = "IOU_PARTIES",
        value_delimiter = ',',
        default_value = "Alice,Bob,Charlie"
    )]
    pub parties: Vec<String>,

    /// Legal name of the notary.
    #[arg(long, env = "IOU_NOTARY", default_value = DEFAULT_NOTARY_NAME)]
    pub notary: String,
}

#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Session receive timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub timeout_ms: u64,
}
