//! Command-line interface for rookery.
//!
//! Provides commands for starting flows, ingesting agent result batches,
//! and querying status, progress, results, and metadata.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::config;
use crate::core::{FlowService, ResultStore};
use crate::domain::{FlowType, ResultPayload};

/// rookery - Flow dispatch and result aggregation core
#[derive(Parser, Debug)]
#[command(name = "rookery")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new flow against an agent
    Start {
        /// Agent endpoint id (e.g. C.1234abcd)
        client_id: String,

        /// Flow archetype
        #[arg(value_enum)]
        flow_type: FlowTypeArg,

        /// Flow arguments as inline JSON
        #[arg(short, long, default_value = "null")]
        args: String,

        /// Username recorded as the flow creator
        #[arg(short, long, default_value = "cli")]
        creator: String,
    },

    /// Show the status of a flow
    Status {
        /// Flow ID (UUID)
        flow_id: String,
    },

    /// Show the aggregated progress of a flow
    Progress {
        /// Flow ID (UUID)
        flow_id: String,
    },

    /// List a flow's results, one page at a time
    Results {
        /// Flow ID (UUID)
        flow_id: String,

        /// Resume after this page token
        #[arg(short, long)]
        page_token: Option<u64>,

        /// Page size
        #[arg(short = 'n', long, default_value = "50")]
        page_size: usize,
    },

    /// Show per-type result counts and the finalization flag
    Metadata {
        /// Flow ID (UUID)
        flow_id: String,
    },

    /// Mark a flow as finished (engine-only)
    Finish {
        /// Flow ID (UUID)
        flow_id: String,
    },

    /// Mark a flow as failed (engine-only)
    Fail {
        /// Flow ID (UUID)
        flow_id: String,
    },

    /// Finalize a flow's result metadata (engine-only)
    Finalize {
        /// Flow ID (UUID)
        flow_id: String,
    },

    /// Append a batch of agent results from a JSON file (transport-only)
    Append {
        /// Flow ID (UUID)
        flow_id: String,

        /// File containing a JSON array of result payloads
        file: PathBuf,
    },

    /// List recent flows
    Flows {
        /// Maximum number of flows to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Flow archetype for CLI (maps to FlowType)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FlowTypeArg {
    /// Collect file contents from exact known paths
    CollectFiles,

    /// Hash files without transferring contents
    HashFiles,

    /// Two-phase hash-then-transfer fetch
    FetchFiles,
}

impl From<FlowTypeArg> for FlowType {
    fn from(t: FlowTypeArg) -> Self {
        match t {
            FlowTypeArg::CollectFiles => FlowType::CollectFiles,
            FlowTypeArg::HashFiles => FlowType::HashFiles,
            FlowTypeArg::FetchFiles => FlowType::FetchFiles,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Start {
                client_id,
                flow_type,
                args,
                creator,
            } => start_flow(&client_id, flow_type, &args, &creator).await,
            Commands::Status { flow_id } => show_status(&flow_id).await,
            Commands::Progress { flow_id } => show_progress(&flow_id).await,
            Commands::Results {
                flow_id,
                page_token,
                page_size,
            } => list_results(&flow_id, page_token, page_size).await,
            Commands::Metadata { flow_id } => show_metadata(&flow_id).await,
            Commands::Finish { flow_id } => finish_flow(&flow_id).await,
            Commands::Fail { flow_id } => fail_flow(&flow_id).await,
            Commands::Finalize { flow_id } => finalize_metadata(&flow_id).await,
            Commands::Append { flow_id, file } => append_results(&flow_id, &file).await,
            Commands::Flows { limit } => list_flows(limit).await,
            Commands::Config => show_config(),
        }
    }
}

/// Build the service from the resolved configuration
async fn service() -> Result<FlowService> {
    let flows_dir = config::flows_dir()?;
    let store = Arc::new(
        ResultStore::open(&flows_dir)
            .await
            .with_context(|| format!("Failed to open store at {}", flows_dir.display()))?,
    );
    Ok(FlowService::new(store).with_limits(config::ingest_limits()?))
}

fn parse_flow_id(flow_id: &str) -> Result<Uuid> {
    Uuid::parse_str(flow_id).with_context(|| format!("Invalid flow ID: {}", flow_id))
}

async fn start_flow(
    client_id: &str,
    flow_type: FlowTypeArg,
    args: &str,
    creator: &str,
) -> Result<()> {
    let args: serde_json::Value =
        serde_json::from_str(args).context("Flow arguments are not valid JSON")?;

    let service = service().await?;
    let flow_id = service
        .start_flow(client_id, creator, flow_type.into(), args)
        .await?;

    println!("{}", flow_id);
    Ok(())
}

async fn show_status(flow_id: &str) -> Result<()> {
    let service = service().await?;
    let flow = service.get_flow(parse_flow_id(flow_id)?).await?;

    println!("Flow:      {}", flow.id);
    println!("Client:    {}", flow.client_id);
    println!("Creator:   {}", flow.creator);
    println!("Type:      {}", flow.flow_type);
    println!("Status:    {:?}", flow.status);
    println!("Started:   {}", flow.created_at.to_rfc3339());
    if let Some(finished_at) = flow.finished_at {
        println!("Finished:  {}", finished_at.to_rfc3339());
    }
    println!(
        "Download:  {}",
        if service.downloadable(flow.id).await? {
            "available"
        } else {
            "not available"
        }
    );
    Ok(())
}

async fn show_progress(flow_id: &str) -> Result<()> {
    let service = service().await?;
    let progress = service.get_progress(parse_flow_id(flow_id)?).await?;
    println!("{}", serde_json::to_string_pretty(&progress)?);
    Ok(())
}

async fn list_results(flow_id: &str, page_token: Option<u64>, page_size: usize) -> Result<()> {
    let service = service().await?;
    let page = service
        .list_results(parse_flow_id(flow_id)?, page_token, page_size)
        .await?;

    for result in &page.results {
        println!("{}", serde_json::to_string(result)?);
    }
    if let Some(token) = page.next_page_token {
        eprintln!("next page token: {}", token);
    }
    Ok(())
}

async fn show_metadata(flow_id: &str) -> Result<()> {
    let service = service().await?;
    let metadata = service.get_result_metadata(parse_flow_id(flow_id)?).await?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

async fn finish_flow(flow_id: &str) -> Result<()> {
    let service = service().await?;
    service.mark_finished(parse_flow_id(flow_id)?).await?;
    println!("Flow {} marked finished", flow_id);
    Ok(())
}

async fn fail_flow(flow_id: &str) -> Result<()> {
    let service = service().await?;
    service.mark_failed(parse_flow_id(flow_id)?).await?;
    println!("Flow {} marked failed", flow_id);
    Ok(())
}

async fn finalize_metadata(flow_id: &str) -> Result<()> {
    let service = service().await?;
    service
        .finalize_result_metadata(parse_flow_id(flow_id)?)
        .await?;
    println!("Metadata for flow {} finalized", flow_id);
    Ok(())
}

async fn append_results(flow_id: &str, file: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read results file: {}", file.display()))?;
    let payloads: Vec<ResultPayload> =
        serde_json::from_str(&content).context("Results file is not a JSON array of payloads")?;

    let service = service().await?;
    let range = service
        .append_results(parse_flow_id(flow_id)?, &payloads)
        .await?;

    println!(
        "Appended {} results (seq {}..={})",
        payloads.len(),
        range.first,
        range.last
    );
    Ok(())
}

async fn list_flows(limit: usize) -> Result<()> {
    let service = service().await?;
    let flows = service.list_flows(limit).await?;

    if flows.is_empty() {
        println!("No flows found");
        return Ok(());
    }

    for flow in flows {
        println!(
            "{}  {:<13} {:<9} {}  {}",
            flow.id,
            flow.flow_type.to_string(),
            format!("{:?}", flow.status).to_lowercase(),
            flow.client_id,
            flow.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("Home:       {}", config.home.display());
    println!("Flows dir:  {}", config.home.join("flows").display());
    match &config.config_file {
        Some(path) => println!("Config:     {}", path.display()),
        None => println!("Config:     (defaults)"),
    }
    println!("Max batch:  {}", config.limits.max_batch_results);
    println!("Max page:   {}", config.limits.max_page_size);
    Ok(())
}
