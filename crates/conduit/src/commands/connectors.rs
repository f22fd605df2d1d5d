//! Connectors command - manage an owner's connectors.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use conduit_config::LoadedConfig;
use conduit_domain::{CreateConnector, ModelTask, UpdateConnector};
use conduit_pipeline::ExecutionStatus;
use conduit_types::{ConnectorType, View};
use console::{Style, style};
use serde_json::{Value, json};

use super::{
    Context, parse_connector_type, parse_view, print_connector, print_json, print_next_page,
    print_run, resource_name,
};
use crate::app::App;

/// Arguments for the connectors command.
#[derive(Args, Debug)]
pub struct ConnectorsArgs {
    /// Connector type: source, destination, blockchain, ai
    #[arg(
        short = 't',
        long = "type",
        global = true,
        default_value = "destination",
        value_parser = parse_connector_type
    )]
    pub connector_type: ConnectorType,

    #[command(subcommand)]
    pub command: ConnectorsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConnectorsCommand {
    /// Create a connector
    Create {
        /// Connector id
        id: String,

        /// Definition id or `connector-definitions/<id>`
        #[arg(short, long)]
        definition: String,

        /// Configuration as a JSON object
        #[arg(short, long, default_value = "{}")]
        config: String,

        /// Free-form description
        #[arg(long, default_value = "")]
        description: String,
    },

    /// List connectors
    List {
        /// Page size (0 for the default, at most 100)
        #[arg(long, default_value = "0")]
        page_size: u32,

        /// Token from a previous page
        #[arg(long, default_value = "")]
        page_token: String,

        /// basic or full
        #[arg(long, default_value = "basic", value_parser = parse_view)]
        view: View,
    },

    /// Show a connector by id or name
    Get {
        /// Connector id or `connectors/<id>`
        name: String,

        /// basic or full
        #[arg(long, default_value = "full", value_parser = parse_view)]
        view: View,
    },

    /// Show a connector by permalink
    Lookup {
        /// `connectors/<uid>`
        permalink: String,

        /// basic or full
        #[arg(long, default_value = "full", value_parser = parse_view)]
        view: View,
    },

    /// Update description and/or configuration
    Update {
        /// Connector id or `connectors/<id>`
        name: String,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// Configuration merge patch as a JSON object
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Change a connector's id
    Rename {
        /// Connector id or `connectors/<id>`
        name: String,

        /// New id
        new_id: String,
    },

    /// Delete a connector
    Delete {
        /// Connector id or `connectors/<id>`
        name: String,
    },

    /// Check connectivity and record the resulting state
    Connect {
        /// Connector id or `connectors/<id>`
        name: String,
    },

    /// Mark a connector disconnected
    Disconnect {
        /// Connector id or `connectors/<id>`
        name: String,
    },

    /// Run the connection pre-check without recording the result
    Test {
        /// Connector id or `connectors/<id>`
        name: String,
    },

    /// Write a batch of model outputs through a destination
    Write {
        /// Connector id or `connectors/<id>`
        name: String,

        /// unspecified, classification, detection, keypoint
        #[arg(long, default_value = "unspecified", value_parser = parse_task)]
        task: ModelTask,

        /// Payload as JSON
        #[arg(long, conflicts_with = "data_file")]
        data: Option<String>,

        /// Read the payload from a file
        #[arg(long)]
        data_file: Option<PathBuf>,
    },
}

fn parse_task(s: &str) -> Result<ModelTask, String> {
    ModelTask::parse(s).ok_or_else(|| format!("unknown task '{s}'"))
}

fn parse_object(label: &str, raw: &str) -> Result<Value> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("{label} is not valid JSON"))?;
    if !value.is_object() {
        bail!("{label} must be a JSON object");
    }
    Ok(value)
}

/// Run the connectors command.
pub async fn run(args: ConnectorsArgs, loaded: LoadedConfig, ctx: &Context) -> Result<()> {
    let app = App::open(&loaded.config).await?;
    let result = dispatch(&app, args, ctx).await;
    app.shutdown().await?;
    result
}

async fn dispatch(app: &App, args: ConnectorsArgs, ctx: &Context) -> Result<()> {
    let owner = app.owner(&ctx.metadata).await?;
    let connectors = app.services().connectors();
    let connector_type = args.connector_type;
    let dim = Style::new().dim();

    match args.command {
        ConnectorsCommand::Create {
            id,
            definition,
            config,
            description,
        } => {
            let request = CreateConnector {
                id,
                connector_definition: resource_name("connector-definitions", &definition),
                description,
                configuration: parse_object("--config", &config)?,
            };
            let connector = connectors.create(&owner, connector_type, request).await?;
            if ctx.json_output {
                return print_json(&connector);
            }
            println!("{} {}", style("Created").green(), connector.name());
            print_connector(&connector);
        }
        ConnectorsCommand::List {
            page_size,
            page_token,
            view,
        } => {
            let page = connectors
                .list(&owner, connector_type, page_size, &page_token, view)
                .await?;
            if ctx.json_output {
                return print_json(&json!({
                    "connectors": page.items,
                    "total_size": page.total_size,
                    "next_page_token": page.next_page_token,
                }));
            }
            if page.items.is_empty() {
                println!(
                    "{}",
                    dim.apply_to(format!("No {connector_type} connectors"))
                );
            }
            for connector in &page.items {
                print_connector(connector);
                println!();
            }
            print_next_page(page.total_size, &page.next_page_token);
        }
        ConnectorsCommand::Get { name, view } => {
            let name = resource_name("connectors", &name);
            let connector = connectors.get(&owner, connector_type, &name, view).await?;
            if ctx.json_output {
                return print_json(&connector);
            }
            print_connector(&connector);
        }
        ConnectorsCommand::Lookup { permalink, view } => {
            let connector = connectors
                .lookup(&owner, connector_type, &permalink, view)
                .await?;
            if ctx.json_output {
                return print_json(&connector);
            }
            print_connector(&connector);
        }
        ConnectorsCommand::Update {
            name,
            description,
            config,
        } => {
            let name = resource_name("connectors", &name);
            let request = UpdateConnector {
                description,
                configuration: config
                    .as_deref()
                    .map(|raw| parse_object("--config", raw))
                    .transpose()?,
            };
            let connector = connectors
                .update(&owner, connector_type, &name, request)
                .await?;
            if ctx.json_output {
                return print_json(&connector);
            }
            println!("{} {}", style("Updated").green(), connector.name());
            print_connector(&connector);
        }
        ConnectorsCommand::Rename { name, new_id } => {
            let name = resource_name("connectors", &name);
            let connector = connectors
                .rename(&owner, connector_type, &name, &new_id)
                .await?;
            if ctx.json_output {
                return print_json(&connector);
            }
            println!("{} {} -> {}", style("Renamed").green(), name, connector.name());
        }
        ConnectorsCommand::Delete { name } => {
            let name = resource_name("connectors", &name);
            let run = connectors.delete(&owner, connector_type, &name).await?;
            if ctx.json_output {
                return print_json(&run);
            }
            println!("{} {}", style("Deleted").green(), name);
            if ctx.verbose {
                print_run(&run);
            }
        }
        ConnectorsCommand::Connect { name } => {
            let name = resource_name("connectors", &name);
            let (_, run) = connectors.connect(&owner, connector_type, &name).await?;
            if let Some(result) = app.wait(&run).await? {
                if let ExecutionStatus::Failed(message) = &result.status {
                    bail!("check workflow {} failed: {message}", run.workflow_id);
                }
            }
            let connector = connectors
                .get(&owner, connector_type, &name, View::Basic)
                .await?;
            if ctx.json_output {
                return print_json(&json!({ "connector": connector, "workflow": run }));
            }
            print_run(&run);
            print_connector(&connector);
        }
        ConnectorsCommand::Disconnect { name } => {
            let name = resource_name("connectors", &name);
            let connector = connectors
                .disconnect(&owner, connector_type, &name)
                .await?;
            if ctx.json_output {
                return print_json(&connector);
            }
            print_connector(&connector);
        }
        ConnectorsCommand::Test { name } => {
            let name = resource_name("connectors", &name);
            let state = connectors.test(&owner, connector_type, &name).await?;
            if ctx.json_output {
                return print_json(&json!({ "state": state }));
            }
            println!("{}  {}", style(&name).bold(), state);
        }
        ConnectorsCommand::Write {
            name,
            task,
            data,
            data_file,
        } => {
            if connector_type != ConnectorType::Destination {
                bail!("write is only supported for destination connectors");
            }
            let raw = match (data, data_file) {
                (Some(raw), _) => raw,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => bail!("one of --data or --data-file is required"),
            };
            let payload = parse_object("payload", &raw)?;
            let name = resource_name("connectors", &name);
            let run = connectors.write(&owner, &name, task, &payload).await?;
            if let Some(result) = app.wait(&run).await? {
                if let ExecutionStatus::Failed(message) = &result.status {
                    bail!("write workflow {} failed: {message}", run.workflow_id);
                }
            }
            if ctx.json_output {
                return print_json(&run);
            }
            print_run(&run);
        }
    }
    Ok(())
}
