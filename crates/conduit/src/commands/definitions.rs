//! Definitions command - browse the connector catalog.

use anyhow::Result;
use clap::{Args, Subcommand};
use conduit_config::LoadedConfig;
use conduit_types::{ConnectorType, View};
use console::Style;
use serde_json::json;

use super::{
    Context, parse_connector_type, parse_view, print_definition, print_json, print_next_page,
    resource_name,
};
use crate::app::App;

/// Arguments for the definitions command.
#[derive(Args, Debug)]
pub struct DefinitionsArgs {
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
    pub command: DefinitionsCommand,
}

#[derive(Subcommand, Debug)]
pub enum DefinitionsCommand {
    /// List connector definitions
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

    /// Show a connector definition by id or name
    Get {
        /// Definition id or `connector-definitions/<id>`
        name: String,

        /// basic or full
        #[arg(long, default_value = "full", value_parser = parse_view)]
        view: View,
    },

    /// Show a connector definition by permalink
    Lookup {
        /// `connector-definitions/<uid>`
        permalink: String,

        /// basic or full
        #[arg(long, default_value = "full", value_parser = parse_view)]
        view: View,
    },
}

/// Run the definitions command.
pub async fn run(args: DefinitionsArgs, loaded: LoadedConfig, ctx: &Context) -> Result<()> {
    let app = App::open(&loaded.config).await?;
    let result = dispatch(&app, args, ctx).await;
    app.shutdown().await?;
    result
}

async fn dispatch(app: &App, args: DefinitionsArgs, ctx: &Context) -> Result<()> {
    let definitions = app.services().definitions();
    let connector_type = args.connector_type;

    match args.command {
        DefinitionsCommand::List {
            page_size,
            page_token,
            view,
        } => {
            let page = definitions
                .list(connector_type, page_size, &page_token, view)
                .await?;
            if ctx.json_output {
                return print_json(&json!({
                    "connector_definitions": page.items,
                    "total_size": page.total_size,
                    "next_page_token": page.next_page_token,
                }));
            }
            if page.items.is_empty() {
                println!(
                    "{}",
                    Style::new()
                        .dim()
                        .apply_to(format!("No {connector_type} connector definitions"))
                );
            }
            for definition in &page.items {
                print_definition(definition, ctx.verbose);
                println!();
            }
            print_next_page(page.total_size, &page.next_page_token);
        }
        DefinitionsCommand::Get { name, view } => {
            let name = resource_name("connector-definitions", &name);
            let definition = definitions.get(connector_type, &name, view).await?;
            if ctx.json_output {
                return print_json(&definition);
            }
            print_definition(&definition, true);
        }
        DefinitionsCommand::Lookup { permalink, view } => {
            let definition = definitions.lookup(&permalink, view).await?;
            if ctx.json_output {
                return print_json(&definition);
            }
            print_definition(&definition, true);
        }
    }
    Ok(())
}
