//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use conduit_config::LoadedConfig;
use uuid::Uuid;

use super::{Context, print_json};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./conduit.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration and data paths
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, loaded: LoadedConfig, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(&loaded, ctx),
        ConfigCommand::Which => cmd_which(&loaded, ctx),
        ConfigCommand::Init { local } => cmd_init(local),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(loaded: &LoadedConfig, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        return print_json(&loaded.config);
    }

    println!("# Conduit Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("# No config files loaded (using defaults)\n");
    } else {
        for source in &sources {
            println!("# from {}", source.display());
        }
        println!();
    }
    for warning in &loaded.warnings {
        println!("# warning: {warning}");
    }

    let data_dir = conduit_config::data_dir();
    let config = &loaded.config;
    println!("# database: {}", config.database_path(&data_dir).display());
    println!("# catalog:  {}", config.catalog_dir(&data_dir).display());
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

fn cmd_which(loaded: &LoadedConfig, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let sources: Vec<_> = loaded
            .sources
            .iter()
            .map(|s| serde_json::json!({ "path": s.path, "loaded": s.loaded }))
            .collect();
        return print_json(&sources);
    }

    println!("Config file search order (later overrides earlier):\n");
    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'conduit config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }
    Ok(())
}

fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from("conduit.toml")
    } else {
        conduit_config::user_config_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&path, init_template(Uuid::new_v4()))?;
    println!("✓ Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  put catalog files in {}", conduit_config::data_dir().join("catalog").display());
    println!("  conduit config show               # verify configuration");
    println!("  conduit definitions list          # browse the catalog");
    Ok(())
}

fn init_template(owner_uid: Uuid) -> String {
    format!(
        r#"# Conduit Configuration

# [database]
# path = "conduit.db"

# [catalog]
# dir = "catalog"

[identity]
lookup_timeout_secs = 5
default_owner_id = "local-user"
backend = "static"

[[identity.users]]
uid = "{owner_uid}"
id = "local-user"

[pipeline]
enabled = true
task_queue = "connector-backend"
# max_concurrent_tasks = 4
# task_timeout_secs = 300
# pipeline_timeout_secs = 600

[logging]
level = "info"
json_file = true
"#
    )
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let config = conduit_config::user_config_path();
    let data = conduit_config::data_dir();
    if ctx.json_output {
        return print_json(&serde_json::json!({ "config": config, "data": data }));
    }
    match config {
        Some(path) => println!("config: {}", path.display()),
        None => eprintln!("Could not determine config directory"),
    }
    println!("data:   {}", data.display());
    Ok(())
}
