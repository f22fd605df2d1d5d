//! CLI command handlers.

pub mod config;
pub mod connectors;
pub mod definitions;

use console::{Style, style};
use conduit_pipeline::WorkflowRun;
use conduit_types::{
    Connector, ConnectorDefinition, ConnectorType, HEADER_OWNER_ID, HEADER_OWNER_UID,
    RequestMetadata, View,
};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Request metadata carrying the caller identity.
    pub metadata: RequestMetadata,
}

/// Build request metadata from the global owner flags.
pub fn request_metadata(owner_id: Option<String>, owner_uid: Option<String>) -> RequestMetadata {
    let mut metadata = RequestMetadata::new();
    if let Some(uid) = owner_uid {
        metadata.append(HEADER_OWNER_UID, uid);
    }
    if let Some(id) = owner_id {
        metadata.append(HEADER_OWNER_ID, id);
    }
    metadata
}

pub fn parse_connector_type(s: &str) -> Result<ConnectorType, String> {
    ConnectorType::parse(s).ok_or_else(|| {
        format!("unknown connector type '{s}' (expected source, destination, blockchain, or ai)")
    })
}

pub fn parse_view(s: &str) -> Result<View, String> {
    match s.to_ascii_lowercase().as_str() {
        "basic" | "view_basic" => Ok(View::Basic),
        "full" | "view_full" => Ok(View::Full),
        _ => Err(format!("unknown view '{s}' (expected basic or full)")),
    }
}

/// Accept either a bare id or a full resource name.
pub fn resource_name(collection: &str, id_or_name: &str) -> String {
    if id_or_name.contains('/') {
        id_or_name.to_string()
    } else {
        format!("{collection}/{id_or_name}")
    }
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_definition(definition: &ConnectorDefinition, verbose: bool) {
    let dim = Style::new().dim();
    println!(
        "{}  {}",
        style(definition.name()).bold(),
        dim.apply_to(definition.connector_type)
    );
    println!("  title:  {}", definition.title);
    println!("  image:  {}", definition.image());
    println!("  uid:    {}", dim.apply_to(definition.uid));
    if !definition.documentation_url.is_empty() {
        println!("  docs:   {}", definition.documentation_url);
    }
    if verbose {
        if let Some(spec) = &definition.spec {
            println!(
                "  spec:   {}",
                serde_json::to_string_pretty(spec).unwrap_or_default()
            );
        }
    }
}

pub fn print_connector(connector: &Connector) {
    let dim = Style::new().dim();
    let state = match connector.state {
        conduit_types::ConnectorState::Connected => style(connector.state).green(),
        conduit_types::ConnectorState::Error => style(connector.state).red(),
        _ => style(connector.state).yellow(),
    };
    println!("{}  {}", style(connector.name()).bold(), state);
    println!("  type:       {}", connector.connector_type);
    println!("  uid:        {}", dim.apply_to(connector.uid));
    if !connector.description.is_empty() {
        println!("  description: {}", connector.description);
    }
    println!("  created:    {}", connector.create_time.to_rfc3339());
    if let Some(configuration) = &connector.configuration {
        println!(
            "  configuration: {}",
            serde_json::to_string(configuration).unwrap_or_default()
        );
    }
}

pub fn print_run(run: &WorkflowRun) {
    let dim = Style::new().dim();
    println!("{} {}", style("Submitted").green(), run.workflow_id);
    println!("  {}", dim.apply_to(format!("run {}", run.run_id)));
}

pub fn print_next_page(total_size: u64, next_page_token: &str) {
    let dim = Style::new().dim();
    println!();
    println!("{}", dim.apply_to(format!("total: {total_size}")));
    if !next_page_token.is_empty() {
        println!(
            "{}",
            dim.apply_to(format!("next page: --page-token {next_page_token}"))
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name() {
        assert_eq!(resource_name("connectors", "c1"), "connectors/c1");
        assert_eq!(resource_name("connectors", "connectors/c1"), "connectors/c1");
    }

    #[test]
    fn test_request_metadata() {
        let md = request_metadata(Some("alice".into()), None);
        assert_eq!(md.single(HEADER_OWNER_ID), Some("alice"));
        assert!(!md.contains(HEADER_OWNER_UID));
    }

    #[test]
    fn test_parse_view() {
        assert_eq!(parse_view("FULL").unwrap(), View::Full);
        assert!(parse_view("everything").is_err());
    }
}
