//! Command-line definitions.

use berth::instance::{
    adapters::DEFAULT_COMPOSE_PROGRAM,
    domain::{DEFAULT_PUBLIC_HOST, ExportFormat, InstanceDomainError, InstanceId},
};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

fn parse_instance_id(raw: &str) -> Result<InstanceId, InstanceDomainError> {
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|err| InstanceDomainError::InvalidInstanceId {
            value: 0,
            reason: format!("'{raw}' is not an integer: {err}"),
        })?;
    InstanceId::new(value)
}

#[derive(Debug, Parser)]
#[command(
    name = "berth",
    about = "Provision and track isolated self-hosted Supabase instances",
    version,
    propagate_version = true
)]
pub(crate) struct Cli {
    /// Directory holding the registry and instance folders
    /// (default: ~/projects/database)
    #[arg(long, env = "BERTH_BASE_DIR", global = true)]
    pub(crate) base_dir: Option<Utf8PathBuf>,

    /// Host used in generated URLs
    #[arg(long, env = "BERTH_PUBLIC_HOST", default_value = DEFAULT_PUBLIC_HOST, global = true)]
    pub(crate) public_host: String,

    /// Container CLI providing `compose`
    #[arg(long, env = "BERTH_DOCKER", default_value = DEFAULT_COMPOSE_PROGRAM, global = true)]
    pub(crate) docker: String,

    /// Upstream Supabase docker directory copied into new instance folders
    #[arg(long, env = "BERTH_STACK_TEMPLATE", global = true)]
    pub(crate) stack_template: Option<Utf8PathBuf>,

    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Provision one or more instances
    Create {
        /// Instance ids; the smallest free id when omitted
        #[arg(value_parser = parse_instance_id)]
        ids: Vec<InstanceId>,
        /// Human label (single instance only)
        #[arg(long)]
        name: Option<String>,
        /// Free-text description
        #[arg(long)]
        description: Option<String>,
        /// Tag to attach; repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List registered instances with their container state
    List {
        /// Output format: table, json, yaml, or env
        #[arg(long, default_value = "table")]
        format: ExportFormat,
    },
    /// Show the registry entry of an instance
    Get {
        #[arg(value_parser = parse_instance_id)]
        id: InstanceId,
    },
    /// Export connection details
    Info {
        /// Restrict the export to one instance
        #[arg(long, value_parser = parse_instance_id)]
        instance: Option<InstanceId>,
        /// Output format: table, json, yaml, or env
        #[arg(long, default_value = "table")]
        format: ExportFormat,
        /// Write the export to a file instead of stdout
        #[arg(long)]
        output: Option<Utf8PathBuf>,
    },
    /// Change the name, description, or tags of an instance
    Update {
        #[arg(value_parser = parse_instance_id)]
        id: InstanceId,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New description
        #[arg(long)]
        description: Option<String>,
        /// Replacement tag; repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Remove every tag
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },
    /// Remove an instance from the registry
    Delete {
        #[arg(value_parser = parse_instance_id)]
        id: InstanceId,
        /// Also remove the instance folder
        #[arg(long)]
        remove_files: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Leave the containers running
        #[arg(long)]
        keep_running: bool,
    },
    /// Show container state
    Status {
        /// Restrict to one instance
        #[arg(long, value_parser = parse_instance_id)]
        instance: Option<InstanceId>,
    },
    /// Start the containers of an instance
    Start {
        #[arg(value_parser = parse_instance_id)]
        id: InstanceId,
    },
    /// Stop the containers of an instance
    Stop {
        #[arg(value_parser = parse_instance_id)]
        id: InstanceId,
    },
    /// Show recent container logs
    Logs {
        #[arg(value_parser = parse_instance_id)]
        id: InstanceId,
        /// Restrict to one compose service
        #[arg(long)]
        service: Option<String>,
        /// Number of lines per container
        #[arg(long, default_value_t = 100)]
        tail: u32,
    },
    /// Print a compose file for a service joining an instance network
    Template {
        #[arg(value_parser = parse_instance_id)]
        id: InstanceId,
        /// Compose service name
        service: String,
        /// Write the template to a file instead of stdout
        #[arg(long)]
        output: Option<Utf8PathBuf>,
    },
    /// Rewrite the .env and compose override of an instance
    Render {
        #[arg(value_parser = parse_instance_id)]
        id: InstanceId,
    },
}
