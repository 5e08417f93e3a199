//! Command-line interface for provisioning self-hosted Supabase instances.
//!
//! Usage:
//!
//! ```text
//! berth [--base-dir DIR] [--public-host HOST] [--stack-template DIR] <command> [args]
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the default filter) so that
//! exports written to stdout can be piped.

mod cli;
mod session;


use berth::instance::{
    adapters::{DirectoryWorkspace, DockerComposeRuntime, JsonFileRegistry, OsEntropy},
    services::{InstanceProvisioningService, ProvisioningConfig},
};
use camino::Utf8PathBuf;
use clap::Parser;
use cli::Cli;
use eyre::{WrapErr, eyre};
use mockable::DefaultClock;
use session::Session;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Base directory below the home directory used when none is configured.
const DEFAULT_BASE_DIR: &str = "projects/database";

fn init_tracing(verbose: bool) -> eyre::Result<()> {
    let default_directive = if verbose { "berth=debug" } else { "berth=info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .wrap_err("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| eyre!("failed to initialise logging: {err}"))
}

fn resolve_base_dir(configured: Option<Utf8PathBuf>) -> eyre::Result<Utf8PathBuf> {
    if let Some(base_dir) = configured {
        return Ok(base_dir);
    }
    let native_home =
        dirs::home_dir().ok_or_else(|| eyre!("cannot determine the home directory"))?;
    let home = Utf8PathBuf::from_path_buf(native_home)
        .map_err(|path| eyre!("home directory {} is not valid UTF-8", path.display()))?;
    Ok(home.join(DEFAULT_BASE_DIR))
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let base_dir = resolve_base_dir(cli.base_dir)?;
    let mut config = ProvisioningConfig::new(base_dir.clone()).with_public_host(cli.public_host);
    if let Some(template) = cli.stack_template {
        config = config.with_stack_template(template);
    }
    let service = InstanceProvisioningService::new(
        Arc::new(JsonFileRegistry::new(base_dir.clone())),
        Arc::new(DirectoryWorkspace::new(base_dir)),
        Arc::new(DockerComposeRuntime::new(cli.docker)),
        Arc::new(OsEntropy),
        Arc::new(DefaultClock),
        config,
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();
    Session::new(&service, &mut input, &mut output).run(cli.command)
}
