//! `authz-gate` operator CLI.
//!
//! ```text
//! authz-gate [-c authz.toml] check --subject alice --action read --resource notes:alice:1
//! authz-gate [-c authz.toml] validate
//! authz-gate [-c authz.toml] serve
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use authz_gate::config::{load_config, load_config_or_default, AuthzConfig, ConfigError};
use authz_gate::lifecycle::{signals, startup, Shutdown};
use authz_gate::observability::logging::init_logging;
use authz_gate::{ActionKind, AuthorizationCoordinator, HttpPermissionClient, ResourceRef};

#[derive(Parser)]
#[command(name = "authz-gate", version, about = "Resilient permission checks with degraded-mode fallback")]
struct Cli {
    /// Config file; defaults apply when it does not exist (except for `validate`).
    #[arg(short, long, default_value = "authz.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one permission check and print the result as JSON
    Check {
        #[arg(long)]
        subject: String,
        /// read, write, create, update, delete, admin (or an alias such as get, edit, remove)
        #[arg(long)]
        action: String,
        /// type:id, notes:owner:id or public:...
        #[arg(long)]
        resource: String,
        /// Owner hint used by the fallback policy
        #[arg(long)]
        owner: Option<String>,
        /// Mark the resource public for the fallback policy
        #[arg(long)]
        public: bool,
    },
    /// Validate the config file and exit
    Validate,
    /// Run the cache sweeper, metrics exporter and admin API until signalled
    Serve,
}

/// `validate` insists on a real file; the other commands run on defaults.
fn load(path: &Path, command: &Commands) -> Result<AuthzConfig, ConfigError> {
    if matches!(command, Commands::Validate) {
        return load_config(path);
    }
    let (config, found) = load_config_or_default(path)?;
    if !found {
        eprintln!("warning: {} not found, using defaults", path.display());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(&cli.config, &cli.command) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.observability);

    let outcome = match cli.command {
        Commands::Validate => {
            println!("{}: ok", cli.config.display());
            Ok(())
        }
        Commands::Check {
            subject,
            action,
            resource,
            owner,
            public,
        } => check(&config, &subject, &action, &resource, owner, public).await,
        Commands::Serve => serve(&config).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn check(
    config: &AuthzConfig,
    subject: &str,
    action: &str,
    resource: &str,
    owner: Option<String>,
    public: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let action: ActionKind = action.parse()?;
    let mut resource = ResourceRef::parse(resource)?;
    if let Some(owner) = owner {
        resource = resource.owned_by(owner);
    }
    if public {
        resource = resource.public();
    }

    let client = HttpPermissionClient::new(&config.backend)?;
    let coordinator = AuthorizationCoordinator::from_config(config, Arc::new(client));
    let result = coordinator.authorize(subject, action, resource).await?;

    println!(
        "{}",
        serde_json::json!({
            "allowed": result.allowed,
            "source": result.source,
            "latency_ms": result.latency.as_secs_f64() * 1000.0,
            "message": result.denial_message(),
        })
    );
    Ok(())
}

async fn serve(config: &AuthzConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "authz-gate starting");

    let shutdown = Shutdown::new();
    let services = startup::start(config, &shutdown).await?;
    tracing::info!(
        backend = %config.backend.endpoint,
        admin = ?services.admin_address,
        "ready"
    );

    signals::shutdown_on_signal(shutdown).await;
    for task in services.tasks {
        let _ = task.await;
    }

    tracing::info!(cache = ?services.coordinator.cache().stats(), "shutdown complete");
    Ok(())
}
