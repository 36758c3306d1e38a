//! # valsctl
//!
//! Command-line adapter for the vals-operator provider.
//!
//! ## Usage
//!
//! ```bash
//! # Create or update a ValsSecret from a desired-state file
//! valsctl apply valssecret -f app-credentials.yaml
//!
//! # Rename: delete default/old-name, then upsert the file's identity
//! valsctl apply valssecret -f app-credentials.yaml --replace default/old-name
//!
//! # Show the observed state of a DbSecret
//! valsctl get dbsecret example --namespace default
//!
//! # Type of a ValsSecret without touching it
//! valsctl lookup app-credentials --namespace apps
//!
//! # Type of the Secret it rendered
//! valsctl lookup-secret app-credentials --namespace apps
//!
//! # JSON Schema of the desired-state file
//! valsctl schema dbsecret
//! ```
//!
//! Observed state is printed as JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use vals_operator_provider::codec::ObjectKey;
use vals_operator_provider::config::{Environment, ProviderConfig, RuntimeSettings};
use vals_operator_provider::observability::{gather_metrics, init_tracing};
use vals_operator_provider::runtime::{self, ProviderRuntime, ResourceType};

/// vals-operator provider CLI
#[derive(Parser)]
#[command(name = "valsctl", version)]
#[command(
    about = "Manage vals-operator ValsSecret and DbSecret resources",
    long_about = None,
    after_help = "\
Available resource types:
  valssecret (or 'vs') - ValsSecret resource (digitalis.io/v1)
  dbsecret (or 'dbs')  - DbSecret resource (digitalis.io/v1beta1)

Examples:
  valsctl apply valssecret -f secret.yaml
  valsctl get dbs example --namespace default
  valsctl lookup app-credentials -n apps
  valsctl lookup-secret app-credentials -n apps
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    print_metrics: bool,
}

/// Connection flags; each one overrides the matching provider configuration field
#[derive(Args)]
struct ConnectionArgs {
    /// Kubernetes API server (scheme optional)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Bearer token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Credential file; repeat for an ordered precedence list. Replaces any
    /// path from the provider file or `KUBE_CONFIG_PATH`
    #[arg(long, global = true)]
    kubeconfig: Vec<String>,

    /// Context to select instead of the file's current context
    #[arg(long, global = true)]
    context: Option<String>,

    /// Cluster entry to use with the selected context
    #[arg(long, global = true)]
    cluster: Option<String>,

    /// User entry to use with the selected context
    #[arg(long, global = true)]
    user: Option<String>,

    /// Skip server certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    #[arg(long, global = true)]
    proxy_url: Option<String>,

    /// Provider configuration file (YAML or JSON)
    #[arg(long, global = true, value_name = "FILE")]
    provider_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a resource from a desired-state file
    Apply {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: Kind,

        /// Desired-state file (YAML or JSON); `-` reads stdin
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        /// Prior identity (NAMESPACE/NAME); deleted first when it differs from the file's
        #[arg(long, value_name = "NAMESPACE/NAME", value_parser = parse_key)]
        replace: Option<ObjectKey>,
    },
    /// Show the observed state of a resource
    Get {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: Kind,

        #[arg(value_name = "NAME")]
        name: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Delete a resource
    Delete {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: Kind,

        #[arg(value_name = "NAME")]
        name: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Read name, namespace and type of a ValsSecret
    Lookup {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Read name, namespace and type of a core Secret
    LookupSecret {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Print the JSON Schema of a desired-state file
    Schema {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: Kind,
    },
}

/// Resource types supported by valsctl
#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    #[value(name = "valssecret", alias = "vs")]
    ValsSecret,
    #[value(name = "dbsecret", alias = "dbs")]
    DbSecret,
}

impl From<Kind> for ResourceType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::ValsSecret => Self::ValsSecret,
            Kind::DbSecret => Self::DbSecret,
        }
    }
}

fn parse_key(value: &str) -> Result<ObjectKey, String> {
    ObjectKey::parse(value).ok_or_else(|| format!("expected NAMESPACE/NAME, got {value:?}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = RuntimeSettings::from_env();
    init_tracing(Some(&settings.log_level));

    let result = run(cli.command, &cli.connection, settings).await;

    if cli.print_metrics {
        match gather_metrics() {
            Ok(text) => eprint!("{text}"),
            Err(e) => error!("Failed to gather metrics: {e:#}"),
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, args: &ConnectionArgs, settings: RuntimeSettings) -> Result<()> {
    if let Commands::Schema { resource_type } = command {
        return print_json(&ResourceType::from(resource_type).json_schema());
    }

    let config = provider_config(args)?.with_env_defaults();
    let runtime = runtime::initialize(&config, settings, &Environment::capture())
        .await
        .context("Failed to initialize provider")?;

    execute(&runtime, command).await
}

async fn execute(runtime: &ProviderRuntime, command: Commands) -> Result<()> {
    let cancel = runtime.cancellation();
    match command {
        Commands::Apply {
            resource_type,
            file,
            replace,
        } => {
            let desired = read_input(&file)?;
            let report = runtime
                .apply(resource_type.into(), &desired, replace.as_ref(), &cancel)
                .await?;
            print_json(&report)
        }
        Commands::Get {
            resource_type,
            name,
            namespace,
        } => {
            let key = ObjectKey::new(namespace, name);
            let observed = runtime.read(resource_type.into(), &key, &cancel).await?;
            print_json(&observed)
        }
        Commands::Delete {
            resource_type,
            name,
            namespace,
        } => {
            let key = ObjectKey::new(namespace, name);
            runtime.delete(resource_type.into(), &key, &cancel).await?;
            eprintln!("{} {key} deleted", ResourceType::from(resource_type));
            Ok(())
        }
        Commands::Lookup { name, namespace } => {
            let key = ObjectKey::new(namespace, name);
            let summary = runtime.lookup_vals_secret(&key, &cancel).await?;
            print_json(&summary)
        }
        Commands::LookupSecret { name, namespace } => {
            let key = ObjectKey::new(namespace, name);
            let summary = runtime.lookup_secret(&key, &cancel).await?;
            print_json(&summary)
        }
        Commands::Schema { resource_type } => {
            print_json(&ResourceType::from(resource_type).json_schema())
        }
    }
}

/// Flags over the provider file; the `KUBE_*` environment fills what is still unset
fn provider_config(args: &ConnectionArgs) -> Result<ProviderConfig> {
    let mut config = match &args.provider_config {
        Some(path) => ProviderConfig::from_file(path)?,
        None => ProviderConfig::default(),
    };

    set(&mut config.host, args.host.as_ref());
    set(&mut config.token, args.token.as_ref());
    set(&mut config.config_context, args.context.as_ref());
    set(&mut config.config_context_cluster, args.cluster.as_ref());
    set(&mut config.config_context_auth_info, args.user.as_ref());
    set(&mut config.proxy_url, args.proxy_url.as_ref());
    if args.insecure {
        config.insecure = Some(true);
    }
    match args.kubeconfig.as_slice() {
        [] => {}
        [single] => {
            config.config_path = Some(single.clone());
            config.config_paths.clear();
        }
        many => {
            config.config_path = None;
            config.config_paths = many.to_vec();
        }
    }

    Ok(config)
}

fn set(field: &mut Option<String>, value: Option<&String>) {
    if let Some(value) = value {
        *field = Some(value.clone());
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buffer = Vec::new();
        std::io::Read::read_to_end(&mut std::io::stdin(), &mut buffer)
            .context("Failed to read desired state from stdin")?;
        return Ok(buffer);
    }
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{rendered}");
    Ok(())
}
