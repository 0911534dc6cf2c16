//! # apim-policy CLI
//!
//! Drives one API policy through its lifecycle from a YAML configuration
//! file and a JSON state file.
//!
//! ## Usage
//!
//! ```bash
//! # Create the policy, or update it when the state file already tracks one
//! apim-policy apply -f policy.yaml --state policy.state.json
//!
//! # Refresh state from the service
//! apim-policy refresh --state policy.state.json
//!
//! # Delete the policy and its state
//! apim-policy destroy --state policy.state.json
//!
//! # Start tracking an existing policy
//! apim-policy import /subscriptions/.../apis/api1/policies/policy --state policy.state.json
//! ```

use anyhow::{anyhow, Context, Result};
use apim_policy_provider::config::ProviderConfig;
use apim_policy_provider::observability::metrics;
use apim_policy_provider::schema::{
    config_json_schema, resource_schema, validate_import_id,
    xml_with_dotnet_interpolations_diff_suppress,
};
use apim_policy_provider::{
    ApiPolicyClient, ApiPolicyConfig, ApiPolicyReconciler, ResourceData, RestApiPolicyClient,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Azure API Management API policy reconciler
#[derive(Parser)]
#[command(name = "apim-policy")]
#[command(
    about = "Manage the policy document of an Azure API Management API",
    long_about = None,
    after_help = "\
Environment:
  AZURE_SUBSCRIPTION_ID  subscription used to address new policies
  AZURE_CLIENT_ID        use Workload Identity instead of managed identity
  ARM_ENDPOINT           management endpoint (default https://management.azure.com)
  LOG_FORMAT             text (default) or json
"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// State file tracking the managed policy
    #[arg(long, global = true, default_value = "apim-policy.state.json")]
    pub state: PathBuf,

    /// Write Prometheus metrics to this file before exiting
    #[arg(long, global = true, value_name = "PATH")]
    pub metrics_textfile: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or update the policy described by a configuration file
    Apply {
        /// YAML configuration of the policy
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,
    },
    /// Refresh the state file from the service
    Refresh,
    /// Delete the tracked policy and remove the state file
    Destroy,
    /// Start tracking an existing policy by its resource ID
    Import {
        /// Full resource ID of the policy
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Print the resource schema and the JSON Schema of the configuration file
    Schema,
    /// Print version and build information
    Version,
}

/// Run a parsed command to completion
///
/// # Errors
/// Returns an error if the command fails; the message is printed by `main`.
pub async fn run(cli: Cli, provider: ProviderConfig, cancel: CancellationToken) -> Result<()> {
    match cli.command {
        Commands::Schema => print_schema(),
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Apply { ref file } => {
            let reconciler = build_reconciler(&provider)?;
            apply(&reconciler, file, &cli.state, &cancel).await
        }
        Commands::Refresh => {
            let reconciler = build_reconciler(&provider)?;
            refresh(&reconciler, &cli.state, &cancel).await
        }
        Commands::Destroy => {
            let reconciler = build_reconciler(&provider)?;
            destroy(&reconciler, &cli.state, &cancel).await
        }
        Commands::Import { ref id } => {
            let reconciler = build_reconciler(&provider)?;
            import(&reconciler, id, &cli.state, &cancel).await
        }
    }
}

fn build_reconciler(provider: &ProviderConfig) -> Result<ApiPolicyReconciler> {
    let client: Arc<dyn ApiPolicyClient> = Arc::new(
        RestApiPolicyClient::new(provider).context("Failed to create API Management client")?,
    );
    Ok(ApiPolicyReconciler::new(
        client,
        provider.subscription_id.clone(),
        provider.timeouts,
    ))
}

fn load_config(path: &Path) -> Result<ApiPolicyConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    let config: ApiPolicyConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration {}: {e}", path.display()))?;
    Ok(config)
}

fn load_tracked(state: &Path) -> Result<ResourceData> {
    match ResourceData::load(state)? {
        Some(data) if data.is_tracked() => Ok(data),
        _ => Err(anyhow!(
            "No policy is tracked in {}; run `apim-policy apply` or `apim-policy import` first",
            state.display()
        )),
    }
}

/// Whether `config` would change nothing on a tracked policy
fn is_unchanged(data: &ResourceData, config: &ApiPolicyConfig) -> bool {
    let content_unchanged = match &config.xml_content {
        Some(content) => xml_with_dotnet_interpolations_diff_suppress(data.xml_content(), content),
        None => true,
    };
    let link_unchanged = data.xml_link() == config.xml_link.as_deref().unwrap_or_default();
    content_unchanged && link_unchanged && !data.key_changed(config)
}

async fn apply(
    reconciler: &ApiPolicyReconciler,
    file: &Path,
    state: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = load_config(file)?;

    let mut data = match ResourceData::load(state)? {
        Some(existing) if existing.is_tracked() => {
            if existing.key_changed(&config) {
                let replacement = ResourceData::for_create(&config);
                // Fail before the old policy is gone if the new one cannot be addressed
                let target = reconciler.target(&replacement)?;
                info!(
                    "Policy key changed; replacing {} with {}",
                    existing.id(),
                    target.id()
                );
                reconciler.delete(&existing, cancel).await?;
                replacement
            } else if is_unchanged(&existing, &config) {
                println!("No changes. {} is up to date.", existing.id());
                return Ok(());
            } else {
                let mut data = existing;
                data.apply_config(&config);
                data
            }
        }
        _ => ResourceData::for_create(&config),
    };

    let created = data.is_new_resource();
    reconciler.create_or_update(&mut data, cancel).await?;
    data.set_new_resource(false);
    data.save(state)?;

    println!(
        "{} {}",
        if created { "Created" } else { "Updated" },
        data.id()
    );
    Ok(())
}

async fn refresh(
    reconciler: &ApiPolicyReconciler,
    state: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut data = load_tracked(state)?;
    let previous_id = data.id().to_string();
    reconciler.read(&mut data, cancel).await?;
    data.save(state)?;

    if data.is_tracked() {
        println!("Refreshed {}", data.id());
    } else {
        warn!("{} no longer exists", previous_id);
        println!("{previous_id} no longer exists and is no longer tracked");
    }
    Ok(())
}

async fn destroy(
    reconciler: &ApiPolicyReconciler,
    state: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some(data) = ResourceData::load(state)? else {
        println!("Nothing to destroy");
        return Ok(());
    };

    if data.is_tracked() {
        reconciler.delete(&data, cancel).await?;
        println!("Destroyed {}", data.id());
    }
    std::fs::remove_file(state)
        .with_context(|| format!("Failed to remove state file {}", state.display()))?;
    Ok(())
}

async fn import(
    reconciler: &ApiPolicyReconciler,
    id: &str,
    state: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(existing) = ResourceData::load(state)? {
        if existing.is_tracked() {
            return Err(anyhow!(
                "{} already tracks {}",
                state.display(),
                existing.id()
            ));
        }
    }

    let parsed = validate_import_id(id).with_context(|| format!("Invalid import ID {id:?}"))?;
    let mut data = ResourceData::for_import(parsed.id());
    reconciler.read(&mut data, cancel).await?;
    if !data.is_tracked() {
        return Err(anyhow!("Cannot import non-existent remote object {parsed}"));
    }
    data.save(state)?;

    println!("Imported {}", data.id());
    Ok(())
}

fn print_schema() -> Result<()> {
    let output = serde_json::json!({
        "resource": resource_schema(),
        "config": config_json_schema(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize schema")?
    );
    Ok(())
}

fn print_version() {
    println!("apim-policy {}", env!("CARGO_PKG_VERSION"));
    println!("  built:  {}", env!("BUILD_DATETIME"));
    println!("  commit: {}", env!("BUILD_GIT_HASH"));
}

/// Write the metrics textfile when requested; failures are only logged
pub fn flush_metrics(path: Option<&Path>) {
    if let Some(path) = path {
        if let Err(e) = metrics::write_textfile(path) {
            warn!("Failed to write metrics to {}: {:#}", path.display(), e);
        }
    }
}
