//! FeatureSync command-line tool.
//!
//! Runs a reconciliation of a source dataset against a feature layer, and
//! provides subcommands for generating and validating configuration files
//! and inspecting the remote side.

mod output;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use featuresync_core::config::{AppConfig, AuthMode};
use featuresync_core::mapping::FieldMapping;
use featuresync_core::notify::Notifier;
use featuresync_core::reconcile;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// FeatureSync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "featuresync",
    version,
    about = "Push attribute updates from a JSON dataset to a hosted feature layer"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./featuresync.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute one reconciliation run.
    Run {
        /// Print the report as JSON instead of a table.
        #[arg(long)]
        json: bool,

        /// Load both sides and show what would be matched, without updating.
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./featuresync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Print the remote name -> object id index.
    Index,

    /// Check that the configured credential yields a token.
    Token,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so `run --json` output stays parseable. `--log-level` wins
/// over the config file; without either only warnings are shown.
fn init_tracing(cli: &Cli) {
    let level = cli.log_level.clone().unwrap_or_else(|| {
        AppConfig::load_from_file(&cli.config)
            .map(|c| c.run.log_level)
            .unwrap_or_else(|_| "warn".into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Run { json, dry_run } => {
            let config = load_config(&cli.config)?;
            if dry_run {
                cmd_plan(&config, json).await
            } else {
                cmd_run(&config, json).await
            }
        }
        Commands::Index => cmd_index(&load_config(&cli.config)?).await,
        Commands::Token => cmd_token(&load_config(&cli.config)?).await,
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn spinner(message: &str, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, json: bool) -> Result<()> {
    let run_config = config.reconciliation_config()?;
    let mapper = FieldMapping::new(&config.mapping, &config.source.name_field);
    let notifier = Notifier::new(&config.notifications);

    let progress = spinner("Reconciling...", json);
    let result = reconcile::reconcile_with_summary(&run_config, &mapper).await;
    progress.finish_and_clear();

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(notify_err) = notifier.notify_failure(&e.to_string()).await {
                warn!(error = %notify_err, "failure notification not delivered");
            }
            return Err(e).context("reconciliation aborted");
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::print_summary(&summary);
    }

    if let Err(e) = notifier.notify_run(&summary).await {
        warn!(error = %e, "run summary notification not delivered");
    }

    Ok(())
}

async fn cmd_plan(config: &AppConfig, json: bool) -> Result<()> {
    let run_config = config.reconciliation_config()?;

    let progress = spinner("Loading source and remote index...", json);
    let result = reconcile::plan(&run_config).await;
    progress.finish_and_clear();
    let plan = result.context("dry run aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!();
    println!("{}", style::header("Dry Run"));
    println!();
    if !plan.matched.is_empty() || !plan.failures.is_empty() {
        println!("{}", output::plan_table(&plan));
        println!();
    }
    println!("  Would update : {}", plan.matched.len());
    println!("  Unmatched    : {}", plan.failures.len());
    println!();
    println!("{}", style::dim("No updates were sent."));

    Ok(())
}

async fn cmd_index(config: &AppConfig) -> Result<()> {
    let run_config = config.reconciliation_config()?;

    let progress = spinner("Querying feature layer...", false);
    let result = reconcile::fetch_remote_index(&run_config).await;
    progress.finish_and_clear();
    let index = result.context("failed to load remote index")?;

    println!();
    println!(
        "{}",
        style::header(&format!("Remote Index ({} features)", index.len()))
    );
    println!();
    if !index.is_empty() {
        println!("{}", output::index_table(&index));
    }
    if !index.duplicates().is_empty() {
        println!();
        println!(
            "{}",
            style::warn(&format!(
                "{} duplicate name(s); the last feature wins: {}",
                index.duplicates().len(),
                index.duplicates().join(", ")
            ))
        );
    }

    Ok(())
}

async fn cmd_token(config: &AppConfig) -> Result<()> {
    let run_config = config.reconciliation_config()?;
    let token = reconcile::resolve_token(&run_config)
        .await
        .context("failed to resolve credential")?;

    println!(
        "{}",
        style::success(&format!(
            "Token resolved ({} mode, {} characters)",
            run_config.credential.mode(),
            token.len()
        ))
    );
    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# FeatureSync configuration
# Secrets are never stored here: *_env fields name environment variables.

[run]
log_level = "info"
# timeout_secs = 30
strict_duplicates = false

[source]
url = "https://data.example.com/records.json"
name_field = "name"

[feature_service]
url = "https://services.arcgis.com/ORG_ID/arcgis/rest/services/LAYER/FeatureServer/0"
name_field = "pa_name"
object_id_field = "OBJECTID"

[auth]
mode = "token"
token_env = "FEATURESYNC_TOKEN"
# mode = "username"
# username = "svc_user"
# password_env = "FEATURESYNC_PASSWORD"

[mapping]
# remote attribute = source field; leave empty to copy every scalar field
fields = { STATUS = "status" }
skip_missing = false

[notifications]
# slack_webhook_url_env = "SLACK_WEBHOOK_URL"
notify_on = "problems"
"#;

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Edit the source and feature layer URLs and the field mapping");
    println!("  2. Set the referenced environment variables (FEATURESYNC_TOKEN, etc.)");
    println!(
        "  3. Validate with: featuresync validate --config {}",
        output.display()
    );
    println!(
        "  4. Preview with: featuresync run --dry-run --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    if let Err(e) = config.resolve_env_vars() {
        println!("  {}", style::warn(&e.to_string()));
    } else {
        println!("  {}", style::success("Environment variable references processed"));
    }

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All required fields are valid"));

    println!();
    println!("Configuration summary:");
    println!("  Source URL      : {}", config.source.url);
    println!("  Source key      : {}", config.source.name_field);
    println!("  Layer URL       : {}", config.feature_service.url);
    println!(
        "  Layer key / id  : {} / {}",
        config.feature_service.name_field, config.feature_service.object_id_field
    );
    println!("  Auth mode       : {}", config.auth.mode);
    match config.auth.mode {
        AuthMode::Token => {
            println!(
                "  Token           : {}",
                style::secret_state(config.auth.token.is_some())
            );
        }
        AuthMode::Username => {
            println!(
                "  Username        : {}",
                config.auth.username.as_deref().unwrap_or("")
            );
            println!(
                "  Password        : {}",
                style::secret_state(config.auth.password.is_some())
            );
            println!("  Token URL       : {}", config.auth.token_url);
        }
    }
    if config.mapping.fields.is_empty() {
        println!("  Mapping         : passthrough");
    } else {
        let fields: Vec<String> = config
            .mapping
            .fields
            .iter()
            .map(|(target, source)| format!("{} <- {}", target, source))
            .collect();
        println!("  Mapping         : {}", fields.join(", "));
    }
    println!(
        "  Slack webhook   : {}",
        if config.notifications.slack_webhook_url_env.is_some() {
            style::secret_state(config.notifications.slack_webhook_url.is_some())
        } else {
            "not configured".to_string()
        }
    );
    println!(
        "  Notify on       : {}",
        format!("{:?}", config.notifications.notify_on).to_lowercase()
    );
    println!();
    println!("{}", style::success("Configuration is valid."));

    Ok(())
}
