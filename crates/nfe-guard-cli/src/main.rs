use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use nfe_guard::{AuditCategory, GuardConfig, SecurityAuditor};
use nfe_guard_cli::commands::{self, audit_cmd, check_config, keygen, secret, validate};
use nfe_guard_cli::{init_tracing, output};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "nfe-guard", version, about = "Security gate for NF-e invoice ingestion")]
struct Cli {
    /// Machine-readable JSON output on stdout
    #[arg(long, global = true)]
    json: bool,

    /// `.env` file read under the process environment
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse, sanitize and extract NF-e XML files
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Rate-limit key the files are charged to
        #[arg(long, default_value = "cli")]
        source: String,
        /// Per-file processing timeout
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
        /// Reference date for the issue-date window (YYYY-MM-DD)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Generate a vault key
    Keygen {
        /// Write the key to this file (mode 0600) instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Seal a secret for the `.env` file; reads stdin when no value is given
    Encrypt { value: Option<String> },
    /// Reveal an `enc:` value
    Decrypt { value: String },
    /// Print the masked display form of a secret
    Mask {
        value: String,
        /// Mask only the password of a database URL
        #[arg(long)]
        database_url: bool,
    },
    /// Validate startup configuration
    CheckConfig {
        /// Additional keys that must be present
        #[arg(long = "require")]
        require: Vec<String>,
    },
    /// Audit trail commands
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Show the most recent events
    Tail {
        /// Audit log; defaults to AUDIT_LOG_PATH
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
        /// Only events of this category (e.g. xml_security, rate_limit)
        #[arg(long)]
        category: Option<AuditCategory>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json);
    output::set_json(cli.json);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if output::is_json() {
                output::print_json(&serde_json::json!({ "error": format!("{e:#}") }));
            } else {
                eprintln!("error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Dispatch a subcommand. `Ok(false)` means the command ran but found problems.
async fn run(cli: Cli) -> Result<bool> {
    let source = commands::load_source(&cli.env_file)?;

    match cli.command {
        Commands::Validate {
            files,
            source: key,
            timeout_secs,
            today,
        } => {
            let config = GuardConfig::from_source(&source).context("invalid configuration")?;
            let args = validate::ValidateArgs {
                files,
                source: key,
                timeout: Duration::from_secs(timeout_secs),
                today,
            };
            let reports = validate::run(&config, args).await?;
            validate::print(&reports);
            Ok(reports.iter().all(|r| r.accepted))
        }
        Commands::Keygen { out } => {
            keygen::run(out.as_deref())?;
            Ok(true)
        }
        Commands::Encrypt { value } => {
            println!("{}", secret::encrypt(&source, value)?);
            Ok(true)
        }
        Commands::Decrypt { value } => {
            let auditor = auditor(&source)?;
            println!("{}", secret::decrypt(&source, &auditor, &value)?);
            Ok(true)
        }
        Commands::Mask {
            value,
            database_url,
        } => {
            println!("{}", secret::mask_value(&value, database_url));
            Ok(true)
        }
        Commands::CheckConfig { require } => {
            let auditor = auditor(&source)?;
            check_config::run(&source, &auditor, &require)
        }
        Commands::Audit {
            command:
                AuditCommands::Tail {
                    path,
                    limit,
                    category,
                },
        } => {
            let path = match path {
                Some(path) => path,
                None => {
                    GuardConfig::from_source(&source)
                        .context("invalid configuration")?
                        .audit_log_path
                }
            };
            let events = audit_cmd::tail(&path, limit, category)?;
            audit_cmd::print(&events);
            Ok(true)
        }
    }
}

/// Auditor for operator commands. Falls back to a disabled one when the
/// tunables themselves are broken, so `check-config` can still report them.
fn auditor(source: &dyn nfe_guard::ConfigSource) -> Result<SecurityAuditor> {
    match GuardConfig::from_source(source) {
        Ok(config) => SecurityAuditor::from_config(&config).with_context(|| {
            format!("failed to open audit log {}", config.audit_log_path.display())
        }),
        Err(_) => Ok(SecurityAuditor::disabled()),
    }
}
