use anyhow::{Context, Result};
use azrm::config::Config;
use azrm::plugin::data::ResourceState;
use azrm::provider::dispatch::{self, Request, Response};
use azrm::provider::{registry, ProviderMeta};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Azure Resource Manager provider plugin
#[derive(Parser, Debug)]
#[command(name = "azrm", version = azrm::VERSION, about, long_about = None)]
struct Args {
    /// Subscription to use (overrides ARM_SUBSCRIPTION_ID and the config file)
    #[arg(short, long, global = true)]
    subscription: Option<String>,

    /// Log level for debugging (AZRM_LOG takes precedence when set)
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Log file, `-` for stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the schema of every type, or of one type
    Schema {
        #[arg(long = "type")]
        type_name: Option<String>,
    },
    /// List resource and data source types
    Types,
    /// Check a configuration document against a type's schema
    Validate {
        type_name: String,
        config: PathBuf,
        /// Validate against the data source of that name
        #[arg(long)]
        data_source: bool,
    },
    /// Show what applying a configuration would do
    Plan {
        type_name: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Create, update or replace a resource; prints the new state
    Apply {
        type_name: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Refresh a resource's state
    Read {
        type_name: String,
        #[arg(long)]
        state: PathBuf,
    },
    /// Delete a resource
    Destroy {
        type_name: String,
        #[arg(long)]
        state: PathBuf,
    },
    /// Adopt an existing object into state
    Import { type_name: String, id: String },
    /// Read a data source
    Data { type_name: String, config: PathBuf },
    /// Serve JSON requests from stdin, one per line
    Serve,
    /// Show the configuration, or persist settings
    Configure {
        /// Subscription to save as the default
        #[arg(long)]
        set_subscription: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Logs never go to stdout, which carries responses
fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = match EnvFilter::try_from_env("AZRM_LOG") {
        Ok(filter) => filter,
        Err(_) if matches!(level, LogLevel::Off) => return Ok(None),
        Err(_) => EnvFilter::new(level.as_directive()),
    };

    let (writer, guard) = match log_file {
        Some(path) if path == Path::new("-") => tracing_appender::non_blocking(std::io::stderr()),
        _ => {
            let path = log_file.map(Path::to_path_buf).unwrap_or_else(get_log_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {:?}", parent))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {:?}", path))?;
            tracing_appender::non_blocking(file)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("azrm {} started with log level: {:?}", azrm::VERSION, level);
    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azrm").join("azrm.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azrm").join("azrm.log");
    }
    PathBuf::from("azrm.log")
}

/// Read a JSON or YAML document; `-` reads stdin
fn read_document(path: &Path) -> Result<Value> {
    let text = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("reading stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?
    };
    serde_yaml::from_str(&text).with_context(|| format!("parsing {:?}", path))
}

fn read_state(path: &Path) -> Result<ResourceState> {
    let document = read_document(path)?;
    serde_json::from_value(document).with_context(|| format!("{:?} is not a resource state", path))
}

fn load_config(args: &Args) -> Config {
    let mut config = Config::load().with_env_overrides();
    if let Some(subscription) = &args.subscription {
        config.subscription_id = Some(subscription.clone());
    }
    config
}

fn print_response(response: &Response) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;

    let config = load_config(&args);

    let request = match args.command {
        Command::Types => {
            let types = serde_json::json!({
                "resources": registry::resource_types(),
                "data_sources": registry::data_source_types(),
            });
            println!("{}", serde_json::to_string_pretty(&types)?);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Schema { type_name: None } => Request::GetSchema,
        Command::Schema {
            type_name: Some(type_name),
        } => {
            let schema = registry::provider_schema();
            let found = ["resources", "data_sources"]
                .iter()
                .find_map(|kind| schema.get(kind).and_then(|s| s.get(&type_name)).cloned())
                .with_context(|| format!("unknown type {:?}", type_name))?;
            println!("{}", serde_json::to_string_pretty(&found)?);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Configure { set_subscription } => {
            let mut stored = Config::load();
            if let Some(subscription) = set_subscription {
                stored.set_subscription(&subscription)?;
                eprintln!("Saved subscription {}", subscription);
            }
            println!("{}", serde_json::to_string_pretty(&stored)?);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Serve => {
            let meta = match ProviderMeta::configure(&config) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    tracing::warn!("Provider not configured, API requests will fail: {:#}", e);
                    None
                }
            };
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            dispatch::serve(meta.as_ref(), stdin, tokio::io::stdout()).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Validate {
            type_name,
            config,
            data_source,
        } => Request::Validate {
            type_name,
            data_source,
            config: read_document(&config)?,
        },
        Command::Plan {
            type_name,
            config,
            state,
        } => Request::Plan {
            type_name,
            config: config.as_deref().map(read_document).transpose()?,
            prior: state.as_deref().map(read_state).transpose()?,
        },
        Command::Apply {
            type_name,
            config,
            state,
        } => Request::Apply {
            type_name,
            config: config.as_deref().map(read_document).transpose()?,
            prior: state.as_deref().map(read_state).transpose()?,
        },
        Command::Read { type_name, state } => Request::Read {
            type_name,
            state: read_state(&state)?,
        },
        Command::Destroy { type_name, state } => Request::Delete {
            type_name,
            state: read_state(&state)?,
        },
        Command::Import { type_name, id } => Request::Import { type_name, id },
        Command::Data { type_name, config } => Request::ReadDataSource {
            type_name,
            config: read_document(&config)?,
        },
    };

    let needs_api = !matches!(
        request,
        Request::GetSchema | Request::Validate { .. } | Request::Plan { .. }
    );
    let meta = if needs_api {
        Some(ProviderMeta::configure(&config)?)
    } else {
        None
    };

    let response = dispatch::invoke(meta.as_ref(), request).await;
    print_response(&response)?;

    // Returning lets the log guard flush the final lines
    if matches!(response, Response::Error { .. }) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
