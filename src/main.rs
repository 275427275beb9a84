use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use drip_config::FlowDef;
use drip_engine::{ActionExecutor, Dispatcher, DispatcherConfig, FlowService, SaveError};
use drip_mailer::{HttpTransport, LogTransport, MailTransport};
use drip_store::{SqliteStore, Store};

/// Drip - timed email flows
#[derive(Parser)]
#[command(name = "drip")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.drip)
  #[arg(long, global = true, env = "DRIP_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Database URL, overrides the database in the data directory
  #[arg(long, global = true, env = "DATABASE_URL")]
  database_url: Option<String>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a flow file and print its schedule
  Validate {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,
  },

  /// Save a flow and schedule its emails
  Save {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,
  },

  /// Show a saved flow and its jobs
  Status { flow_id: String },

  /// Run the dispatcher until interrupted
  Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
  /// Seconds between store polls
  #[arg(long, env = "DRIP_TICK_SECS", default_value_t = 5)]
  tick_secs: u64,

  /// Seconds a claimed job may go without an outcome before it is retried
  #[arg(long, env = "DRIP_GRACE_SECS", default_value_t = 300)]
  grace_secs: u64,

  /// Emails sent concurrently per tick
  #[arg(long, env = "DRIP_MAX_CONCURRENCY", default_value_t = 8)]
  max_concurrency: usize,

  /// Claims per job, including retries after a crash
  #[arg(long, env = "DRIP_MAX_ATTEMPTS", default_value_t = 2)]
  max_attempts: u32,

  /// HTTP mail relay endpoint. Without it emails are only logged.
  #[arg(long, env = "DRIP_MAIL_ENDPOINT")]
  mail_endpoint: Option<String>,

  /// Bearer token for the mail relay
  #[arg(long, env = "DRIP_MAIL_TOKEN", hide_env_values = true)]
  mail_token: Option<String>,

  /// Sender address
  #[arg(long, env = "DRIP_MAIL_FROM")]
  mail_from: Option<String>,
}

fn main() -> Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drip=info,warn")),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let Some(command) = cli.command else {
    println!("drip - use --help to see available commands");
    return Ok(ExitCode::SUCCESS);
  };

  let database_url = match cli.database_url {
    Some(url) => url,
    None => {
      let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
          .context("could not determine home directory")?
          .join(".drip"),
      };
      std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
      format!("sqlite://{}", data_dir.join("drip.db").display())
    }
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Validate { flow_file } => validate_flow(&flow_file).await,
      Commands::Save { flow_file } => save_flow(&flow_file, &database_url).await,
      Commands::Status { flow_id } => flow_status(&flow_id, &database_url).await,
      Commands::Run(args) => run_dispatcher(args, &database_url).await,
    }
  })
}

async fn read_flow(flow_file: &Path) -> Result<FlowDef> {
  let content = tokio::fs::read_to_string(flow_file)
    .await
    .with_context(|| format!("failed to read flow file: {}", flow_file.display()))?;

  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse flow file: {}", flow_file.display()))
}

async fn open_store(database_url: &str) -> Result<Arc<SqliteStore>> {
  let store = SqliteStore::connect(database_url)
    .await
    .with_context(|| format!("failed to open database: {}", database_url))?;
  Ok(Arc::new(store))
}

async fn validate_flow(flow_file: &Path) -> Result<ExitCode> {
  let def = read_flow(flow_file).await?;

  let graph = match drip_workflow::validate(&def) {
    Ok(graph) => graph,
    Err(e) => {
      println!("{}", serde_json::to_string_pretty(&SaveError::from(e).body())?);
      return Ok(ExitCode::FAILURE);
    }
  };

  let schedule: Vec<_> = drip_workflow::compile(&graph, Utc::now())
    .into_iter()
    .map(|action| {
      serde_json::json!({
        "nodeId": action.node_id,
        "offsetMs": action.offset_ms,
        "to": action.payload.to,
        "subject": action.payload.subject,
      })
    })
    .collect();

  println!("{}", serde_json::to_string_pretty(&schedule)?);
  Ok(ExitCode::SUCCESS)
}

async fn save_flow(flow_file: &Path, database_url: &str) -> Result<ExitCode> {
  let def = read_flow(flow_file).await?;
  let store = open_store(database_url).await?;
  let service = FlowService::new(store.clone());

  let code = match service.save_flow(def).await {
    Ok(saved) => {
      println!("{}", serde_json::to_string_pretty(&saved)?);
      ExitCode::SUCCESS
    }
    Err(e) => {
      let mut body = e.body();
      body["status"] = e.status_code().into();
      println!("{}", serde_json::to_string_pretty(&body)?);
      ExitCode::FAILURE
    }
  };

  store.close().await;
  Ok(code)
}

async fn flow_status(flow_id: &str, database_url: &str) -> Result<ExitCode> {
  let store = open_store(database_url).await?;
  let report = FlowService::new(store.clone())
    .flow_status(flow_id)
    .await
    .with_context(|| format!("failed to load flow {}", flow_id))?;

  println!("{}", serde_json::to_string_pretty(&report)?);
  store.close().await;
  Ok(ExitCode::SUCCESS)
}

async fn run_dispatcher(args: RunArgs, database_url: &str) -> Result<ExitCode> {
  let transport: Arc<dyn MailTransport> = match args.mail_endpoint {
    Some(endpoint) => {
      let Some(from) = args.mail_from else {
        bail!("--mail-from is required with --mail-endpoint");
      };
      let mut transport =
        HttpTransport::new(&endpoint, from).context("invalid mail relay configuration")?;
      if let Some(token) = args.mail_token {
        transport = transport.with_token(token);
      }
      tracing::info!(endpoint = %transport.endpoint(), "mail_relay_configured");
      Arc::new(transport)
    }
    None => {
      tracing::warn!("no mail endpoint configured, emails will only be logged");
      Arc::new(LogTransport)
    }
  };

  let config = DispatcherConfig {
    tick_interval: Duration::from_secs(args.tick_secs),
    grace_window: Duration::from_secs(args.grace_secs),
    max_concurrency: args.max_concurrency,
    max_attempts: args.max_attempts,
  };

  let executor = ActionExecutor::new(transport);
  if config.grace_window < executor.send_timeout() * 2 {
    bail!(
      "--grace-secs must be at least twice the send timeout of {}s",
      executor.send_timeout().as_secs()
    );
  }

  let store = open_store(database_url).await?;
  let dyn_store: Arc<dyn Store> = store.clone();
  let dispatcher = Dispatcher::new(dyn_store, executor, config);

  let cancel = CancellationToken::new();
  let shutdown = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::info!("shutdown_requested");
      shutdown.cancel();
    }
  });

  dispatcher.start(cancel).await;
  store.close().await;
  Ok(ExitCode::SUCCESS)
}
