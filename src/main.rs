use anyhow::{Context as _, Result};
use boardd::{
    board::store::TaskStore,
    board::{Category, Priority, Status, TaskDraft},
    client::BoardClient,
    config::{BoardConfig, ConfigWatcher, HotConfig},
    ipc::{self, event::EventBroadcaster},
    protocol::{ClientEvent, ServerEvent},
    storage::Storage,
    uploads::{self, LocalAttachmentStore},
    AppContext,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "boardd",
    about = "boardd — realtime collaborative task board daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// WebSocket server port
    #[arg(long, env = "BOARDD_PORT")]
    port: Option<u16>,

    /// Data directory for config, uploads, and the SQLite database
    #[arg(long, env = "BOARDD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BOARDD_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "BOARDD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "BOARDD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the board server (default when no subcommand given).
    ///
    /// Runs boardd in the foreground.
    ///
    /// Examples:
    ///   boardd serve
    ///   boardd
    Serve,
    /// Print the server's health document.
    ///
    /// Examples:
    ///   boardd status
    Status,
    /// Connect, wait for the snapshot, and print every task as JSON.
    ///
    /// Examples:
    ///   boardd snapshot
    Snapshot,
    /// Create a task and print the committed record.
    ///
    /// Examples:
    ///   boardd create "Write spec" --priority High
    Create {
        /// Task title (must not be empty)
        title: String,
        /// Low | Medium | High
        #[arg(long, default_value = "Medium")]
        priority: String,
        /// Bug | Feature | Enhancement
        #[arg(long, default_value = "Feature")]
        category: String,
    },
    /// Upload an attachment and print its fileUrl.
    ///
    /// The size ceiling is checked locally before any bytes are sent.
    ///
    /// Examples:
    ///   boardd upload ./design.png
    Upload {
        /// File to upload
        file: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = BoardConfig::new(args.port, args.data_dir, args.log, args.bind_address);
    let _log_guard = init_tracing(&config, args.log_file.as_deref());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Status => status(&config).await,
        Command::Snapshot => snapshot(&config).await,
        Command::Create {
            title,
            priority,
            category,
        } => create(&config, title, priority, category).await,
        Command::Upload { file } => upload(&config, &file).await,
    }
}

async fn serve(config: BoardConfig) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting boardd");

    // The process must not run without its persistence engine.
    let storage = Arc::new(
        Storage::new_with_slow_query(&config.data_dir, config.slow_query_threshold_ms)
            .await
            .context("failed to open task storage — refusing to start")?,
    );

    let hot = HotConfig::from_config(&config);
    // Keep the watcher alive for the lifetime of the server; hot-reload is
    // optional and the server runs fine without it.
    let watcher = ConfigWatcher::start(&config.data_dir, hot.clone());
    let hot = watcher
        .as_ref()
        .map(|w| w.hot.clone())
        .unwrap_or_else(|| Arc::new(tokio::sync::RwLock::new(hot)));

    let ctx = Arc::new(AppContext {
        attachments: Arc::new(LocalAttachmentStore::new(&config.data_dir)),
        tasks: Arc::new(TaskStore::new(storage)),
        broadcaster: Arc::new(EventBroadcaster::new()),
        hot,
        started_at: std::time::Instant::now(),
        config: Arc::new(config),
    });

    ipc::run(ctx).await
}

async fn status(config: &BoardConfig) -> Result<()> {
    let url = format!("http://127.0.0.1:{}/health", config.port);
    let body: serde_json::Value = reqwest::get(&url)
        .await
        .context("board server not reachable")?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn snapshot(config: &BoardConfig) -> Result<()> {
    let url = format!("ws://127.0.0.1:{}", config.port);
    let mut client = BoardClient::connect(&url).await?;
    client.wait_synced().await?;
    let tasks: Vec<_> = client.projection().tasks().into_iter().cloned().collect();
    println!("{}", serde_json::to_string_pretty(&tasks)?);
    Ok(())
}

async fn create(
    config: &BoardConfig,
    title: String,
    priority: String,
    category: String,
) -> Result<()> {
    let priority: Priority = priority.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let category: Category = category.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let url = format!("ws://127.0.0.1:{}", config.port);
    let mut client = BoardClient::connect(&url).await?;
    client.wait_synced().await?;

    let draft = TaskDraft {
        title: title.clone(),
        status: Status::Todo,
        priority,
        category,
        file_url: String::new(),
    };
    client.send(&ClientEvent::Create(draft)).await?;

    // The committed record comes back on the broadcast stream — the
    // originator is included in every fan-out.
    loop {
        match client.next_event().await? {
            Some(ServerEvent::Created(task)) if task.title == title.trim() => {
                println!("{}", serde_json::to_string_pretty(&task)?);
                return Ok(());
            }
            Some(_) => continue,
            None => anyhow::bail!("connection closed before the create was confirmed"),
        }
    }
}

async fn upload(config: &BoardConfig, file: &std::path::Path) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment.bin");
    let base_url = format!("http://127.0.0.1:{}", config.port);
    let file_url =
        uploads::upload_attachment(&base_url, name, bytes, config.max_upload_bytes).await?;
    println!("{file_url}");
    Ok(())
}

/// Initialise tracing from config: pretty or JSON output, optional
/// daily-rotated log file. Returns the appender guard that must be held for
/// the lifetime of the process.
fn init_tracing(
    config: &BoardConfig,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_level = config.log.clone();
    let use_json = config.log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "boardd.log".to_string());
        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }
        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(log_level)
            .init();
        None
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
        None
    }
}
