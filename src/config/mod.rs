use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::uploads::DEFAULT_MAX_UPLOAD_BYTES;

const DEFAULT_PORT: u16 = 5000;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// WebSocket server port (default: 5000).
    port: Option<u16>,
    /// Bind address (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,boardd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured).
    log_format: Option<String>,
    /// Attachment size ceiling in bytes (default: 5 MiB).
    max_upload_bytes: Option<u64>,
    /// Log SQLite queries exceeding this threshold in milliseconds (0 = off; default: 100).
    slow_query_threshold_ms: Option<u64>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── BoardConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Bind address for the WebSocket server (BOARDD_BIND env var).
    pub bind_address: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Attachment size ceiling in bytes; also the startup value of the
    /// hot-reloadable copy.
    pub max_upload_bytes: u64,
    /// Slow-query log threshold in milliseconds (0 = disabled).
    pub slow_query_threshold_ms: u64,
}

impl BoardConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("BOARDD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let max_upload_bytes = toml.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let slow_query_threshold_ms = toml.slow_query_threshold_ms.unwrap_or(100);

        Self {
            port,
            data_dir,
            log,
            bind_address,
            log_format,
            max_upload_bytes,
            slow_query_threshold_ms,
        }
    }
}

// ─── Hot-reloadable config subset ─────────────────────────────────────────────

/// Non-critical config fields that can be changed without restarting.
#[derive(Debug, Clone)]
pub struct HotConfig {
    pub max_upload_bytes: u64,
}

impl HotConfig {
    pub fn from_config(config: &BoardConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Watches `config.toml` for changes and reloads non-critical fields.
///
/// The watcher uses the `notify` crate (kqueue on macOS, inotify on Linux)
/// to detect file modifications. Only the upload ceiling is reloaded; port,
/// bind address, and other startup-only fields require a full restart.
pub struct ConfigWatcher {
    pub hot: Arc<RwLock<HotConfig>>,
    // Hold the watcher alive; dropping it stops the file watch.
    _watcher: notify_debouncer_full::Debouncer<
        notify_debouncer_full::notify::RecommendedWatcher,
        notify_debouncer_full::FileIdMap,
    >,
}

impl ConfigWatcher {
    /// Start watching `{data_dir}/config.toml` for changes.
    ///
    /// Returns `None` if the watcher could not be created (non-fatal; the
    /// server runs fine without hot-reload).
    pub fn start(data_dir: &Path, initial: HotConfig) -> Option<Self> {
        let config_path = data_dir.join("config.toml");
        let default_ceiling = initial.max_upload_bytes;
        let hot = Arc::new(RwLock::new(initial));

        let hot_clone = hot.clone();
        let config_path_clone = config_path.clone();
        let rt_handle = tokio::runtime::Handle::current();

        let watcher = notify_debouncer_full::new_debouncer(
            std::time::Duration::from_secs(2),
            None,
            move |result: notify_debouncer_full::DebounceEventResult| {
                if let Ok(events) = result {
                    // Only act on modify/create events
                    let relevant = events.iter().any(|e| {
                        use notify_debouncer_full::notify::EventKind;
                        matches!(e.event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    });
                    if relevant {
                        let hot = hot_clone.clone();
                        let path = config_path_clone.clone();
                        rt_handle.spawn(async move {
                            let new_config = load_hot_config(&path, default_ceiling);
                            let mut guard = hot.write().await;
                            if guard.max_upload_bytes != new_config.max_upload_bytes {
                                info!(
                                    max_upload_bytes = new_config.max_upload_bytes,
                                    "config.toml reloaded"
                                );
                                *guard = new_config;
                            }
                        });
                    }
                }
            },
        );

        match watcher {
            Ok(mut debouncer) => {
                use notify_debouncer_full::notify::Watcher as _;
                // Watch the data_dir (parent of config.toml) since watching a
                // non-existent file fails on some platforms.
                let watch_path = config_path.parent().unwrap_or_else(|| Path::new("."));
                if let Err(e) = debouncer.watcher().watch(
                    watch_path,
                    notify_debouncer_full::notify::RecursiveMode::NonRecursive,
                ) {
                    warn!("config watcher failed to start: {e} — hot-reload disabled");
                    return None;
                }
                info!(path = %config_path.display(), "config hot-reload watcher started");
                Some(Self {
                    hot,
                    _watcher: debouncer,
                })
            }
            Err(e) => {
                warn!("config watcher creation failed: {e} — hot-reload disabled");
                None
            }
        }
    }
}

/// Load only the hot-reloadable fields from config.toml.
fn load_hot_config(path: &Path, default_ceiling: u64) -> HotConfig {
    let toml = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str::<TomlConfig>(&s).ok())
        .unwrap_or_default();
    HotConfig {
        max_upload_bytes: toml.max_upload_bytes.unwrap_or(default_ceiling),
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/boardd
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("boardd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/boardd or ~/.local/share/boardd
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("boardd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("boardd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\boardd
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("boardd");
        }
    }
    // Fallback
    PathBuf::from(".boardd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BoardConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.bind_address, "127.0.0.1");
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(cfg.log, "info");
    }

    #[test]
    fn cli_beats_toml_beats_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "port = 6000\nlog = \"debug\"\nmax_upload_bytes = 1024\n",
        )
        .unwrap();
        let cfg = BoardConfig::new(Some(7000), Some(dir.path().to_path_buf()), None, None);
        // CLI wins for port, TOML wins where the CLI was silent.
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.log, "debug");
        assert_eq!(cfg.max_upload_bytes, 1024);
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "port = \"not a number").unwrap();
        let cfg = BoardConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 5000);
    }

    #[test]
    fn hot_config_reload_picks_up_new_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_upload_bytes = 2048\n").unwrap();
        let hot = load_hot_config(&path, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(hot.max_upload_bytes, 2048);
        // Removing the key falls back to the startup value.
        std::fs::write(&path, "port = 5000\n").unwrap();
        let hot = load_hot_config(&path, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(hot.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }
}
