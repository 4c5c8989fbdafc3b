pub mod commands;
pub mod conversation;
pub mod inference;

use anyhow::Context;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use commands::AppState;
use inference::{LogFormat, ModelRegistry, OllamaClient, RelayConfig, RelayInvoker};

/// Initialize the tracing subscriber.
///
/// Logs go to stderr unless `log_file` is configured, in which case:
/// 1. Existing logs are rotated (relay.log → relay.log.1 → .2 → .3, keeps last 3).
/// 2. A fresh file is opened with a line-flushing writer.
///
/// The filter comes from `RUST_LOG`, defaulting to `chat_relay=info,warn`.
pub fn init_tracing(config: &RelayConfig) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let (writer, ansi) = match &config.log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            }
            rotate_log_file(path, 3);

            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            (BoxMakeWriter::new(FlushingWriter::new(log_file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chat_relay=info,warn"));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_ids(false);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_address,
        inference_server = %config.base_url,
        default_model = ?config.default_model,
        log_file = ?config.log_file,
        pid = std::process::id(),
        "=== chat-relay starting ==="
    );
    Ok(())
}

/// Rotate log files: `relay.log` → `relay.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &std::path::Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// `tracing-subscriber` hands each formatted event to the writer, but the
/// bytes may still sit in OS buffers when the relay is killed. Flushing
/// per write puts every line on disk immediately, which matters most for
/// the last lines before a crash or a hung upstream call.
///
/// The relay logs a handful of lines per chat turn, so the extra syscall is
/// not noticeable.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Build the shared state from configuration.
pub fn build_state(config: &RelayConfig) -> anyhow::Result<AppState> {
    let client = OllamaClient::from_config(config).context("failed to build inference client")?;
    let registry = ModelRegistry::new(client.clone(), config.default_model.clone());
    let invoker = RelayInvoker::new(client);
    Ok(AppState::new(registry, invoker, config.system_prompt.clone())
        .with_idle_timeout(config.session_idle_timeout()))
}

/// Serve the chat front end until the process is stopped.
pub async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    let app = commands::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    tracing::info!(addr = %config.bind_address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
