use anyhow::{Context, Result};
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::{fs::File, net::TcpListener};
use tokio_util::{io::ReaderStream, sync::CancellationToken};
use tracing_subscriber::EnvFilter;
use video_store::{
    config::{AppConfig, RunMode},
    models::file::DEFAULT_CONTENT_TYPE,
    services::{
        chunk_store::ChunkStore, memory_store::MemoryChunkStore, sqlite_store::SqliteChunkStore,
        uploader::NewUpload,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting video-store with config: {:?}", cfg);

    // --- Initialize the chunk store; schema is ready before anything else runs ---
    let store: Arc<dyn ChunkStore> = if cfg.in_memory {
        tracing::warn!("Running with an in-memory store; data is lost on exit");
        Arc::new(MemoryChunkStore::new())
    } else {
        let sqlite = open_sqlite(&cfg).await?;
        sqlite.migrate().await?;
        if mode == RunMode::Migrate {
            tracing::info!("Database migration complete.");
            return Ok(()); // exit after migration
        }
        Arc::new(sqlite)
    };

    let state = AppState::new(store, cfg.chunk_size);

    match mode {
        RunMode::Migrate => {
            tracing::info!("Nothing to migrate for the in-memory store.");
            Ok(())
        }
        RunMode::Ingest { path, content_type } => ingest(&state, &path, content_type).await,
        RunMode::Serve => serve(&cfg, state).await,
    }
}

async fn open_sqlite(cfg: &AppConfig) -> Result<SqliteChunkStore> {
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");

    // Create parent directory if needed
    if !db_path.starts_with(":memory:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    SqliteChunkStore::connect(db_url, cfg.max_connections)
        .await
        .with_context(|| format!("opening database {}", db_url))
}

/// Store a local file and print its id.
async fn ingest(state: &AppState, path: &Path, content_type: Option<String>) -> Result<()> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let record = state
        .uploader
        .upload_stream(
            NewUpload {
                filename,
                content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into()),
            },
            ReaderStream::new(file),
        )
        .await?;

    tracing::info!(id = %record.id, length = ?record.length, "ingested {}", path.display());
    println!("{}", record.id);
    Ok(())
}

async fn serve(cfg: &AppConfig, state: AppState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = video_store::app(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C (or SIGTERM on unix), cancelling in-flight streams so
/// the graceful shutdown can drain.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown requested; cancelling open streams");
    shutdown.cancel();
}
