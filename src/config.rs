use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, num::NonZeroU32, path::PathBuf, str::FromStr};

use crate::models::file::DEFAULT_CHUNK_SIZE;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub chunk_size: NonZeroU32,
    /// Keep everything in process memory instead of SQLite.
    pub in_memory: bool,
}

/// What the process should do once configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    /// Apply the schema and exit.
    Migrate,
    /// Store one local file, print its id and exit.
    Ingest {
        path: PathBuf,
        content_type: Option<String>,
    },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked video store with streaming delivery")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides VIDEO_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Chunk size in bytes for new uploads (overrides VIDEO_STORE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<NonZeroU32>,

    /// Keep all data in memory; nothing survives a restart
    #[arg(long)]
    pub in_memory: bool,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "ingest")]
    pub migrate: bool,

    /// Store a local file, print its id and exit
    #[arg(long, value_name = "PATH")]
    pub ingest: Option<PathBuf>,

    /// Content type recorded for --ingest
    #[arg(long, requires = "ingest")]
    pub content_type: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        // Parse CLI once
        let args = Args::parse();
        Self::merge(args, |key| env::var(key))
    }

    /// Merge parsed arguments over values from `lookup`, then defaults.
    pub fn merge(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<(Self, RunMode)> {
        // --- Environment fallback ---
        let env_host = lookup("VIDEO_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env(&lookup, "VIDEO_STORE_PORT", 5002u16)?;
        let env_db = lookup("VIDEO_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/video_store.db".into());
        let env_max_connections = parse_env(&lookup, "VIDEO_STORE_MAX_CONNECTIONS", 5u32)?;
        let default_chunk = NonZeroU32::new(DEFAULT_CHUNK_SIZE).context("default chunk size")?;
        let env_chunk = parse_env(&lookup, "VIDEO_STORE_CHUNK_SIZE", default_chunk)?;

        if env_max_connections == 0 {
            bail!("VIDEO_STORE_MAX_CONNECTIONS must be at least 1");
        }

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            max_connections: env_max_connections,
            chunk_size: args.chunk_size.unwrap_or(env_chunk),
            in_memory: args.in_memory,
        };

        let mode = match (args.migrate, args.ingest) {
            (true, _) => RunMode::Migrate,
            (false, Some(path)) => RunMode::Ingest {
                path,
                content_type: args.content_type,
            },
            (false, None) => RunMode::Serve,
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(
    lookup: &impl Fn(&str) -> Result<String, env::VarError>,
    key: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
