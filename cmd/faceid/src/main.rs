//! faceid - face enrollment and recognition service.

mod config;
mod server;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use faceid_recognizer::{CacheConfig, Enroller, MatcherCache};
use faceid_store::Embedding;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Face enrollment and recognition service.
#[derive(Parser, Debug)]
#[command(name = "faceid")]
#[command(version, about = "Face enrollment and recognition service")]
struct Cli {
    /// Config file (default: ~/.faceid/config.yaml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// redb database file (default: in-memory)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default)
    Serve(ServeArgs),

    /// List enrolled identities
    List,

    /// Enroll identities from a JSON file of {"name": [[f32, ...], ...]}
    Import {
        /// Input file
        file: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Listen address (e.g. :8080)
    #[arg(short, long)]
    listen: Option<String>,

    /// Match threshold
    #[arg(long)]
    threshold: Option<f32>,

    /// Required X-API-Key value
    #[arg(long)]
    api_key: Option<String>,

    /// Face extraction service URL
    #[arg(long)]
    extractor_url: Option<String>,

    /// Static files directory
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(data) = &cli.data {
        cfg.data_path = Some(data.clone());
    }

    match cli.command {
        None => serve(cfg, ServeArgs::default()).await,
        Some(Commands::Serve(args)) => serve(cfg, args).await,
        Some(Commands::List) => list(&cfg),
        Some(Commands::Import { file }) => import(&cfg, &file),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn serve(mut cfg: Config, args: ServeArgs) -> Result<()> {
    if let Some(listen) = args.listen {
        cfg.listen = listen;
    }
    if let Some(threshold) = args.threshold {
        cfg.threshold = threshold;
    }
    if let Some(key) = args.api_key {
        cfg.api_key = Some(key);
    }
    if let Some(url) = args.extractor_url {
        let mut ex = cfg.extractor.take().unwrap_or(config::ExtractorConfig {
            url: String::new(),
            api_key: None,
            timeout_secs: 10,
        });
        ex.url = url;
        cfg.extractor = Some(ex);
    }
    if args.static_dir.is_some() {
        cfg.static_dir = args.static_dir;
    }
    cfg.validate()?;

    match &cfg.data_path {
        Some(path) => tracing::info!(path = %path.display(), "using persistent store"),
        None => tracing::warn!("no data path configured, enrollments are kept in memory only"),
    }
    if cfg.api_key.is_none() {
        tracing::warn!("no API key configured, the API is open");
    }

    let state = server::AppState::from_config(&cfg)?;
    let static_dir = cfg.static_dir.clone();
    server::serve(&cfg.listen, state, static_dir).await
}

fn list(cfg: &Config) -> Result<()> {
    let store = cfg.open_store()?;
    let all = store.list()?;
    if all.is_empty() {
        println!("No identities enrolled.");
        return Ok(());
    }
    println!("{:<24} {:<24} {:>10}  ENROLLED", "KEY", "NAME", "EMBEDDINGS");
    for id in &all {
        println!(
            "{:<24} {:<24} {:>10}  {}",
            id.key,
            id.display_name,
            id.embeddings.len(),
            id.enrolled_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    let dim = all[0].dimension();
    println!("\n{} identities, dimension {dim}", all.len());
    Ok(())
}

fn import(cfg: &Config, file: &std::path::Path) -> Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("read {}", file.display()))?;
    let people: BTreeMap<String, Vec<Embedding>> = serde_json::from_str(&data)
        .with_context(|| format!("parse {}", file.display()))?;

    let store = Arc::new(cfg.open_store()?);
    let enroller = Enroller::new(Arc::new(MatcherCache::new(store, CacheConfig::default())));

    let mut failed = 0;
    for (name, embeddings) in people {
        match enroller.enroll(&name, embeddings) {
            Ok(out) => println!("{}", out.message),
            Err(e) => {
                failed += 1;
                eprintln!("{name}: {e}");
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} identities failed to import");
    }
    Ok(())
}
