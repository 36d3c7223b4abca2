use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use upsync::utils::{format_file_size, media_type_for};
use upsync::{HttpRemote, NewItem, SyncConfig, SyncEngine};

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Upload files and keep the nested file list in sync")]
struct Args {
    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the maximum file size in bytes
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Files to upload
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    let mut config = SyncConfig::load_or_default(args.config.as_deref())
        .context("Can't load config")?;
    if let Some(limit) = args.max_file_size {
        config.max_file_size = limit;
    }

    let remote = Arc::new(HttpRemote::new(&config)?);
    let engine = SyncEngine::builder(config).remote(remote).build()?;

    if let Err(err) = engine.initialize().await {
        warn!(error = %err, "initial load failed, starting from an empty list");
    }

    let mut items = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Can't read {}", path.display()))?;
        let name = path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = media_type_for(&name);
        items.push(NewItem::new(name, media_type, Bytes::from(bytes)));
    }

    let report = engine.submit(items).await?;
    for rejection in &report.rejected {
        eprintln!("rejected {}: {}", rejection.name, rejection.error);
    }

    engine.wait_idle().await;
    if let Err(err) = engine.refresh_now().await {
        warn!(error = %err, "final refresh failed, showing local state");
    }

    let snapshot = engine.snapshot();
    for item in snapshot.items() {
        println!("{:<10} {:>10}  {}", item.status(), format_file_size(item.size), item.name);
    }
    println!("{} files, {}", snapshot.count(), format_file_size(snapshot.total_size()));

    engine.shutdown();
    Ok(())
}
