//! Magpie server - clone websites into standalone HTML documents
//!
//! Serves the embedded frontend, the clone endpoint, and preview lookups.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use magpie_core::{ChromeConfig, CloneConfig, CloneService, PreviewStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;

#[derive(Parser)]
#[command(name = "magpie")]
#[command(author, version, about = "Clone a website into a standalone HTML document", long_about = None)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Explicit Chrome/Chromium binary path (discovered from the system
    /// when omitted)
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Maximum concurrently open browser contexts
    #[arg(long, default_value_t = 4)]
    max_contexts: usize,

    /// Run the browser with a visible window (debugging aid)
    #[arg(long)]
    no_headless: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "debug"
    } else {
        "magpie_core=info,magpie_server=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let api_key = std::env::var("GEMINI_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty());

    let chrome = ChromeConfig {
        chrome_path: cli.chrome_path,
        max_contexts: cli.max_contexts,
        headless: !cli.no_headless,
    };
    let service = CloneService::new(
        CloneConfig::default(),
        chrome,
        api_key,
        PreviewStore::new(),
    )?;
    if !service.has_reconstructor() {
        tracing::warn!(
            "GEMINI_API_KEY is not set; the reconstruction path (is_small = true) is disabled"
        );
    }
    let app = api::router(Arc::new(service));

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
