use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use realtime_voice_proxy::{ServerConfig, routes, state::AppState};

/// Realtime voice proxy - relays browser WebSockets to a realtime speech API
/// and logs per-turn latency.
#[derive(Parser, Debug)]
#[command(name = "realtime-voice-proxy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Needed before any outbound wss:// connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig::from_env()?
    };

    let address = config.address();
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    let app_state = AppState::new(config)?;
    print_banner(&app_state);

    let app = routes::create_app_router(app_state);

    println!("Server listening on http://{}", socket_addr);
    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner(state: &AppState) {
    let config = &state.config;
    let upstream = config
        .upstream_endpoint()
        .unwrap_or_else(|e| format!("<{e}>"));

    println!("{}", "=".repeat(60));
    println!("Realtime voice proxy");
    println!("{}", "=".repeat(60));
    println!(
        "Resource:      {}",
        config.azure_resource.as_deref().unwrap_or("<unset>")
    );
    println!("Deployment:    {}", config.deployment_name);
    println!("Upstream:      {}", upstream);
    println!(
        "API key:       {}",
        if config.has_api_key() { "set" } else { "NOT SET" }
    );
    println!("Latency log:   {}", state.latency_log.path().display());
    println!("Port:          {}", config.port);
    println!("{}", "=".repeat(60));
    println!("Endpoints:");
    println!("  GET /health");
    println!("  GET /ws/realtime");
    println!("  GET /api/latency-stats");
    println!("  GET /api/sessions");
    println!("{}", "=".repeat(60));
}
