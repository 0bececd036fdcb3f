//! tradehub-node: backend for the trade agreement hub
//!
//! Serves the record API by default. `test-webhook` exercises the automation
//! webhook with a sample agreement and `stats` prints snapshot counts.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use tradehub_node::api::{cors_layer, create_router, AppState};
use tradehub_node::store::Agreement;
use tradehub_node::{Config, InsightRelay, RecordStore};

#[derive(Parser)]
#[command(name = "tradehub-node")]
#[command(about = "Trade agreement records with ESG scoring and AI insight relay")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tradehub-node.toml")]
    config: String,

    /// Data directory
    #[arg(short, long, env = "TRADEHUB_DATA_DIR")]
    data_dir: Option<String>,

    /// HTTP port (overrides config file)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Automation webhook URL
    #[arg(long, env = "N8N_WEBHOOK_URL")]
    n8n_webhook_url: Option<String>,

    /// OpenAI API key, reported in AI status only
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Deployed agreement contract address
    #[arg(long, env = "CONTRACT_ADDRESS")]
    contract_address: Option<String>,

    /// Number of snapshot backups to keep
    #[arg(long, env = "BACKUP_RETENTION")]
    backup_retention: Option<usize>,

    /// Allowed CORS origin
    #[arg(long, env = "CORS_ORIGIN")]
    cors_origin: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Check the webhook and run a sample agreement through every analysis
    TestWebhook,
    /// Print snapshot statistics and exit
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tradehub_node=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load or create default config
    let mut config = if Path::new(&cli.config).exists() {
        info!("Config file: {}", cli.config);
        Config::load(Path::new(&cli.config))?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.database.data_dir = PathBuf::from(data_dir);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = cli.n8n_webhook_url {
        config.ai.n8n_webhook_url = Some(url);
    }
    if let Some(key) = cli.openai_api_key {
        config.ai.openai_api_key = Some(key);
    }
    if let Some(address) = cli.contract_address {
        config.blockchain.contract_address = Some(address);
    }
    if let Some(retention) = cli.backup_retention {
        config.database.backup_retention = retention;
    }
    if let Some(origin) = cli.cors_origin {
        config.security.cors_origin = origin;
    }

    for warning in config.warnings() {
        warn!("{}", warning);
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::TestWebhook => test_webhook(&config).await,
        Command::Stats => stats(&config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("Starting tradehub-node");
    info!("Data dir: {}", config.database.data_dir.display());

    let store = RecordStore::open(&config.database).await?;
    let relay = InsightRelay::new(&config.ai);
    let state = AppState::new(store, relay);

    let app = create_router(state, cors_layer(&config.security.cors_origin));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn test_webhook(config: &Config) -> anyhow::Result<()> {
    let relay = InsightRelay::new(&config.ai);

    println!("AI status:");
    println!("{}", serde_json::to_string_pretty(&relay.status())?);

    println!("\nConnection test:");
    println!("{}", serde_json::to_string_pretty(&relay.test_connection().await)?);

    let sample: Agreement = serde_json::from_value(json!({
        "id": format!("test-{}", Utc::now().timestamp_millis()),
        "importer": "0x1234567890123456789012345678901234567890",
        "exporter": "0x0987654321098765432109876543210987654321",
        "goodsDescription": "Test Electronics - Smartphones",
        "originCountry": "China",
        "destinationCountry": "India",
        "amount": "50000",
        "incoterms": "CIF",
        "status": "pending",
        "createdAt": Utc::now(),
    }))?;

    println!("\nAnalysis of sample agreement {}:", sample.id);
    let analysis = relay.process_agreement(&sample).await;
    println!("{}", serde_json::to_string_pretty(&analysis)?);

    Ok(())
}

async fn stats(config: &Config) -> anyhow::Result<()> {
    let store = RecordStore::open(&config.database).await?;
    println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
    Ok(())
}
