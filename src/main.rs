use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use serenity::http::Http;
use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use mentionbot::chatbot::{ChatbotConfig, ChatbotEngine, DiscordClient, Handler};
use mentionbot::config::Config;
use mentionbot::llm;
use mentionbot::trend::GoogleTrends;

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("mentionbot.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            return ExitCode::FAILURE;
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting mentionbot...");
    match config_path {
        Some(ref path) => info!("Loaded config from {}", path.display()),
        None => info!("Loaded config from environment"),
    }
    info!("Allowed servers: {:?}", config.allowed_servers);
    info!("Excluded users: {}", config.excluded_users.len());
    info!(
        "Trend augmentation: {} (on failure: {:?})",
        if config.enable_trend { "enabled" } else { "disabled" },
        config.trend_failure_policy
    );
    if config.allowed_servers.is_empty() {
        warn!("ALLOWED_SERVERS is empty; every guild will be refused");
    }

    match run(config).await {
        Ok(()) => {
            info!("Bot stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let llm = llm::Client::new(config.together_api_key.clone(), config.llm_base_url.clone())?;
    let trends = GoogleTrends::japan()?;
    let platform = DiscordClient::new(Arc::new(Http::new(&config.discord_token)));

    let engine = Arc::new(ChatbotEngine::new(
        ChatbotConfig::from_config(&config),
        Arc::new(platform),
        Arc::new(llm),
        Arc::new(trends),
    ));

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler::new(engine))
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping Discord client...");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting Discord gateway connection...");
    client.start().await?;
    Ok(())
}
