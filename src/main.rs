//! Questline - gamified challenge engine

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use questline::{
    ai::{CompletionClient, CompletionConfig, HttpCompletionClient},
    config::Args,
    db::MongoClient,
    server,
    services::{
        scheduler::spawn_generation_task, GeneratorService, StatusService, VerifierService,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("questline={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Questline - Challenge Engine");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Completion API: {}", args.completion_api_url);
    info!(
        "Completion credential: {}",
        if args.has_completion_credential() {
            "configured"
        } else {
            "MISSING (generation and avatar checks disabled)"
        }
    );
    info!("Scheduler: {}", if args.scheduler_enabled { "enabled" } else { "disabled" });
    info!("======================================");

    // Connect to MongoDB
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            client
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    // Completion API client, optional: without a credential the service
    // still serves verification of non-vision challenges and status reads
    let ai: Option<Arc<dyn CompletionClient>> = if args.has_completion_credential() {
        match HttpCompletionClient::new(CompletionConfig {
            api_url: args.completion_api_url.clone(),
            api_key: args.completion_api_key.clone().unwrap_or_default(),
            text_model: args.completion_text_model.clone(),
            vision_model: args.completion_vision_model.clone(),
            timeout_secs: args.completion_timeout_secs,
        }) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                error!("Completion client setup failed: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        warn!("No completion API key configured");
        None
    };

    let generator = Arc::new(GeneratorService::new(mongo.clone(), ai.clone()));
    let status = Arc::new(StatusService::new(
        mongo.clone(),
        args.reserved_verified_username.clone(),
    ));
    let verifier = Arc::new(VerifierService::new(
        mongo.clone(),
        ai.clone(),
        Arc::clone(&status),
    ));

    if args.scheduler_enabled {
        let _ = spawn_generation_task(Arc::clone(&generator));
        info!("Daily generation scheduler started");
    }

    let state = Arc::new(server::AppState::new(
        args, mongo, generator, verifier, status,
    ));

    server::run(state).await?;

    Ok(())
}
