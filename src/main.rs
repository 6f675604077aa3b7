//! usergate - user service with signed session cookies

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usergate::{
    config::Args,
    db::MongoClient,
    server::{self, AppState},
    store::{MemoryUserStore, MongoUserStore, UserStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("usergate={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  usergate");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} (db '{}')", args.mongodb_uri, args.mongodb_db);
    info!("Login timeout: {}ms", args.request_timeout_ms);
    info!("Secure cookies: {}", args.cookie_secure);
    info!("======================================");

    let key = args.secret_key()?;
    if args.session_secret.is_none() {
        warn!("No SESSION_SECRET set (dev mode) - using a random key, sessions end on restart");
    }

    // MongoDB is required in production; dev mode falls back to memory
    let (users, store_kind): (Arc<dyn UserStore>, &'static str) =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                (Arc::new(MongoUserStore::new(&client).await?), "mongodb")
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, using in-memory users): {}", e);
                    (Arc::new(MemoryUserStore::new()), "memory")
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    let state = Arc::new(AppState::new(args, users, key, store_kind));
    server::run(state).await?;

    Ok(())
}
