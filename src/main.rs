// src/main.rs

use std::{net::SocketAddr, sync::Arc, time::Duration};

use aptitude::{
    config::Config,
    models::user::{NewUser, ROLE_ADMIN},
    routes,
    state::AppState,
    store::{PgStore, UserStore},
    utils::hash::hash_password,
};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    let store = Arc::new(PgStore::new(pool));

    // Seed Admin User
    if let Err(e) = seed_admin_user(store.as_ref(), &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let state = AppState::new(store, config.clone());

    // Evict idle sessions in the background
    let _sweeper = state.sessions.spawn_sweeper(Duration::from_secs(60));

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}

async fn seed_admin_user(
    store: &dyn UserStore,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        if store.user_by_username(username).await?.is_none() {
            tracing::info!("Seeding admin user: {}", username);
            let password_hash = hash_password(password)?;

            store
                .create_user(NewUser {
                    username: username.clone(),
                    password_hash,
                    name: None,
                    role: ROLE_ADMIN.to_string(),
                })
                .await?;
            tracing::info!("Admin user created successfully.");
        }
    }
    Ok(())
}
