//! # Rusty-Market Binary
//!
//! Assembles the services from configuration, seeds the store, starts the
//! background timers and hands stdin to the console.

mod console;
mod seed;

use std::sync::Arc;

use anyhow::Context;
use rm_auth_argon2::{Argon2Provider, HashCost};
use rm_config::{LogFormat, MarketConfig};
use rm_core::clock::SystemClock;
use rm_core::traits::KeyValueStore;
use rm_services::{sale_sweeper, ListingFeed, Market, MarketSettings, Ports};
use rm_store_memory::MemoryStore;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "session-local")]
use rm_session_local::LocalKv;

#[cfg(not(feature = "session-local"))]
use rm_store_memory::MemoryKv;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, dotenv) = rm_config::load().context("loading configuration")?;
    init_tracing(config.log_format);
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(
        Argon2Provider::new(
            HashCost {
                memory_kib: config.argon2_memory_kib,
                iterations: config.argon2_iterations,
                ..HashCost::default()
            },
            config.password_pepper.clone(),
        )
        .context("configuring password hashing")?,
    );

    let ports = Ports {
        users: store.clone(),
        products: store.clone(),
        reports: store.clone(),
        chat: store.clone(),
        client_storage: client_storage(&config),
        auth: auth.clone(),
        clock: Arc::new(SystemClock),
    };
    let market = Market::new(ports, settings(&config));

    if let Some(path) = &config.fixtures_path {
        let summary = seed::load(path, config.starting_balance, &*store, &*auth, &market).await?;
        tracing::info!(
            path = %path.display(),
            users = summary.users,
            listings = summary.listings,
            posts = summary.posts,
            "fixtures loaded"
        );
    }

    match market.session.restore_session().await {
        Some(user) => tracing::info!(username = %user.username, "resumed previous session"),
        None => tracing::debug!("no session to resume"),
    }

    let sweeper = sale_sweeper(market.marketplace.clone(), config.sweep_interval());
    let feed = ListingFeed::new(market.marketplace.clone());
    let refresher = feed.spawn_refresh(config.listing_refresh());

    tracing::info!(
        users = store.user_count(),
        products = store.product_count(),
        "rusty-market ready"
    );
    let result = console::run(&market, &feed).await;

    sweeper.cancel();
    refresher.cancel();
    tracing::info!("rusty-market stopped");
    result
}

fn settings(config: &MarketConfig) -> MarketSettings {
    MarketSettings {
        starting_balance: config.starting_balance,
        session_ttl: chrono::Duration::days(i64::from(config.session_ttl_days)),
        sale_retention: chrono::Duration::hours(i64::from(config.sale_retention_hours)),
    }
}

#[cfg(feature = "session-local")]
fn client_storage(config: &MarketConfig) -> Arc<dyn KeyValueStore> {
    tracing::debug!(dir = %config.session_dir.display(), "client session storage on disk");
    Arc::new(LocalKv::new(config.session_dir.clone()))
}

#[cfg(not(feature = "session-local"))]
fn client_storage(_config: &MarketConfig) -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryKv::new())
}

/// Logs go to stderr so they never interleave with console output.
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
}
