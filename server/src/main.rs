//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use clap::Parser;
use presence_server::aggregator::PresenceAggregator;
use presence_server::badges::BadgeResolver;
use presence_server::catalog::CatalogHandle;
use presence_server::config::{Arguments, Configuration};
use presence_server::dispatcher::{Dispatcher, EventRouter};
use presence_server::health::HealthMonitor;
use presence_server::http::{ApiContext, create_router};
use presence_server::intake::EventIntake;
use presence_server::presence::PresenceStateMachine;
use presence_server::service::QueryService;
use presence_server::store::{MemoryPlayerStore, PlayerStore, PostgresPlayerStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load arguments from the command line
    let arguments: Arguments = Parser::parse();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(true)
        .init();

    // Load environment variables from .env file if specified
    if let Some(ref env_file) = arguments.env_file {
        if std::path::Path::new(env_file).exists() {
            tracing::debug!("Loading environment variables from file: {}", env_file);
            dotenv::from_filename(env_file).ok();
        }
    } else {
        tracing::debug!("Loading environment variables from default file");
        dotenv::dotenv().ok();
    }

    // Load configuration from a file with environment variable substitution
    let config: Configuration =
        Configuration::load(&arguments.config_file).expect("Unable to load configuration file");

    tracing::debug!("Configuration loaded: {:?}", config);
    tracing::info!("Starting Presence Server...");

    // Select the player store
    let database_url: &str = &config.database.url;
    let postgres = if database_url.trim().is_empty() {
        None
    } else {
        tracing::info!("Connecting to Database");
        let postgres =
            PostgresPlayerStore::connect(database_url, config.database.max_connections)
                .await
                .expect("Failed to connect to database");
        Some(Arc::new(postgres))
    };
    let store: Arc<dyn PlayerStore> = match &postgres {
        Some(postgres) => postgres.clone(),
        None => {
            tracing::warn!("No database configured, using the in-memory store");
            Arc::new(MemoryPlayerStore::new())
        }
    };

    // Load the badge catalog
    let catalog =
        CatalogHandle::open(config.badges.path()).expect("Unable to load badge catalog");

    // Assemble the engine
    let presence = PresenceStateMachine::new(store.clone());
    let badges = BadgeResolver::new(store.clone(), catalog.clone());
    let aggregator = PresenceAggregator::new(store.clone(), config.query.count_cache_ttl());
    let service = QueryService::new(store.clone(), badges.clone(), aggregator, &config.query);
    let health = HealthMonitor::new(store.clone());
    let dispatcher = Dispatcher::start(EventRouter::new(presence, badges), &config.dispatcher);

    let shutdown = CancellationToken::new();

    // Periodic store health checks
    let health_task = tokio::spawn(health.clone().run(
        Duration::from_secs(config.health.interval_secs.max(1)),
        shutdown.clone(),
    ));

    // Event intake
    let intake_addr: SocketAddr = config.intake.addr.to_addr();
    let intake = EventIntake::bind(intake_addr, dispatcher.handle(), shutdown.clone()).await?;
    let intake_task = tokio::spawn(intake.run());

    // Query API
    let api_addr: SocketAddr = config.api.addr.to_addr();
    tracing::info!("Binding query API to {}", api_addr);
    let listener = TcpListener::bind(api_addr).await?;
    tracing::info!("Query API listening on {}", api_addr);
    let app = create_router(ApiContext::new(service, health));
    let api_shutdown = shutdown.clone();
    let api_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
            .await
    });

    wait_for_signals(&shutdown, &catalog).await;
    tracing::info!("Initiating graceful shutdown...");

    // Producers first so the dispatcher queues can close
    if let Err(e) = intake_task.await {
        tracing::error!("Event intake task failed: {}", e);
    }
    dispatcher.shutdown().await;

    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Query API failed: {}", e),
        Err(e) => tracing::error!("Query API task failed: {}", e),
    }
    if let Err(e) = health_task.await {
        tracing::error!("Health monitor task failed: {}", e);
    }

    if let Some(postgres) = postgres {
        tracing::info!("Closing database pool");
        postgres.close().await;
    }

    tracing::info!("Presence Server stopped");
    Ok(())
}

/// Block until Ctrl-C or SIGTERM, reloading the badge catalog on SIGHUP
async fn wait_for_signals(shutdown: &CancellationToken, catalog: &CatalogHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut hangup = signal(SignalKind::hangup()).expect("Failed to install SIGHUP handler");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C signal");
                    break;
                }
                _ = terminate.recv() => {
                    tracing::info!("Received SIGTERM signal");
                    break;
                }
                _ = hangup.recv() => {
                    tracing::info!("Received SIGHUP, reloading badge catalog");
                    if let Err(e) = catalog.reload() {
                        tracing::error!("Badge catalog reload failed, keeping current catalog: {}", e);
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = catalog;
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        tracing::info!("Received Ctrl+C signal");
    }

    shutdown.cancel();
}
