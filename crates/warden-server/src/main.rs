use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_events::{EventManager, EventPublisher, EventRouter, EventSink, RabbitMqProvider};
use warden_server::config::{AppConfig, QueueConfig};
use warden_server::events::register_handlers;
use warden_server::rest::{self, AppState};
use warden_server::service::{AccessService, GroupService, RoleService, TenantService};
use warden_storage::{
    GroupRepository, PermissionRepository, PostgresAuditStore, ResourceRepository,
    RoleRepository, TenantRepository, migrations,
};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().json().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = AppConfig::from_env()?;
    info!(port = config.port, "starting warden server");

    let pool = warden_storage::connect(&config.database).await?;

    if config.run_migrations {
        info!("running database migrations");
        migrations::run(&pool).await?;
    } else {
        info!("skipping database migrations (RUN_MIGRATIONS not set to 'true')");
    }

    let audit = Arc::new(PostgresAuditStore::new(pool.clone()));

    // The publisher is built before the application services so they can
    // hold its narrow sink; handlers get the full publisher when the
    // router is registered below.
    let (provider, publisher) = match &config.queue {
        QueueConfig::Disabled => (None, None),
        QueueConfig::RabbitMq(mq) => {
            let provider = Arc::new(RabbitMqProvider::new(
                &mq.url,
                mq.max_connections,
                mq.max_channels_per_conn,
            )?);
            let publisher: Arc<EventPublisher<RabbitMqProvider, PostgresAuditStore>> = Arc::new(
                EventManager::build_publisher(Arc::clone(&provider), Arc::clone(&audit)),
            );
            (Some(provider), Some(publisher))
        }
    };

    let sink: Option<Arc<dyn EventSink>> = publisher
        .clone()
        .map(|p| p as Arc<dyn EventSink>);

    let tenants = Arc::new(TenantService::new(TenantRepository::new(pool.clone())));
    let roles = Arc::new(RoleService::new(
        RoleRepository::new(pool.clone()),
        sink.clone(),
    ));
    let groups = Arc::new(GroupService::new(GroupRepository::new(pool.clone()), sink));
    let access = Arc::new(AccessService::new(
        PermissionRepository::new(pool.clone()),
        ResourceRepository::new(pool.clone()),
    ));

    let manager = match (&config.queue, provider, publisher) {
        (QueueConfig::RabbitMq(mq), Some(provider), Some(publisher)) => {
            let mut router = EventRouter::new();
            register_handlers(
                &mut router,
                Arc::clone(&roles),
                Arc::clone(&groups),
                publisher,
            );

            let manager = EventManager::new(
                provider,
                Arc::clone(&audit),
                Arc::new(router),
                mq.external_manager,
            );
            manager.start().await?;
            Some(manager)
        }
        _ => {
            info!("event system disabled (no queue provider configured)");
            None
        }
    };

    let state = AppState {
        tenants,
        roles,
        groups,
        access,
    };
    let router = rest::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(manager) = manager {
        info!("stopping event system");
        manager.stop().await?;
    }
    pool.close().await;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => { info!("received SIGINT"); }
        _ = sigterm.recv() => { info!("received SIGTERM"); }
    }
}
