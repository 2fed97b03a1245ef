use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use health::{ComponentStatus, HealthHandle, HealthRegistry};
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::balancer::ConditionBalancer;
use crate::config::{Config, CounterBackend, StorageBackend};
use crate::identity::{IdentityProvider, MemoryIdentityProvider, PgIdentityProvider};
use crate::router;
use crate::sessions::{MemorySessionSink, PgSessionSink, SessionSink};
use crate::store::postgres::get_pool;
use crate::store::{CounterStore, MemoryCounterStore, PgCounterStore, RedisCounterStore};

const LIVENESS_INTERVAL: Duration = Duration::from_secs(10);

/// The storage a server runs on, chosen by config or handed in by tests.
#[derive(Clone)]
pub struct Backends {
    pub counters: Arc<dyn CounterStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sessions: Arc<dyn SessionSink>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            counters: Arc::new(MemoryCounterStore::new()),
            identity: Arc::new(MemoryIdentityProvider::new()),
            sessions: Arc::new(MemorySessionSink::new()),
        }
    }
}

pub async fn build_backends(config: &Config) -> anyhow::Result<Backends> {
    let pool: Option<PgPool> = if config.needs_postgres() {
        let pool = get_pool(
            &config.database_url,
            config.max_pg_connections,
            Duration::from_secs(config.acquire_timeout_secs),
        )?;
        if *config.run_migrations {
            sqlx::migrate!("../migrations").run(&pool).await?;
        }
        Some(pool)
    } else {
        None
    };

    let counters: Arc<dyn CounterStore> = match (config.counter_backend, &pool) {
        (CounterBackend::Postgres, Some(pool)) => Arc::new(PgCounterStore::new(pool.clone())),
        (CounterBackend::Redis, _) => Arc::new(
            RedisCounterStore::new(config.redis_url.clone(), config.store_timeout()).await?,
        ),
        _ => Arc::new(MemoryCounterStore::new()),
    };

    let (identity, sessions): (Arc<dyn IdentityProvider>, Arc<dyn SessionSink>) =
        match (config.storage_backend, &pool) {
            (StorageBackend::Postgres, Some(pool)) => (
                Arc::new(PgIdentityProvider::new(pool.clone())),
                Arc::new(PgSessionSink::new(pool.clone())),
            ),
            _ => (
                Arc::new(MemoryIdentityProvider::new()),
                Arc::new(MemorySessionSink::new()),
            ),
        };

    Ok(Backends {
        counters,
        identity,
        sessions,
    })
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let backends = match build_backends(&config).await {
        Ok(backends) => backends,
        Err(e) => {
            tracing::error!("Failed to set up storage backends: {}", e);
            return;
        }
    };

    serve_with_backends(config, backends, listener, shutdown).await
}

pub async fn serve_with_backends<F>(
    config: Config,
    backends: Backends,
    listener: TcpListener,
    shutdown: F,
) where
    F: Future<Output = ()> + Send + 'static,
{
    let balancer = Arc::new(ConditionBalancer::new(
        backends.counters,
        config.experiment_id.clone(),
        config.tie_break,
        config.store_timeout(),
    ));

    // Never resets existing counts, safe on every start
    if let Err(e) = balancer.seed().await {
        tracing::error!("Failed to seed condition counters: {}", e);
        return;
    }

    let health = HealthRegistry::new("liveness");
    let counter_store = health.register("counter_store", LIVENESS_INTERVAL * 3);
    tokio::spawn(liveness_loop(counter_store, balancer.clone()));

    let app = router::router(
        balancer,
        backends.identity,
        backends.sessions,
        health,
        config,
    );

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {:?}", addr),
        Err(e) => tracing::warn!("listening on an unknown address: {}", e),
    }

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("server error: {}", e);
    }
}

async fn liveness_loop(handle: HealthHandle, balancer: Arc<ConditionBalancer>) {
    loop {
        match balancer.ping().await {
            Ok(()) => handle.report_healthy(),
            Err(e) => {
                tracing::warn!("counter store ping failed: {}", e);
                handle.report_status(ComponentStatus::Unhealthy);
            }
        }
        tokio::time::sleep(LIVENESS_INTERVAL).await;
    }
}
