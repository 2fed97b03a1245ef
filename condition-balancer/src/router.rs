use std::future::ready;
use std::sync::Arc;

use axum::{
    extract,
    http::{Method, StatusCode},
    routing::{get, post},
    Router,
};
use common_metrics::setup_metrics_routes;
use health::HealthRegistry;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    balancer::ConditionBalancer, config::Config, endpoint, identity::IdentityProvider,
    sessions::SessionSink,
};

#[derive(Clone)]
pub struct State {
    pub balancer: Arc<ConditionBalancer>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sessions: Arc<dyn SessionSink>,
    pub config: Config,
}

pub fn router(
    balancer: Arc<ConditionBalancer>,
    identity: Arc<dyn IdentityProvider>,
    sessions: Arc<dyn SessionSink>,
    liveness: HealthRegistry,
    config: Config,
) -> Router {
    let state = State {
        balancer,
        identity,
        sessions,
        config: config.clone(),
    };

    // Participants come from arbitrary origins, so mirror whatever they send
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    let status_router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(readiness))
        .route("/_liveness", get(move || ready(liveness.get_status())));

    let experiment_router = Router::new()
        .route("/assign-condition", post(endpoint::assign_condition))
        .route("/auth/anonymous", post(endpoint::sign_in_anonymously))
        .route("/sessions", post(endpoint::write_session))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrency));

    let router = Router::new()
        .merge(status_router)
        .merge(experiment_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // The prometheus recorder is process global, keep it out of tests
    if *config.enable_metrics {
        setup_metrics_routes(router)
    } else {
        router
    }
}

/// Ready once both the counter store and the session store answer.
pub async fn readiness(
    extract::State(state): extract::State<State>,
) -> Result<&'static str, (StatusCode, String)> {
    state.balancer.ping().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("counter store unavailable: {e}"),
        )
    })?;
    state.sessions.ping().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("session store unavailable: {e}"),
        )
    })?;

    Ok("ready")
}

pub async fn index() -> &'static str {
    "condition balancer"
}
