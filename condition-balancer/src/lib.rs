pub mod api;
pub mod balancer;
pub mod config;
pub mod endpoint;
pub mod identity;
pub mod metrics_consts;
pub mod router;
pub mod selection;
pub mod server;
pub mod sessions;
pub mod store;

// Shared with the integration tests in tests/, so not cfg(test)
pub mod test_utils;
