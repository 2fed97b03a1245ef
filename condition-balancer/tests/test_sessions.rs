use std::sync::Arc;

use anyhow::Result;
use assert_json_diff::assert_json_include;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::common::*;

use condition_balancer::config::Config;
use condition_balancer::identity::MemoryIdentityProvider;
use condition_balancer::server::Backends;
use condition_balancer::sessions::MemorySessionSink;
use condition_balancer::store::MemoryCounterStore;
use condition_balancer::test_utils::sample_session_record;

pub mod common;

fn backends_with(sessions: MemorySessionSink) -> Backends {
    Backends {
        counters: Arc::new(MemoryCounterStore::new()),
        identity: Arc::new(MemoryIdentityProvider::new()),
        sessions: Arc::new(sessions),
    }
}

#[tokio::test]
async fn it_issues_distinct_anonymous_identities() -> Result<()> {
    let server = ServerHandle::for_config(Config::default_test_config()).await;

    let first = server.sign_in().await;
    let second = server.sign_in().await;

    assert_ne!(first.participant_id, second.participant_id);
    assert_ne!(first.token, second.token);

    Ok(())
}

#[tokio::test]
async fn it_records_a_session_for_the_caller() -> Result<()> {
    let sessions = MemorySessionSink::new();
    let config = Config::default_test_config();
    let server = ServerHandle::for_backends(config.clone(), backends_with(sessions.clone())).await;
    let identity = server.sign_in().await;

    let record = sample_session_record(&config.experiment_id);
    let res = server
        .send_session(
            &identity.token,
            serde_json::to_string(&record)?,
            "application/json",
        )
        .await;
    assert_eq!(StatusCode::CREATED, res.status());

    let stored = sessions.records();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0.id, identity.participant_id);
    assert_eq!(stored[0].1, record);

    // Same session twice is a conflict, not a second row
    let res = server
        .send_session(
            &identity.token,
            serde_json::to_string(&record)?,
            "application/json",
        )
        .await;
    assert_eq!(StatusCode::CONFLICT, res.status());
    assert_eq!(sessions.records().len(), 1);

    Ok(())
}

#[tokio::test]
async fn it_rejects_invalid_sessions() -> Result<()> {
    let sessions = MemorySessionSink::new();
    let config = Config::default_test_config();
    let server = ServerHandle::for_backends(config.clone(), backends_with(sessions.clone())).await;
    let identity = server.sign_in().await;

    let mut record = sample_session_record(&config.experiment_id);
    record.age = 9;
    let res = server
        .send_session(
            &identity.token,
            serde_json::to_string(&record)?,
            "application/json",
        )
        .await;
    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({"error": "bad_request"})
    );

    let res = server
        .send_session(&identity.token, "{\"session_id\": 1}", "application/json")
        .await;
    assert_eq!(StatusCode::BAD_REQUEST, res.status());

    let record = sample_session_record(&config.experiment_id);
    let res = server
        .send_session(&identity.token, serde_json::to_string(&record)?, "text/plain")
        .await;
    assert_eq!(StatusCode::BAD_REQUEST, res.status());

    assert!(sessions.records().is_empty());

    Ok(())
}

#[tokio::test]
async fn it_requires_identity_to_record() -> Result<()> {
    let sessions = MemorySessionSink::new();
    let config = Config::default_test_config();
    let server = ServerHandle::for_backends(config.clone(), backends_with(sessions.clone())).await;

    let record = sample_session_record(&config.experiment_id);
    let res = server
        .send_session(
            "anon_never_issued",
            serde_json::to_string(&record)?,
            "application/json",
        )
        .await;
    assert_eq!(StatusCode::UNAUTHORIZED, res.status());
    assert!(sessions.records().is_empty());

    Ok(())
}

#[tokio::test]
async fn it_reports_an_unavailable_sink() -> Result<()> {
    let sessions = MemorySessionSink::new();
    let config = Config::default_test_config();
    let server = ServerHandle::for_backends(config.clone(), backends_with(sessions.clone())).await;
    let identity = server.sign_in().await;

    sessions.set_unavailable(true);
    let record = sample_session_record(&config.experiment_id);
    let res = server
        .send_session(
            &identity.token,
            serde_json::to_string(&record)?,
            "application/json",
        )
        .await;
    assert_eq!(StatusCode::SERVICE_UNAVAILABLE, res.status());
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({"error": "unavailable"})
    );

    Ok(())
}

#[tokio::test]
async fn it_is_not_ready_while_the_sink_is_down() -> Result<()> {
    let sessions = MemorySessionSink::new();
    let server =
        ServerHandle::for_backends(Config::default_test_config(), backends_with(sessions.clone()))
            .await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/_readiness")).send().await?;
    assert_eq!(StatusCode::OK, res.status());

    sessions.set_unavailable(true);
    let res = client.get(server.url("/_readiness")).send().await?;
    assert_eq!(StatusCode::SERVICE_UNAVAILABLE, res.status());
    assert!(res.text().await?.contains("session store unavailable"));

    sessions.set_unavailable(false);
    let res = client.get(server.url("/_readiness")).send().await?;
    assert_eq!(StatusCode::OK, res.status());

    Ok(())
}
