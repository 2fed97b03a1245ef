use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use envconfig::Envconfig;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use common_types::{CardId, Variant};
use condition_balancer::config::Config;
use condition_balancer::identity::MemoryIdentityProvider;
use condition_balancer::server::{serve_with_backends, Backends};
use condition_balancer::sessions::MemorySessionSink;
use condition_balancer::store::{CounterStore, MemoryCounterStore};
use experiment_session::completion::{CompletionMarker, FileCompletionMarker, MemoryCompletionMarker};
use experiment_session::config::ExperimentClientConfig;
use experiment_session::controller::START_ERROR;
use experiment_session::demographics::Demographics;
use experiment_session::{BalancerClient, DeviceInfo, SessionController, Stage};

struct Balancer {
    url: String,
    counters: MemoryCounterStore,
    sessions: MemorySessionSink,
    shutdown: Arc<Notify>,
}

impl Balancer {
    async fn start() -> Balancer {
        let counters = MemoryCounterStore::new();
        let sessions = MemorySessionSink::new();
        let backends = Backends {
            counters: Arc::new(counters.clone()),
            identity: Arc::new(MemoryIdentityProvider::new()),
            sessions: Arc::new(sessions.clone()),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve_with_backends(Config::default_test_config(), backends, listener, async move {
                notify.notified().await
            })
            .await
        });

        // Answered only once the server has seeded its counters and accepts
        let ready = reqwest::get(format!("{url}/_readiness")).await.unwrap();
        assert!(ready.status().is_success());

        Balancer {
            url,
            counters,
            sessions,
            shutdown,
        }
    }

    fn client(&self) -> Arc<BalancerClient> {
        Arc::new(BalancerClient::new(&self.url, Duration::from_secs(2)).unwrap())
    }
}

impl Drop for Balancer {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}

fn device() -> DeviceInfo {
    DeviceInfo {
        user_agent: "integration-test".to_string(),
        screen_w: 1440,
        screen_h: 900,
        tz: "Europe/Berlin".to_string(),
    }
}

fn demographics() -> Demographics {
    Demographics {
        sex: "Weiblich".to_string(),
        age: 31,
        degree: "Promotion".to_string(),
    }
}

#[tokio::test]
async fn it_runs_a_participant_through_every_stage() -> Result<()> {
    let balancer = Balancer::start().await;
    let marker_dir = tempfile::tempdir()?;
    let config = ExperimentClientConfig::init_from_hashmap(&HashMap::from([
        ("BALANCER_URL".to_string(), balancer.url.clone()),
        (
            "COMPLETION_MARKER_DIR".to_string(),
            marker_dir.path().display().to_string(),
        ),
    ]))?;
    let marker = FileCompletionMarker::new(marker_dir.path());

    let mut controller = SessionController::from_config(&config, device())?;
    assert!(!controller.already_completed()?);

    let condition = controller.start(true).await?;
    assert_eq!(controller.stage(), Stage::Task);

    controller.toggle_card(CardId::C4)?;
    controller.toggle_card(CardId::C1)?;
    assert!(controller.submit_task()?);
    controller.submit_confidence(65)?;
    controller.submit_demographics(demographics()).await?;
    assert_eq!(controller.stage(), Stage::Debrief);
    assert!(marker.is_marked()?);

    let stored = balancer.sessions.records();
    assert_eq!(stored.len(), 1);
    let (participant, record) = &stored[0];
    assert_eq!(
        Some(participant.id),
        controller.participant().map(|p| p.participant_id)
    );
    assert_eq!(record.condition, condition);
    assert_eq!(record.final_selection, vec![CardId::C4, CardId::C1]);
    assert_eq!(record.experiment_id, config.experiment_id);
    assert_eq!(record.degree, "Promotion");

    let counts = balancer.counters.counts("kogsys_wason_v1").await?;
    assert_eq!(counts.iter().map(|(_, c)| c).sum::<i64>(), 1);

    Ok(())
}

#[tokio::test]
async fn it_spreads_participants_over_conditions() -> Result<()> {
    let balancer = Balancer::start().await;
    let client = balancer.client();

    let mut seen = vec![];
    for _ in 0..3 {
        let mut controller = SessionController::new(
            client.clone(),
            Arc::new(MemoryCompletionMarker::new()),
            "kogsys_wason_v1".to_string(),
            device(),
        );
        seen.push(controller.start(true).await?);
    }
    seen.sort();

    assert_eq!(seen, Variant::ALL.to_vec());

    Ok(())
}

#[tokio::test]
async fn it_stays_at_consent_when_the_balancer_is_down() -> Result<()> {
    let balancer = Balancer::start().await;
    let mut controller = SessionController::new(
        balancer.client(),
        Arc::new(MemoryCompletionMarker::new()),
        "kogsys_wason_v1".to_string(),
        device(),
    );

    balancer.counters.set_unavailable(true);
    assert!(controller.start(true).await.is_err());
    assert_eq!(controller.stage(), Stage::Consent);
    assert_eq!(controller.start_error(), Some(START_ERROR));
    assert_eq!(controller.condition(), None);

    balancer.counters.set_unavailable(false);
    controller.start(true).await?;
    assert_eq!(controller.stage(), Stage::Task);

    Ok(())
}

#[tokio::test]
async fn it_keeps_the_participant_at_demographics_when_saving_fails() -> Result<()> {
    let balancer = Balancer::start().await;
    let marker = Arc::new(MemoryCompletionMarker::new());
    let mut controller = SessionController::new(
        balancer.client(),
        marker.clone(),
        "kogsys_wason_v1".to_string(),
        device(),
    );

    controller.start(true).await?;
    controller.submit_task()?;
    controller.submit_confidence(10)?;

    balancer.sessions.set_unavailable(true);
    assert!(controller.submit_demographics(demographics()).await.is_err());
    assert_eq!(controller.stage(), Stage::Demographics);
    assert!(controller.save_error().is_some());
    assert!(!marker.is_marked()?);

    balancer.sessions.set_unavailable(false);
    controller.submit_demographics(demographics()).await?;
    assert_eq!(controller.stage(), Stage::Debrief);
    assert_eq!(balancer.sessions.records().len(), 1);

    Ok(())
}
