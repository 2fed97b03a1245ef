#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use common_types::AnonymousIdentity;
use condition_balancer::config::Config;
use condition_balancer::server::{serve, serve_with_backends, Backends};

pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_config(config: Config) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve(config, listener, async move { notify.notified().await }).await
        });
        ServerHandle { addr, shutdown }
    }

    /// Runs on backends the test keeps handles to, e.g. to simulate outages.
    pub async fn for_backends(config: Config, backends: Backends) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve_with_backends(config, backends, listener, async move {
                notify.notified().await
            })
            .await
        });
        ServerHandle { addr, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{:?}{}", self.addr, path)
    }

    pub async fn sign_in(&self) -> AnonymousIdentity {
        reqwest::Client::new()
            .post(self.url("/auth/anonymous"))
            .send()
            .await
            .expect("failed to send request")
            .json()
            .await
            .expect("failed to decode identity")
    }

    pub async fn send_assign_request(&self, token: Option<&str>) -> reqwest::Response {
        let mut request = reqwest::Client::new().post(self.url("/assign-condition"));
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        request.send().await.expect("failed to send request")
    }

    pub async fn send_session<T: Into<reqwest::Body>>(
        &self,
        token: &str,
        body: T,
        content_type: &str,
    ) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.url("/sessions"))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
