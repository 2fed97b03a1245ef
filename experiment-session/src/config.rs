use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct ExperimentClientConfig {
    #[envconfig(default = "http://127.0.0.1:3001")]
    pub balancer_url: String,

    #[envconfig(default = "5000")]
    pub request_timeout_ms: u64,

    #[envconfig(default = "kogsys_wason_v1")]
    pub experiment_id: String,

    #[envconfig(default = ".")]
    pub completion_marker_dir: String,
}

impl ExperimentClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
