use log::{debug, error};
use reqwest::Client;

/// Sends a GET to a health-check URL (healthchecks.io style) after each
/// watch pass so an outside monitor notices when the watcher stops.
pub struct HttpPingSender {
    client: Client,
    url: String,
}

pub fn user_agent() -> String {
    format!(
        "app_checker/{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

impl HttpPingSender {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn send_ping(&self) -> Result<(), reqwest::Error> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, user_agent())
            .send()
            .await?
            .error_for_status()
            .map_err(|err| {
                error!("Unexpected health check response from {}: {}", self.url, err);
                err
            })?;
        debug!("Health check ping sent: {}", response.status());
        Ok(())
    }
}
