//! Federation health probe.

use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Endpoint every federating server answers with its version document
pub const FEDERATION_VERSION_PATH: &str = "/_matrix/federation/v1/version";

/// Reachability check of a resolved federation address
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// True iff the server answered the version endpoint with a JSON document
    async fn probe(&self, address: &str) -> bool;
}

/// Probe requesting the federation version endpoint
pub struct VersionProbe {
    client: reqwest::Client,
    scheme: &'static str,
    timeout_duration: Duration,
}

impl VersionProbe {
    /// Create a probe over HTTPS
    pub fn new(timeout_duration: Duration) -> Result<Self, ProbeError> {
        Self::with_scheme("https", timeout_duration)
    }

    /// Create a probe over plain HTTP, for local listeners without TLS
    pub fn plaintext(timeout_duration: Duration) -> Result<Self, ProbeError> {
        Self::with_scheme("http", timeout_duration)
    }

    fn with_scheme(scheme: &'static str, timeout_duration: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()?;

        Ok(Self {
            client,
            scheme,
            timeout_duration,
        })
    }

    /// URL of the version endpoint for `address`
    pub fn url_for(&self, address: &str) -> String {
        format!("{}://{}{}", self.scheme, address, FEDERATION_VERSION_PATH)
    }

    /// Perform the check, returning its duration on success
    pub async fn check(&self, address: &str) -> Result<Duration, ProbeError> {
        let start = Instant::now();
        let url = self.url_for(address);

        let response = match timeout(self.timeout_duration, self.client.get(&url).send()).await {
            Ok(response) => response?,
            Err(_) => return Err(ProbeError::Timeout(self.timeout_duration)),
        };

        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&body)?;

        Ok(start.elapsed())
    }
}

#[async_trait]
impl HealthProbe for VersionProbe {
    async fn probe(&self, address: &str) -> bool {
        match self.check(address).await {
            Ok(duration) => {
                debug!(address, duration_ms = duration.as_millis(), "Federation probe successful");
                true
            }
            Err(e) => {
                warn!(address, error = %e, "Federation probe failed");
                false
            }
        }
    }
}
