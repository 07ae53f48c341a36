use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One call-history record from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    pub id: i64,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub transcript_summary: Option<String>,
    /// Call length in seconds
    pub duration: i64,
    pub created_at: String,
}

/// Thin client for the dashboard REST endpoints.
pub struct DashboardClient {
    http: reqwest::Client,
    base_url: String,
}

impl DashboardClient {
    /// `base_url` is scheme + host:port, e.g. `http://localhost:8000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Available appointment slots as RFC 3339 timestamp strings, in backend
    /// order.
    pub async fn appointments(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/dashboard/appointments", self.base_url);
        info!("Fetching appointments: {}", url);

        let slots = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to reach dashboard API")?
            .error_for_status()
            .context("Appointments request rejected")?
            .json::<Vec<String>>()
            .await
            .context("Failed to parse appointments response")?;

        Ok(slots)
    }

    /// Call history, most recent first (backend order).
    pub async fn calls(&self) -> Result<Vec<CallLog>> {
        let url = format!("{}/api/dashboard/calls", self.base_url);
        info!("Fetching call history: {}", url);

        let calls = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to reach dashboard API")?
            .error_for_status()
            .context("Calls request rejected")?
            .json::<Vec<CallLog>>()
            .await
            .context("Failed to parse calls response")?;

        Ok(calls)
    }
}
