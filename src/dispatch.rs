//! Submit a compiled render script and follow the job to a terminal state.

use crate::{error::ApiError, timeline::RenderScript, types::VideoResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Planned,
    Waiting,
    Transcribing,
    Rendering,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl RenderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One render as reported by the render API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderDescriptor {
    /// Absent when the API rejects a render outright.
    #[serde(default)]
    pub id: Option<String>,
    pub status: RenderStatus,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub snapshot_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { interval: Duration::from_secs(2), max_attempts: 60 }
    }
}

#[async_trait]
pub trait RenderApi: Send + Sync {
    /// Submits a script; the API answers with one descriptor per output.
    async fn submit(&self, script: &RenderScript) -> Result<Vec<RenderDescriptor>, ApiError>;
    async fn fetch(&self, id: &str) -> Result<RenderDescriptor, ApiError>;
}

#[async_trait]
impl<T: RenderApi + ?Sized> RenderApi for Arc<T> {
    async fn submit(&self, script: &RenderScript) -> Result<Vec<RenderDescriptor>, ApiError> {
        (**self).submit(script).await
    }

    async fn fetch(&self, id: &str) -> Result<RenderDescriptor, ApiError> {
        (**self).fetch(id).await
    }
}

pub struct JobDispatcher<A> {
    api: A,
    policy: RetryPolicy,
}

impl<A: RenderApi> JobDispatcher<A> {
    pub fn new(api: A, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    pub async fn run(&self, script: &RenderScript, cancel: &CancellationToken) -> VideoResult {
        let descriptors = match self.api.submit(script).await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, auth = e.is_auth(), "render submission failed");
                return VideoResult::failure(format!("Render submission failed: {e}"));
            }
        };
        let Some(render) = descriptors.into_iter().next() else {
            return VideoResult::failure("Render API accepted the job but returned no render");
        };
        info!(render_id = ?render.id, status = ?render.status, "render submitted");

        if render.status.is_terminal() {
            return resolve_terminal(render, script.duration);
        }
        match render.id {
            Some(id) if !id.trim().is_empty() => self.poll(&id, script.duration, cancel).await,
            _ => {
                warn!(status = ?render.status, "render accepted without an id");
                VideoResult::failure("Render API returned no render id to poll")
            }
        }
    }

    /// Sleeps between attempts, never before the first one.
    pub async fn poll(&self, id: &str, duration: f64, cancel: &CancellationToken) -> VideoResult {
        let mut last_error: Option<String> = None;

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return cancelled(id),
                    _ = tokio::time::sleep(self.policy.interval) => {}
                }
            } else if cancel.is_cancelled() {
                return cancelled(id);
            }

            match self.api.fetch(id).await {
                Err(e) if e.is_auth() => {
                    warn!(render_id = %id, attempt, error = %e, "render polling unauthorized, giving up");
                    return VideoResult::failure(format!("Render polling failed: {e}"));
                }
                Err(e) => {
                    warn!(render_id = %id, attempt, error = %e, "transient poll error");
                    last_error = Some(e.to_string());
                }
                Ok(render) if render.status.is_terminal() => {
                    info!(render_id = %id, attempt, status = ?render.status, "render finished");
                    return resolve_terminal(render, duration);
                }
                Ok(render) => {
                    debug!(render_id = %id, attempt, status = ?render.status, "render in progress")
                }
            }
        }

        let mut message = format!("Render timed out after {} status checks", self.policy.max_attempts);
        if let Some(e) = last_error {
            message.push_str(&format!("; last error: {e}"));
        }
        warn!(render_id = %id, "{message}");
        VideoResult::failure(message)
    }
}

fn cancelled(id: &str) -> VideoResult {
    info!(render_id = %id, "render polling cancelled");
    VideoResult::failure("Render cancelled")
}

fn resolve_terminal(render: RenderDescriptor, duration: f64) -> VideoResult {
    match (render.status, render.url) {
        (RenderStatus::Succeeded, Some(url)) => {
            VideoResult::success(url, duration).with_thumbnail(render.snapshot_url)
        }
        (RenderStatus::Succeeded, None) => {
            VideoResult::failure("Render succeeded but returned no video URL")
        }
        _ => {
            let message = render.error_message.filter(|m| !m.trim().is_empty());
            VideoResult::failure(message.unwrap_or_else(|| "Render failed".into()))
        }
    }
}
