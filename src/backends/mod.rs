//! Interchangeable render backends and the registry that picks between them.

pub mod creatomate;
pub mod gemini;

use crate::{
    config::{Config, CREATOMATE_KEY_VAR, GEMINI_KEY_VAR},
    types::{AnimationSpecs, VideoResult},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use creatomate::PreciseBackend;
pub use gemini::GenerativeBackend;

#[async_trait]
pub trait VideoBackend: Send + Sync {
    fn kind(&self) -> BackendKind;
    /// Never fails: every error is folded into the returned [`VideoResult`].
    async fn generate_video(&self, specs: &AnimationSpecs, cancel: &CancellationToken) -> VideoResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Timeline-accurate rendering through the Creatomate render API.
    Creatomate,
    /// Image + prompt sent to a Gemini generative model.
    Gemini,
}

impl BackendKind {
    pub const ALL: [Self; 2] = [Self::Creatomate, Self::Gemini];

    pub fn id(self) -> &'static str {
        match self {
            Self::Creatomate => "creatomate",
            Self::Gemini => "gemini",
        }
    }

    pub fn credential_var(self) -> &'static str {
        match self {
            Self::Creatomate => CREATOMATE_KEY_VAR,
            Self::Gemini => GEMINI_KEY_VAR,
        }
    }

    pub fn credential(self, config: &Config) -> Option<&str> {
        match self {
            Self::Creatomate => config.creatomate_api_key.as_deref(),
            Self::Gemini => config.gemini_api_key.as_deref(),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown backend '{0}'")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownBackend(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendAvailability {
    pub id: BackendKind,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub type Constructor = fn(&Config, reqwest::Client, String) -> Box<dyn VideoBackend>;

fn build_precise(config: &Config, client: reqwest::Client, key: String) -> Box<dyn VideoBackend> {
    Box::new(PreciseBackend::new(config, client, key))
}

fn build_generative(config: &Config, client: reqwest::Client, key: String) -> Box<dyn VideoBackend> {
    Box::new(GenerativeBackend::new(config, client, key))
}

/// Decides from configured credentials alone which backends can serve a request.
#[derive(Clone)]
pub struct BackendRegistry {
    config: Arc<Config>,
    client: reqwest::Client,
    constructors: BTreeMap<BackendKind, Constructor>,
}

impl BackendRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        let constructors = BTreeMap::from([
            (BackendKind::Creatomate, build_precise as Constructor),
            (BackendKind::Gemini, build_generative as Constructor),
        ]);
        Self { config, client, constructors }
    }

    pub fn available_backends(&self) -> Vec<BackendAvailability> {
        self.constructors
            .keys()
            .map(|&kind| match kind.credential(&self.config) {
                Some(_) => BackendAvailability { id: kind, available: true, reason: None },
                None => BackendAvailability {
                    id: kind,
                    available: false,
                    reason: Some(format!("Missing {}", kind.credential_var())),
                },
            })
            .collect()
    }

    /// `specs` is not consulted yet; selection is by credentials only.
    pub fn recommended_backend(&self, _specs: &AnimationSpecs) -> BackendKind {
        if BackendKind::Creatomate.credential(&self.config).is_some() {
            BackendKind::Creatomate
        } else if BackendKind::Gemini.credential(&self.config).is_some() {
            BackendKind::Gemini
        } else {
            // Falls through to the usual missing-credential error downstream.
            BackendKind::Creatomate
        }
    }

    pub async fn dispatch(&self, specs: &AnimationSpecs, backend: &str, cancel: &CancellationToken) -> VideoResult {
        match backend.parse::<BackendKind>() {
            Ok(kind) => self.dispatch_kind(specs, kind, cancel).await,
            Err(e) => {
                warn!(backend, "rejecting render for unknown backend");
                VideoResult::failure(e.to_string())
            }
        }
    }

    pub async fn dispatch_kind(
        &self,
        specs: &AnimationSpecs,
        kind: BackendKind,
        cancel: &CancellationToken,
    ) -> VideoResult {
        let Some(key) = kind.credential(&self.config) else {
            warn!(%kind, "backend credential missing");
            return VideoResult::failure(format!("{kind} backend unavailable: missing {}", kind.credential_var()));
        };
        let Some(build) = self.constructors.get(&kind) else {
            return VideoResult::failure(UnknownBackend(kind.to_string()).to_string());
        };

        let backend = build(&self.config, self.client.clone(), key.to_string());
        info!(
            kind = %backend.kind(),
            platform = %specs.platform.id,
            elements = specs.elements.len(),
            duration = specs.duration,
            "dispatching render"
        );
        let result = backend.generate_video(specs, cancel).await;
        if result.success {
            info!(%kind, url = ?result.url, "render complete");
        } else {
            warn!(%kind, error = ?result.error, "render failed");
        }
        result
    }
}
