use super::{BackendKind, VideoBackend};
use crate::{
    config::Config,
    dispatch::{JobDispatcher, RenderApi, RenderDescriptor},
    error::ApiError,
    timeline::{self, RenderScript},
    types::{AnimationSpecs, VideoResult},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Serialize)]
struct Submission<'a> {
    source: &'a RenderScript,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<RenderDescriptor>),
    One(RenderDescriptor),
}

/// Bearer-authenticated client for the `/v1/renders` endpoints.
#[derive(Clone)]
pub struct CreatomateClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CreatomateClient {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key }
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| {
            debug!(error = %e, "render API response did not decode");
            ApiError::decode(&body)
        })
    }
}

#[async_trait]
impl RenderApi for CreatomateClient {
    async fn submit(&self, script: &RenderScript) -> Result<Vec<RenderDescriptor>, ApiError> {
        let resp = self
            .client
            .post(format!("{}/v1/renders", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&Submission { source: script })
            .send()
            .await?;
        Ok(match Self::read::<OneOrMany>(resp).await? {
            OneOrMany::Many(renders) => renders,
            OneOrMany::One(render) => vec![render],
        })
    }

    async fn fetch(&self, id: &str) -> Result<RenderDescriptor, ApiError> {
        let resp = self
            .client
            .get(format!("{}/v1/renders/{}", self.base_url, id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::read(resp).await
    }
}

/// Compiles the full timeline and renders it as an asynchronous job.
pub struct PreciseBackend {
    dispatcher: JobDispatcher<CreatomateClient>,
}

impl PreciseBackend {
    pub fn new(config: &Config, client: reqwest::Client, api_key: String) -> Self {
        let api = CreatomateClient::new(client, &config.creatomate_base_url, api_key);
        Self { dispatcher: JobDispatcher::new(api, config.poll) }
    }
}

#[async_trait]
impl VideoBackend for PreciseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Creatomate
    }

    async fn generate_video(&self, specs: &AnimationSpecs, cancel: &CancellationToken) -> VideoResult {
        let script = timeline::compile(specs);
        info!(elements = script.elements.len(), duration = script.duration, "compiled render timeline");
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(script = %serde_json::to_string(&script).unwrap_or_default(), "render script");
        }
        self.dispatcher.run(&script, cancel).await
    }
}
