//! Generative backend: the source image plus a synthesized brief go to a
//! Gemini model, which may answer with a reference to a rendered video.
//!
//! The service has historically needed two call shapes, so the adapter tries an
//! ordered list of strategies. A strategy either settles the request or asks
//! for the next one; only call failures move on, an answer without a video
//! does not.

use super::{BackendKind, VideoBackend};
use crate::{
    config::Config,
    error::ApiError,
    types::{AnimationSpecs, ElementType, VideoResult},
};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::BytesMut;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;
const STYLE_DIRECTIVE: &str = "Style: professional, clean, modern motion graphics with smooth, polished transitions.";
const UNSUPPORTED_MARKERS: [&str; 6] = [
    "not supported",
    "unsupported",
    "cannot generate video",
    "can't generate video",
    "unable to generate video",
    "do not have the ability to generate video",
];

pub const UNSUPPORTED_MESSAGE: &str =
    "Video generation is not supported for this Gemini model or API key. Use the Creatomate backend instead.";

fn exhausted_message(detail: Option<&str>) -> String {
    let detail = detail.map(|d| format!(" ({d})")).unwrap_or_default();
    format!(
        "Gemini did not return a video{detail}. \
         Try the Creatomate backend, which renders the animation precisely and reliably."
    )
}

/// Base64-encoded image with its MIME type, ready for an inline-data part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub mime_type: String,
    pub data: String,
}

impl SourceImage {
    /// Splits a `data:` URI. Non-base64 payloads are encoded as-is.
    pub fn from_data_uri(uri: &str) -> anyhow::Result<Self> {
        let rest = uri.trim().strip_prefix("data:").ok_or_else(|| anyhow!("not a data URI"))?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| anyhow!("data URI has no payload"))?;
        let mut params = header.split(';');
        let mime_type = params.next().filter(|m| !m.is_empty()).unwrap_or("image/png").to_string();
        let data = if params.any(|p| p.eq_ignore_ascii_case("base64")) {
            payload.trim().to_string()
        } else {
            STANDARD.encode(payload.as_bytes())
        };
        if data.is_empty() {
            bail!("data URI payload is empty");
        }
        Ok(Self { mime_type, data })
    }

    pub async fn fetch(client: &reqwest::Client, url: &str) -> anyhow::Result<Self> {
        let resp = client.get(url).send().await.context("image request failed")?;
        if !resp.status().is_success() {
            bail!("bad status {}", resp.status());
        }
        let mime_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "image/png".into());

        let mut buf = BytesMut::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
            if buf.len() > MAX_IMAGE_BYTES {
                bail!("image exceeds {} bytes", MAX_IMAGE_BYTES);
            }
        }
        Ok(Self { mime_type, data: STANDARD.encode(&buf) })
    }

    pub async fn load(client: &reqwest::Client, source: &str) -> anyhow::Result<Self> {
        let source = source.trim();
        if source.starts_with("data:") {
            Self::from_data_uri(source)
        } else if source.starts_with("http://") || source.starts_with("https://") {
            Self::fetch(client, source).await
        } else if source.is_empty() {
            bail!("no source image provided")
        } else {
            bail!("unrecognised source image reference")
        }
    }
}

fn platform_hint(platform_id: &str) -> Option<&'static str> {
    let id = platform_id.to_ascii_lowercase();
    if id.contains("tiktok") {
        Some("Mobile-first: hook viewers in the first second with fast, energetic motion and a sense of urgency.")
    } else if id.contains("roblox") {
        Some("Make it feel game-like and playful, with bouncy motion that invites players to engage.")
    } else {
        None
    }
}

pub fn build_prompt(specs: &AnimationSpecs) -> String {
    let mut lines = vec![format!(
        "Create a {}-second animated video ad for {} in {} aspect ratio, based on the attached image.",
        specs.duration, specs.platform.name, specs.format.aspect_ratio
    )];

    let texts: Vec<_> = specs
        .elements
        .iter()
        .filter(|e| matches!(e.kind, ElementType::Text | ElementType::Cta))
        .filter(|e| !e.content.trim().is_empty())
        .map(|e| format!("- \"{}\"", e.content))
        .collect();
    if !texts.is_empty() {
        lines.push("Animate this text exactly as written:".into());
        lines.extend(texts);
    }

    lines.push(STYLE_DIRECTIVE.into());
    if let Some(colors) = specs.source_analysis.as_ref().map(|a| &a.dominant_colors).filter(|c| !c.is_empty()) {
        lines.push(format!("Use the brand colors: {}.", colors.join(", ")));
    }
    if let Some(hint) = platform_hint(&specs.platform.id) {
        lines.push(hint.into());
    }
    lines.join("\n")
}

pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub image: SourceImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Video(String),
    Unsupported,
    NoVideo,
    /// The call itself failed; try the next strategy.
    Continue(String),
}

#[async_trait]
pub trait GenerationStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(&self, request: &GenerationRequest) -> StrategyOutcome;
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    #[serde(alias = "file_data")]
    pub file_data: Option<FileData>,
    #[serde(alias = "file_uri")]
    pub file_uri: Option<String>,
    #[serde(alias = "video_uri")]
    pub video_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    #[serde(alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(alias = "file_uri")]
    pub file_uri: Option<String>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates.iter().filter_map(|c| c.content.as_ref()).flat_map(|c| c.parts.iter())
    }

    /// Any part carrying a video file reference.
    pub fn sdk_video(&self) -> Option<String> {
        self.parts().find_map(|p| {
            p.file_data
                .as_ref()
                .filter(|f| f.mime_type.as_deref().map_or(true, |m| m.starts_with("video/")))
                .and_then(|f| f.file_uri.clone())
                .or_else(|| p.video_uri.clone())
        })
    }

    /// Only the first part of the first candidate is considered.
    pub fn rest_video(&self) -> Option<String> {
        let part = self.candidates.first()?.content.as_ref()?.parts.first()?;
        part.file_uri
            .clone()
            .or_else(|| part.video_uri.clone())
            .or_else(|| part.file_data.as_ref().and_then(|f| f.file_uri.clone()))
    }

    pub fn states_unsupported(&self) -> bool {
        self.parts().filter_map(|p| p.text.as_deref()).any(|text| {
            let text = text.to_ascii_lowercase();
            UNSUPPORTED_MARKERS.iter().any(|m| text.contains(m))
        })
    }

    fn outcome(&self, video: Option<String>) -> StrategyOutcome {
        match video {
            Some(uri) => StrategyOutcome::Video(uri),
            None if self.states_unsupported() => StrategyOutcome::Unsupported,
            None => StrategyOutcome::NoVideo,
        }
    }
}

async fn read_response(resp: reqwest::Response) -> Result<GenerateContentResponse, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ApiError::from_status(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| {
        debug!(error = %e, "generateContent response did not decode");
        ApiError::decode(&body)
    })
}

/// Request shape used by the official client libraries: header auth, camelCase parts.
pub struct SdkStrategy {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SdkStrategy {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key }
    }

    async fn call(&self, request: &GenerationRequest) -> Result<GenerateContentResponse, ApiError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "inlineData": { "mimeType": request.image.mime_type, "data": request.image.data } },
                    { "text": request.prompt },
                ],
            }],
        });
        let resp = self
            .client
            .post(format!("{}/v1beta/models/{}:generateContent", self.base_url, request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        read_response(resp).await
    }
}

#[async_trait]
impl GenerationStrategy for SdkStrategy {
    fn name(&self) -> &'static str {
        "sdk"
    }

    async fn attempt(&self, request: &GenerationRequest) -> StrategyOutcome {
        match self.call(request).await {
            Ok(resp) => resp.outcome(resp.sdk_video()),
            Err(e) => StrategyOutcome::Continue(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct RestBody<'a> {
    contents: [RestContent<'a>; 1],
}

#[derive(Serialize)]
struct RestContent<'a> {
    parts: [RestPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum RestPart<'a> {
    Inline { inline_data: RestInline<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct RestInline<'a> {
    mime_type: &'a str,
    data: &'a str,
}

/// Raw REST call with the key in the query string.
pub struct RestStrategy {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestStrategy {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key }
    }

    fn endpoint(&self, model: &str) -> Result<url::Url, ApiError> {
        let raw = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        url::Url::parse_with_params(&raw, [("key", self.api_key.as_str())])
            .map_err(|e| ApiError::Decode(format!("invalid endpoint {raw}: {e}")))
    }

    async fn call(&self, request: &GenerationRequest) -> Result<GenerateContentResponse, ApiError> {
        let body = RestBody {
            contents: [RestContent {
                parts: [
                    RestPart::Inline {
                        inline_data: RestInline { mime_type: &request.image.mime_type, data: &request.image.data },
                    },
                    RestPart::Text { text: &request.prompt },
                ],
            }],
        };
        let resp = self.client.post(self.endpoint(&request.model)?).json(&body).send().await?;
        read_response(resp).await
    }
}

#[async_trait]
impl GenerationStrategy for RestStrategy {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn attempt(&self, request: &GenerationRequest) -> StrategyOutcome {
        match self.call(request).await {
            Ok(resp) => resp.outcome(resp.rest_video()),
            // Keep the key out of logs and messages.
            Err(ApiError::Transport(e)) => StrategyOutcome::Continue(format!("request failed: {}", e.without_url())),
            Err(e) => StrategyOutcome::Continue(e.to_string()),
        }
    }
}

/// Request/response only: no polling, no retry on soft states.
pub struct GenerativeBackend {
    client: reqwest::Client,
    model: String,
    strategies: Vec<Box<dyn GenerationStrategy>>,
}

impl GenerativeBackend {
    pub fn new(config: &Config, client: reqwest::Client, api_key: String) -> Self {
        let strategies: Vec<Box<dyn GenerationStrategy>> = vec![
            Box::new(SdkStrategy::new(client.clone(), &config.gemini_base_url, api_key.clone())),
            Box::new(RestStrategy::new(client.clone(), &config.gemini_base_url, api_key)),
        ];
        Self::with_strategies(client, config.gemini_model.clone(), strategies)
    }

    pub fn with_strategies(
        client: reqwest::Client,
        model: String,
        strategies: Vec<Box<dyn GenerationStrategy>>,
    ) -> Self {
        Self { client, model, strategies }
    }

    /// Image loading and every strategy call, raced as one unit against cancellation.
    async fn attempt(&self, specs: &AnimationSpecs) -> VideoResult {
        let image = match SourceImage::load(&self.client, &specs.source_image).await {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "could not load source image");
                return VideoResult::failure(format!("Could not load source image: {e:#}"));
            }
        };
        let request = GenerationRequest { model: self.model.clone(), prompt: build_prompt(specs), image };
        info!(model = %request.model, prompt_len = request.prompt.len(), "requesting generative video");
        self.run_strategies(&request, specs.duration).await
    }

    pub async fn run_strategies(&self, request: &GenerationRequest, duration: f64) -> VideoResult {
        let mut last_error = None;
        for strategy in &self.strategies {
            match strategy.attempt(request).await {
                StrategyOutcome::Video(uri) => {
                    info!(strategy = strategy.name(), "generative model returned a video");
                    return VideoResult::success(uri, duration);
                }
                StrategyOutcome::Unsupported => {
                    warn!(strategy = strategy.name(), "video generation reported as unsupported");
                    return VideoResult::failure(UNSUPPORTED_MESSAGE);
                }
                StrategyOutcome::NoVideo => {
                    warn!(strategy = strategy.name(), "response carried no video reference");
                    return VideoResult::failure(exhausted_message(Some("the response contained no video")));
                }
                StrategyOutcome::Continue(error) => {
                    warn!(strategy = strategy.name(), %error, "generation call failed, trying next strategy");
                    last_error = Some(error);
                }
            }
        }
        VideoResult::failure(exhausted_message(last_error.as_deref()))
    }
}

#[async_trait]
impl VideoBackend for GenerativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    async fn generate_video(&self, specs: &AnimationSpecs, cancel: &CancellationToken) -> VideoResult {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("generative render cancelled");
                VideoResult::failure("Render cancelled")
            }
            result = self.attempt(specs) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::tests::{element, specs};
    use crate::types::{ElementAnimation, SourceAnalysis};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct Fixed {
        outcome: StrategyOutcome,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GenerationStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn attempt(&self, _: &GenerationRequest) -> StrategyOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn backend(outcomes: Vec<StrategyOutcome>) -> (GenerativeBackend, Vec<Arc<AtomicUsize>>) {
        let counters: Vec<_> = outcomes.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let strategies = outcomes
            .into_iter()
            .zip(&counters)
            .map(|(outcome, calls)| Box::new(Fixed { outcome, calls: calls.clone() }) as Box<dyn GenerationStrategy>)
            .collect();
        (GenerativeBackend::with_strategies(reqwest::Client::new(), "test-model".into(), strategies), counters)
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "test-model".into(),
            prompt: "p".into(),
            image: SourceImage { mime_type: "image/png".into(), data: "AAAA".into() },
        }
    }

    #[tokio::test]
    async fn fallback_runs_only_after_a_failed_call() {
        let video = StrategyOutcome::Video("https://v/1.mp4".into());
        let (b, calls) = backend(vec![StrategyOutcome::Continue("boom".into()), video]);
        let result = b.run_strategies(&request(), 8.0).await;
        assert_eq!(result, VideoResult::success("https://v/1.mp4", 8.0));
        assert_eq!(calls[1].load(Ordering::SeqCst), 1);

        let (b, calls) = backend(vec![StrategyOutcome::NoVideo, StrategyOutcome::Video("https://v/1.mp4".into())]);
        let result = b.run_strategies(&request(), 8.0).await;
        assert!(result.error.unwrap().contains("Creatomate"));
        assert_eq!(calls[1].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_stops_with_redirect() {
        let (b, calls) = backend(vec![StrategyOutcome::Unsupported, StrategyOutcome::Video("https://v/1.mp4".into())]);
        assert_eq!(b.run_strategies(&request(), 8.0).await, VideoResult::failure(UNSUPPORTED_MESSAGE));
        assert_eq!(calls[1].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_strategies_recommend_precise_backend() {
        let (b, _) =
            backend(vec![StrategyOutcome::Continue("first".into()), StrategyOutcome::Continue("HTTP 500".into())]);
        let error = b.run_strategies(&request(), 8.0).await.error.unwrap();
        assert!(error.contains("HTTP 500"), "{error}");
        assert!(error.contains("Try the Creatomate backend"), "{error}");
    }

    #[test]
    fn prompt_lists_text_colors_and_platform_hint() {
        let mut s = specs(15.0, vec![
            element("headline", ElementType::Text, ElementAnimation::default()),
            element("logo", ElementType::Logo, ElementAnimation::default()),
        ]);
        let mut cta = element("cta", ElementType::Cta, ElementAnimation::default());
        cta.content = "Shop Now".into();
        s.elements.push(cta);
        s.source_analysis =
            Some(SourceAnalysis { dominant_colors: vec!["#112233".into(), "#ffffff".into()], ..Default::default() });

        let prompt = build_prompt(&s);
        assert!(prompt.contains("15-second"));
        assert!(prompt.contains("TikTok"));
        assert!(prompt.contains("9:16"));
        assert!(prompt.contains("- \"Summer Sale\"\n- \"Shop Now\""));
        assert_eq!(prompt.matches("- \"").count(), 2);
        assert!(prompt.contains("professional, clean, modern"));
        assert!(prompt.contains("#112233, #ffffff"));
        assert!(prompt.contains("urgency"));
    }

    #[test]
    fn data_uris_are_split() {
        let img = SourceImage::from_data_uri("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        assert_eq!(img, SourceImage { mime_type: "image/jpeg".into(), data: "/9j/4AAQ".into() });
        assert!(SourceImage::from_data_uri("https://example.com/a.png").is_err());
        assert!(SourceImage::from_data_uri("data:image/png;base64,").is_err());
    }

    #[test]
    fn response_inspection_distinguishes_shapes() {
        let sdk: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here you go" },
                { "fileData": { "mimeType": "video/mp4", "fileUri": "https://files/v.mp4" } }
            ]}}]
        }))
        .unwrap();
        assert_eq!(sdk.sdk_video().as_deref(), Some("https://files/v.mp4"));
        assert_eq!(sdk.rest_video(), None);

        let rest: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "videoUri": "https://files/r.mp4" }] } }]
        }))
        .unwrap();
        assert_eq!(rest.rest_video().as_deref(), Some("https://files/r.mp4"));

        let refusal: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Video output is not supported by this model." }] } }]
        }))
        .unwrap();
        assert_eq!(refusal.outcome(refusal.sdk_video()), StrategyOutcome::Unsupported);
        assert_eq!(GenerateContentResponse::default().outcome(None), StrategyOutcome::NoVideo);
    }

    #[test]
    fn rest_body_uses_snake_case_parts() {
        let body = RestBody {
            contents: [RestContent {
                parts: [
                    RestPart::Inline { inline_data: RestInline { mime_type: "image/png", data: "AAAA" } },
                    RestPart::Text { text: "hi" },
                ],
            }],
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({ "contents": [{ "parts": [
                { "inline_data": { "mime_type": "image/png", "data": "AAAA" } },
                { "text": "hi" }
            ] }] })
        );
    }

    #[test]
    fn rest_endpoint_carries_key_as_query() {
        let s = RestStrategy::new(reqwest::Client::new(), "https://api.example.com/", "k 1".into());
        let url = s.endpoint("gemini-2.0-flash-exp").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1beta/models/gemini-2.0-flash-exp:generateContent?key=k+1");
    }
}
