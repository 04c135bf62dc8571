use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdFormat {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub aspect_ratio: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub min_duration: Option<f64>,
    #[serde(default)]
    pub max_duration: Option<f64>,
}

/// Everything needed to turn one static ad into a short animated video.
///
/// Produced upstream by the image analysis step and never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationSpecs {
    pub platform: Platform,
    pub format: AdFormat,
    /// Total video length in seconds.
    pub duration: f64,
    /// Original static ad, usually a `data:` URI.
    #[serde(default)]
    pub source_image: String,
    #[serde(default)]
    pub elements: Vec<AnimationElement>,
    #[serde(default)]
    pub source_analysis: Option<SourceAnalysis>,
    #[serde(default)]
    pub background: Option<Background>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAnalysis {
    #[serde(default)]
    pub dominant_colors: Vec<String>,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub text_regions: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Background {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Text,
    Cta,
    Image,
    Logo,
    Shape,
    Background,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationElement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementType,
    pub bounds: Bounds,
    /// Text for text/cta, an image reference for image/logo.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub style: ElementStyle,
    #[serde(default)]
    pub animation: ElementAnimation,
}

/// Percentages of the frame, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FontWeight {
    Numeric(u16),
    Named(String),
}

impl std::fmt::Display for FontWeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Named(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementStyle {
    pub font_family: Option<String>,
    pub font_size: Option<f64>,
    pub font_weight: Option<FontWeight>,
    pub color: Option<String>,
    pub background_color: Option<String>,
    pub border_radius: Option<f64>,
}

/// Effect names and easing are kept as free-form strings; the compiler
/// degrades anything it does not recognise instead of rejecting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementAnimation {
    #[serde(default = "none_effect")]
    pub entry: String,
    #[serde(default)]
    pub entry_duration: f64,
    #[serde(default)]
    pub entry_delay: f64,
    #[serde(default)]
    pub hold: Option<f64>,
    #[serde(default)]
    pub exit: Option<String>,
    #[serde(default)]
    pub exit_duration: Option<f64>,
    #[serde(default)]
    pub easing: Option<String>,
}

fn none_effect() -> String {
    "none".into()
}

impl Default for ElementAnimation {
    fn default() -> Self {
        Self {
            entry: none_effect(),
            entry_duration: 0.0,
            entry_delay: 0.0,
            hold: None,
            exit: None,
            exit_duration: None,
            easing: None,
        }
    }
}

/// Uniform outcome of every render path, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VideoResult {
    pub fn success(url: impl Into<String>, duration: f64) -> Self {
        let url = url.into();
        Self {
            success: true,
            download_url: Some(url.clone()),
            url: Some(url),
            thumbnail_url: None,
            duration: Some(duration),
            format: Some("mp4".into()),
            error: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail_url = thumbnail;
        self
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            url: None,
            download_url: None,
            thumbnail_url: None,
            duration: None,
            format: None,
            error: Some(error.into()),
        }
    }
}

/// Shortens a response body for embedding in a human-readable message.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
