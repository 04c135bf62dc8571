//! Compiles backend-neutral [`AnimationSpecs`] into a Creatomate render script.
//!
//! Pure and deterministic: the same specs always compile to the same script,
//! and malformed animation fields degrade to safe defaults instead of failing.

use crate::types::{AnimationElement, AnimationSpecs, ElementAnimation, ElementType};
use serde::Serialize;

pub const FRAME_RATE: u32 = 30;
pub const OUTPUT_FORMAT: &str = "mp4";
const DEFAULT_BACKGROUND: &str = "#1a1a2e";
const DEFAULT_TEXT_COLOR: &str = "#ffffff";
const PLACEHOLDER_FILL: &str = "rgba(255,255,255,0.15)";
const BACKGROUND_FADE_SECS: f64 = 0.3;
const SAFETY_FADE_SECS: f64 = 0.5;
const DEFAULT_EASING: &str = "quadratic-out";
const RECT_PATH: &str = "M 0 0 L 100 0 L 100 100 L 0 100 Z";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderScript {
    pub output_format: &'static str,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub duration: f64,
    pub elements: Vec<TimelineElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineElement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub track: u32,
    pub time: f64,
    pub duration: f64,
    pub x: String,
    pub y: String,
    pub width: String,
    pub height: String,
    pub x_anchor: String,
    pub y_anchor: String,
    #[serde(flatten)]
    pub primitive: Primitive,
    pub animations: Vec<AnimationDirective>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Primitive {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        font_family: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        font_size: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        font_weight: Option<String>,
        fill_color: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        background_color: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        background_border_radius: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        x_alignment: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        y_alignment: Option<String>,
    },
    Image {
        source: String,
        fit: String,
    },
    Shape {
        path: String,
        fill_color: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        border_radius: Option<f64>,
    },
}

impl Primitive {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Shape { .. } => "shape",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveKind {
    Fade,
    Slide,
    Scale,
    Bounce,
    Pulse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Seconds from element start, or a percentage of the element's duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DirectiveTime {
    Seconds(f64),
    Percent(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationDirective {
    #[serde(rename = "type")]
    pub kind: DirectiveKind,
    pub time: DirectiveTime,
    pub duration: f64,
    pub easing: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_scale: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reversed: bool,
}

impl AnimationDirective {
    fn fade_in(duration: f64) -> Self {
        Self {
            kind: DirectiveKind::Fade,
            time: DirectiveTime::Seconds(0.0),
            duration,
            easing: DEFAULT_EASING,
            direction: None,
            start_scale: None,
            reversed: false,
        }
    }
}

/// Semantic effect resolved to the backend's directive vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Effect {
    kind: DirectiveKind,
    direction: Option<Direction>,
    start_scale: Option<&'static str>,
}

impl Effect {
    const FADE: Self = Self { kind: DirectiveKind::Fade, direction: None, start_scale: None };

    const fn slide(direction: Direction) -> Self {
        Self { kind: DirectiveKind::Slide, direction: Some(direction), start_scale: None }
    }

    const fn scale(start: &'static str) -> Self {
        Self { kind: DirectiveKind::Scale, direction: None, start_scale: Some(start) }
    }
}

/// `None` means "no animation". Unrecognised names fall back to a fade.
fn map_effect(name: &str) -> Option<Effect> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "none" => None,
        "fade" => Some(Effect::FADE),
        "slide-up" => Some(Effect::slide(Direction::Up)),
        "slide-down" => Some(Effect::slide(Direction::Down)),
        "slide-left" => Some(Effect::slide(Direction::Left)),
        "slide-right" => Some(Effect::slide(Direction::Right)),
        "zoom-in" => Some(Effect::scale("0%")),
        "zoom-out" => Some(Effect::scale("150%")),
        "bounce" => Some(Effect { kind: DirectiveKind::Bounce, direction: None, start_scale: None }),
        "pulse" => Some(Effect { kind: DirectiveKind::Pulse, direction: None, start_scale: None }),
        other => {
            tracing::debug!(effect = other, "unrecognised effect, using fade");
            Some(Effect::FADE)
        }
    }
}

pub fn map_easing(name: Option<&str>) -> &'static str {
    match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
        Some("linear") => "linear",
        Some("ease-in") => "quadratic-in",
        Some("ease-out") => "quadratic-out",
        Some("ease-in-out") => "quadratic-in-out",
        _ => DEFAULT_EASING,
    }
}

/// Elements without a hold run until the end of the video. Anything that
/// would overrun the video is clamped to the time remaining after its delay.
pub fn element_duration(animation: &ElementAnimation, spec_duration: f64) -> f64 {
    let delay = animation.entry_delay.max(0.0);
    let remaining = (spec_duration - delay).max(0.0);
    match animation.hold {
        Some(hold) if hold > 0.0 => {
            let exit = animation.exit_duration.unwrap_or(0.0).max(0.0);
            (animation.entry_duration.max(0.0) + hold + exit).min(remaining)
        }
        _ => remaining,
    }
}

/// Start of the exit animation as a percentage of the element's duration, in `[0, 100]`.
pub fn exit_start_percent(element_duration: f64, exit_duration: f64) -> f64 {
    if element_duration <= 0.0 {
        return 0.0;
    }
    ((element_duration - exit_duration) / element_duration * 100.0).clamp(0.0, 100.0)
}

fn format_percent(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded}%")
}

fn animations_for(animation: &ElementAnimation, duration: f64) -> Vec<AnimationDirective> {
    let easing = map_easing(animation.easing.as_deref());
    let mut directives = Vec::new();

    if let Some(effect) = map_effect(&animation.entry) {
        directives.push(AnimationDirective {
            kind: effect.kind,
            time: DirectiveTime::Seconds(0.0),
            duration: animation.entry_duration.max(0.0),
            easing,
            direction: effect.direction,
            start_scale: effect.start_scale,
            reversed: false,
        });
    }

    if let Some(effect) = animation.exit.as_deref().and_then(map_effect) {
        let exit = animation.exit_duration.unwrap_or(0.0).max(0.0);
        directives.push(AnimationDirective {
            kind: effect.kind,
            time: DirectiveTime::Percent(format_percent(exit_start_percent(duration, exit))),
            duration: exit,
            easing,
            direction: effect.direction,
            start_scale: effect.start_scale,
            reversed: true,
        });
    }

    if directives.is_empty() {
        directives.push(AnimationDirective::fade_in(SAFETY_FADE_SECS));
    }
    directives
}

fn is_url(src: &str) -> bool {
    let src = src.trim_start();
    src.starts_with("http://") || src.starts_with("https://")
}

fn background_color(specs: &AnimationSpecs) -> String {
    specs
        .source_analysis
        .as_ref()
        .and_then(|a| a.dominant_colors.first())
        .filter(|c| !c.trim().is_empty())
        .cloned()
        .or_else(|| specs.background.as_ref().map(|b| b.value.clone()).filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_BACKGROUND.to_string())
}

fn primitive_for(element: &AnimationElement, specs: &AnimationSpecs) -> Option<Primitive> {
    let style = &element.style;
    match element.kind {
        ElementType::Text | ElementType::Cta => {
            let is_cta = element.kind == ElementType::Cta;
            Some(Primitive::Text {
                text: element.content.clone(),
                font_family: style.font_family.clone(),
                font_size: style.font_size,
                font_weight: style.font_weight.as_ref().map(ToString::to_string),
                fill_color: style.color.clone().unwrap_or_else(|| DEFAULT_TEXT_COLOR.into()),
                background_color: style.background_color.clone(),
                background_border_radius: style.background_color.as_ref().and(style.border_radius),
                x_alignment: is_cta.then(|| "50%".into()),
                y_alignment: is_cta.then(|| "50%".into()),
            })
        }
        ElementType::Image | ElementType::Logo => {
            let src = if element.content.trim().is_empty() { &specs.source_image } else { &element.content };
            if is_url(src) {
                Some(Primitive::Image { source: src.trim().to_string(), fit: "contain".into() })
            } else {
                // Embedded image data cannot be forwarded; the render API only fetches URLs.
                tracing::debug!(element = %element.id, "image source is not a URL, using placeholder");
                Some(Primitive::Shape {
                    path: RECT_PATH.into(),
                    fill_color: style.background_color.clone().unwrap_or_else(|| PLACEHOLDER_FILL.into()),
                    border_radius: style.border_radius,
                })
            }
        }
        ElementType::Shape => Some(Primitive::Shape {
            path: RECT_PATH.into(),
            fill_color: style
                .background_color
                .clone()
                .or_else(|| style.color.clone())
                .unwrap_or_else(|| background_color(specs)),
            border_radius: style.border_radius,
        }),
        ElementType::Background => Some(Primitive::Shape {
            path: RECT_PATH.into(),
            fill_color: style.background_color.clone().unwrap_or_else(|| background_color(specs)),
            border_radius: None,
        }),
        ElementType::Unknown => None,
    }
}

fn background_layer(specs: &AnimationSpecs) -> TimelineElement {
    TimelineElement {
        name: Some("background".into()),
        track: 0,
        time: 0.0,
        duration: specs.duration.max(0.0),
        x: "50%".into(),
        y: "50%".into(),
        width: "100%".into(),
        height: "100%".into(),
        x_anchor: "50%".into(),
        y_anchor: "50%".into(),
        primitive: Primitive::Shape {
            path: RECT_PATH.into(),
            fill_color: background_color(specs),
            border_radius: None,
        },
        animations: vec![AnimationDirective::fade_in(BACKGROUND_FADE_SECS)],
    }
}

fn compile_element(element: &AnimationElement, specs: &AnimationSpecs, track: u32) -> Option<TimelineElement> {
    let primitive = primitive_for(element, specs)?;
    let duration = element_duration(&element.animation, specs.duration);
    let b = element.bounds;
    let full_frame = element.kind == ElementType::Background;

    Some(TimelineElement {
        name: Some(element.id.clone()),
        track,
        time: element.animation.entry_delay.max(0.0),
        duration,
        x: if full_frame { "50%".into() } else { format_percent(b.x) },
        y: if full_frame { "50%".into() } else { format_percent(b.y) },
        width: if full_frame { "100%".into() } else { format_percent(b.width) },
        height: if full_frame { "100%".into() } else { format_percent(b.height) },
        x_anchor: if full_frame { "50%".into() } else { "0%".into() },
        y_anchor: if full_frame { "50%".into() } else { "0%".into() },
        primitive,
        animations: animations_for(&element.animation, duration),
    })
}

/// Background first on track 0, then one track per element in input order.
pub fn compile(specs: &AnimationSpecs) -> RenderScript {
    let mut elements = vec![background_layer(specs)];
    let mut track = 0u32;
    for element in &specs.elements {
        track += 1;
        match compile_element(element, specs, track) {
            Some(compiled) => elements.push(compiled),
            None => {
                tracing::debug!(element = %element.id, kind = ?element.kind, "dropping element without a primitive")
            }
        }
    }

    RenderScript {
        output_format: OUTPUT_FORMAT,
        width: specs.format.width,
        height: specs.format.height,
        frame_rate: FRAME_RATE,
        duration: specs.duration,
        elements,
    }
}
