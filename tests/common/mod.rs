#![allow(dead_code)]

use ad_renderer::{config::Config, dispatch::RetryPolicy, AnimationSpecs};
use axum::Router;
use serde_json::json;
use std::time::Duration;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn config() -> Config {
    Config {
        poll: RetryPolicy { interval: Duration::from_millis(1), max_attempts: 5 },
        ..Config::default()
    }
}

pub fn specs() -> AnimationSpecs {
    serde_json::from_value(json!({
        "platform": { "id": "tiktok", "name": "TikTok" },
        "format": {
            "id": "in-feed",
            "name": "In-Feed",
            "aspectRatio": "9:16",
            "width": 1080,
            "height": 1920,
            "minDuration": 5,
            "maxDuration": 60
        },
        "duration": 15,
        "sourceImage": "data:image/png;base64,iVBORw0KGgo=",
        "sourceAnalysis": { "dominantColors": ["#112233", "#f5f5f5"] },
        "elements": [
            {
                "id": "headline",
                "type": "text",
                "bounds": { "x": 10, "y": 12, "width": 80, "height": 10 },
                "content": "Summer Sale",
                "style": { "fontFamily": "Montserrat", "fontSize": 64, "fontWeight": 800, "color": "#ffffff" },
                "animation": { "entry": "slide-up", "entryDuration": 0.6, "entryDelay": 0.5, "easing": "ease-out" }
            },
            {
                "id": "logo",
                "type": "logo",
                "bounds": { "x": 40, "y": 80, "width": 20, "height": 8 },
                "content": "data:image/png;base64,AAAA",
                "style": { "backgroundColor": "#333333" },
                "animation": {
                    "entry": "zoom-in",
                    "entryDuration": 0.5,
                    "entryDelay": 1,
                    "hold": 3,
                    "exit": "fade",
                    "exitDuration": 0.5
                }
            },
            {
                "id": "cta",
                "type": "cta",
                "bounds": { "x": 25, "y": 65, "width": 50, "height": 8 },
                "content": "Shop Now",
                "style": { "backgroundColor": "#ff3366", "borderRadius": 24 },
                "animation": { "entry": "pulse", "entryDuration": 0.8, "entryDelay": 2 }
            }
        ]
    }))
    .unwrap()
}
