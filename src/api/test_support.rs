//! Router fixtures and request helpers shared by endpoint tests.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use crate::api::router::api_router;
use crate::chat::StreamEvent;
use crate::config::AppConfig;
use crate::core_state::CoreState;
use crate::pipeline::generation::MockLlm;
use crate::pipeline::retrieval::testing::{topic_knowledge_base, DownEmbedder, TopicEmbedder};
use crate::pipeline::retrieval::EmbeddingModel;
use crate::pipeline::translation::{MockTranslator, Translator};

const BODY_LIMIT: usize = 1024 * 1024;

pub struct TestServices {
    pub llm: MockLlm,
    pub translator: Option<MockTranslator>,
    pub embedder_down: bool,
}

impl Default for TestServices {
    fn default() -> Self {
        Self {
            llm: MockLlm::new("Rest in a quiet room and drink water."),
            translator: Some(MockTranslator::with(&[
                ("başım ağrıyor", "I have a headache"),
                (
                    "Rest in a quiet room and drink water.",
                    "Sessiz bir odada dinlenin ve su için.",
                ),
            ])),
            embedder_down: false,
        }
    }
}

pub fn test_core(services: TestServices) -> Arc<CoreState> {
    let mut config = AppConfig::default();
    config.pipeline.classifier_fallback = false;
    let embedder: Box<dyn EmbeddingModel> = if services.embedder_down {
        Box::new(DownEmbedder)
    } else {
        Box::new(TopicEmbedder)
    };
    let translator = services
        .translator
        .map(|t| Box::new(t) as Box<dyn Translator>);
    Arc::new(CoreState::with_services(
        config,
        topic_knowledge_base(),
        embedder,
        Box::new(services.llm),
        translator,
    ))
}

pub fn test_router(services: TestServices) -> Router {
    api_router(test_core(services))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    (status, body.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(bytes).unwrap()
    }
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, bytes) = send(app, request).await;
    (status, json_body(&bytes))
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let (status, bytes) = send(app, post(uri, body)).await;
    (status, json_body(&bytes))
}

/// Read a whole event stream and decode every `data:` line.
pub async fn post_sse(app: &Router, uri: &str, body: Value) -> (StatusCode, Vec<StreamEvent>) {
    let (status, bytes) = send(app, post(uri, body)).await;
    let text = String::from_utf8(bytes).unwrap();
    let events = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect();
    (status, events)
}
