// Vanish Ephemeral Paste Hosting
// Copyright (C) 2021  Edward Shen
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

#![warn(clippy::nursery, clippy::pedantic)]

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, TypedHeader};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use futures::StreamExt;
use serde_json::Value;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use vanish_common::{
    CreatePaste, CreatedPaste, ErrorBody, Gone, PasteView, Url, MAX_TTL_SECONDS, MAX_VIEWS,
};

use crate::config::{Backend, Opts};
use crate::reader::{ConsumeError, Consumed, PasteReader, ViewLimit};
use crate::short_code::PasteId;
use crate::store::{MemoryStore, RocksStore, Store};
use crate::time::{request_now, TestNow};
use crate::writer::{bound_message, CreateError, PasteWriter};

mod config;
mod paste;
mod reader;
mod short_code;
mod store;
mod time;
mod writer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();

    let store: Arc<dyn Store> = match opts.store {
        Backend::Memory => {
            warn!("Using the in-memory store; pastes will not survive a restart");
            Arc::new(MemoryStore::default())
        }
        Backend::Rocksdb => Arc::new(RocksStore::open(&opts.db_path)?),
    };

    if opts.test_mode {
        warn!("Test mode is on; clients can set the clock with x-test-now-ms");
    }

    let state = AppState::new(
        store,
        opts.base_url.clone(),
        opts.view_limit(),
        opts.test_mode,
    );

    let mut signals = Signals::new(&[SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();

    info!("Listening on {}", opts.bind);
    axum::Server::bind(&opts.bind)
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(async move {
            signals.next().await;
            info!("Shutting down");
        })
        .await?;

    signals_handle.close();
    Ok(())
}

#[derive(Clone)]
struct AppState {
    writer: Arc<PasteWriter>,
    reader: Arc<PasteReader>,
    test_mode: bool,
}

impl AppState {
    fn new(store: Arc<dyn Store>, base_url: Url, view_limit: ViewLimit, test_mode: bool) -> Self {
        Self {
            writer: Arc::new(PasteWriter::new(Arc::clone(&store), base_url)),
            reader: Arc::new(PasteReader::new(store, view_limit)),
            test_mode,
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/pastes", post(create))
        .route("/api/pastes/:id", get(read))
        .route("/p/:id", get(view))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

/// A failed request: the status plus an `{"error": ...}` body.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(error),
        }
    }

    fn internal(error: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<CreateError> for ApiError {
    fn from(e: CreateError) -> Self {
        match e {
            CreateError::Validation(message) => Self::new(StatusCode::BAD_REQUEST, message),
            // Already logged by the writer.
            CreateError::Storage(_) => Self::internal("Failed to create paste"),
        }
    }
}

impl From<ConsumeError> for ApiError {
    fn from(e: ConsumeError) -> Self {
        // Gone pastes are an ordinary outcome; only store trouble is an error.
        e.gone().map_or_else(
            || {
                error!("Failed to read paste: {}", e);
                Self::internal("Failed to read paste")
            },
            |gone| Self::new(StatusCode::NOT_FOUND, gone.as_str()),
        )
    }
}

#[instrument(skip(state, payload))]
async fn create(
    Extension(state): Extension<AppState>,
    maybe_now: Option<TypedHeader<TestNow>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedPaste>), ApiError> {
    let Json(body) =
        payload.map_err(|rejection| ApiError::new(StatusCode::BAD_REQUEST, rejection.to_string()))?;
    let request = create_request(&body)?;
    let now = request_now(state.test_mode, maybe_now.map(|v| v.0));

    let writer = Arc::clone(&state.writer);
    let created = task::spawn_blocking(move || writer.create(request, now))
        .await
        .map_err(|e| {
            error!("Failed to join handle: {}", e);
            ApiError::internal("Failed to create paste")
        })??;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Pulls a create request out of a JSON body. Limits of the wrong type get
/// the same message as limits out of range.
fn create_request(body: &Value) -> Result<CreatePaste, ApiError> {
    let content = match body.get("content") {
        Some(Value::String(content)) => content.clone(),
        _ => return Err(ApiError::new(StatusCode::BAD_REQUEST, "content required")),
    };

    Ok(CreatePaste {
        content,
        ttl_seconds: limit(body, "ttl_seconds", MAX_TTL_SECONDS)?,
        max_views: limit(body, "max_views", MAX_VIEWS)?,
    })
}

fn limit(body: &Value, name: &str, max: u32) -> Result<Option<i64>, ApiError> {
    match body.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, bound_message(name, max))),
    }
}

#[instrument(skip(state))]
async fn read(
    Extension(state): Extension<AppState>,
    maybe_now: Option<TypedHeader<TestNow>>,
    Path(id): Path<String>,
) -> Result<Json<PasteView>, ApiError> {
    let consumed = consume(&state, maybe_now, &id).await?;
    Ok(Json(consumed.into()))
}

/// The link handed out on creation; serves the bare content.
#[instrument(skip(state))]
async fn view(
    Extension(state): Extension<AppState>,
    maybe_now: Option<TypedHeader<TestNow>>,
    Path(id): Path<String>,
) -> Result<String, ApiError> {
    let consumed = consume(&state, maybe_now, &id).await?;
    Ok(consumed.content)
}

async fn consume(
    state: &AppState,
    maybe_now: Option<TypedHeader<TestNow>>,
    id: &str,
) -> Result<Consumed, ApiError> {
    // Anything that can't be an id can't be a paste either.
    let id: PasteId = id
        .parse()
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, Gone::NotFound.as_str()))?;
    let now = request_now(state.test_mode, maybe_now.map(|v| v.0));

    let reader = Arc::clone(&state.reader);
    let consumed = task::spawn_blocking(move || reader.consume(&id, now))
        .await
        .map_err(|e| {
            error!("Failed to join handle: {}", e);
            ApiError::internal("Failed to read paste")
        })??;

    Ok(consumed)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::paste::{self, PasteRecord, Policy};
    use crate::store::tests::FailingStore;

    fn app(view_limit: ViewLimit) -> Router {
        router(AppState::new(
            Arc::new(MemoryStore::default()),
            Url::parse("http://paste.test").unwrap(),
            view_limit,
            true,
        ))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, body.to_vec())
    }

    async fn post_json(app: &Router, body: &str, now: i64) -> (StatusCode, Value) {
        let request = Request::post("/api/pastes")
            .header("content-type", "application/json")
            .header("x-test-now-ms", now.to_string())
            .body(Body::from(body.to_owned()))
            .unwrap();
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn get_json(app: &Router, path: &str, now: i64) -> (StatusCode, Value) {
        let request = Request::get(path)
            .header("x-test-now-ms", now.to_string())
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn create_paste(app: &Router, body: Value, now: i64) -> String {
        let (status, created) = post_json(app, &body.to_string(), now).await;
        assert_eq!(status, StatusCode::CREATED, "{}", created);
        created["id"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn create_returns_id_and_link() {
        let app = app(ViewLimit::Loose);
        let (status, created) =
            post_json(&app, r#"{"content":"hello","ttl_seconds":60}"#, 1000).await;

        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap();
        assert_eq!(created["url"], format!("http://paste.test/p/{}", id));
    }

    #[tokio::test]
    async fn create_reports_validation_errors() {
        let app = app(ViewLimit::Loose);

        let cases = [
            (json!({"content": "   "}), "content required"),
            (
                json!({"content": "x", "ttl_seconds": 0}),
                "ttl_seconds must be between 1 and 604800",
            ),
            (
                json!({"content": "x", "ttl_seconds": 604_801}),
                "ttl_seconds must be between 1 and 604800",
            ),
            (
                json!({"content": "x", "max_views": -1}),
                "max_views must be between 1 and 100",
            ),
            (
                json!({"content": "x", "max_views": 101}),
                "max_views must be between 1 and 100",
            ),
        ];

        for (body, message) in cases {
            let (status, error) = post_json(&app, &body.to_string(), 0).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
            assert_eq!(error["error"], message);
        }
    }

    #[tokio::test]
    async fn create_rejects_malformed_bodies() {
        let app = app(ViewLimit::Loose);

        let (status, error) = post_json(&app, "not json", 0).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error["error"].is_string());

        let cases = [
            (r#"{"ttl_seconds":5}"#, "content required"),
            (r#"{"content":42}"#, "content required"),
            (
                r#"{"content":"x","ttl_seconds":"60"}"#,
                "ttl_seconds must be between 1 and 604800",
            ),
            (
                r#"{"content":"x","ttl_seconds":1.5}"#,
                "ttl_seconds must be between 1 and 604800",
            ),
            (
                r#"{"content":"x","max_views":true}"#,
                "max_views must be between 1 and 100",
            ),
        ];
        for (body, message) in cases {
            let (status, error) = post_json(&app, body, 0).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
            assert_eq!(error["error"], message, "{}", body);
        }

        let (status, _) = post_json(&app, r#"{"content":"x","ttl_seconds":null}"#, 0).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn store_failures_are_opaque_server_errors() {
        let id: PasteId = "V1StGXR8_Z5jdHi6B-myT".parse().unwrap();
        let record = PasteRecord::new("x".to_owned(), 0, Policy::default());
        let app = router(AppState::new(
            Arc::new(FailingStore::seeded(&paste::key(&id), record.into_fields())),
            Url::parse("http://paste.test").unwrap(),
            ViewLimit::Loose,
            true,
        ));

        let (status, error) = post_json(&app, r#"{"content":"hello"}"#, 0).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error, json!({"error": "Failed to create paste"}));

        let (status, error) = get_json(&app, &format!("/api/pastes/{}", id), 0).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error, json!({"error": "Failed to read paste"}));

        // Missing pastes stay 404 even when the store can't be written to.
        let (status, error) = get_json(&app, "/api/pastes/AAAAAAAAAAAAAAAAAAAAA", 0).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], "not_found");
    }

    #[tokio::test]
    async fn hello_walkthrough_over_http() {
        let app = app(ViewLimit::Loose);
        let id = create_paste(
            &app,
            json!({"content": "hello", "ttl_seconds": 60, "max_views": 2}),
            1000,
        )
        .await;
        let path = format!("/api/pastes/{}", id);

        let (status, view) = get_json(&app, &path, 1010).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            view,
            json!({
                "content": "hello",
                "remaining_views": 1,
                "expires_at": "1970-01-01T00:01:01Z",
            })
        );

        let (status, view) = get_json(&app, &path, 1020).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["remaining_views"], 0);

        let (status, error) = get_json(&app, &path, 1030).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error, json!({"error": "view_limit_reached"}));

        let (status, error) = get_json(&app, &path, 1040).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error, json!({"error": "not_found"}));
    }

    #[tokio::test]
    async fn expired_paste_reports_expired_then_not_found() {
        let app = app(ViewLimit::Loose);
        let id = create_paste(&app, json!({"content": "brief", "ttl_seconds": 1}), 0).await;
        let path = format!("/api/pastes/{}", id);

        let (status, _) = get_json(&app, &path, 999).await;
        assert_eq!(status, StatusCode::OK);

        let (status, error) = get_json(&app, &path, 1000).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], "expired");

        let (_, error) = get_json(&app, &path, 1000).await;
        assert_eq!(error["error"], "not_found");
    }

    #[tokio::test]
    async fn unlimited_paste_reports_null_limits() {
        let app = app(ViewLimit::Loose);
        let id = create_paste(&app, json!({"content": "forever"}), 0).await;

        let (status, view) = get_json(&app, &format!("/api/pastes/{}", id), 0).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["remaining_views"], Value::Null);
        assert_eq!(view["expires_at"], Value::Null);
    }

    #[tokio::test]
    async fn malformed_ids_are_not_found() {
        let app = app(ViewLimit::Loose);
        for path in ["/api/pastes/nope", "/api/pastes/V1StGXR8_Z5jdHi6B-myT", "/p/nope"] {
            let (status, error) = get_json(&app, path, 0).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
            assert_eq!(error["error"], "not_found");
        }
    }

    #[tokio::test]
    async fn view_link_serves_plain_content_and_counts() {
        let app = app(ViewLimit::Strict);
        let id = create_paste(&app, json!({"content": "raw text", "max_views": 1}), 0).await;

        let request = Request::get(format!("/p/{}", id)).body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"raw text");

        let (status, error) = get_json(&app, &format!("/api/pastes/{}", id), 0).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], "view_limit_reached");
    }

    #[tokio::test]
    async fn clock_header_is_ignored_outside_test_mode() {
        let app = router(AppState::new(
            Arc::new(MemoryStore::default()),
            Url::parse("http://paste.test").unwrap(),
            ViewLimit::Loose,
            false,
        ));
        let id = create_paste(&app, json!({"content": "x", "ttl_seconds": 60}), 0).await;

        // A far future clock would expire the paste if it were honored.
        let (status, _) = get_json(&app, &format!("/api/pastes/{}", id), i64::MAX).await;
        assert_eq!(status, StatusCode::OK);
    }
}
