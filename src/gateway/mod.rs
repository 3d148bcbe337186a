//! Data API Gateway.
//!
//! Thin HTTP surface over the Query Engine: JSON in, JSON out, no
//! business logic beyond parameter parsing and envelope shaping, routed
//! through a uniform `/api/v1/data/{plugin}/{source}/{verb}` surface.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::WickedError;
use crate::orchestrator::{self, IndexOptions};
use crate::query::{Direction, QueryEngine};
use crate::store::Store;

/// Default port the HTTP gateway binds to.
pub const DEFAULT_PORT: u16 = 18889;

/// The single plugin this binary implements. `{plugin}` and `{source}`
/// in the route both must match this literally — anything else is an
/// uninstalled plugin, reported via the graceful-degradation contract
/// rather than routed anywhere.
const SELF_PLUGIN: &str = "wicked-search";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub root_path: std::path::PathBuf,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// Maps any failure surfaced by a handler into the standard
/// `{error: {code, message, details}}` envelope.
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    fn bad_input(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_input",
            message: message.into(),
            details: None,
        }
    }
}

impl From<WickedError> for ApiError {
    fn from(err: WickedError) -> Self {
        let details = match &err {
            WickedError::NotFound { suggestions, .. } if !suggestions.is_empty() => {
                Some(serde_json::json!({ "suggestions": suggestions }))
            }
            _ => None,
        };
        Self {
            status: StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: err.code(),
            message: err.to_string(),
            details,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: err.to_string(),
            details: None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: format!("failed to serialize response: {err}"),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, serde::Deserialize, Default)]
struct VerbParams {
    limit: Option<u32>,
    offset: Option<u32>,
    query: Option<String>,
    project: Option<String>,
    id: Option<String>,
    depth: Option<u32>,
    direction: Option<String>,
    layer: Option<String>,
    #[serde(rename = "type")]
    symbol_type: Option<String>,
}

impl VerbParams {
    fn project(&self) -> String {
        crate::model::normalize_project(self.project.as_deref())
    }

    fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(crate::query::DEFAULT_LIMIT)
            .min(crate::query::MAX_LIMIT)
    }

    fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/data/plugins", get(list_plugins))
        .route("/api/v1/data/:plugin/:source/:verb", get(dispatch_verb))
        .route("/api/v1/data/refresh", post(refresh_manifests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener, state).await
}

pub async fn serve_with_listener(listener: TcpListener, state: AppState) -> Result<()> {
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct PluginSource {
    name: String,
    verbs: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct PluginManifest {
    name: String,
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<PluginSource>,
}

const VERBS: &[&str] = &[
    "list", "get", "search", "stats", "refs", "traverse", "blast_radius", "hotspots", "lineage",
    "service_map", "categories", "impact", "content",
];

/// Companion plugins (kanban, crew, dashboard, …) are out of scope for
/// this binary; they are listed here only so `plugins` reflects the full
/// family and reports them unavailable rather than silently omitting them.
const COMPANION_PLUGINS: &[&str] = &["wicked-kanban", "wicked-memory", "wicked-crew", "wicked-dashboard"];

async fn list_plugins() -> Json<Vec<PluginManifest>> {
    let mut manifests = vec![PluginManifest {
        name: SELF_PLUGIN.to_string(),
        available: true,
        reason: None,
        sources: vec![PluginSource {
            name: SELF_PLUGIN.to_string(),
            verbs: VERBS.to_vec(),
        }],
    }];
    for name in COMPANION_PLUGINS {
        manifests.push(PluginManifest {
            name: name.to_string(),
            available: false,
            reason: Some("plugin not installed".to_string()),
            sources: Vec::new(),
        });
    }
    Json(manifests)
}

async fn refresh_manifests() -> Json<Vec<PluginManifest>> {
    list_plugins().await
}

async fn dispatch_verb(
    State(state): State<AppState>,
    AxumPath((plugin, source, verb)): AxumPath<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    if plugin != SELF_PLUGIN || source != SELF_PLUGIN {
        return Err(ApiError::not_found(format!(
            "plugin {plugin}/{source} is not installed in this binary"
        )));
    }

    let params = parse_verb_params(&params);
    let project = params.project();
    crate::model::validate_project_name(&project).map_err(ApiError::from)?;
    let store = state.store.lock().expect("store mutex poisoned");
    let engine = QueryEngine::new(&store);

    let limit = params.limit();
    let offset = params.offset();

    // Every branch below produces a full `{items, meta}` envelope
    // (Testable Property 9) — `list`/`search` paginate and build one
    // directly; every other verb's single value or complete list is
    // wrapped via `engine.envelope` instead of returned as bare JSON.
    let body: serde_json::Value = match verb.as_str() {
        "list" => serde_json::to_value(engine.list(&project, limit, offset)?)?,
        "get" => {
            let id = params.id.as_deref().ok_or_else(|| ApiError::bad_input("missing id parameter"))?;
            serde_json::to_value(engine.envelope(&project, vec![engine.get(&project, id)?], limit, offset))?
        }
        "content" => {
            let id = params.id.as_deref().ok_or_else(|| ApiError::bad_input("missing id parameter"))?;
            let content = engine.content(&project, id)?;
            serde_json::to_value(engine.envelope(&project, vec![serde_json::json!({ "content": content })], limit, offset))?
        }
        "search" => {
            let query = params.query.as_deref().unwrap_or("");
            serde_json::to_value(engine.search(&project, query, limit, offset)?)?
        }
        "stats" => serde_json::to_value(engine.envelope(&project, vec![engine.stats(&project)?], limit, offset))?,
        "refs" => {
            let id = params.id.as_deref().ok_or_else(|| ApiError::bad_input("missing id parameter"))?;
            serde_json::to_value(engine.envelope(&project, engine.refs(&project, id)?, limit, offset))?
        }
        "traverse" => {
            let id = params.id.as_deref().ok_or_else(|| ApiError::bad_input("missing id parameter"))?;
            let depth = params.depth.unwrap_or(1);
            let direction = Direction::parse(params.direction.as_deref().unwrap_or("both"))
                .map_err(ApiError::from)?;
            let result = engine.traverse(&project, id, depth, direction)?;
            serde_json::to_value(engine.envelope(&project, vec![result], limit, offset))?
        }
        "blast_radius" => {
            let id = params.id.as_deref().ok_or_else(|| ApiError::bad_input("missing id parameter"))?;
            let depth = params.depth.unwrap_or(2);
            let result = engine.blast_radius(&project, id, depth)?;
            serde_json::to_value(engine.envelope(&project, vec![result], limit, offset))?
        }
        "hotspots" => {
            let hotspots = engine.hotspots(&project, limit, params.layer.as_deref(), params.symbol_type.as_deref())?;
            serde_json::to_value(engine.envelope(&project, hotspots, limit, offset))?
        }
        "lineage" => {
            let name = params.query.as_deref().ok_or_else(|| ApiError::bad_input("missing query parameter"))?;
            serde_json::to_value(engine.envelope(&project, engine.lineage(&project, name)?, limit, offset))?
        }
        "service_map" => {
            let graph = engine.service_map(&project)?;
            serde_json::to_value(engine.envelope(&project, vec![graph], limit, offset))?
        }
        "categories" => {
            let categories = engine.categories(&project)?;
            serde_json::to_value(engine.envelope(&project, vec![categories], limit, offset))?
        }
        "impact" => {
            let name = params.query.as_deref().ok_or_else(|| ApiError::bad_input("missing query parameter"))?;
            let depth = params.depth.unwrap_or(2);
            let impact = engine.impact(&project, name, depth)?;
            serde_json::to_value(engine.envelope(&project, vec![impact], limit, offset))?
        }
        other => return Err(ApiError::bad_input(format!("unknown verb: {other}"))),
    };

    Ok(Json(body).into_response())
}

fn parse_verb_params(raw: &HashMap<String, String>) -> VerbParams {
    VerbParams {
        limit: raw.get("limit").and_then(|v| v.parse().ok()),
        offset: raw.get("offset").and_then(|v| v.parse().ok()),
        query: raw.get("query").cloned(),
        project: raw.get("project").cloned(),
        id: raw.get("id").cloned(),
        depth: raw.get("depth").and_then(|v| v.parse().ok()),
        direction: raw.get("direction").cloned(),
        layer: raw.get("layer").cloned(),
        symbol_type: raw.get("type").cloned(),
    }
}

/// Invoked by `POST /api/v1/data/refresh`'s CLI-mirror twin (`wicked-search
/// index`) and by the `serve` subcommand's own startup. Kept here rather
/// than in `orchestrator` since it is solely about wiring `IndexOptions`
/// from gateway state, not about indexing semantics.
pub fn reindex(state: &AppState, project: &str, incremental: bool) -> Result<orchestrator::IndexSummary> {
    let mut store = state.store.lock().expect("store mutex poisoned");
    let options = IndexOptions {
        project: project.to_string(),
        incremental,
        ..IndexOptions::default()
    };
    orchestrator::index(&mut store, &state.root_path, &options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn seeded_state() -> AppState {
        let mut store = Store::open_in_memory().unwrap();
        let symbol = crate::model::Symbol::new(
            PathBuf::from("src/a.rs"),
            "add".to_string(),
            "crate::add".to_string(),
            crate::model::SymbolType::Function,
            "rust".to_string(),
            1,
            1,
        );
        store
            .replace_file_symbols("default", &PathBuf::from("src/a.rs"), &[symbol])
            .unwrap();
        AppState {
            store: Arc::new(Mutex::new(store)),
            root_path: PathBuf::from("."),
        }
    }

    #[tokio::test]
    async fn list_plugins_reports_self_available_and_companions_not() {
        let Json(manifests) = list_plugins().await;
        let me = manifests.iter().find(|m| m.name == SELF_PLUGIN).unwrap();
        assert!(me.available);
        assert!(manifests.iter().any(|m| !m.available));
    }

    #[tokio::test]
    async fn dispatch_verb_list_returns_envelope_json() {
        let state = seeded_state();
        let mut params = HashMap::new();
        params.insert("limit".to_string(), "10".to_string());
        let response = dispatch_verb(
            State(state),
            AxumPath((SELF_PLUGIN.to_string(), SELF_PLUGIN.to_string(), "list".to_string())),
            Query(params),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dispatch_verb_rejects_unknown_plugin() {
        let state = seeded_state();
        let err = dispatch_verb(
            State(state),
            AxumPath(("other".to_string(), "other".to_string(), "list".to_string())),
            Query(HashMap::new()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dispatch_verb_rejects_invalid_project_name() {
        let state = seeded_state();
        let mut params = HashMap::new();
        params.insert("project".to_string(), "not valid!".to_string());
        let err = dispatch_verb(
            State(state),
            AxumPath((SELF_PLUGIN.to_string(), SELF_PLUGIN.to_string(), "list".to_string())),
            Query(params),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dispatch_verb_stats_returns_ok_wrapped_in_envelope() {
        let state = seeded_state();
        let response = dispatch_verb(
            State(state),
            AxumPath((SELF_PLUGIN.to_string(), SELF_PLUGIN.to_string(), "stats".to_string())),
            Query(HashMap::new()),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dispatch_verb_missing_id_is_bad_input() {
        let state = seeded_state();
        let err = dispatch_verb(
            State(state),
            AxumPath((SELF_PLUGIN.to_string(), SELF_PLUGIN.to_string(), "get".to_string())),
            Query(HashMap::new()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
