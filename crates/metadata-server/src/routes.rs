use crate::auth::{Verifier, SCOPE_DELETE, SCOPE_WRITE};
use crate::identity::IdentityProvider;
use crate::metrics;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metadata_core::{
    resolve, Document, Envelope, FilterSpec, MetaError, Page, QueryParser, Result, ResultSet,
    ServiceRequest, DID_FIELD,
};
use metadata_storage::Records;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct AppState {
    pub records: Records,
    pub parser: Arc<dyn QueryParser>,
    pub verifier: Arc<Verifier>,
    pub identity: Arc<IdentityProvider>,
    pub service: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route(
            "/record",
            get(get_record).post(post_record).delete(delete_record),
        )
        .route("/search", post(search))
        .route("/count", post(count))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// An envelope whose HTTP status mirrors `Envelope::status`.
pub struct Reply(pub Envelope);

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

fn reply(app: &AppState, op: &'static str, outcome: Result<ResultSet>) -> Reply {
    let env = match outcome {
        Ok(results) => {
            debug!(op, nrecords = results.nrecords, "ok");
            Envelope::ok(&app.service, results)
        }
        Err(e) => {
            let env = Envelope::from_error(&app.service, &e);
            if env.status >= 500 {
                error!(op, code = ?env.code, error = %e, "request failed");
            } else {
                warn!(op, code = ?env.code, error = %e, "request rejected");
            }
            env
        }
    };
    metrics::record(op, env.code);
    Reply(env)
}

#[derive(Debug, Deserialize)]
struct DidParam {
    #[serde(default)]
    did: String,
}

fn did_param(params: std::result::Result<Query<DidParam>, QueryRejection>) -> Result<String> {
    let Query(p) = params.map_err(|e| MetaError::Bind(e.body_text()))?;
    if p.did.is_empty() {
        return Err(MetaError::Bind("did parameter is required".into()));
    }
    Ok(p.did)
}

fn service_request(body: &[u8]) -> Result<ServiceRequest> {
    serde_json::from_slice(body).map_err(|e| MetaError::Parse(format!("invalid request: {e}")))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_text() -> impl IntoResponse {
    (StatusCode::OK, metrics::render())
}

async fn get_record(
    State(app): State<AppState>,
    params: std::result::Result<Query<DidParam>, QueryRejection>,
) -> Reply {
    let _timer = metrics::OP_DURATION.with_label_values(&["get"]).start_timer();
    let outcome = retrieve(&app, params).await;
    reply(&app, "get", outcome)
}

async fn retrieve(
    app: &AppState,
    params: std::result::Result<Query<DidParam>, QueryRejection>,
) -> Result<ResultSet> {
    let did = did_param(params)?;
    let docs = app
        .records
        .get(Some(&FilterSpec::by_did(&did)), Page::all())
        .await?;
    Ok(ResultSet::records(docs.len() as u64, docs))
}

async fn post_record(State(app): State<AppState>, headers: HeaderMap, body: Bytes) -> Reply {
    let _timer = metrics::OP_DURATION.with_label_values(&["insert"]).start_timer();
    let outcome = insert(&app, &headers, &body).await;
    reply(&app, "insert", outcome)
}

async fn insert(app: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<ResultSet> {
    app.verifier.verify(headers)?.require(SCOPE_WRITE)?;
    let doc = match serde_json::from_slice::<JsonValue>(body) {
        Ok(JsonValue::Object(doc)) => doc,
        Ok(_) => return Err(MetaError::Parse("record must be a JSON object".into())),
        Err(e) => return Err(MetaError::Parse(format!("invalid record: {e}"))),
    };
    let did = app.records.insert(doc).await?;
    let mut echo = Document::new();
    echo.insert(DID_FIELD.to_string(), JsonValue::String(did));
    Ok(ResultSet::records(1, vec![echo]))
}

async fn search(State(app): State<AppState>, headers: HeaderMap, body: Bytes) -> Reply {
    let _timer = metrics::OP_DURATION.with_label_values(&["search"]).start_timer();
    let outcome = find(&app, &headers, &body).await;
    reply(&app, "search", outcome)
}

async fn find(app: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<ResultSet> {
    app.verifier.verify(headers)?;
    let req = service_request(body)?;
    let spec = resolve(&req.service_query, app.parser.as_ref())?;
    debug!(client = %req.client, ?spec, "search");
    app.records.search(spec.as_ref(), &req.service_query).await
}

async fn count(State(app): State<AppState>, headers: HeaderMap, body: Bytes) -> Reply {
    let _timer = metrics::OP_DURATION.with_label_values(&["count"]).start_timer();
    let outcome = tally(&app, &headers, &body).await;
    reply(&app, "count", outcome)
}

async fn tally(app: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<ResultSet> {
    app.verifier.verify(headers)?;
    let req = service_request(body)?;
    let spec = resolve(&req.service_query, app.parser.as_ref())?;
    let n = app.records.count(spec.as_ref()).await?;
    Ok(ResultSet::count(n))
}

async fn delete_record(
    State(app): State<AppState>,
    headers: HeaderMap,
    params: std::result::Result<Query<DidParam>, QueryRejection>,
) -> Reply {
    let _timer = metrics::OP_DURATION.with_label_values(&["remove"]).start_timer();
    let outcome = remove(&app, &headers, params).await;
    reply(&app, "remove", outcome)
}

async fn remove(
    app: &AppState,
    headers: &HeaderMap,
    params: std::result::Result<Query<DidParam>, QueryRejection>,
) -> Result<ResultSet> {
    let grant = app.verifier.verify(headers)?;
    grant.require(SCOPE_DELETE)?;
    let did = did_param(params)?;
    let user = grant
        .user
        .ok_or_else(|| MetaError::MissingIdentity("token carries no user".into()))?;
    let identity = app.identity.lookup(&user)?;
    let removed = app.records.remove(&did, &identity).await?;
    Ok(ResultSet::count(removed))
}
