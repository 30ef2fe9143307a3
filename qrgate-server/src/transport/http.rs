//! HTTP transport
//!
//! # API Endpoints
//!
//! Operation routes take `multipart/form-data` and are rate limited per
//! client and route:
//!
//! - `POST /generate`: fields `text`, `compress`, `color`, `bg_color`,
//!   `logo` (file). Returns `image/png`.
//! - `POST /decode`: field `image` (file). Returns
//!   `{"decoded": "...", "compressed": false}`.
//! - `POST /ocr`: fields `image` (file) and `languages`
//!   (e.g. `en,ch_sim`). Returns `{"text": "..."}`.
//!
//! Reporting routes:
//!
//! - `GET /stats?bucket=hour|day`
//! - `GET /logs?action=&client=&since=&until=&limit=`
//! - `GET /logs/export`: CSV attachment
//! - `GET /health`
//! - `GET /metrics`: Prometheus text format
//!
//! Errors are JSON: `{"error": "...", "category": "rate_limited", "code": 429}`.
//! Rejected calls also carry a `Retry-After` header.

use super::Transport;
use crate::error::ApiError;
use crate::orchestrator::{DecodeRequest, GenerateRequest, OcrRequest, Orchestrator};
use crate::types::ClientKey;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        ConnectInfo, DefaultBodyLimit, FromRequestParts, Multipart, Query, Request, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::{Extensions, HeaderMap, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use qrgate::audit::{Action, Bucket, LogFilter};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

/// Knobs of the HTTP surface
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Take the client key from `X-Forwarded-For` when present
    pub trust_forwarded_for: bool,
    /// Record requests to reporting routes in the log
    pub audit_access: bool,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        HttpOptions {
            trust_forwarded_for: false,
            audit_access: true,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// HTTP transport implementation
pub struct HttpTransport {
    addr: SocketAddr,
    options: HttpOptions,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16, options: HttpOptions) -> Result<Self> {
        let addr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow!("Invalid HTTP address {host}:{port}: {e}"))?;
        Ok(Self { addr, options })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(self, orchestrator: Orchestrator) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("HTTP server listening on {}", self.addr);

        serve(listener, router(orchestrator, self.options), shutdown_signal()).await
    }
}

/// Serve `app` until `shutdown` resolves, exposing peer addresses to handlers
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Listen for SIGTERM and SIGINT (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}

pub struct AppState {
    orchestrator: Orchestrator,
    options: HttpOptions,
}

/// Build the API router
pub fn router(orchestrator: Orchestrator, options: HttpOptions) -> Router {
    let body_limit = options.max_upload_bytes;
    let state = Arc::new(AppState {
        orchestrator,
        options,
    });

    let reporting = Router::new()
        .route("/stats", get(handle_stats))
        .route("/logs", get(handle_logs))
        .route("/logs/export", get(handle_export))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            record_access,
        ));

    Router::new()
        .route("/generate", post(handle_generate))
        .route("/decode", post(handle_decode))
        .route("/ocr", post(handle_ocr))
        .merge(reporting)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn resolve_client(headers: &HeaderMap, extensions: &Extensions, trust: bool) -> ClientKey {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok());
    ClientKey::resolve(peer, forwarded_for, trust)
}

impl FromRequestParts<Arc<AppState>> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(resolve_client(
            &parts.headers,
            &parts.extensions,
            state.options.trust_forwarded_for,
        ))
    }
}

/// Log each successful or failed hit on a reporting route
async fn record_access(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if !state.options.audit_access {
        return next.run(request).await;
    }

    let client = resolve_client(
        request.headers(),
        request.extensions(),
        state.options.trust_forwarded_for,
    );
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    match state.orchestrator.record_access(&client, &path).await {
        Ok(()) => response,
        Err(e) => e.into_response(),
    }
}

fn parse_form_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::Validation(format!("malformed multipart body: {}", e.body_text()))
}

async fn field_text(field: Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(multipart_error)
}

async fn field_bytes(field: Field<'_>) -> Result<Vec<u8>, ApiError> {
    Ok(field.bytes().await.map_err(multipart_error)?.to_vec())
}

async fn read_generate(mut multipart: Multipart) -> Result<GenerateRequest, ApiError> {
    let mut request = GenerateRequest::default();
    let mut text = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => text = Some(field_text(field).await?),
            "compress" => {
                let value = field_text(field).await?;
                request.compress = parse_form_bool(&value).ok_or_else(|| {
                    ApiError::Validation(format!("invalid value for compress: {value:?}"))
                })?;
            }
            "color" => request.color = Some(field_text(field).await?),
            "bg_color" => request.bg_color = Some(field_text(field).await?),
            "logo" => {
                let logo = field_bytes(field).await?;
                request.logo = (!logo.is_empty()).then_some(logo);
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    request.text = text.ok_or_else(|| ApiError::Validation("field `text` is required".to_string()))?;
    Ok(request)
}

/// Read the `image` file and, when present, the `languages` field
async fn read_image(mut multipart: Multipart) -> Result<(Vec<u8>, Option<String>), ApiError> {
    let mut image = None;
    let mut languages = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => image = Some(field_bytes(field).await?),
            "languages" => languages = Some(field_text(field).await?),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let image = image.ok_or_else(|| ApiError::Validation("field `image` is required".to_string()))?;
    Ok((image, languages))
}

fn form(multipart: Result<Multipart, MultipartRejection>) -> Result<Multipart, ApiError> {
    multipart.map_err(|e| ApiError::Validation(e.body_text()))
}

async fn handle_generate(
    State(state): State<Arc<AppState>>,
    client: ClientKey,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let request = match form(multipart) {
        Ok(multipart) => read_generate(multipart).await,
        Err(e) => Err(e),
    };

    let png = state.orchestrator.generate(client, request).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn handle_decode(
    State(state): State<Arc<AppState>>,
    client: ClientKey,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let request = match form(multipart) {
        Ok(multipart) => read_image(multipart)
            .await
            .map(|(image, _)| DecodeRequest { image }),
        Err(e) => Err(e),
    };

    let output = state.orchestrator.decode(client, request).await?;
    Ok(Json(output).into_response())
}

async fn handle_ocr(
    State(state): State<Arc<AppState>>,
    client: ClientKey,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let request = match form(multipart) {
        Ok(multipart) => read_image(multipart)
            .await
            .map(|(image, languages)| OcrRequest { image, languages }),
        Err(e) => Err(e),
    };

    let output = state.orchestrator.ocr(client, request).await?;
    Ok(Json(output).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub bucket: Option<String>,
}

async fn handle_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, ApiError> {
    let bucket = query
        .bucket
        .as_deref()
        .filter(|b| !b.is_empty())
        .map(str::parse::<Bucket>)
        .transpose()
        .map_err(ApiError::Validation)?;

    let summary = state.orchestrator.stats(bucket).await?;
    Ok(Json(summary).into_response())
}

/// Raw `/logs` query string; parsed by hand so bad values are a 400 in
/// the API error format
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub action: Option<String>,
    pub client: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<String>,
}

fn parse_time(name: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ApiError::Validation(format!("invalid {name}: {e}")))
}

impl LogsQuery {
    pub fn into_filter(self) -> Result<LogFilter, ApiError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        Ok(LogFilter {
            action: non_empty(self.action)
                .map(|a| a.parse::<Action>())
                .transpose()
                .map_err(|e| ApiError::Validation(e.to_string()))?,
            client_key: non_empty(self.client),
            since: non_empty(self.since)
                .map(|s| parse_time("since", &s))
                .transpose()?,
            until: non_empty(self.until)
                .map(|s| parse_time("until", &s))
                .transpose()?,
            limit: non_empty(self.limit)
                .map(|l| {
                    l.parse::<usize>()
                        .map_err(|e| ApiError::Validation(format!("invalid limit: {e}")))
                })
                .transpose()?,
        })
    }
}

async fn handle_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, ApiError> {
    let entries = state.orchestrator.logs(query.into_filter()?).await?;
    Ok(Json(entries).into_response())
}

async fn handle_export(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let csv = state.orchestrator.export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=logs.csv"),
        ],
        csv,
    )
        .into_response())
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let ocr = if state.orchestrator.ocr_available() {
        "available"
    } else {
        "unavailable"
    };
    Json(json!({ "status": "ok", "ocr": ocr }))
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.orchestrator.metrics().export_prometheus(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form_bool() {
        assert_eq!(parse_form_bool("true"), Some(true));
        assert_eq!(parse_form_bool(" On "), Some(true));
        assert_eq!(parse_form_bool("0"), Some(false));
        assert_eq!(parse_form_bool(""), Some(false));
        assert_eq!(parse_form_bool("maybe"), None);
    }

    #[test]
    fn test_logs_query_into_filter() {
        let filter = LogsQuery {
            action: Some("decode_error".to_string()),
            client: Some("10.0.0.1".to_string()),
            since: Some("2024-05-06T07:00:00Z".to_string()),
            until: Some(String::new()),
            limit: Some("10".to_string()),
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.action, Some(Action::DecodeError));
        assert_eq!(filter.client_key.as_deref(), Some("10.0.0.1"));
        assert_eq!(
            filter.since.unwrap().to_rfc3339(),
            "2024-05-06T07:00:00+00:00"
        );
        assert_eq!(filter.until, None);
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn test_logs_query_rejects_bad_values() {
        let bad_action = LogsQuery {
            action: Some("explode".to_string()),
            ..LogsQuery::default()
        };
        assert!(matches!(bad_action.into_filter(), Err(ApiError::Validation(_))));

        let bad_time = LogsQuery {
            since: Some("yesterday".to_string()),
            ..LogsQuery::default()
        };
        assert!(matches!(bad_time.into_filter(), Err(ApiError::Validation(_))));

        let bad_limit = LogsQuery {
            limit: Some("-1".to_string()),
            ..LogsQuery::default()
        };
        assert!(matches!(bad_limit.into_filter(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_transport_address() {
        assert!(HttpTransport::new("127.0.0.1", 8000, HttpOptions::default()).is_ok());
        assert!(HttpTransport::new("not a host", 8000, HttpOptions::default()).is_err());
    }
}
