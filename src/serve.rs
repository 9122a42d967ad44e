//! Purpose: Provide the HTTP/JSON server exposing CSV tables.
//! Exports: `ServeConfig`, `serve`, `router`.
//! Role: Axum-based read-only server; one `GET /<table>` route per exposed table.
//! Invariants: Error envelopes share `table_json::error_json`; kinds remain stable.
//! Invariants: Unexposed tables are 404; load, parse, and validation failures are 500.
//! Invariants: Path table names are matched exactly against the exposed set.
//! Notes: CSV reads are blocking and run on the blocking pool; nothing is cached.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use csvserve::api::{
    Error, ErrorKind, ExposedTables, PageRequest, TableService, ValidationMode, paginate,
};

use crate::table_json::{error_json, schema_json, tables_json};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub exposed: ExposedTables,
    pub validation: ValidationMode,
}

#[derive(Clone)]
struct AppState {
    service: TableService,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    init_tracing();

    let service = TableService::new(config.data_dir.clone(), config.exposed.clone())
        .with_validation(config.validation);
    if !config.data_dir.is_dir() {
        tracing::warn!(data_dir = %config.data_dir.display(), "data directory does not exist");
    }
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(
        bind = %config.bind,
        data_dir = %config.data_dir.display(),
        tables = %config.exposed.names().join(","),
        "serving tables"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

pub fn router(service: TableService) -> Router {
    let state = Arc::new(AppState { service });
    Router::new()
        .route("/health", get(health))
        .route("/api/tables", get(list_tables))
        .route("/api/schema/:table", get(table_schema))
        .route("/api/:table", get(query_table))
        .route("/:table", get(get_table))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    offset: Option<usize>,
    limit: Option<usize>,
    start_date: Option<String>,
    end_date: Option<String>,
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "ok",
        "data_dir": state.service.data_dir().display().to_string(),
    }))
    .into_response()
}

async fn list_tables(State(state): State<Arc<AppState>>) -> Response {
    let service = state.service.clone();
    match run_blocking(move || service.list_tables()).await {
        Ok(tables) => {
            Json(tables_json(&tables, state.service.exposed().names())).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn table_schema(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
) -> Response {
    let service = state.service.clone();
    match run_blocking(move || service.describe(&table)).await {
        Ok(description) => Json(schema_json(&description)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_table(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
) -> Response {
    let service = state.service.clone();
    let name = table.clone();
    match run_blocking(move || service.records(&name)).await {
        Ok(records) => {
            tracing::info!(table = %table, returned = records.len(), "serving table");
            Json(records).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn query_table(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return error_response(
                Error::new(ErrorKind::Usage)
                    .with_message(rejection.body_text())
                    .with_hint("offset and limit must be non-negative integers."),
            );
        }
    };
    let request = PageRequest {
        offset: query.offset.unwrap_or(0),
        limit: query.limit,
        start_date: query.start_date,
        end_date: query.end_date,
    };
    if let Err(err) = request.limit() {
        return error_response(err);
    }

    let service = state.service.clone();
    let result = run_blocking(move || {
        let records = service.records(&table)?;
        paginate(&table, records, &request)
    })
    .await;
    match result {
        Ok(page) => {
            tracing::info!(
                table = %page.table,
                offset = page.offset,
                limit = page.limit,
                returned = page.returned,
                "serving page"
            );
            Json(page).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("table task failed")
            .with_source(err)
    })?
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::NotExposed => StatusCode::NOT_FOUND,
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::FileNotFound
        | ErrorKind::Parse
        | ErrorKind::Validation
        | ErrorKind::Io
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::warn!(error = %err, "request failed");
    }
    (status, Json(error_json(&err))).into_response()
}

#[cfg(test)]
mod tests {
    use super::router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use csvserve::api::{ExposedTables, TableService};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn service(dir: &tempfile::TempDir) -> TableService {
        let exposed = ExposedTables::parse("payments,fuel_purchases").expect("tables");
        TableService::new(dir.path(), exposed)
    }

    async fn get(service: TableService, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        let response = router(service).oneshot(request).await.expect("response");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    #[tokio::test]
    async fn table_route_returns_all_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("payments.csv"), "id,amount\n1,42.5\n2,3\n")
            .expect("write");
        let (status, body) = get(service(&dir), "/payments").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{"id": "1", "amount": "42.5"}, {"id": "2", "amount": "3"}])
        );
    }

    #[tokio::test]
    async fn declared_schema_coerces_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("fuel_purchases.csv"),
            "fuel_purchase_id,gallons,purchase_date\nf1,12.5,2024-05-01 07:15:00\n",
        )
        .expect("write");
        let (status, body) = get(service(&dir), "/fuel_purchases").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{"fuel_purchase_id": "f1", "gallons": 12.5, "purchase_date": "2024-05-01T07:15:00"}])
        );
    }

    #[tokio::test]
    async fn unexposed_table_is_404() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("secret.csv"), "a\n1\n").expect("write");
        let (status, body) = get(service(&dir), "/secret").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], "NotExposed");
    }

    #[tokio::test]
    async fn padded_table_name_is_404_on_both_routes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("payments.csv"), "id\n1\n").expect("write");
        for uri in ["/%20payments", "/api/%20payments", "/payments%20"] {
            let (status, body) = get(service(&dir), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["error"]["kind"], "NotExposed", "{uri}");
        }
    }

    #[tokio::test]
    async fn missing_file_is_500() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (status, body) = get(service(&dir), "/payments").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], "FileNotFound");
    }

    #[tokio::test]
    async fn short_row_is_500_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("payments.csv"), "id,amount\n1\n").expect("write");
        let (status, body) = get(service(&dir), "/payments").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], "ParseError");
        assert_eq!(body["error"]["row"], 1);
    }

    #[tokio::test]
    async fn validation_failure_is_500() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("fuel_purchases.csv"),
            "fuel_purchase_id,gallons\nf1,lots\n",
        )
        .expect("write");
        let (status, body) = get(service(&dir), "/fuel_purchases").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], "ValidationError");
        assert_eq!(body["error"]["field"], "gallons");
    }

    #[tokio::test]
    async fn health_and_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("payments.csv"), "id\n1\n").expect("write");
        std::fs::write(dir.path().join("other.csv"), "id\n1\n").expect("write");

        let (status, body) = get(service(&dir), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get(service(&dir), "/api/tables").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tables"], json!(["other", "payments"]));
        assert_eq!(body["exposed"], json!(["payments", "fuel_purchases"]));
    }

    #[tokio::test]
    async fn schema_route_reports_types() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("fuel_purchases.csv"),
            "fuel_purchase_id,gallons\nf1,1\n",
        )
        .expect("write");
        let (status, body) = get(service(&dir), "/api/schema/fuel_purchases").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schema"], json!({"fuel_purchase_id": "string", "gallons": "float"}));

        let (status, _) = get(service(&dir), "/api/schema/secret").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn paged_route_returns_envelope() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("payments.csv"), "id\n1\n2\n3\n").expect("write");
        let (status, body) = get(service(&dir), "/api/payments?offset=1&limit=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["returned"], 1);
        assert_eq!(body["total_available"], 3);
        assert_eq!(body["has_more"], true);
        assert_eq!(body["data"], json!([{"id": "2"}]));
    }

    #[tokio::test]
    async fn paged_route_rejects_bad_limits() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("payments.csv"), "id\n1\n").expect("write");
        let (status, body) = get(service(&dir), "/api/payments?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "Usage");

        let (status, _) = get(service(&dir), "/api/payments?offset=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
