// Veterinary Clinic Records - Web Server
// One action endpoint at /api, static files for everything else

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::any,
    Router,
};
use clap::Parser;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vet_clinic::{dispatch, ApiReply, ApiRequest, ClinicConfig, ClinicError, ClinicStore};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<ClinicStore>>,
}

#[derive(Debug, Parser)]
#[command(name = "clinic-server", version = vet_clinic::VERSION)]
struct Args {
    /// Address to listen on (overrides `server.bind`)
    #[arg(long)]
    bind: Option<String>,

    /// SQLite database file (overrides `database.path`)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Directory served for paths other than /api (overrides `server.static_dir`)
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

// ============================================================================
// Handler
// ============================================================================

/// ANY /api - dispatch on the `action` parameter
async fn api(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = ClinicError::BadRequest(format!("body must be JSON: {}", e));
                return into_response(ApiReply::from_error(&err));
            }
        }
    };

    let request = ApiRequest::new(query, body);
    let store = Arc::clone(&state.store);

    match tokio::task::spawn_blocking(move || dispatch(&store, &request)).await {
        Ok(reply) => into_response(reply),
        Err(e) => {
            error!(error = %e, "dispatch task failed");
            into_response(ApiReply::from_error(&ClinicError::Poisoned))
        }
    }
}

fn into_response(reply: ApiReply) -> Response {
    match reply {
        ApiReply::Json { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(body)).into_response()
        }
        ApiReply::Csv { filename, body } => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            body,
        )
            .into_response(),
    }
}

fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new().route("/api", any(api)).with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CLINIC_LOG")
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let mut config = ClinicConfig::load().context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }
    if args.static_dir.is_some() {
        config.server.static_dir = args.static_dir;
    }

    let store = ClinicStore::open(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path.display()))?;
    let state = AppState {
        store: Arc::new(Mutex::new(store)),
    };

    let app = router(state, config.server.static_dir.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;

    info!(bind = %config.server.bind, db = %config.database.path.display(), "clinic server listening");
    if let Some(dir) = &config.server.static_dir {
        info!(dir = %dir.display(), "serving static files");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("clinic server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "could not listen for ctrl-c");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState {
            store: Arc::new(Mutex::new(ClinicStore::open_in_memory().unwrap())),
        };
        router(state, None)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_via_query() {
        let response = app()
            .oneshot(Request::get("/api?action=health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_post_json_body_creates_owner() {
        let body = r#"{"action":"create_owner","first_name":"Ana","last_name":"Ruiz","age":31}"#;
        let response = app()
            .oneshot(
                Request::post("/api")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["owner_id"], 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let response = app()
            .oneshot(Request::post("/api?action=create_owner").body(Body::from("nombre=Ana")).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_export_is_attachment() {
        let response = app()
            .oneshot(Request::get("/api?action=export_csv").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"pets_export_"));
    }
}
