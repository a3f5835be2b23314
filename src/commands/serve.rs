use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use websearch_core::{AppConfig, SearchResult, SearchStatus};
use websearch_crawler::PoolFetcher;
use websearch_orchestrator::{progress, Orchestrator, ResultStore};
use websearch_state::StateStore;

use super::Pipeline;

#[derive(Clone)]
pub struct AppState {
    orchestrator: Orchestrator<PoolFetcher>,
    state: Arc<StateStore>,
    results: Arc<ResultStore>,
    config: Arc<AppConfig>,
    inflight: Arc<DashMap<String, CancellationToken>>,
}

#[derive(Deserialize)]
struct SearchRequest {
    url: String,
    query: String,
    max_pages: Option<usize>,
}

#[derive(Serialize)]
struct SearchAccepted {
    search_id: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct PendingBody {
    pending: bool,
}

pub async fn run(config: AppConfig, port_override: Option<u16>) -> anyhow::Result<()> {
    let port = port_override.unwrap_or(config.general.port);
    let pipeline = Pipeline::connect(config).await?;

    let state = AppState {
        orchestrator: pipeline.orchestrator,
        state: pipeline.state,
        results: pipeline.results,
        config: Arc::new(pipeline.config),
        inflight: Arc::new(DashMap::new()),
    };

    let app = Router::new()
        .route("/search", post(start_search))
        .route("/search/:id/state", get(get_state))
        .route("/search/:id/results", get(get_results))
        .route("/search/:id/ws", get(stream_progress))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "serving websearch API");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn start_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    let seed = match Url::parse(&req.url) {
        Ok(url) => url,
        Err(err) => {
            return (
                axum::http::StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: format!("invalid url: {err}"),
                }),
            )
                .into_response();
        }
    };

    let max_pages = req.max_pages.unwrap_or(state.config.general.max_pages);
    if max_pages == 0 {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "max_pages must be positive".to_string(),
            }),
        )
            .into_response();
    }

    let search_id = Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    state.inflight.insert(search_id.clone(), cancel.clone());

    let orchestrator = state.orchestrator.clone();
    let inflight = Arc::clone(&state.inflight);
    let id_for_task = search_id.clone();
    tokio::spawn(async move {
        let result = orchestrator
            .search(&id_for_task, &seed, &req.query, max_pages, &cancel)
            .await;
        if let Err(err) = result {
            warn!(search_id = %id_for_task, error = %err, "search ended with an error");
        }
        inflight.remove(&id_for_task);
    });

    (
        axum::http::StatusCode::ACCEPTED,
        Json(SearchAccepted { search_id }),
    )
        .into_response()
}

async fn get_state(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.state.get(&id).await {
        Ok(Some(snapshot)) => Json(snapshot).into_response(),
        Ok(None) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "search not found".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!(search_id = %id, %err, "failed to read search state");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// 200 with ranked results once `completed`, 202 `{pending}` while the search
/// is still running, 404 for an unknown id — per spec §6's `get_results`.
async fn get_results(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    if let Some(results) = state.results.get(&id) {
        return Json(results).into_response();
    }

    match state.state.get(&id).await {
        Ok(Some(snapshot)) if snapshot.status == SearchStatus::Error => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: snapshot.error.unwrap_or_else(|| "search failed".to_string()),
            }),
        )
            .into_response(),
        Ok(Some(snapshot)) if snapshot.status == SearchStatus::Completed => {
            // The orchestrator stores results before marking state complete,
            // so this is unreachable in practice; kept as a safe fallback.
            Json(Vec::<SearchResult>::new()).into_response()
        }
        Ok(Some(_)) => {
            (axum::http::StatusCode::ACCEPTED, Json(PendingBody { pending: true })).into_response()
        }
        Ok(None) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "search not found".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!(search_id = %id, %err, "failed to read search state");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn stream_progress(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_progress_socket(socket, state, id))
}

async fn handle_progress_socket(mut socket: WebSocket, state: AppState, id: String) {
    let tick = std::time::Duration::from_millis(state.config.general.progress_tick_ms);
    let mut events = Box::pin(progress::subscribe_with_tick(
        Arc::clone(&state.state),
        id.clone(),
        tick,
    ));

    while let Some(event) = events.next().await {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(search_id = %id, %err, "failed to serialize progress event");
                break;
            }
        };
        if socket.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }

    let _ = socket.close().await;
}
