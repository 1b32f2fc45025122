// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use game_crud_common::{
    DEFAULT_KEY_PREFIX, GAME_NOT_FOUND, Game, GameId, decode_game_payload, decode_patch_payload,
    decode_stored_game, encode_game, game_id_from_key, key_pattern, store_key,
};
use lambda_http::run as lambda_run;
use redis::{AsyncCommands, aio::ConnectionManager};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn GameStore>,
}

/// Raw key-value access to game records, addressed by game id.
#[async_trait]
trait GameStore: Send + Sync {
    async fn get(&self, game_id: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, game_id: &str, value: String) -> anyhow::Result<()>;
    /// Ids of every record in the store, in store-defined order.
    async fn list_ids(&self) -> anyhow::Result<Vec<GameId>>;
}

#[derive(Clone)]
struct RedisGameStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisGameStore {
    async fn from_env() -> anyhow::Result<Self> {
        let redis_url = std::env::var("REDIS_URL")
            .ok()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());
        let key_prefix = std::env::var("GAME_KEY_PREFIX")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());

        let client = redis::Client::open(redis_url.as_str()).context("invalid REDIS_URL")?;
        let connection = ConnectionManager::new(client)
            .await
            .context("failed to connect to Redis")?;
        info!(key_prefix = %key_prefix, "connected to Redis game store");

        Ok(Self {
            connection,
            key_prefix,
        })
    }
}

#[async_trait]
impl GameStore for RedisGameStore {
    async fn get(&self, game_id: &str) -> anyhow::Result<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(store_key(&self.key_prefix, game_id)).await?;
        Ok(value)
    }

    async fn set(&self, game_id: &str, value: String) -> anyhow::Result<()> {
        let mut connection = self.connection.clone();
        connection
            .set::<_, _, ()>(store_key(&self.key_prefix, game_id), value)
            .await?;
        Ok(())
    }

    async fn list_ids(&self) -> anyhow::Result<Vec<GameId>> {
        let mut connection = self.connection.clone();
        let keys: Vec<String> = connection.keys(key_pattern(&self.key_prefix)).await?;
        Ok(keys
            .iter()
            .filter_map(|key| game_id_from_key(&self.key_prefix, key))
            .map(ToOwned::to_owned)
            .collect())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "game_crud_service=debug,tower_http=info".to_string()),
        )
        .init();

    let state = AppState {
        store: Arc::new(RedisGameStore::from_env().await?),
    };

    let ui_dir = std::env::var("GAME_UI_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./ui"));
    let app = build_router(state, ui_dir);

    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("AWS Lambda runtime detected; running game-crud-service in lambda mode");
        lambda_run(app)
            .await
            .map_err(|e| anyhow::Error::msg(format!("lambda runtime error: {e}")))?;
        return Ok(());
    }

    let bind_addr = parse_bind_addr("GAME_CRUD_BIND", "0.0.0.0:8080")?;
    info!(%bind_addr, "game-crud-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("game-crud-service stopped; store connection released");
    Ok(())
}

fn build_router(state: AppState, ui_dir: PathBuf) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/games", get(list_games_handler).post(create_game_handler))
        .route(
            "/games/{game_id}",
            get(get_game_handler)
                .put(update_game_handler)
                .delete(delete_game_handler),
        )
        .fallback_service(ServeDir::new(ui_dir))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received; draining connections");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "game-crud-service"}))
}

async fn create_game_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Game>), ApiError> {
    let game = decode_game_payload(&body)
        .map_err(|e| ApiError::bad_request(e.to_string()))?
        .into_created(Utc::now());

    save_game(&state, &game.game_id, &game).await?;
    info!(game_id = %game.game_id, "game created");

    Ok((StatusCode::CREATED, Json(game)))
}

async fn get_game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<Game>, ApiError> {
    Ok(Json(load_game(&state, &game_id).await?))
}

async fn update_game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    body: Bytes,
) -> Result<Json<Game>, ApiError> {
    let patch = decode_patch_payload(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let mut game = load_game(&state, &game_id).await?;
    game.apply_patch(&patch);

    save_game(&state, &game_id, &game).await?;
    info!(game_id = %game_id, "game updated");

    Ok(Json(game))
}

async fn delete_game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<Game>, ApiError> {
    let mut game = load_game(&state, &game_id).await?;
    game.mark_deleted();

    save_game(&state, &game_id, &game).await?;
    info!(game_id = %game_id, "game soft-deleted");

    Ok(Json(game))
}

async fn list_games_handler(State(state): State<AppState>) -> Result<Json<Vec<Game>>, ApiError> {
    let game_ids = state.store.list_ids().await.map_err(store_error)?;

    let mut games = Vec::with_capacity(game_ids.len());
    for game_id in game_ids {
        let raw = state
            .store
            .get(&game_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::internal(format!("game {game_id} has no stored value")))?;
        let game = decode_or_default(&game_id, &raw);
        if game.is_listed() {
            games.push(game);
        }
    }

    Ok(Json(games))
}

async fn load_game(state: &AppState, game_id: &str) -> Result<Game, ApiError> {
    let raw = state
        .store
        .get(game_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found(GAME_NOT_FOUND))?;
    Ok(decode_or_default(game_id, &raw))
}

async fn save_game(state: &AppState, game_id: &str, game: &Game) -> Result<(), ApiError> {
    let value = encode_game(game).map_err(|e| ApiError::internal(e.to_string()))?;
    state.store.set(game_id, value).await.map_err(store_error)
}

// Corrupt stored values are served as an empty record rather than failing the request.
fn decode_or_default(game_id: &str, raw: &str) -> Game {
    decode_stored_game(raw).unwrap_or_else(|error| {
        warn!(game_id = %game_id, error = %error, "stored game is not valid JSON");
        Game::default()
    })
}

fn store_error(error: anyhow::Error) -> ApiError {
    ApiError::internal(error.to_string())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (self.status, self.message).into_response()
    }
}
