//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! HTTP query API
//!
//! JSON endpoints over [`QueryService`]. Errors are reported with an
//! [`ErrorResponse`] body and a status derived from the error kind.

use crate::error::{ErrorKind, PresenceError};
use crate::health::HealthMonitor;
use crate::service::QueryService;
use axum::{
    Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use presence_common::Pageable;
use presence_common::api::{
    ActiveBadgeResponse, BadgeRequest, BadgesResponse, CountResponse, ErrorResponse,
    FleetCountsRequest, FleetCountsResponse, GlobalSummaryRequest, GlobalSummaryResponse,
    HealthResponse, LoginSessionsResponse, OnlinePlayersResponse, PlayerBadgesResponse,
    PlayerIdsRequest, PlayerServersResponse, PlayerView, PlayersResponse, PlaytimeResponse,
    ScopeRequest, SearchPlayersRequest, SearchPlayersResponse,
};
use serde::Deserialize;

/// Shared state for all API handlers
#[derive(Clone)]
pub struct ApiContext {
    service: QueryService,
    health: HealthMonitor,
}

impl ApiContext {
    pub fn new(service: QueryService, health: HealthMonitor) -> Self {
        Self { service, health }
    }
}

/// Error wrapper turning a [`PresenceError`] into an HTTP response
#[derive(Debug)]
pub struct ApiError(pub PresenceError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorResponse {
        let kind = self.0.kind();
        let message = match kind {
            // Store internals are not exposed to callers
            ErrorKind::Unavailable => "service temporarily unavailable".to_string(),
            _ => self.0.to_string(),
        };
        ErrorResponse {
            kind: kind.as_str().to_string(),
            message,
        }
    }
}

impl From<PresenceError> for ApiError {
    fn from(error: PresenceError) -> Self {
        ApiError(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(PresenceError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(PresenceError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Query failed: {}", self.0);
        } else {
            tracing::debug!(%status, "Query rejected: {}", self.0);
        }
        (status, Json(self.body())).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct UsernameQuery {
    #[serde(default)]
    pub ignore_case: bool,
}

/// Create the query API router
pub fn create_router(context: ApiContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/badges", get(list_badges))
        .route("/players/batch", post(get_players))
        .route("/players/search", post(search_players))
        .route("/players/by-username/{username}", get(get_player_by_username))
        .route("/players/{id}", get(get_player))
        .route("/players/{id}/sessions", get(get_login_sessions))
        .route("/players/{id}/badges", get(get_player_badges).post(add_badge))
        .route("/players/{id}/badges/{badge}", delete(remove_badge))
        .route(
            "/players/{id}/badges/active",
            get(get_active_badge).put(set_active_badge),
        )
        .route("/tracker/player-servers", post(get_player_servers))
        .route("/tracker/servers/{server}/players", get(get_server_players))
        .route("/tracker/count", post(get_player_count))
        .route("/tracker/fleet-counts", post(get_fleet_counts))
        .route("/tracker/summary", post(get_global_summary))
        .route("/stats/unique-players", get(get_unique_players))
        .route("/stats/playtime", get(get_total_playtime))
        .with_state(context)
}

async fn health_check(State(context): State<ApiContext>) -> (StatusCode, Json<HealthResponse>) {
    let status = context.health.status();
    let code = if status.serving {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn list_badges(State(context): State<ApiContext>) -> Json<BadgesResponse> {
    Json(context.service.get_badges())
}

async fn get_player(State(context): State<ApiContext>, Path(id): Path<String>) -> ApiResult<PlayerView> {
    Ok(Json(context.service.get_player(&id).await?))
}

async fn get_players(
    State(context): State<ApiContext>,
    request: Result<Json<PlayerIdsRequest>, JsonRejection>,
) -> ApiResult<PlayersResponse> {
    let Json(request) = request?;
    Ok(Json(context.service.get_players(request).await?))
}

async fn get_player_by_username(
    State(context): State<ApiContext>,
    Path(username): Path<String>,
    query: Result<Query<UsernameQuery>, QueryRejection>,
) -> ApiResult<PlayerView> {
    let Query(query) = query?;
    Ok(Json(
        context
            .service
            .get_player_by_username(&username, query.ignore_case)
            .await?,
    ))
}

async fn search_players(
    State(context): State<ApiContext>,
    request: Result<Json<SearchPlayersRequest>, JsonRejection>,
) -> ApiResult<SearchPlayersResponse> {
    let Json(request) = request?;
    Ok(Json(context.service.search_players_by_username(request).await?))
}

async fn get_login_sessions(
    State(context): State<ApiContext>,
    Path(id): Path<String>,
    pageable: Result<Query<Pageable>, QueryRejection>,
) -> ApiResult<LoginSessionsResponse> {
    let Query(pageable) = pageable?;
    Ok(Json(
        context.service.get_login_sessions(&id, Some(pageable)).await?,
    ))
}

async fn get_player_badges(
    State(context): State<ApiContext>,
    Path(id): Path<String>,
) -> ApiResult<PlayerBadgesResponse> {
    Ok(Json(context.service.get_player_badges(&id).await?))
}

async fn get_active_badge(
    State(context): State<ApiContext>,
    Path(id): Path<String>,
) -> ApiResult<ActiveBadgeResponse> {
    Ok(Json(context.service.get_active_player_badge(&id).await?))
}

async fn add_badge(
    State(context): State<ApiContext>,
    Path(id): Path<String>,
    request: Result<Json<BadgeRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = request?;
    context
        .service
        .add_badge_to_player(&id, &request.badge_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_badge(
    State(context): State<ApiContext>,
    Path((id, badge)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    context.service.remove_badge_from_player(&id, &badge).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_active_badge(
    State(context): State<ApiContext>,
    Path(id): Path<String>,
    request: Result<Json<BadgeRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = request?;
    context
        .service
        .set_active_player_badge(&id, &request.badge_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_player_servers(
    State(context): State<ApiContext>,
    request: Result<Json<PlayerIdsRequest>, JsonRejection>,
) -> ApiResult<PlayerServersResponse> {
    let Json(request) = request?;
    Ok(Json(context.service.get_player_servers(request).await?))
}

async fn get_server_players(
    State(context): State<ApiContext>,
    Path(server): Path<String>,
) -> ApiResult<OnlinePlayersResponse> {
    Ok(Json(context.service.get_server_players(&server).await?))
}

async fn get_player_count(
    State(context): State<ApiContext>,
    request: Result<Json<ScopeRequest>, JsonRejection>,
) -> ApiResult<CountResponse> {
    let Json(request) = request?;
    Ok(Json(context.service.get_player_count(request).await?))
}

async fn get_fleet_counts(
    State(context): State<ApiContext>,
    request: Result<Json<FleetCountsRequest>, JsonRejection>,
) -> ApiResult<FleetCountsResponse> {
    let Json(request) = request?;
    Ok(Json(context.service.get_fleet_player_counts(request).await?))
}

async fn get_global_summary(
    State(context): State<ApiContext>,
    request: Result<Json<GlobalSummaryRequest>, JsonRejection>,
) -> ApiResult<GlobalSummaryResponse> {
    let Json(request) = request?;
    Ok(Json(context.service.get_global_players_summary(request).await?))
}

async fn get_unique_players(State(context): State<ApiContext>) -> ApiResult<CountResponse> {
    Ok(Json(context.service.get_stat_total_unique_players().await?))
}

async fn get_total_playtime(State(context): State<ApiContext>) -> ApiResult<PlaytimeResponse> {
    Ok(Json(context.service.get_stat_total_playtime().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::PresenceAggregator;
    use crate::badges::BadgeResolver;
    use crate::catalog::{BadgeCatalog, BadgeDefinition, CatalogHandle};
    use crate::config::QueryConfig;
    use crate::error::StoreError;
    use crate::store::{MemoryPlayerStore, PlayerStore};
    use chrono::Utc;
    use presence_common::{Placement, Player};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn context(store: Arc<MemoryPlayerStore>) -> ApiContext {
        context_with(store, &QueryConfig::default())
    }

    fn context_with(store: Arc<MemoryPlayerStore>, config: &QueryConfig) -> ApiContext {
        let catalog = BadgeCatalog::from_definitions(vec![
            BadgeDefinition::new("vip", 10, true),
            BadgeDefinition::new("staff", 50, false),
        ])
        .unwrap();
        let badges = BadgeResolver::new(store.clone(), CatalogHandle::new(catalog));
        let aggregator = PresenceAggregator::new(store.clone(), None);
        let service = QueryService::new(store.clone(), badges, aggregator, config);
        ApiContext::new(service, HealthMonitor::new(store))
    }

    async fn seed(store: &MemoryPlayerStore) -> Uuid {
        let player = Player::first_connect(
            Uuid::new_v4(),
            "Alice",
            None,
            Utc::now(),
            Placement::new("lobby-1-1", "proxy-1-1"),
        );
        store.upsert_player(&player).await.unwrap();
        player.id
    }

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            ApiError(PresenceError::Validation("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(PresenceError::PlayerNotFound(id)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(PresenceError::NotOwned {
                player_id: id,
                badge_id: "vip".into()
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(PresenceError::Timeout(Duration::from_secs(5))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unavailable_body_is_generic() {
        let error = ApiError(PresenceError::Store(StoreError::Unavailable(
            "connection refused to 10.0.0.5".into(),
        )));
        let body = error.body();
        assert_eq!(body.kind, "unavailable");
        assert!(!body.message.contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_get_player_handler() {
        let store = Arc::new(MemoryPlayerStore::new());
        let id = seed(&store).await;
        let context = context(store);

        let Json(view) = get_player(State(context.clone()), Path(id.to_string()))
            .await
            .unwrap();
        assert_eq!(view.username, "Alice");
        assert!(view.online);

        let error = get_player(State(context.clone()), Path("not-a-uuid".into()))
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        let error = get_player(State(context), Path(Uuid::new_v4().to_string()))
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_query_is_server_error() {
        let store = Arc::new(MemoryPlayerStore::new());
        let id = seed(&store).await;
        let config = QueryConfig {
            timeout_ms: 100,
            ..QueryConfig::default()
        };
        let context = context_with(store.clone(), &config);

        store.set_latency(Duration::from_secs(10));
        let error = get_player(State(context), Path(id.to_string()))
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = error.body();
        assert_eq!(body.kind, "unavailable");
        assert_eq!(body.message, "service temporarily unavailable");

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_badge_command_handlers() {
        let store = Arc::new(MemoryPlayerStore::new());
        let id = seed(&store).await;
        let context = context(store);

        let status = add_badge(
            State(context.clone()),
            Path(id.to_string()),
            Ok(Json(BadgeRequest {
                badge_id: "vip".into(),
            })),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let error = add_badge(
            State(context.clone()),
            Path(id.to_string()),
            Ok(Json(BadgeRequest {
                badge_id: "vip".into(),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status(), StatusCode::CONFLICT);

        let Json(active) = get_active_badge(State(context.clone()), Path(id.to_string()))
            .await
            .unwrap();
        assert_eq!(active.badge.id, "vip");

        let error = remove_badge(State(context), Path((id.to_string(), "staff".into())))
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_health_reports_unavailable_store() {
        let store = Arc::new(MemoryPlayerStore::new());
        let context = context(store.clone());

        store.set_unavailable(true);
        context.health.check().await;
        let (status, Json(body)) = health_check(State(context)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.serving);
    }
}
