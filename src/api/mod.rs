// HTTP surface: sync trigger, REST and GraphQL queries, health.

mod dto;
mod error;
mod graphql;

pub use dto::{MessageResponse, VehicleMakeResponse, VehicleTypeResponse};
pub use error::ApiError;
pub use graphql::{build_schema, QueryRoot, VehicleObject, VehicleSchema, VehicleTypeObject};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub const FETCH_SUCCESS_MESSAGE: &str = "Vehicle data fetched and stored successfully";

// Query parameters arrive as text so that junk values fall back to defaults
#[derive(Debug, Default, Deserialize)]
pub struct VehicleQueryParams {
    #[serde(rename = "makeName")]
    pub make_name: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse().ok())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/vehicles/fetch", get(fetch_vehicles).post(fetch_vehicles))
        .route("/vehicles", get(list_vehicles))
        .route("/graphql", get(graphiql).post(graphql_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn fetch_vehicles(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    state.sync.sync_all().await?;
    Ok(Json(MessageResponse {
        message: FETCH_SUCCESS_MESSAGE.to_string(),
    }))
}

async fn list_vehicles(
    State(state): State<AppState>,
    Query(params): Query<VehicleQueryParams>,
) -> Result<Json<Vec<VehicleMakeResponse>>, ApiError> {
    let makes = state
        .query
        .query(
            params.make_name.as_deref(),
            parse_number(params.limit.as_deref()),
            parse_number(params.offset.as_deref()),
        )
        .await?;
    Ok(Json(makes.into_iter().map(Into::into).collect()))
}

async fn graphql_handler(
    State(state): State<AppState>,
    Json(request): Json<async_graphql::Request>,
) -> impl IntoResponse {
    let response = state.schema.execute(request).await;
    let status = if response.is_err() {
        tracing::error!(errors = ?response.errors, "graphql request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}

async fn graphiql() -> Html<String> {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .finish(),
    )
}
