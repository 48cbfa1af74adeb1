//! Thin axum boundary.
//!
//! Routes extract the bearer token, path/query parameters and JSON bodies,
//! then delegate to the handler methods on [`SealboxServer`]. No request
//! semantics live here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::clients::{LoginRequest, RegisterClientRequest};
use crate::handlers::deks::{CreateDekRequest, RotateKekRequest, UpdateDekRequest};
use crate::handlers::folders::CreateFolderRequest;
use crate::handlers::secrets::{CreateSecretRequest, UpdateSecretRequest};
use crate::server::{parse_bearer, SealboxServer};

type ServerState = State<Arc<SealboxServer>>;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    parse_bearer(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    )
}

pub fn router(server: Arc<SealboxServer>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/client/register", post(register_client))
        .route("/client/login", post(login))
        .route("/client/info/{id}", get(client_info))
        .route("/client/{id}/revoke", delete(revoke_client))
        .route("/dek", post(create_dek).get(list_deks))
        .route("/dek/rotate-kek", post(rotate_kek))
        .route("/dek/{id}", get(get_dek).put(update_dek).delete(delete_dek))
        .route("/secret", post(create_secret).get(list_secrets))
        .route(
            "/secret/{id_or_name}",
            get(get_secret).put(update_secret).delete(delete_secret),
        )
        .route("/folder", post(create_folder).get(list_folders))
        .route("/folder/{id}", get(get_folder).delete(delete_folder))
        .with_state(server)
}

async fn healthz() -> &'static str {
    "ok"
}

// ───────────────────────────────────── Clients ────────────────────────────────────────

async fn register_client(
    State(server): ServerState,
    headers: HeaderMap,
    Json(req): Json<RegisterClientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let info = server.register_client(bearer(&headers), req).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn login(
    State(server): ServerState,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.login(req).await?))
}

async fn client_info(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.client_info(bearer(&headers), id).await?))
}

async fn revoke_client(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    server.revoke_client(bearer(&headers), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ───────────────────────────────────── DEKs ───────────────────────────────────────────

async fn create_dek(
    State(server): ServerState,
    headers: HeaderMap,
    Json(req): Json<CreateDekRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let info = server.create_dek(bearer(&headers), req).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn list_deks(
    State(server): ServerState,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.list_deks(bearer(&headers)).await?))
}

async fn get_dek(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id): Path<u32>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.get_dek(bearer(&headers), id).await?))
}

async fn update_dek(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id): Path<u32>,
    Json(req): Json<UpdateDekRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.update_dek(bearer(&headers), id, req).await?))
}

async fn delete_dek(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id): Path<u32>,
) -> Result<impl IntoResponse, ApiError> {
    server.delete_dek(bearer(&headers), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rotate_kek(
    State(server): ServerState,
    headers: HeaderMap,
    Json(req): Json<RotateKekRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.rotate_kek(bearer(&headers), req).await?))
}

// ───────────────────────────────────── Secrets ────────────────────────────────────────

#[derive(Deserialize)]
struct ListSecretsQuery {
    folder: Option<Uuid>,
}

async fn create_secret(
    State(server): ServerState,
    headers: HeaderMap,
    Json(req): Json<CreateSecretRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = server.create_secret(bearer(&headers), req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_secret(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id_or_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.get_secret(bearer(&headers), &id_or_name).await?))
}

async fn update_secret(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSecretRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.update_secret(bearer(&headers), id, req).await?))
}

async fn delete_secret(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    server.delete_secret(bearer(&headers), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_secrets(
    State(server): ServerState,
    headers: HeaderMap,
    Query(query): Query<ListSecretsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        server.list_secrets(bearer(&headers), query.folder).await?,
    ))
}

// ───────────────────────────────────── Folders ────────────────────────────────────────

async fn create_folder(
    State(server): ServerState,
    headers: HeaderMap,
    Json(req): Json<CreateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let info = server.create_folder(bearer(&headers), req).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn list_folders(
    State(server): ServerState,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.list_folders(bearer(&headers)).await?))
}

async fn get_folder(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(server.get_folder(bearer(&headers), id).await?))
}

async fn delete_folder(
    State(server): ServerState,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    server.delete_folder(bearer(&headers), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
