use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateServiceRequest, ServiceSearchQuery, UpdateServiceRequest};
use crate::services::CatalogService;

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_active_services(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let services = catalog.list_active(None).await?;

    Ok(Json(json!({
        "services": services,
        "total": services.len()
    })))
}

#[axum::debug_handler]
pub async fn search_services(
    State(config): State<Arc<AppConfig>>,
    Query(query): Query<ServiceSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let services = catalog.search_services(&query, None).await?;

    Ok(Json(json!({
        "services": services,
        "total": services.len()
    })))
}

#[axum::debug_handler]
pub async fn list_services_by_category(
    State(config): State<Arc<AppConfig>>,
    Path(category): Path<String>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let services = catalog.list_by_category(&category, None).await?;

    Ok(Json(json!({
        "category": category,
        "services": services,
        "total": services.len()
    })))
}

#[axum::debug_handler]
pub async fn list_services_by_doctor(
    State(config): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let services = catalog.list_by_doctor(doctor_id, None).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "services": services,
        "total": services.len()
    })))
}

#[axum::debug_handler]
pub async fn get_service(
    State(config): State<Arc<AppConfig>>,
    Path(service_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let service = catalog.get_service(service_id, None).await?;

    Ok(Json(json!(service)))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_service(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let catalog = CatalogService::new(&config);
    let service = catalog.create_service(&user, request, auth.token()).await?;

    Ok((StatusCode::CREATED, Json(json!(service))))
}

#[axum::debug_handler]
pub async fn update_service(
    State(config): State<Arc<AppConfig>>,
    Path(service_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateServiceRequest>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let service = catalog
        .update_service(&user, service_id, request, auth.token())
        .await?;

    Ok(Json(json!(service)))
}

#[axum::debug_handler]
pub async fn toggle_service_status(
    State(config): State<Arc<AppConfig>>,
    Path(service_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let service = catalog.toggle_status(&user, service_id, auth.token()).await?;

    Ok(Json(json!(service)))
}

#[axum::debug_handler]
pub async fn assign_doctor(
    State(config): State<Arc<AppConfig>>,
    Path((service_id, doctor_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let service = catalog
        .assign_doctor(&user, service_id, doctor_id, auth.token())
        .await?;

    Ok(Json(json!(service)))
}

#[axum::debug_handler]
pub async fn remove_doctor(
    State(config): State<Arc<AppConfig>>,
    Path((service_id, doctor_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let service = catalog
        .remove_doctor(&user, service_id, doctor_id, auth.token())
        .await?;

    Ok(Json(json!(service)))
}

#[axum::debug_handler]
pub async fn service_statistics(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let catalog = CatalogService::new(&config);
    let stats = catalog.statistics(&user, auth.token()).await?;

    Ok(Json(json!(stats)))
}
