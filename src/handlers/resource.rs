//! Resource CRUD handlers: list, create, read, update, update status, delete.
//! The resource is looked up from the `{module}/{resource}` path on every request.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::response::{success, success_msg};
use crate::service::CrudService;
use crate::state::AppState;
use crate::tree::Row;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

fn parse_id(id_str: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest(format!("invalid id '{}': expected a UUID", id_str)))
}

/// Body must be well-formed JSON holding an object; framework rejections are folded into the envelope.
fn body_to_row(body: Result<Json<Value>, JsonRejection>) -> Result<Row, AppError> {
    let Json(value) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path((module, name)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.resource(&module, &name)?;
    let page = CrudService::list(state.store.as_ref(), resource, &params).await?;
    Ok(success(page))
}

pub async fn create(
    State(state): State<AppState>,
    Path((module, name)): Path<(String, String)>,
    caller: Option<Extension<Caller>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.resource(&module, &name)?;
    let payload = body_to_row(body)?;
    let founder = caller.and_then(|Extension(c)| c.user_id);
    let row = CrudService::create_as(state.store.as_ref(), &state.model, resource, &payload, founder).await?;
    Ok(success_msg(row, "created"))
}

pub async fn read(
    State(state): State<AppState>,
    Path((module, name, id_str)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.resource(&module, &name)?;
    let id = parse_id(&id_str)?;
    let row = CrudService::read(state.store.as_ref(), resource, id).await?;
    Ok(success(row))
}

pub async fn update(
    State(state): State<AppState>,
    Path((module, name, id_str)): Path<(String, String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.resource(&module, &name)?;
    let id = parse_id(&id_str)?;
    let payload = body_to_row(body)?;
    let row = CrudService::update(state.store.as_ref(), &state.model, resource, id, &payload).await?;
    Ok(success(row))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path((module, name, id_str)): Path<(String, String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.resource(&module, &name)?;
    let id = parse_id(&id_str)?;
    let payload = body_to_row(body)?;
    let row = CrudService::update_status(state.store.as_ref(), &state.model, resource, id, &payload).await?;
    Ok(success(row))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((module, name, id_str)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.resource(&module, &name)?;
    let id = parse_id(&id_str)?;
    let removed = CrudService::delete(state.store.as_ref(), &state.model, resource, id).await?;
    Ok(success_msg(removed, "deleted"))
}
