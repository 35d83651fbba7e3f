//! Full router over the in-memory store, driven with `oneshot`.

use admin_backend::config::{builtin_resources, resolve};
use admin_backend::{app_router, AppState, MemoryStore};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const TOKEN: &str = "test-token";

fn app_with_users(tokens: &[(&str, Option<Uuid>)]) -> Router {
    let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
    let tokens: HashMap<String, Option<Uuid>> = tokens.iter().map(|(t, u)| (t.to_string(), *u)).collect();
    app_router(AppState::new(Arc::new(MemoryStore::new()), model, tokens))
}

fn app_with_tokens(tokens: &[&str]) -> Router {
    let tokens: Vec<(&str, Option<Uuid>)> = tokens.iter().map(|t| (*t, None)).collect();
    app_with_users(&tokens)
}

fn app() -> Router {
    app_with_tokens(&[TOKEN])
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    let body = match body {
        Some(b) => {
            builder = builder.header("content-type", "application/json");
            Body::from(b.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map(|b| b.to_string());
    send(app, method, uri, body.as_deref(), Some(TOKEN)).await
}

const ROLES: &str = "/api/system/role-management";
const ORGS: &str = "/api/administrative/organization";

#[tokio::test]
async fn health_and_version_need_no_token() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (status, body) = send(&app, "GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "ok");
    let (status, body) = send(&app, "GET", "/version", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "admin-backend");
}

#[tokio::test]
async fn api_requires_a_known_bearer_token() {
    let app = app();
    let (status, body) = send(&app, "GET", ROLES, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);
    assert!(body["data"].is_null());
    assert!(body["msg"].is_string());

    let (status, _) = send(&app, "GET", ROLES, None, Some("someone-else")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, "GET", ROLES, None, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "code": 200, "data": { "list": [], "total": 0 } }));
}

#[tokio::test]
async fn without_configured_tokens_any_bearer_is_accepted() {
    let app = app_with_tokens(&[]);
    let (status, _) = send(&app, "GET", ROLES, None, Some("anything")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", ROLES, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn role_crud_round_trip() {
    let app = app();
    let (status, created) = call(&app, "POST", ROLES, Some(json!({ "role_name": "Admin", "role_code": "admin" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["code"], 200);
    assert_eq!(created["msg"], "created");
    let id = created["data"]["role_id"].as_str().unwrap().to_string();

    let (status, read) = call(&app, "GET", &format!("{ROLES}/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["data"]["role_name"], "Admin");

    let (status, updated) = call(
        &app,
        "PUT",
        &format!("{ROLES}/{id}"),
        Some(json!({ "role_name": "Administrator" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["role_name"], "Administrator");

    let (status, patched) = call(&app, "PATCH", &format!("{ROLES}/{id}"), Some(json!({ "status": 0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["data"]["status"], 0);

    let (status, listed) = call(&app, "GET", &format!("{ROLES}?status=0&current=1&pageSize=10"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"]["total"], 1);

    let (status, deleted) = call(&app, "DELETE", &format!("{ROLES}/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["data"], 1);

    let (status, body) = call(&app, "GET", &format!("{ROLES}/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn error_codes_in_the_envelope() {
    let app = app();
    let (status, body) = call(&app, "POST", ROLES, Some(json!({ "role_name": "NoCode" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 422);

    call(&app, "POST", ROLES, Some(json!({ "role_name": "Admin", "role_code": "admin" }))).await;
    let (status, body) = call(&app, "POST", ROLES, Some(json!({ "role_name": "Admin 2", "role_code": "admin" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (status, body) = send(&app, "POST", ROLES, Some("{not json"), Some(TOKEN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, body) = call(&app, "POST", ROLES, Some(json!(["array"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, body) = call(&app, "GET", &format!("{ROLES}/not-a-uuid"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, body) = call(&app, "GET", "/api/system/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);

    let (status, body) = call(&app, "GET", "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);

    let (status, body) = call(&app, "GET", &format!("{ROLES}?status=enabled"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 422);
}

#[tokio::test]
async fn organization_tree_and_reject_delete() {
    let app = app();
    let (_, root) = call(
        &app,
        "POST",
        ORGS,
        Some(json!({ "org_name": "HQ", "org_code": "hq", "org_type": "company", "sort": 2 })),
    )
    .await;
    let root_id = root["data"]["org_id"].as_str().unwrap().to_string();
    call(
        &app,
        "POST",
        ORGS,
        Some(json!({ "org_name": "Branch", "org_code": "br", "org_type": "company", "sort": 1 })),
    )
    .await;
    let (status, child) = call(
        &app,
        "POST",
        ORGS,
        Some(json!({ "org_name": "R&D", "org_code": "rd", "org_type": "unit", "parent_id": root_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let child_id = child["data"]["org_id"].as_str().unwrap().to_string();

    let (status, tree) = call(&app, "GET", ORGS, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree["data"]["total"], 3);
    let roots = tree["data"]["list"].as_array().unwrap();
    assert_eq!(roots[0]["org_name"], "Branch");
    assert_eq!(roots[1]["org_name"], "HQ");
    assert_eq!(roots[1]["children"][0]["org_name"], "R&D");
    assert_eq!(roots[1]["children"][0]["children"], json!([]));

    let (status, body) = call(&app, "DELETE", &format!("{ORGS}/{root_id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (status, body) = call(
        &app,
        "PUT",
        &format!("{ORGS}/{root_id}"),
        Some(json!({ "parent_id": child_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (status, _) = call(&app, "DELETE", &format!("{ORGS}/{child_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, "DELETE", &format!("{ORGS}/{root_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], 1);
}

#[tokio::test]
async fn patch_status_on_resource_without_status_is_bad_request() {
    let app = app();
    let (_, org) = call(
        &app,
        "POST",
        ORGS,
        Some(json!({ "org_name": "HQ", "org_code": "hq", "org_type": "company" })),
    )
    .await;
    let org_id = org["data"]["org_id"].as_str().unwrap();
    let (status, job) = call(
        &app,
        "POST",
        "/api/administrative/jobs-management",
        Some(json!({ "jobs_name": "Engineer", "org_id": org_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let jobs_id = job["data"]["jobs_id"].as_str().unwrap();
    let (status, body) = call(
        &app,
        "PATCH",
        &format!("/api/administrative/jobs-management/{jobs_id}"),
        Some(json!({ "status": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn unsupported_verbs_get_a_405_envelope() {
    let app = app();
    let id = Uuid::new_v4();
    for (method, uri) in [
        ("POST", format!("{ROLES}/{id}")),
        ("PUT", ROLES.to_string()),
        ("DELETE", ROLES.to_string()),
    ] {
        let (status, body) = call(&app, method, &uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
        assert_eq!(body["code"], 405);
        assert!(body["data"].is_null());
        assert!(body["msg"].is_string());
    }
    let (status, body) = send(&app, "POST", "/health", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["code"], 405);

    // the token is still checked first
    let (status, _) = send(&app, "POST", &format!("{ROLES}/{id}"), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn founder_is_the_user_behind_the_token() {
    let user = Uuid::new_v4();
    let app = app_with_users(&[(TOKEN, Some(user)), ("anonymous", None)]);
    let forged = Uuid::new_v4().to_string();

    let (status, created) = call(
        &app,
        "POST",
        ROLES,
        Some(json!({ "role_name": "Admin", "role_code": "admin", "founder": forged })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["data"]["founder"], user.to_string());

    let body = json!({ "role_name": "Viewer", "role_code": "viewer", "founder": forged }).to_string();
    let (status, created) = send(&app, "POST", ROLES, Some(&body), Some("anonymous")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(created["data"]["founder"].is_null());
}

#[tokio::test]
async fn role_menu_permissions_round_trip() {
    let app = app();
    let menus = "/api/system/menu-management";
    let (_, menu) = call(&app, "POST", menus, Some(json!({ "name": "home", "menu_type": "menu" }))).await;
    let menu_id = menu["data"]["menu_id"].as_str().unwrap().to_string();

    let (status, role) = call(
        &app,
        "POST",
        ROLES,
        Some(json!({ "role_name": "Admin", "role_code": "admin", "menu_permission": [menu_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let role_id = role["data"]["role_id"].as_str().unwrap().to_string();
    let (_, read) = call(&app, "GET", &format!("{ROLES}/{role_id}"), None).await;
    assert_eq!(read["data"]["menu_permission"], json!([menu_id]));

    let (status, body) = call(&app, "DELETE", &format!("{menus}/{menu_id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (status, body) = call(
        &app,
        "PUT",
        &format!("{ROLES}/{role_id}"),
        Some(json!({ "menu_permission": [Uuid::new_v4().to_string()] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);
}
