//! End-to-end authorization flows through the full interceptor chain.
//!
//! Every request here passes validation, authentication/authorization, the
//! token whitelist, rate limiting, and scope resolution before a handler
//! answers, exactly as in production; only the key-value store and
//! masterdata are in-memory.
mod common;

use axum::http::StatusCode;
use basalt_authz::{AdminRole, MethodPermission, ProjectRole, TenantRole};
use common::{harness, read_json};
use serde_json::json;
use std::collections::BTreeMap;

#[tokio::test]
async fn anonymous_can_read_public_health() {
    let h = harness().await;
    let response = h.rpc("/api.v1.HealthService/Get", None, json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "SERVING");
}

#[tokio::test]
async fn anonymous_can_read_version() {
    let h = harness().await;
    let response = h.rpc("/api.v1.VersionService/Get", None, json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["version"], "test");
}

#[tokio::test]
async fn project_owner_reads_own_project() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::from([("p-1".to_string(), ProjectRole::Owner)]),
            BTreeMap::new(),
            None,
        )
        .await;

    let response = h
        .rpc(
            "/api.v1.IPService/List",
            Some(&bearer),
            json!({"project": "p-1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(body["ips"].as_array().expect("ips").is_empty());
}

#[tokio::test]
async fn wrong_project_is_denied() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::from([("p-1".to_string(), ProjectRole::Owner)]),
            BTreeMap::new(),
            None,
        )
        .await;

    let response = h
        .rpc(
            "/api.v1.IPService/List",
            Some(&bearer),
            json!({"project": "p-2"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["message"], "not allowed to call: /api.v1.IPService/List");
}

#[tokio::test]
async fn viewer_cannot_allocate() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::from([("p-1".to_string(), ProjectRole::Viewer)]),
            BTreeMap::new(),
            None,
        )
        .await;

    let response = h
        .rpc(
            "/api.v1.IPService/Allocate",
            Some(&bearer),
            json!({"project": "p-1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn editor_allocates_and_deletes() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::from([("p-1".to_string(), ProjectRole::Editor)]),
            BTreeMap::new(),
            None,
        )
        .await;

    let response = h
        .rpc(
            "/api.v1.IPService/Allocate",
            Some(&bearer),
            json!({"project": "p-1", "name": "gateway"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let allocated = read_json(response).await;
    let uuid = allocated["ip"]["uuid"].as_str().expect("uuid").to_string();

    let response = h
        .rpc(
            "/api.v1.IPService/Delete",
            Some(&bearer),
            json!({"project": "p-1", "uuid": uuid}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_reads_admin_endpoint() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "ops@basalt",
            Vec::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            Some(AdminRole::Editor),
        )
        .await;

    let response = h
        .rpc("/admin.v1.TenantService/List", Some(&bearer), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["tenants"][0]["id"], "acme");
}

#[tokio::test]
async fn admin_viewer_cannot_revoke() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "ops@basalt",
            Vec::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            Some(AdminRole::Viewer),
        )
        .await;

    let response = h
        .rpc(
            "/admin.v1.TokenService/Revoke",
            Some(&bearer),
            json!({"user_id": "john.doe@github", "uuid": "11f8d4b2-6d6f-44aa-a790-6907e79eaa4c"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_token_is_unauthenticated() {
    let h = harness().await;
    let response = h
        .rpc("/api.v1.IPService/List", None, json!({"project": "p-1"}))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["message"], "token is not valid");
}

#[tokio::test]
async fn revoked_token_is_denied() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::from([("p-1".to_string(), ProjectRole::Owner)]),
            BTreeMap::new(),
            None,
        )
        .await;

    // Self-revoke through the RPC surface.
    let response = h
        .rpc("/api.v1.TokenService/List", Some(&bearer), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let tokens = read_json(response).await;
    let uuid = tokens["tokens"][0]["id"].as_str().expect("id").to_string();

    let response = h
        .rpc(
            "/api.v1.TokenService/Revoke",
            Some(&bearer),
            json!({"uuid": uuid}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .rpc("/api.v1.TokenService/List", Some(&bearer), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["message"], "token was revoked or has expired");
}

#[tokio::test]
async fn expired_token_counts_as_revoked() {
    let h = harness().await;
    // A signed form whose exp is seconds in the past still passes signature
    // validation inside the leeway, but its record never existed in the
    // store, which is indistinguishable from TTL eviction.
    let signing = h.state.keys.latest_private().await.expect("signing key");
    let now = chrono::Utc::now().timestamp();
    let claims = basalt_authz::Claims {
        iss: common::ISSUER.to_string(),
        sub: "john.doe@github".to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        iat: now - 3600,
        nbf: now - 3600,
        exp: now - 1,
        token_type: "CONSOLE".to_string(),
    };
    let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::ES256);
    header.kid = Some(signing.kid.clone());
    let secret =
        jsonwebtoken::encode(&header, &claims, &signing.encoding_key).expect("encode");

    let response = h
        .rpc(
            "/api.v1.TokenService/List",
            Some(&format!("Bearer {secret}")),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["message"], "token was revoked or has expired");
}

#[tokio::test]
async fn unknown_project_resolves_to_not_found() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::from([("p-404".to_string(), ProjectRole::Owner)]),
            BTreeMap::new(),
            None,
        )
        .await;

    let response = h
        .rpc(
            "/api.v1.IPService/List",
            Some(&bearer),
            json!({"project": "p-404"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["message"], "project not found");
}

#[tokio::test]
async fn tenant_viewer_reads_tenant() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::new(),
            BTreeMap::from([("acme".to_string(), TenantRole::Viewer)]),
            None,
        )
        .await;

    let response = h
        .rpc(
            "/api.v1.TenantService/Get",
            Some(&bearer),
            json!({"tenant": "acme"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["tenant"]["name"], "Acme Corp");
}

#[tokio::test]
async fn validation_failure_is_a_failed_precondition() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
        )
        .await;

    let response = h
        .rpc(
            "/api.v1.TokenService/Revoke",
            Some(&bearer),
            json!({"uuid": "not-a-uuid"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    let body = read_json(response).await;
    assert!(
        body["message"]
            .as_str()
            .expect("message")
            .starts_with("request validation failed")
    );
}

#[tokio::test]
async fn explicit_permission_grants_exactly_its_methods() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "svc@backend",
            vec![MethodPermission {
                subject: "p-1".to_string(),
                methods: vec!["/api.v1.IPService/List".to_string()],
            }],
            BTreeMap::new(),
            BTreeMap::new(),
            None,
        )
        .await;

    let response = h
        .rpc(
            "/api.v1.IPService/List",
            Some(&bearer),
            json!({"project": "p-1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .rpc(
            "/api.v1.IPService/Allocate",
            Some(&bearer),
            json!({"project": "p-1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn method_service_lists_effective_methods() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::from([("p-1".to_string(), ProjectRole::Viewer)]),
            BTreeMap::new(),
            None,
        )
        .await;

    let response = h
        .rpc("/api.v1.MethodService/List", Some(&bearer), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let permissions = body["permissions"].as_array().expect("permissions");
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0]["subject"], "p-1");
    let methods = permissions[0]["methods"].as_array().expect("methods");
    assert!(methods.contains(&serde_json::json!("/api.v1.IPService/List")));
    assert!(!methods.contains(&serde_json::json!("/api.v1.IPService/Allocate")));
}

#[tokio::test]
async fn project_list_resolves_callers_projects() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
            Vec::new(),
            BTreeMap::from([
                ("p-1".to_string(), ProjectRole::Owner),
                ("p-2".to_string(), ProjectRole::Viewer),
            ]),
            BTreeMap::new(),
            None,
        )
        .await;

    let response = h
        .rpc("/api.v1.ProjectService/List", Some(&bearer), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["projects"].as_array().expect("projects").len(), 2);
}
