//! Token issuance flows: the privilege-reduction rules over RPC, the
//! trusted console/CLI paths, and rate limiting.
mod common;

use axum::http::StatusCode;
use basalt_authz::{MethodPermission, ProjectRole, TokenType};
use common::{default_options, harness, harness_with, read_json};
use serde_json::json;
use std::collections::BTreeMap;

#[tokio::test]
async fn privilege_reduction_denies_stronger_role() {
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
            "/api.v1.TokenService/Create",
            Some(&bearer),
            json!({
                "project_roles": {"p-1": "OWNER"},
                "expires": 3600
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["code"], "permission_denied");
    assert_eq!(
        body["message"],
        "requested role 'OWNER' is higher than allowed role 'EDITOR'"
    );
}

#[tokio::test]
async fn created_token_works_and_is_narrower() {
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
            "/api.v1.TokenService/Create",
            Some(&bearer),
            json!({
                "description": "read-only automation",
                "permissions": [
                    {"subject": "p-1", "methods": ["/api.v1.IPService/List"]}
                ],
                "expires": 3600
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["token"]["token_type"], "API");
    assert_eq!(body["token"]["user_id"], "john.doe@github");
    let secret = body["secret"].as_str().expect("secret").to_string();
    let derived = format!("Bearer {secret}");

    // The derived token can list ...
    let response = h
        .rpc(
            "/api.v1.IPService/List",
            Some(&derived),
            json!({"project": "p-1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // ... but not allocate, even though its creator could.
    let response = h
        .rpc(
            "/api.v1.IPService/Allocate",
            Some(&derived),
            json!({"project": "p-1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn creation_rejects_zero_ttl() {
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
            "/api.v1.TokenService/Create",
            Some(&bearer),
            json!({"expires": 0}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["message"], "ttl must be positive");
}

#[tokio::test]
async fn creation_rejects_foreign_subject() {
    let h = harness().await;
    let bearer = h
        .bearer(
            "john.doe@github",
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
            "/api.v1.TokenService/Create",
            Some(&bearer),
            json!({
                "permissions": [
                    {"subject": "p-2", "methods": ["/api.v1.IPService/List"]}
                ],
                "expires": 3600
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(
        body["message"],
        "requested subject 'p-2' access is not allowed"
    );
}

#[tokio::test]
async fn console_token_is_trusted_and_short_lived() {
    let h = harness().await;
    let (token, secret) = h
        .state
        .issuer
        .create_console_token(
            "jane.doe@github",
            &apiserver::api::types::TokenServiceCreateRequest {
                project_roles: BTreeMap::from([("p-1".to_string(), ProjectRole::Owner)]),
                ..Default::default()
            },
        )
        .await
        .expect("console token");

    assert_eq!(token.token_type, TokenType::Console);
    assert_eq!(
        token
            .expires_at
            .signed_duration_since(token.issued_at)
            .num_hours(),
        8
    );
    assert!(token.admin_role.is_none());

    let response = h
        .rpc(
            "/api.v1.IPService/List",
            Some(&format!("Bearer {secret}")),
            json!({"project": "p-1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cli_token_skips_the_permission_check() {
    let h = harness().await;
    let (token, secret) = h
        .state
        .issuer
        .create_api_token_unchecked(&apiserver::api::types::TokenServiceCreateRequest {
            description: "status dashboard".to_string(),
            admin_role: Some(basalt_authz::AdminRole::Viewer),
            expires: Some(3600),
            ..Default::default()
        })
        .await
        .expect("cli token");

    assert_eq!(token.user_id, apiserver::api::token::CLI_SUBJECT);
    assert_eq!(token.token_type, TokenType::Api);

    let response = h
        .rpc(
            "/admin.v1.TokenService/List",
            Some(&format!("Bearer {secret}")),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["tokens"].as_array().expect("tokens").len(), 1);
}

#[tokio::test]
async fn legacy_records_surface_migrated_through_the_admin_listing() {
    let h = harness().await;
    // A record in the pre-split shape: flat roles, lowercase role names,
    // UUID subjects meaning projects, `{*, admin}` meaning global admin.
    let legacy = serde_json::json!({
        "uuid": "11f8d4b2-6d6f-44aa-a790-6907e79eaa4c",
        "user_id": "john.doe@github",
        "expires": "2099-01-01T00:00:00Z",
        "issued_at": "2023-01-01T00:00:00Z",
        "token_type": 2,
        "roles": [
            {"subject": "9e1f0a54-9e9f-4ad6-9cbb-aaa0bd0c4d7b", "role": "owner"},
            {"subject": "*", "role": "admin"}
        ]
    });
    h.state
        .kv
        .put(
            "tokens/john.doe@github/11f8d4b2-6d6f-44aa-a790-6907e79eaa4c",
            &legacy.to_string(),
            None,
        )
        .await
        .expect("seed legacy record");

    let admin = h
        .bearer(
            "ops@basalt",
            Vec::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            Some(basalt_authz::AdminRole::Viewer),
        )
        .await;

    let response = h
        .rpc("/admin.v1.TokenService/List", Some(&admin), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let tokens = body["tokens"].as_array().expect("tokens");
    let legacy_token = tokens
        .iter()
        .find(|token| token["id"] == "11f8d4b2-6d6f-44aa-a790-6907e79eaa4c")
        .expect("legacy token listed");
    assert_eq!(
        legacy_token["project_roles"]["9e1f0a54-9e9f-4ad6-9cbb-aaa0bd0c4d7b"],
        "OWNER"
    );
    assert_eq!(legacy_token["admin_role"], "EDITOR");
}

#[tokio::test]
async fn anonymous_requests_are_rate_limited() {
    let mut options = default_options();
    options.max_requests_per_minute_unauthenticated = 2;
    let h = harness_with(options).await;

    for _ in 0..2 {
        let response = h.rpc("/api.v1.HealthService/Get", None, json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = h.rpc("/api.v1.HealthService/Get", None, json!({})).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get("retry-after")
        .expect("retry-after")
        .to_str()
        .expect("ascii")
        .parse::<u64>()
        .expect("seconds");
    assert!(retry_after <= 60);
}

#[tokio::test]
async fn authenticated_rate_limit_is_keyed_by_user() {
    let mut options = default_options();
    options.max_requests_per_minute = 2;
    let h = harness_with(options).await;

    let alice = h
        .bearer("alice", Vec::new(), BTreeMap::new(), BTreeMap::new(), None)
        .await;
    let bob = h
        .bearer("bob", Vec::new(), BTreeMap::new(), BTreeMap::new(), None)
        .await;

    for _ in 0..2 {
        let response = h
            .rpc("/api.v1.TokenService/List", Some(&alice), json!({}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = h
        .rpc("/api.v1.TokenService/List", Some(&alice), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Bob's bucket is unaffected.
    let response = h
        .rpc("/api.v1.TokenService/List", Some(&bob), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
