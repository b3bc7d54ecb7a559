//! Shared helpers for the api-server integration tests.
//!
//! Builds a fully wired router on the in-memory key-value store and
//! masterdata backend, with helpers to mint and store tokens and to drive
//! RPCs through the whole interceptor chain.
use apiserver::app::{AppOptions, AppState, build_router};
use apiserver::masterdata::{MemoryMasterdata, Project, Tenant};
use apiserver::store::memory::MemoryKv;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use basalt_authz::{AdminRole, MethodPermission, ProjectRole, TenantRole, TokenType};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const ISSUER: &str = "https://api.basalt.example";

pub struct TestHarness {
    pub state: AppState,
    pub router: Router,
}

pub fn default_options() -> AppOptions {
    AppOptions {
        issuer: ISSUER.to_string(),
        admin_subjects: Vec::new(),
        max_requests_per_minute: 1000,
        max_requests_per_minute_unauthenticated: 1000,
        version: "test".to_string(),
        revision: "deadbeef".to_string(),
    }
}

pub async fn harness() -> TestHarness {
    harness_with(default_options()).await
}

pub async fn harness_with(options: AppOptions) -> TestHarness {
    let masterdata = Arc::new(MemoryMasterdata::new());
    masterdata
        .put_tenant(Tenant {
            id: "acme".to_string(),
            name: "Acme Corp".to_string(),
            email: "ops@acme.example".to_string(),
        })
        .await;
    masterdata
        .put_project(Project {
            id: "p-1".to_string(),
            name: "workloads".to_string(),
            tenant_id: "acme".to_string(),
        })
        .await;
    masterdata
        .put_project(Project {
            id: "p-2".to_string(),
            name: "sandbox".to_string(),
            tenant_id: "acme".to_string(),
        })
        .await;

    let state = AppState::new(Arc::new(MemoryKv::new()), masterdata, options);
    let router = build_router(state.clone());
    TestHarness { state, router }
}

impl TestHarness {
    /// Issue and store a console token for `user`, returning the bearer
    /// header value.
    pub async fn bearer(
        &self,
        user: &str,
        permissions: Vec<MethodPermission>,
        project_roles: BTreeMap<String, ProjectRole>,
        tenant_roles: BTreeMap<String, TenantRole>,
        admin_role: Option<AdminRole>,
    ) -> String {
        let signing = self.state.keys.latest_private().await.expect("signing key");
        let (secret, mut token) = basalt_authz::issue(
            TokenType::Console,
            user,
            ISSUER,
            Duration::from_secs(3600),
            &signing.encoding_key,
            &signing.kid,
        )
        .expect("issue");
        token.permissions = permissions;
        token.project_roles = project_roles;
        token.tenant_roles = tenant_roles;
        token.admin_role = admin_role;
        self.state.tokens.put(&token).await.expect("store token");
        format!("Bearer {secret}")
    }

    pub async fn rpc(&self, method: &str, bearer: Option<&str>, body: Value) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(method)
            .header("content-type", "application/json");
        if let Some(bearer) = bearer {
            request = request.header("authorization", bearer);
        }
        let request = request
            .body(Body::from(body.to_string()))
            .expect("request");
        self.router.clone().oneshot(request).await.expect("rpc")
    }
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
