//! Application wiring.
//!
//! # Purpose
//! Builds the Axum router with the interceptor chain and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! Route paths are the fully-qualified RPC method names; the service
//! catalogue governs their authorization, the router only dispatches.
use crate::api;
use crate::api::ip::IpPool;
use crate::api::token::TokenIssuer;
use crate::auth::cache::TtlCache;
use crate::auth::keys::SigningKeyStore;
use crate::auth::policy::{KeySet, PolicyEngine};
use crate::interceptor;
use crate::masterdata::{MasterdataClient, Project};
use crate::observability;
use crate::store::KvBackend;
use crate::store::tokens::TokenStore;
use axum::routing::post;
use axum::{Router, middleware};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;

const KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const PROJECT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KvBackend>,
    pub tokens: TokenStore,
    pub keys: SigningKeyStore,
    pub policy: Arc<PolicyEngine>,
    pub issuer: Arc<TokenIssuer>,
    pub masterdata: Arc<dyn MasterdataClient>,
    pub project_cache: Arc<TtlCache<String, Project>>,
    pub ips: Arc<IpPool>,
    pub max_requests_per_minute: u32,
    pub max_requests_per_minute_unauthenticated: u32,
    pub version: String,
    pub revision: String,
}

pub struct AppOptions {
    pub issuer: String,
    pub admin_subjects: Vec<String>,
    pub max_requests_per_minute: u32,
    pub max_requests_per_minute_unauthenticated: u32,
    pub version: String,
    pub revision: String,
}

impl AppState {
    pub fn new(
        kv: Arc<dyn KvBackend>,
        masterdata: Arc<dyn MasterdataClient>,
        options: AppOptions,
    ) -> AppState {
        let tokens = TokenStore::new(kv.clone());
        let keys = SigningKeyStore::new(kv.clone());

        let cache_keys = keys.clone();
        let key_cache: Arc<TtlCache<(), KeySet>> =
            Arc::new(TtlCache::new(KEY_CACHE_TTL, move |_key: ()| {
                let keys = cache_keys.clone();
                async move { Ok(keys.public_keys().await?) }
            }));

        let cache_masterdata = masterdata.clone();
        let project_cache = Arc::new(TtlCache::new(PROJECT_CACHE_TTL, move |id: String| {
            let masterdata = cache_masterdata.clone();
            async move { Ok(masterdata.get_project(&id).await?) }
        }));

        let policy = Arc::new(PolicyEngine::new(
            tokens.clone(),
            key_cache,
            vec![options.issuer.clone()],
        ));
        let issuer = Arc::new(TokenIssuer::new(
            tokens.clone(),
            keys.clone(),
            options.issuer,
            options.admin_subjects,
        ));

        AppState {
            kv,
            tokens,
            keys,
            policy,
            issuer,
            masterdata,
            project_cache,
            ips: Arc::new(IpPool::new()),
            max_requests_per_minute: options.max_requests_per_minute,
            max_requests_per_minute_unauthenticated: options.max_requests_per_minute_unauthenticated,
            version: options.version,
            revision: options.revision,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "rpc.request",
                method = %request.uri().path(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    let chain = ServiceBuilder::new()
        .layer(trace_layer)
        .layer(middleware::from_fn(interceptor::validate::validate))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            interceptor::authorize::authorize,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            interceptor::whitelist::whitelist,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            interceptor::ratelimit::ratelimit,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            interceptor::scope::resolve_scope,
        ));

    Router::new()
        .route("/api.v1.HealthService/Get", post(api::system::health))
        .route("/api.v1.VersionService/Get", post(api::system::version))
        .route("/api.v1.TokenService/Create", post(api::token::create))
        .route("/api.v1.TokenService/List", post(api::token::list))
        .route("/api.v1.TokenService/Revoke", post(api::token::revoke))
        .route("/api.v1.MethodService/List", post(api::method::list))
        .route("/api.v1.ProjectService/List", post(api::project::list))
        .route("/api.v1.ProjectService/Get", post(api::project::get))
        .route("/api.v1.IPService/Get", post(api::ip::get))
        .route("/api.v1.IPService/List", post(api::ip::list))
        .route("/api.v1.IPService/Allocate", post(api::ip::allocate))
        .route("/api.v1.IPService/Delete", post(api::ip::delete))
        .route("/api.v1.TenantService/Get", post(api::tenant::get))
        .route("/admin.v1.TenantService/List", post(api::admin::tenant_list))
        .route("/admin.v1.TokenService/List", post(api::admin::token_list))
        .route(
            "/admin.v1.TokenService/Revoke",
            post(api::admin::token_revoke),
        )
        .layer(chain)
        .with_state(state)
}
