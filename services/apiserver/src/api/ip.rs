//! IP resource service.
//!
//! Thin, memory-backed handlers that exercise the project-scoped half of the
//! interceptor chain. The authoritative IP management lives in the metal
//! backend; this service carries the request/response contract.
use crate::api::error::{ApiError, api_not_found};
use crate::api::types::{
    Ip, IpServiceAllocateRequest, IpServiceAllocateResponse, IpServiceDeleteRequest,
    IpServiceDeleteResponse, IpServiceGetRequest, IpServiceGetResponse, IpServiceListRequest,
    IpServiceListResponse,
};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct IpPool {
    ips: RwLock<HashMap<String, Ip>>,
    next: AtomicU32,
}

impl IpPool {
    pub fn new() -> Self {
        Self::default()
    }

    async fn allocate(&self, project: &str, name: &str, description: &str) -> Ip {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let ip = Ip {
            uuid: Uuid::new_v4().to_string(),
            ip: format!("198.51.100.{}", n % 256),
            project: project.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        };
        self.ips.write().await.insert(ip.uuid.clone(), ip.clone());
        ip
    }

    async fn get(&self, project: &str, uuid: &str) -> Option<Ip> {
        self.ips
            .read()
            .await
            .get(uuid)
            .filter(|ip| ip.project == project)
            .cloned()
    }

    async fn list(&self, project: &str) -> Vec<Ip> {
        let mut ips: Vec<_> = self
            .ips
            .read()
            .await
            .values()
            .filter(|ip| ip.project == project)
            .cloned()
            .collect();
        ips.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        ips
    }

    async fn delete(&self, project: &str, uuid: &str) -> Option<Ip> {
        let mut ips = self.ips.write().await;
        match ips.get(uuid) {
            Some(ip) if ip.project == project => ips.remove(uuid),
            _ => None,
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    Json(req): Json<IpServiceListRequest>,
) -> Result<Json<IpServiceListResponse>, ApiError> {
    Ok(Json(IpServiceListResponse {
        ips: state.ips.list(&req.project).await,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    Json(req): Json<IpServiceGetRequest>,
) -> Result<Json<IpServiceGetResponse>, ApiError> {
    let ip = state
        .ips
        .get(&req.project, &req.uuid)
        .await
        .ok_or_else(|| api_not_found("ip not found"))?;
    Ok(Json(IpServiceGetResponse { ip }))
}

pub async fn allocate(
    State(state): State<AppState>,
    Json(req): Json<IpServiceAllocateRequest>,
) -> Result<Json<IpServiceAllocateResponse>, ApiError> {
    let ip = state
        .ips
        .allocate(&req.project, &req.name, &req.description)
        .await;
    Ok(Json(IpServiceAllocateResponse { ip }))
}

pub async fn delete(
    State(state): State<AppState>,
    Json(req): Json<IpServiceDeleteRequest>,
) -> Result<Json<IpServiceDeleteResponse>, ApiError> {
    let ip = state
        .ips
        .delete(&req.project, &req.uuid)
        .await
        .ok_or_else(|| api_not_found("ip not found"))?;
    Ok(Json(IpServiceDeleteResponse { ip }))
}
