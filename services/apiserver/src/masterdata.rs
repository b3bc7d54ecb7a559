//! Masterdata lookup client.
//!
//! # Purpose
//! Projects and tenants are owned by the masterdata backend; the api-server
//! only reads them to resolve request scopes and to answer listing calls.
//! The HTTP client authenticates with a shared HMAC header and bounds every
//! call with a short deadline so a slow backend fails requests fast.
//!
//! # Startup behavior
//! The server never gives up connecting to masterdata: the retry loop keeps
//! probing every three seconds so an ops restart of the backend does not
//! require restarting this process.
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

const REQUEST_DEADLINE: Duration = Duration::from_secs(3);
const RETRY_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Error)]
pub enum MasterdataError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait MasterdataClient: Send + Sync {
    async fn get_project(&self, id: &str) -> Result<Project, MasterdataError>;
    async fn get_tenant(&self, id: &str) -> Result<Tenant, MasterdataError>;
    async fn list_tenants(&self) -> Result<Vec<Tenant>, MasterdataError>;
    async fn probe(&self) -> Result<(), MasterdataError>;
}

#[derive(Debug, Clone)]
pub struct MasterdataConfig {
    pub host: String,
    pub port: u16,
    pub hmac: String,
    pub ca_path: String,
    pub cert_path: String,
    pub key_path: String,
}

pub struct HttpMasterdata {
    client: reqwest::Client,
    base_url: String,
    hmac: String,
}

impl HttpMasterdata {
    pub fn connect(config: &MasterdataConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_DEADLINE);

        if !config.ca_path.is_empty() {
            let pem = std::fs::read(&config.ca_path)
                .with_context(|| format!("read masterdata ca: {}", config.ca_path))?;
            let cert = reqwest::Certificate::from_pem(&pem).context("parse masterdata ca")?;
            builder = builder.add_root_certificate(cert);
        }
        if !config.cert_path.is_empty() && !config.key_path.is_empty() {
            let mut pem = std::fs::read(&config.cert_path)
                .with_context(|| format!("read masterdata cert: {}", config.cert_path))?;
            let key = std::fs::read(&config.key_path)
                .with_context(|| format!("read masterdata key: {}", config.key_path))?;
            pem.extend_from_slice(&key);
            let identity =
                reqwest::Identity::from_pem(&pem).context("parse masterdata client identity")?;
            builder = builder.identity(identity);
        }

        let scheme = if config.ca_path.is_empty() { "http" } else { "https" };
        Ok(Self {
            client: builder.build().context("build masterdata client")?,
            base_url: format!("{scheme}://{}:{}", config.host, config.port),
            hmac: config.hmac.clone(),
        })
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        subject: &str,
    ) -> Result<T, MasterdataError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header("x-masterdata-hmac", &self.hmac)
            .send()
            .await
            .context("masterdata request")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MasterdataError::NotFound(subject.to_string()));
        }
        let response = response
            .error_for_status()
            .context("masterdata response status")?;
        Ok(response.json().await.context("masterdata response body")?)
    }
}

#[async_trait]
impl MasterdataClient for HttpMasterdata {
    async fn get_project(&self, id: &str) -> Result<Project, MasterdataError> {
        self.fetch(&format!("/v1/projects/{id}"), id).await
    }

    async fn get_tenant(&self, id: &str) -> Result<Tenant, MasterdataError> {
        self.fetch(&format!("/v1/tenants/{id}"), id).await
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, MasterdataError> {
        self.fetch("/v1/tenants", "tenants").await
    }

    async fn probe(&self) -> Result<(), MasterdataError> {
        let response = self
            .client
            .get(format!("{}/v1/health", self.base_url))
            .header("x-masterdata-hmac", &self.hmac)
            .send()
            .await
            .context("masterdata probe")?;
        response.error_for_status().context("masterdata health")?;
        Ok(())
    }
}

/// Block until masterdata answers its health probe. This loop never gives
/// up; startup is not complete without the backend.
pub async fn retry_connect(config: &MasterdataConfig) -> anyhow::Result<Arc<dyn MasterdataClient>> {
    let client = HttpMasterdata::connect(config)?;
    loop {
        match client.probe().await {
            Ok(()) => break,
            Err(err) => {
                tracing::error!(error = %err, "unable to initialize masterdata client, retrying...");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
    }
    tracing::info!("masterdata client initialized");
    Ok(Arc::new(client))
}

/// In-memory masterdata used by tests and the dev stage.
#[derive(Default)]
pub struct MemoryMasterdata {
    projects: RwLock<HashMap<String, Project>>,
    tenants: RwLock<HashMap<String, Tenant>>,
}

impl MemoryMasterdata {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_project(&self, project: Project) {
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project);
    }

    pub async fn put_tenant(&self, tenant: Tenant) {
        self.tenants.write().await.insert(tenant.id.clone(), tenant);
    }
}

#[async_trait]
impl MasterdataClient for MemoryMasterdata {
    async fn get_project(&self, id: &str) -> Result<Project, MasterdataError> {
        self.projects
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MasterdataError::NotFound(id.to_string()))
    }

    async fn get_tenant(&self, id: &str) -> Result<Tenant, MasterdataError> {
        self.tenants
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MasterdataError::NotFound(id.to_string()))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, MasterdataError> {
        let mut tenants: Vec<_> = self.tenants.read().await.values().cloned().collect();
        tenants.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tenants)
    }

    async fn probe(&self) -> Result<(), MasterdataError> {
        Ok(())
    }
}
