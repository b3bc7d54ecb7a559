use crate::masterdata::MasterdataConfig;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;

pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 100;
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE_UNAUTHENTICATED: u32 = 20;

// Api-server configuration sourced from environment variables, with an
// optional YAML override file for ops deployments.
#[derive(Debug, Clone)]
pub struct Config {
    // Address accepting RPC traffic.
    pub http_endpoint: SocketAddr,
    // Prometheus scrape endpoint.
    pub metrics_endpoint: SocketAddr,
    // Key-value store; empty address selects the in-process store, which is
    // only allowed in the dev stage.
    pub key_value_address: String,
    pub key_value_password: String,
    // Login-flow session secret and console redirect target.
    pub session_secret: String,
    pub front_end_url: String,
    // Issuer URL signed into every token and accepted during verification.
    pub issuer: String,
    pub masterdata: MasterdataConfig,
    // User ids eligible for admin-role uplift during token creation.
    pub admin_subjects: Vec<String>,
    pub max_requests_per_minute: u32,
    pub max_requests_per_minute_unauthenticated: u32,
    // Deployment label; "dev" relaxes the external-backend requirements.
    pub stage: String,
}

#[derive(Debug, Deserialize)]
struct ConfigOverride {
    http_endpoint: Option<String>,
    metrics_endpoint: Option<String>,
    key_value_address: Option<String>,
    key_value_password: Option<String>,
    session_secret: Option<String>,
    front_end_url: Option<String>,
    issuer: Option<String>,
    masterdata_host: Option<String>,
    masterdata_port: Option<u16>,
    masterdata_hmac: Option<String>,
    admin_subjects: Option<Vec<String>>,
    max_requests_per_minute: Option<u32>,
    max_requests_per_minute_unauthenticated: Option<u32>,
    stage: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let http_endpoint = env_or("BASALT_HTTP_ENDPOINT", "0.0.0.0:8080")
            .parse()
            .with_context(|| "parse BASALT_HTTP_ENDPOINT")?;
        let metrics_endpoint = env_or("BASALT_METRICS_ENDPOINT", "0.0.0.0:9090")
            .parse()
            .with_context(|| "parse BASALT_METRICS_ENDPOINT")?;

        let masterdata = MasterdataConfig {
            host: env_or("BASALT_MASTERDATA_HOST", ""),
            port: env_or("BASALT_MASTERDATA_PORT", "8443")
                .parse()
                .with_context(|| "parse BASALT_MASTERDATA_PORT")?,
            hmac: env_or("BASALT_MASTERDATA_HMAC", ""),
            ca_path: env_or("BASALT_MASTERDATA_CA", ""),
            cert_path: env_or("BASALT_MASTERDATA_CERT", ""),
            key_path: env_or("BASALT_MASTERDATA_KEY", ""),
        };

        let admin_subjects = env_or("BASALT_ADMIN_SUBJECTS", "")
            .split(',')
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            http_endpoint,
            metrics_endpoint,
            key_value_address: env_or("BASALT_KEY_VALUE_ADDRESS", ""),
            key_value_password: env_or("BASALT_KEY_VALUE_PASSWORD", ""),
            session_secret: env_or("BASALT_SESSION_SECRET", ""),
            front_end_url: env_or("BASALT_FRONT_END_URL", ""),
            issuer: env_or("BASALT_ISSUER", "http://localhost:8080"),
            masterdata,
            admin_subjects,
            max_requests_per_minute: env_or(
                "BASALT_MAX_REQUESTS_PER_MINUTE",
                &DEFAULT_MAX_REQUESTS_PER_MINUTE.to_string(),
            )
            .parse()
            .with_context(|| "parse BASALT_MAX_REQUESTS_PER_MINUTE")?,
            max_requests_per_minute_unauthenticated: env_or(
                "BASALT_MAX_REQUESTS_PER_MINUTE_UNAUTHENTICATED",
                &DEFAULT_MAX_REQUESTS_PER_MINUTE_UNAUTHENTICATED.to_string(),
            )
            .parse()
            .with_context(|| "parse BASALT_MAX_REQUESTS_PER_MINUTE_UNAUTHENTICATED")?,
            stage: env_or("BASALT_STAGE", "dev"),
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("BASALT_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read BASALT_CONFIG: {path}"))?;
            let override_cfg: ConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse api-server config yaml")?;
            if let Some(value) = override_cfg.http_endpoint {
                config.http_endpoint = value.parse().with_context(|| "parse http_endpoint")?;
            }
            if let Some(value) = override_cfg.metrics_endpoint {
                config.metrics_endpoint =
                    value.parse().with_context(|| "parse metrics_endpoint")?;
            }
            if let Some(value) = override_cfg.key_value_address {
                config.key_value_address = value;
            }
            if let Some(value) = override_cfg.key_value_password {
                config.key_value_password = value;
            }
            if let Some(value) = override_cfg.session_secret {
                config.session_secret = value;
            }
            if let Some(value) = override_cfg.front_end_url {
                config.front_end_url = value;
            }
            if let Some(value) = override_cfg.issuer {
                config.issuer = value;
            }
            if let Some(value) = override_cfg.masterdata_host {
                config.masterdata.host = value;
            }
            if let Some(value) = override_cfg.masterdata_port {
                config.masterdata.port = value;
            }
            if let Some(value) = override_cfg.masterdata_hmac {
                config.masterdata.hmac = value;
            }
            if let Some(value) = override_cfg.admin_subjects {
                config.admin_subjects = value;
            }
            if let Some(value) = override_cfg.max_requests_per_minute {
                config.max_requests_per_minute = value;
            }
            if let Some(value) = override_cfg.max_requests_per_minute_unauthenticated {
                config.max_requests_per_minute_unauthenticated = value;
            }
            if let Some(value) = override_cfg.stage {
                config.stage = value;
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn is_dev(&self) -> bool {
        self.stage == "dev"
    }

    fn validate(&self) -> Result<()> {
        if !self.is_dev() {
            if self.key_value_address.is_empty() {
                bail!("the in-process key-value store is only allowed in the dev stage");
            }
            if self.masterdata.host.is_empty() {
                bail!("masterdata host must be configured outside the dev stage");
            }
        }
        Ok(())
    }
}
