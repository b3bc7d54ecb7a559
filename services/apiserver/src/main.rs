// Basalt api-server
// -----------------
// RPC front door of the basalt cloud-infrastructure control plane. Every
// incoming call passes the interceptor chain (validation, authentication and
// authorization, token whitelist, rate limiting, scope resolution) before a
// handler runs. Besides `serve`, the binary carries the operator `token`
// subcommands: minting bootstrap API tokens and migrating legacy token
// records. Those act directly on the key-value store and never traverse RPC.
use anyhow::{Context, Result, anyhow, bail};
use apiserver::api::token::TokenIssuer;
use apiserver::api::types::TokenServiceCreateRequest;
use apiserver::app::{AppOptions, AppState, build_router};
use apiserver::auth::keys::SigningKeyStore;
use apiserver::config::Config;
use apiserver::masterdata::{MasterdataClient, MemoryMasterdata, retry_connect};
use apiserver::observability;
use apiserver::store::KvBackend;
use apiserver::store::memory::MemoryKv;
use apiserver::store::postgres::PostgresKv;
use apiserver::store::tokens::TokenStore;
use basalt_authz::{AdminRole, MethodPermission, ProjectRole, TenantRole};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const KV_OP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "apiserver", about = "basalt cloud-infrastructure api server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the api server.
    Serve,
    /// Operator token utilities.
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Signing-key utilities.
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Generate a new signing key and make it the current one. Previous
    /// keys stay in the public set until their tokens expire.
    Rotate,
}

#[derive(Subcommand)]
enum TokenCommand {
    /// Mint an api token for infrastructure services that depend on the
    /// api-server (accounting, status dashboard, ...) and print the secret.
    Create {
        /// What this token is going to be used for.
        #[arg(long, default_value = "")]
        description: String,
        /// Requested permissions, `<subject>=<method>[:<method>...]`.
        #[arg(long)]
        permissions: Vec<String>,
        /// Requested project roles, `<project-id>=<role>`.
        #[arg(long)]
        project_roles: Vec<String>,
        /// Requested tenant roles, `<tenant-id>=<role>`.
        #[arg(long)]
        tenant_roles: Vec<String>,
        /// Requested admin role (EDITOR or VIEWER).
        #[arg(long)]
        admin_role: Option<String>,
        /// Requested lifetime in seconds.
        #[arg(long, default_value_t = 30 * 24 * 60 * 60)]
        expiration: u64,
    },
    /// Re-encode every stored token record in the canonical schema.
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "unable to execute command");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve => serve().await,
        Command::Token { command } => token_command(command).await,
        Command::Key { command } => key_command(command).await,
    }
}

async fn key_command(command: KeyCommand) -> Result<()> {
    let config = Config::from_env_or_yaml()?;
    let kv = connect_kv(&config).await?;
    match command {
        KeyCommand::Rotate => {
            let kid = SigningKeyStore::new(kv)
                .rotate()
                .await
                .map_err(|err| anyhow!("key rotation failed: {err}"))?;
            println!("rotated signing key, new key id: {kid}");
        }
    }
    Ok(())
}

async fn serve() -> Result<()> {
    let config = Config::from_env_or_yaml()?;
    let metrics_handle = observability::init_observability("apiserver", &config.stage);

    let kv = connect_kv(&config).await?;
    let masterdata = connect_masterdata(&config).await?;

    let state = AppState::new(
        kv,
        masterdata,
        AppOptions {
            issuer: config.issuer.clone(),
            admin_subjects: config.admin_subjects.clone(),
            max_requests_per_minute: config.max_requests_per_minute,
            max_requests_per_minute_unauthenticated: config
                .max_requests_per_minute_unauthenticated,
            version: env!("CARGO_PKG_VERSION").to_string(),
            revision: option_env!("BASALT_REVISION").unwrap_or("unknown").to_string(),
        },
    );
    let router = build_router(state);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.http_endpoint,
        stage = config.stage,
        "running api-server"
    );

    tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_endpoint,
    ));

    let listener = tokio::net::TcpListener::bind(config.http_endpoint)
        .await
        .with_context(|| format!("bind {}", config.http_endpoint))?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serve rpc traffic")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}

async fn connect_kv(config: &Config) -> Result<Arc<dyn KvBackend>> {
    if config.key_value_address.is_empty() {
        tracing::warn!("no key-value address given, using the in-process store");
        return Ok(Arc::new(MemoryKv::new()));
    }
    let kv = PostgresKv::connect(
        &config.key_value_address,
        &config.key_value_password,
        KV_OP_TIMEOUT,
    )
    .await
    .context("connect key-value store")?;
    Ok(Arc::new(kv))
}

async fn connect_masterdata(config: &Config) -> Result<Arc<dyn MasterdataClient>> {
    if config.masterdata.host.is_empty() {
        tracing::warn!("no masterdata host given, using the in-process backend");
        return Ok(Arc::new(MemoryMasterdata::new()));
    }
    retry_connect(&config.masterdata).await
}

async fn token_command(command: TokenCommand) -> Result<()> {
    let config = Config::from_env_or_yaml()?;
    let kv = connect_kv(&config).await?;
    let tokens = TokenStore::new(kv.clone());

    match command {
        TokenCommand::Create {
            description,
            permissions,
            project_roles,
            tenant_roles,
            admin_role,
            expiration,
        } => {
            let issuer = TokenIssuer::new(
                tokens,
                SigningKeyStore::new(kv),
                config.issuer.clone(),
                config.admin_subjects.clone(),
            );

            let request = TokenServiceCreateRequest {
                description,
                permissions: parse_permissions(&permissions)?,
                project_roles: parse_roles::<ProjectRole>(&project_roles)?,
                tenant_roles: parse_roles::<TenantRole>(&tenant_roles)?,
                admin_role: admin_role
                    .map(|role| parse_role_name::<AdminRole>(&role))
                    .transpose()?,
                expires: Some(expiration),
            };

            let (_, secret) = issuer
                .create_api_token_unchecked(&request)
                .await
                .map_err(|err| anyhow!("{}", err.body.message))?;
            println!("{secret}");
        }
        TokenCommand::Migrate => {
            let migrated = tokens
                .migrate_all()
                .await
                .map_err(|err| anyhow!("token migration failed: {err}"))?;
            println!("migrated {migrated} tokens");
        }
    }

    Ok(())
}

fn parse_permissions(specs: &[String]) -> Result<Vec<MethodPermission>> {
    let mut permissions = Vec::new();
    for spec in specs {
        let Some((subject, methods)) = spec.split_once('=') else {
            bail!("permissions must be provided in the form <subject>=<methods-colon-separated>");
        };
        permissions.push(MethodPermission {
            subject: subject.to_string(),
            methods: methods.split(':').map(str::to_string).collect(),
        });
    }
    Ok(permissions)
}

fn parse_roles<R: FromStr>(specs: &[String]) -> Result<BTreeMap<String, R>> {
    let mut roles = BTreeMap::new();
    for spec in specs {
        let Some((subject, role)) = spec.split_once('=') else {
            bail!("roles must be provided in the form <subject>=<role>");
        };
        roles.insert(subject.to_string(), parse_role_name::<R>(role)?);
    }
    Ok(roles)
}

fn parse_role_name<R: FromStr>(role: &str) -> Result<R> {
    R::from_str(&role.to_uppercase()).map_err(|_| anyhow!("unknown role: {role}"))
}
