//! Bearer token codec.
//!
//! # Purpose
//! Defines the signed-claim structures and the sign/parse/verify helpers for
//! basalt bearer credentials. The signed form carries only registered claims
//! plus the token type; every authorization field lives in the server-side
//! token record, so a bearer credential is a reference to a capability, not
//! the capability itself.
use crate::errors::{AuthzError, AuthzResult};
use crate::jwks::Jwks;
use crate::roles::{AdminRole, ProjectRole, TenantRole};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Expiration applied when a console token is requested without one.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(8 * 60 * 60);
/// Ceiling for any token lifetime.
pub const MAX_EXPIRATION: Duration = Duration::from_secs(90 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    Unspecified,
    Console,
    Api,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Unspecified => "UNSPECIFIED",
            TokenType::Console => "CONSOLE",
            TokenType::Api => "API",
        }
    }

    /// Stable integer form used in the storage encoding.
    pub fn as_i32(self) -> i32 {
        match self {
            TokenType::Unspecified => 0,
            TokenType::Console => 1,
            TokenType::Api => 2,
        }
    }

    pub fn from_i32(value: i32) -> TokenType {
        match value {
            1 => TokenType::Console,
            2 => TokenType::Api,
            _ => TokenType::Unspecified,
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CONSOLE" => Ok(TokenType::Console),
            "API" => Ok(TokenType::Api),
            "UNSPECIFIED" => Ok(TokenType::Unspecified),
            _ => Err(()),
        }
    }
}

/// Registered claims plus the custom `type` claim carried in the signed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// A capability record: the methods a token may invoke on one subject
/// (a project id or a tenant id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodPermission {
    pub subject: String,
    pub methods: Vec<String>,
}

/// The authoritative server-side record for an issued credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Matches the `jti` of the signed form.
    pub id: String,
    pub user_id: String,
    pub description: String,
    pub token_type: TokenType,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<MethodPermission>,
    pub project_roles: BTreeMap<String, ProjectRole>,
    pub tenant_roles: BTreeMap<String, TenantRole>,
    pub admin_role: Option<AdminRole>,
}

impl Token {
    /// Explicit permissions grouped by subject, duplicate subjects merged.
    pub fn permissions_by_subject(&self) -> BTreeMap<String, Vec<String>> {
        let mut res: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for permission in &self.permissions {
            res.entry(permission.subject.clone())
                .or_default()
                .extend(permission.methods.iter().cloned());
        }
        res
    }
}

/// Sign a fresh bearer credential.
///
/// Returns the compact serialized JWS and a token record skeleton carrying
/// the identity fields; the caller populates the authorization fields before
/// storing it. A zero `ttl` falls back to [`DEFAULT_EXPIRATION`].
pub fn issue(
    token_type: TokenType,
    subject: &str,
    issuer: &str,
    ttl: Duration,
    key: &EncodingKey,
    kid: &str,
) -> AuthzResult<(String, Token)> {
    let ttl = if ttl.is_zero() { DEFAULT_EXPIRATION } else { ttl };
    if ttl > MAX_EXPIRATION {
        return Err(AuthzError::TtlExceeded {
            requested_secs: ttl.as_secs(),
            max_secs: MAX_EXPIRATION.as_secs(),
        });
    }

    let issued_at = Utc::now();
    let expires_at = issued_at + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
    let claims = Claims {
        iss: issuer.to_string(),
        sub: subject.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: issued_at.timestamp(),
        nbf: issued_at.timestamp(),
        exp: expires_at.timestamp(),
        token_type: token_type.as_str().to_string(),
    };

    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(kid.to_string());
    let signed = jsonwebtoken::encode(&header, &claims, key)?;

    let token = Token {
        id: claims.jti.clone(),
        user_id: subject.to_string(),
        description: String::new(),
        token_type,
        issued_at,
        expires_at,
        permissions: Vec::new(),
        project_roles: BTreeMap::new(),
        tenant_roles: BTreeMap::new(),
        admin_role: None,
    };

    Ok((signed, token))
}

/// Decode the claims of a compact JWS without verifying its signature.
///
/// Signature and registered-claim validation happen in the policy engine via
/// [`verify`]; an error here signals malformed input only. Empty input means
/// "no credential presented" and yields `Ok(None)`.
pub fn parse(raw: &str) -> AuthzResult<Option<Claims>> {
    if raw.is_empty() {
        return Ok(None);
    }

    let mut segments = raw.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthzError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let decoded = URL_SAFE_NO_PAD
        .decode(payload.as_bytes())
        .map_err(|err| AuthzError::MalformedToken(format!("payload segment: {err}")))?;
    let claims = serde_json::from_slice(&decoded)
        .map_err(|err| AuthzError::MalformedToken(format!("claims: {err}")))?;

    Ok(Some(claims))
}

/// Verify a compact JWS against a public-key set.
///
/// Checks the ES256 signature via the `kid` header (falling back to trying
/// every key when no `kid` is present), the issuer against the allow-list,
/// and the `nbf`/`exp` window.
pub fn verify(raw: &str, jwks: &Jwks, allowed_issuers: &[String]) -> AuthzResult<Claims> {
    let header = jsonwebtoken::decode_header(raw)?;

    let mut validation = Validation::new(Algorithm::ES256);
    validation.validate_nbf = true;
    validation.set_issuer(allowed_issuers);

    let candidates: Vec<_> = match header.kid.as_deref() {
        Some(kid) => vec![
            jwks.find(kid)
                .ok_or_else(|| AuthzError::MissingKey(Some(kid.to_string())))?,
        ],
        None => jwks.keys.iter().collect(),
    };
    if candidates.is_empty() {
        return Err(AuthzError::MissingKey(None));
    }

    let mut last_err = None;
    for jwk in candidates {
        let decoding_key = DecodingKey::from_ec_components(&jwk.x, &jwk.y)?;
        match jsonwebtoken::decode::<Claims>(raw, &decoding_key, &validation) {
            Ok(data) => return Ok(data.claims),
            Err(err) => last_err = Some(err),
        }
    }
    Err(AuthzError::Jwt(last_err.expect("at least one candidate")))
}
