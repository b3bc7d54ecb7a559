//! Token store.
//!
//! # Purpose
//! Persists issued token records in the key-value backend under
//! `tokens/<user_id>/<token_id>`. Records carry a TTL equal to their
//! remaining lifetime so they self-evict; revocation is deletion, which makes
//! a revoked token indistinguishable from an expired one.
//!
//! # Legacy records
//! Older deployments stored roles as a flat `roles` list where the role was a
//! lowercase string, project and tenant subjects were told apart by parsing
//! the subject as a UUID, and `{*, admin}` marked a global admin. The decoder
//! falls back to that shape when the canonical decode fails and re-encodes in
//! canonical form on migration.
use super::{KvBackend, StoreError, StoreResult};
use basalt_authz::{AdminRole, MethodPermission, ProjectRole, TenantRole, Token, TokenType};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

const PREFIX: &str = "tokens/";

fn record_key(user_id: &str, token_id: &str) -> String {
    format!("{PREFIX}{user_id}/{token_id}")
}

fn user_prefix(user_id: &str) -> String {
    format!("{PREFIX}{user_id}/")
}

/// Canonical storage shape. `deny_unknown_fields` is what routes legacy
/// records (which carry a `roles` key) into the fallback decoder.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredToken {
    uuid: String,
    user_id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    permissions: Vec<MethodPermission>,
    expires: DateTime<Utc>,
    issued_at: DateTime<Utc>,
    #[serde(default)]
    token_type: i32,
    #[serde(default)]
    project_roles: BTreeMap<String, ProjectRole>,
    #[serde(default)]
    tenant_roles: BTreeMap<String, TenantRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    admin_role: Option<AdminRole>,
}

#[derive(Debug, Deserialize)]
struct LegacyRole {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    role: String,
}

/// Legacy timestamps appear either as RFC3339 strings or as raw
/// `{seconds, nanos}` objects, depending on which writer produced them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyInstant {
    Rfc3339(DateTime<Utc>),
    Proto {
        #[serde(default)]
        seconds: i64,
        #[serde(default)]
        nanos: i32,
    },
}

impl LegacyInstant {
    fn into_utc(self) -> DateTime<Utc> {
        match self {
            LegacyInstant::Rfc3339(at) => at,
            LegacyInstant::Proto { seconds, nanos } => Utc
                .timestamp_opt(seconds, nanos.max(0) as u32)
                .single()
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyStoredToken {
    uuid: String,
    user_id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    permissions: Vec<MethodPermission>,
    expires: LegacyInstant,
    issued_at: LegacyInstant,
    #[serde(default)]
    token_type: i32,
    #[serde(default)]
    roles: Vec<LegacyRole>,
}

fn is_project_subject(subject: &str) -> bool {
    Uuid::parse_str(subject).is_ok()
}

impl From<&Token> for StoredToken {
    fn from(token: &Token) -> Self {
        StoredToken {
            uuid: token.id.clone(),
            user_id: token.user_id.clone(),
            description: token.description.clone(),
            permissions: token.permissions.clone(),
            expires: token.expires_at,
            issued_at: token.issued_at,
            token_type: token.token_type.as_i32(),
            project_roles: token.project_roles.clone(),
            tenant_roles: token.tenant_roles.clone(),
            admin_role: token.admin_role,
        }
    }
}

impl From<StoredToken> for Token {
    fn from(stored: StoredToken) -> Self {
        Token {
            id: stored.uuid,
            user_id: stored.user_id,
            description: stored.description,
            token_type: TokenType::from_i32(stored.token_type),
            issued_at: stored.issued_at,
            expires_at: stored.expires,
            permissions: stored.permissions,
            project_roles: stored.project_roles,
            tenant_roles: stored.tenant_roles,
            admin_role: stored.admin_role,
        }
    }
}

impl From<LegacyStoredToken> for Token {
    fn from(legacy: LegacyStoredToken) -> Self {
        let mut project_roles = BTreeMap::new();
        let mut tenant_roles = BTreeMap::new();
        let mut admin_role = None;

        for role in &legacy.roles {
            if role.role == "admin" && role.subject == "*" {
                admin_role = Some(AdminRole::Editor);
                continue;
            }

            if is_project_subject(&role.subject) {
                let mapped = match role.role.as_str() {
                    "admin" | "owner" => ProjectRole::Owner,
                    "editor" => ProjectRole::Editor,
                    "viewer" => ProjectRole::Viewer,
                    _ => ProjectRole::Unspecified,
                };
                project_roles.insert(role.subject.clone(), mapped);
                continue;
            }

            let mapped = match role.role.as_str() {
                "admin" | "owner" => TenantRole::Owner,
                "editor" => TenantRole::Editor,
                "viewer" => TenantRole::Viewer,
                _ => TenantRole::Unspecified,
            };
            tenant_roles.insert(role.subject.clone(), mapped);
        }

        Token {
            id: legacy.uuid,
            user_id: legacy.user_id,
            description: legacy.description,
            token_type: TokenType::from_i32(legacy.token_type),
            issued_at: legacy.issued_at.into_utc(),
            expires_at: legacy.expires.into_utc(),
            permissions: legacy.permissions,
            project_roles,
            tenant_roles,
            admin_role,
        }
    }
}

fn decode(raw: &str) -> StoreResult<Token> {
    match serde_json::from_str::<StoredToken>(raw) {
        Ok(stored) => Ok(stored.into()),
        Err(canonical_err) => match serde_json::from_str::<LegacyStoredToken>(raw) {
            Ok(legacy) => Ok(legacy.into()),
            Err(legacy_err) => Err(StoreError::Decode(format!(
                "canonical: {canonical_err}; legacy: {legacy_err}"
            ))),
        },
    }
}

fn encode(token: &Token) -> StoreResult<String> {
    serde_json::to_string(&StoredToken::from(token))
        .map_err(|err| StoreError::Decode(format!("encode token: {err}")))
}

#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KvBackend>,
}

impl TokenStore {
    pub fn new(kv: Arc<dyn KvBackend>) -> Self {
        Self { kv }
    }

    /// Write a token record with a TTL equal to its remaining lifetime.
    pub async fn put(&self, token: &Token) -> StoreResult<()> {
        let remaining = token.expires_at.signed_duration_since(Utc::now());
        let remaining = remaining
            .to_std()
            .map_err(|_| StoreError::Conflict("token is already expired".to_string()))?;
        self.kv
            .put(
                &record_key(&token.user_id, &token.id),
                &encode(token)?,
                Some(remaining),
            )
            .await
    }

    pub async fn get(&self, user_id: &str, token_id: &str) -> StoreResult<Token> {
        let raw = self
            .kv
            .get(&record_key(user_id, token_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("token {token_id}")))?;
        decode(&raw)
    }

    pub async fn exists(&self, user_id: &str, token_id: &str) -> StoreResult<bool> {
        self.kv.exists(&record_key(user_id, token_id)).await
    }

    pub async fn list_by_user(&self, user_id: &str) -> StoreResult<Vec<Token>> {
        let entries = self.kv.scan_prefix(&user_prefix(user_id)).await?;
        let tokens: Vec<Token> = entries
            .iter()
            .map(|(_, raw)| decode(raw))
            .collect::<StoreResult<_>>()?;
        // User ids are arbitrary strings; one containing the key separator
        // could alias another user's prefix, so filter on the record itself.
        Ok(tokens
            .into_iter()
            .filter(|token| token.user_id == user_id)
            .collect())
    }

    /// Global scan across every user. Admin-only by construction of its
    /// callers.
    pub async fn list_all(&self) -> StoreResult<Vec<Token>> {
        let entries = self.kv.scan_prefix(PREFIX).await?;
        entries.iter().map(|(_, raw)| decode(raw)).collect()
    }

    /// Delete a token record. Deleting an absent record is a no-op.
    pub async fn revoke(&self, user_id: &str, token_id: &str) -> StoreResult<()> {
        self.kv.delete(&record_key(user_id, token_id)).await
    }

    /// Re-encode every stored record in the canonical shape. Records that
    /// fail both decoders are logged and counted; the remainder still
    /// migrates.
    pub async fn migrate_all(&self) -> StoreResult<usize> {
        let entries = self.kv.scan_prefix(PREFIX).await?;

        let mut migrated = 0usize;
        let mut failed = 0usize;
        for (key, raw) in &entries {
            let token = match decode(raw) {
                Ok(token) => token,
                Err(err) => {
                    tracing::error!(key, error = %err, "error migrating token");
                    failed += 1;
                    continue;
                }
            };
            if let Err(err) = self.put(&token).await {
                tracing::error!(id = token.id, error = %err, "error migrating token");
                failed += 1;
                continue;
            }
            tracing::info!(id = token.id, "migrated token");
            migrated += 1;
        }

        if failed > 0 {
            return Err(StoreError::Unexpected(anyhow::anyhow!(
                "{failed} of {} tokens failed to migrate",
                entries.len()
            )));
        }
        Ok(migrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryKv;
    use basalt_authz::MethodPermission;
    use chrono::Duration;

    fn store() -> TokenStore {
        TokenStore::new(Arc::new(MemoryKv::new()))
    }

    fn token(user_id: &str, id: &str) -> Token {
        let now = Utc::now();
        Token {
            id: id.to_string(),
            user_id: user_id.to_string(),
            description: "test token".to_string(),
            token_type: TokenType::Api,
            issued_at: now,
            expires_at: now + Duration::hours(1),
            permissions: vec![MethodPermission {
                subject: "p-1".to_string(),
                methods: vec!["/api.v1.IPService/List".to_string()],
            }],
            project_roles: BTreeMap::from([("p-1".to_string(), ProjectRole::Owner)]),
            tenant_roles: BTreeMap::from([("acme".to_string(), TenantRole::Editor)]),
            admin_role: None,
        }
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = store();
        let token = token("alice", "t-1");
        store.put(&token).await.expect("put");
        let fetched = store.get("alice", "t-1").await.expect("get");
        assert_eq!(fetched, token);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let err = store().get("alice", "missing").await.expect_err("missing");
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn put_rejects_expired_token() {
        let store = store();
        let mut expired = token("alice", "t-1");
        expired.expires_at = Utc::now() - Duration::seconds(1);
        assert!(store.put(&expired).await.is_err());
    }

    #[tokio::test]
    async fn lists_are_disjoint_per_user() {
        let store = store();
        store.put(&token("alice", "t-1")).await.expect("put");
        store.put(&token("alice", "t-2")).await.expect("put");
        store.put(&token("bob", "t-3")).await.expect("put");

        let alice = store.list_by_user("alice").await.expect("list");
        let bob = store.list_by_user("bob").await.expect("list");
        assert_eq!(alice.len(), 2);
        assert_eq!(bob.len(), 1);
        for token in &alice {
            assert!(!bob.iter().any(|other| other.id == token.id));
        }

        let all = store.list_all().await.expect("list all");
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = store();
        store.put(&token("alice", "t-1")).await.expect("put");
        store.revoke("alice", "t-1").await.expect("revoke");
        store.revoke("alice", "t-1").await.expect("revoke again");
        assert!(matches!(
            store.get("alice", "t-1").await,
            Err(StoreError::NotFound(_))
        ));
    }

    const LEGACY: &str = r#"{
        "uuid": "11f8d4b2-6d6f-44aa-a790-6907e79eaa4c",
        "user_id": "john.doe@github",
        "description": "legacy",
        "permissions": [{"subject": "9e1f0a54-9e9f-4ad6-9cbb-aaa0bd0c4d7b", "methods": ["/api.v1.IPService/Get"]}],
        "expires": "2099-01-01T00:00:00Z",
        "issued_at": "2023-01-01T00:00:00Z",
        "token_type": 2,
        "roles": [
            {"subject": "9e1f0a54-9e9f-4ad6-9cbb-aaa0bd0c4d7b", "role": "owner"},
            {"subject": "acme-corp", "role": "editor"},
            {"subject": "*", "role": "admin"}
        ]
    }"#;

    #[test]
    fn legacy_roles_split_into_role_maps() {
        let token = decode(LEGACY).expect("legacy decode");
        assert_eq!(
            token.project_roles["9e1f0a54-9e9f-4ad6-9cbb-aaa0bd0c4d7b"],
            ProjectRole::Owner
        );
        assert_eq!(token.tenant_roles["acme-corp"], TenantRole::Editor);
        assert_eq!(token.admin_role, Some(AdminRole::Editor));
        assert_eq!(token.permissions.len(), 1);
    }

    #[test]
    fn legacy_unknown_role_maps_to_unspecified() {
        let raw = r#"{
            "uuid": "u", "user_id": "john", "expires": "2099-01-01T00:00:00Z",
            "issued_at": "2023-01-01T00:00:00Z", "token_type": 1,
            "roles": [{"subject": "acme", "role": "superuser"}]
        }"#;
        let token = decode(raw).expect("legacy decode");
        assert_eq!(token.tenant_roles["acme"], TenantRole::Unspecified);
    }

    #[test]
    fn legacy_proto_timestamps_decode() {
        let raw = r#"{
            "uuid": "u", "user_id": "john",
            "expires": {"seconds": 4070908800},
            "issued_at": {"seconds": 1672531200, "nanos": 500},
            "token_type": 2,
            "roles": []
        }"#;
        let token = decode(raw).expect("legacy decode");
        assert_eq!(token.expires_at.timestamp(), 4070908800);
        assert_eq!(token.issued_at.timestamp(), 1672531200);
    }

    #[test]
    fn garbage_fails_both_decoders() {
        assert!(matches!(decode("{\"nope\":1}"), Err(StoreError::Decode(_))));
    }

    #[test]
    fn legacy_decode_then_encode_is_stable() {
        // Re-decoding a migrated record must preserve the authorization
        // fields of the first decode.
        let first = decode(LEGACY).expect("legacy decode");
        let encoded = encode(&first).expect("encode");
        let second = decode(&encoded).expect("canonical decode");
        assert_eq!(first.permissions, second.permissions);
        assert_eq!(first.project_roles, second.project_roles);
        assert_eq!(first.tenant_roles, second.tenant_roles);
        assert_eq!(first.admin_role, second.admin_role);
    }

    #[tokio::test]
    async fn migrate_rewrites_legacy_records() {
        let kv = Arc::new(MemoryKv::new());
        kv.put(
            "tokens/john.doe@github/11f8d4b2-6d6f-44aa-a790-6907e79eaa4c",
            LEGACY,
            None,
        )
        .await
        .expect("seed");

        let store = TokenStore::new(kv.clone());
        let migrated = store.migrate_all().await.expect("migrate");
        assert_eq!(migrated, 1);

        let raw = kv
            .get("tokens/john.doe@github/11f8d4b2-6d6f-44aa-a790-6907e79eaa4c")
            .await
            .expect("get")
            .expect("present");
        // Canonical decode must now succeed on the first try.
        assert!(serde_json::from_str::<serde_json::Value>(&raw)
            .expect("json")
            .get("project_roles")
            .is_some());
        let token = store
            .get("john.doe@github", "11f8d4b2-6d6f-44aa-a790-6907e79eaa4c")
            .await
            .expect("get");
        assert_eq!(token.admin_role, Some(AdminRole::Editor));
    }
}
