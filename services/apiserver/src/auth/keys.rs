//! Signing-key store.
//!
//! # Purpose and responsibility
//! Generates, persists, and rotates the ES256 signing keys used for bearer
//! credentials, and renders the public half of every live key as a JWKS.
//!
//! # Key invariants and assumptions
//! - Keys are immutable once written; rotation adds a key and repoints
//!   `signing-keys/latest`, it never rewrites existing material.
//! - Concurrent first-use produces exactly one latest key: the pointer write
//!   is a linearizable put-if-absent, losers discard their material and adopt
//!   the winner.
//! - All non-retired public keys stay in the JWKS so outstanding tokens keep
//!   verifying after a rotation.
//!
//! # Security considerations
//! - Private PEMs never leave the key-value store except as an in-memory
//!   `EncodingKey`; the JWKS blob contains public coordinates only.
use crate::store::{KvBackend, StoreError, StoreResult};
use anyhow::{Context, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use basalt_authz::{Jwk, Jwks, KeyUse};
use jsonwebtoken::EncodingKey;
use p256::SecretKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rand::RngCore;
use std::sync::Arc;

const LATEST_POINTER: &str = "signing-keys/latest";
const JWKS_BLOB: &str = "signing-keys/jwks";

fn private_path(kid: &str) -> String {
    format!("signing-keys/{kid}/private")
}

fn public_path(kid: &str) -> String {
    format!("signing-keys/{kid}/public")
}

/// The current private signing key, ready for `jsonwebtoken::encode`.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub encoding_key: EncodingKey,
}

#[derive(Clone)]
pub struct SigningKeyStore {
    kv: Arc<dyn KvBackend>,
}

impl SigningKeyStore {
    pub fn new(kv: Arc<dyn KvBackend>) -> Self {
        Self { kv }
    }

    /// The most recently generated signing key. When none exists yet, one is
    /// generated and persisted first; exactly one concurrent caller wins the
    /// pointer write and every other caller adopts its key.
    pub async fn latest_private(&self) -> StoreResult<SigningKey> {
        if let Some(kid) = self.kv.get(LATEST_POINTER).await? {
            return self.load_private(&kid).await;
        }

        let (kid, private_pem, public_pem) = generate_key_pair()?;
        self.kv.put(&private_path(&kid), &private_pem, None).await?;
        self.kv.put(&public_path(&kid), &public_pem, None).await?;

        if self.kv.put_if_absent(LATEST_POINTER, &kid).await? {
            self.render_jwks().await?;
            return self.load_private(&kid).await;
        }

        // Lost the bootstrap race: discard our material and use the winner.
        // The winner may have rendered the JWKS while our orphan still
        // existed, so render again after the cleanup.
        self.kv.delete(&private_path(&kid)).await?;
        self.kv.delete(&public_path(&kid)).await?;
        self.render_jwks().await?;
        let winner = self
            .kv
            .get(LATEST_POINTER)
            .await?
            .ok_or_else(|| StoreError::Unexpected(anyhow!("latest signing key pointer vanished")))?;
        self.load_private(&winner).await
    }

    /// The current public-key set and its canonical JSON serialization.
    pub async fn public_keys(&self) -> StoreResult<(Jwks, String)> {
        if let Some(raw) = self.kv.get(JWKS_BLOB).await? {
            let jwks = serde_json::from_str(&raw)
                .map_err(|err| StoreError::Decode(format!("jwks blob: {err}")))?;
            return Ok((jwks, raw));
        }
        self.render_jwks().await
    }

    /// Generate a new key and make it the latest. Previous keys remain in
    /// the public set so tokens they signed keep verifying.
    pub async fn rotate(&self) -> StoreResult<String> {
        let (kid, private_pem, public_pem) = generate_key_pair()?;
        self.kv.put(&private_path(&kid), &private_pem, None).await?;
        self.kv.put(&public_path(&kid), &public_pem, None).await?;
        self.kv.put(LATEST_POINTER, &kid, None).await?;
        self.render_jwks().await?;
        Ok(kid)
    }

    async fn load_private(&self, kid: &str) -> StoreResult<SigningKey> {
        let pem = self
            .kv
            .get(&private_path(kid))
            .await?
            .ok_or_else(|| StoreError::Unexpected(anyhow!("private key material missing for {kid}")))?;
        let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes())
            .context("decode private signing key")
            .map_err(StoreError::Unexpected)?;
        Ok(SigningKey {
            kid: kid.to_string(),
            encoding_key,
        })
    }

    /// Re-render the JWKS blob from every stored public key.
    async fn render_jwks(&self) -> StoreResult<(Jwks, String)> {
        let entries = self.kv.scan_prefix("signing-keys/").await?;

        let mut keys = Vec::new();
        for (key, pem) in &entries {
            let Some(kid) = key
                .strip_prefix("signing-keys/")
                .and_then(|rest| rest.strip_suffix("/public"))
            else {
                continue;
            };
            keys.push(public_pem_to_jwk(kid, pem)?);
        }
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));

        let jwks = Jwks { keys };
        let raw = serde_json::to_string(&jwks)
            .map_err(|err| StoreError::Decode(format!("render jwks: {err}")))?;
        self.kv.put(JWKS_BLOB, &raw, None).await?;
        Ok((jwks, raw))
    }
}

fn generate_key_pair() -> StoreResult<(String, String, String)> {
    let secret = SecretKey::random(&mut rand::thread_rng());
    let private_pem = secret
        .to_pkcs8_pem(Default::default())
        .context("encode private key")
        .map_err(StoreError::Unexpected)?
        .to_string();
    let public_pem = secret
        .public_key()
        .to_public_key_pem(Default::default())
        .context("encode public key")
        .map_err(StoreError::Unexpected)?;

    let mut kid_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut kid_bytes);
    let kid = hex::encode(kid_bytes);

    Ok((kid, private_pem, public_pem))
}

fn public_pem_to_jwk(kid: &str, pem: &str) -> StoreResult<Jwk> {
    let public_key = p256::PublicKey::from_public_key_pem(pem)
        .context("decode public signing key")
        .map_err(StoreError::Unexpected)?;
    let point = public_key.to_encoded_point(false);
    let x = point
        .x()
        .ok_or_else(|| StoreError::Unexpected(anyhow!("public key missing x coordinate")))?;
    let y = point
        .y()
        .ok_or_else(|| StoreError::Unexpected(anyhow!("public key missing y coordinate")))?;

    Ok(Jwk {
        kty: "EC".to_string(),
        kid: kid.to_string(),
        alg: "ES256".to_string(),
        use_field: KeyUse::Sig,
        crv: "P-256".to_string(),
        x: URL_SAFE_NO_PAD.encode(x),
        y: URL_SAFE_NO_PAD.encode(y),
    })
}
