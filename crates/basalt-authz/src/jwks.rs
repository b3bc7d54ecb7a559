use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUse {
    Sig,
}

/// Public half of a signing key in JWK form. Keys are ECDSA P-256, so the
/// members are the curve coordinates rather than an RSA modulus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_field: KeyUse,
    pub crv: String,
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwk(kid: &str) -> Jwk {
        Jwk {
            kty: "EC".to_string(),
            kid: kid.to_string(),
            alg: "ES256".to_string(),
            use_field: KeyUse::Sig,
            crv: "P-256".to_string(),
            x: "x-coordinate".to_string(),
            y: "y-coordinate".to_string(),
        }
    }

    #[test]
    fn jwks_roundtrip() {
        let jwks = Jwks {
            keys: vec![jwk("k1")],
        };
        let serialized = serde_json::to_string(&jwks).expect("serialize");
        assert!(serialized.contains("\"use\":\"sig\""));
        let decoded: Jwks = serde_json::from_str(&serialized).expect("deserialize");
        assert_eq!(decoded.keys.len(), 1);
        assert_eq!(decoded.keys[0].crv, "P-256");
    }

    #[test]
    fn find_by_kid() {
        let jwks = Jwks {
            keys: vec![jwk("k1"), jwk("k2")],
        };
        assert!(jwks.find("k2").is_some());
        assert!(jwks.find("k3").is_none());
    }
}
