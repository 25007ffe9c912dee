//! Key material model and JWKS parsing

use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Asymmetric key families usable for signature verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// `kty: RSA`
    Rsa,
    /// `kty: EC` (P-256, P-384)
    Ec,
    /// `kty: OKP` (Ed25519)
    Okp,
}

impl KeyType {
    /// JWK `kty` value
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa => "RSA",
            KeyType::Ec => "EC",
            KeyType::Okp => "OKP",
        }
    }
}

/// A single verification key
///
/// Immutable once constructed; owned by the [`KeySet`] that contains it.
#[derive(Clone)]
pub struct KeyInfo {
    key_id: String,
    algorithm: Algorithm,
    key_type: KeyType,
    key_use: Option<String>,
    key: DecodingKey,
}

impl KeyInfo {
    /// `kid`
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Signature algorithm this key verifies
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Key family
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// `use` parameter, if published
    pub fn key_use(&self) -> Option<&str> {
        self.key_use.as_deref()
    }

    /// Opaque key handle for signature verification
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyInfo")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("key_type", &self.key_type)
            .field("key_use", &self.key_use)
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of the keys published by one issuer, indexed by `kid`
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<KeyInfo>>,
}

impl KeySet {
    /// Key with the given `kid`
    pub fn get(&self, key_id: &str) -> Option<Arc<KeyInfo>> {
        self.keys.get(key_id).cloned()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// No usable keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sorted key ids
    pub fn key_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// All keys, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<KeyInfo>> {
        self.keys.values()
    }
}

/// Why an individual JWK was left out of the set
#[derive(Debug, Error)]
enum SkipReason {
    #[error("entry is not an object")]
    NotAnObject,
    #[error("missing kid")]
    MissingKeyId,
    #[error("unsupported key type '{0}'")]
    UnsupportedKeyType(String),
    #[error("encryption key")]
    EncryptionKey,
    #[error("unsupported curve '{0}'")]
    UnsupportedCurve(String),
    #[error("algorithm '{0}' not usable with this key")]
    IncompatibleAlgorithm(String),
    #[error("missing parameter '{0}'")]
    MissingParameter(&'static str),
    #[error("invalid key material: {0}")]
    InvalidMaterial(String),
}

/// Build a [`KeySet`] from a decoded JWKS document
///
/// Accepts `{"keys": [...]}` and a bare single JWK (an object with `kty`).
/// Individual entries that are unsupported or malformed are skipped; this
/// never fails because of one bad key.
///
/// Returns `None` only when the document is not a key set at all.
pub fn parse_key_set(document: &Value) -> Option<KeySet> {
    let object = document.as_object()?;
    let entries: Vec<&Value> = match object.get("keys") {
        Some(Value::Array(keys)) => keys.iter().collect(),
        Some(_) => return None,
        None if object.contains_key("kty") => vec![document],
        None => return None,
    };

    let mut keys = HashMap::with_capacity(entries.len());
    for entry in entries {
        match parse_key(entry) {
            Ok(info) if keys.contains_key(&info.key_id) => {
                debug!(kid = %info.key_id, "Skipping JWK with duplicate kid");
            }
            Ok(info) => {
                keys.insert(info.key_id.clone(), Arc::new(info));
            }
            Err(reason) => {
                let kid = entry.get("kid").and_then(Value::as_str).unwrap_or("-");
                debug!(kid, reason = %reason, "Skipping JWK");
            }
        }
    }

    Some(KeySet { keys })
}

fn parse_key(entry: &Value) -> Result<KeyInfo, SkipReason> {
    let object = entry.as_object().ok_or(SkipReason::NotAnObject)?;

    let key_id = string(object, "kid")
        .filter(|kid| !kid.is_empty())
        .ok_or(SkipReason::MissingKeyId)?;
    let kty = string(object, "kty").unwrap_or_default();
    let key_use = string(object, "use");
    if key_use == Some("enc") {
        return Err(SkipReason::EncryptionKey);
    }

    let (key_type, key, default_algorithm) = match kty {
        "RSA" => {
            let key = DecodingKey::from_rsa_components(required(object, "n")?, required(object, "e")?)
                .map_err(|e| SkipReason::InvalidMaterial(e.to_string()))?;
            (KeyType::Rsa, key, Algorithm::RS256)
        }
        "EC" => {
            let algorithm = match required(object, "crv")? {
                "P-256" => Algorithm::ES256,
                "P-384" => Algorithm::ES384,
                other => return Err(SkipReason::UnsupportedCurve(other.to_string())),
            };
            let key = DecodingKey::from_ec_components(required(object, "x")?, required(object, "y")?)
                .map_err(|e| SkipReason::InvalidMaterial(e.to_string()))?;
            (KeyType::Ec, key, algorithm)
        }
        "OKP" => {
            let curve = required(object, "crv")?;
            if curve != "Ed25519" {
                return Err(SkipReason::UnsupportedCurve(curve.to_string()));
            }
            let key = DecodingKey::from_ed_components(required(object, "x")?)
                .map_err(|e| SkipReason::InvalidMaterial(e.to_string()))?;
            (KeyType::Okp, key, Algorithm::EdDSA)
        }
        // Symmetric (oct) and unknown key types are not verification keys
        // here. Dropping them is intentional and not a load failure.
        other => return Err(SkipReason::UnsupportedKeyType(other.to_string())),
    };

    let algorithm = match string(object, "alg") {
        None => default_algorithm,
        Some(name) => Algorithm::from_str(name)
            .ok()
            .filter(|algorithm| is_compatible(key_type, default_algorithm, *algorithm))
            .ok_or_else(|| SkipReason::IncompatibleAlgorithm(name.to_string()))?,
    };

    Ok(KeyInfo {
        key_id: key_id.to_string(),
        algorithm,
        key_type,
        key_use: key_use.map(str::to_owned),
        key,
    })
}

fn is_compatible(key_type: KeyType, default_algorithm: Algorithm, algorithm: Algorithm) -> bool {
    match key_type {
        KeyType::Rsa => matches!(
            algorithm,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ),
        // the curve fixes the algorithm
        KeyType::Ec | KeyType::Okp => algorithm == default_algorithm,
    }
}

fn string<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    object.get(name).and_then(Value::as_str)
}

fn required<'a>(object: &'a Map<String, Value>, name: &'static str) -> Result<&'a str, SkipReason> {
    string(object, name).ok_or(SkipReason::MissingParameter(name))
}
