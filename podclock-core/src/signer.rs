//! Request signing
//!
//! Every remote call carries `_sig` and `_ts`. The signature is a SHA-256
//! over a canonical serialization of the payload, so two payloads that
//! differ only in key order sign identically, while any change to a value,
//! the timestamp or the secret changes the signature.
//!
//! ```text
//! _sig = hex(sha256(canonical(payload) + ":" + _ts + ":" + secret + ":" + salt))
//! ```
//!
//! Payloads are built from structs whose optional fields are skipped when
//! `None`, so absent values never reach the canonical form. An explicit
//! `null` is a value and is signed as such.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Deterministic JSON rendering: sorted object keys, arrays in order, no
/// insignificant whitespace.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single JSON spelling.
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Signature over `payload` at `timestamp` with `secret` and `salt`.
pub fn sign(payload: &Value, secret: &str, timestamp: i64, salt: &str) -> String {
    let preimage = format!(
        "{}:{}:{}:{}",
        canonicalize(payload),
        timestamp,
        secret,
        salt
    );
    hex::encode(Sha256::digest(preimage.as_bytes()))
}

/// One-way hash of a user PIN.
///
/// The result is what gets stored, transmitted and used as signing secret;
/// the clear PIN never leaves the process.
pub fn hash_credential(pin: &str) -> String {
    hex::encode(Sha256::digest(pin.trim().as_bytes()))
}

/// A payload with its signature block attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRequest {
    body: Map<String, Value>,
    signature: String,
    timestamp: i64,
}

impl SignedRequest {
    /// Serialize `payload`, sign it, and attach `_sig` / `_ts`.
    ///
    /// The payload must serialize to a JSON object.
    pub fn new<P: Serialize>(
        payload: &P,
        secret: &str,
        timestamp: i64,
        salt: &str,
    ) -> Result<Self> {
        let value = serde_json::to_value(payload)?;
        let mut body = match value {
            Value::Object(map) => map,
            other => {
                return Err(crate::error::Error::Validation(format!(
                    "signed payload must be a JSON object, got {}",
                    other
                )))
            }
        };
        let signature = sign(&Value::Object(body.clone()), secret, timestamp, salt);
        body.insert("_sig".to_string(), Value::String(signature.clone()));
        body.insert("_ts".to_string(), Value::from(timestamp));
        Ok(Self {
            body,
            signature,
            timestamp,
        })
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The `action` opcode, if the payload carries one.
    pub fn action(&self) -> Option<&str> {
        self.body.get("action").and_then(Value::as_str)
    }

    /// The wire body: payload fields plus `_sig` and `_ts`.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_body(self) -> Value {
        Value::Object(self.body)
    }
}
