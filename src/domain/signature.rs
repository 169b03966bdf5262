//! HMAC-SHA256 signatures for inbound webhooks.
//!
//! Senders sign the canonical form of the JSON body: compact, with object
//! keys sorted at every depth. Two bodies that parse to the same JSON value
//! therefore share a signature regardless of key order or whitespace.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Render a JSON value in canonical form.
pub fn canonical_json(value: &Value) -> String {
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
                // Serializing a string cannot fail
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
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
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn mac_for(payload: &Value, secret: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(canonical_json(payload).as_bytes());
    mac
}

/// Compute the lowercase hex signature of a payload.
#[must_use]
pub fn sign(payload: &Value, secret: &[u8]) -> String {
    hex::encode(mac_for(payload, secret).finalize().into_bytes())
}

/// Check a hex signature against a payload in constant time.
///
/// Malformed signatures (non-hex, wrong length) are reported as a mismatch.
#[must_use]
pub fn verify(payload: &Value, signature: &str, secret: &[u8]) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac_for(payload, secret).verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &[u8] = b"webhook-test-secret";

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "y": [3, {"d": null, "c": "x"}]}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"y":[3,{"c":"x","d":null}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_escapes_keys_and_strings() {
        let value = json!({"quote\"key": "line\nbreak"});
        assert_eq!(canonical_json(&value), r#"{"quote\"key":"line\nbreak"}"#);
    }

    #[test]
    fn test_sign_then_verify_accepts() {
        let payload = json!({"event": "payment.confirmed", "paymentId": "abc", "amount": 5000});
        let signature = sign(&payload, SECRET);
        assert_eq!(signature.len(), 64);
        assert!(verify(&payload, &signature, SECRET));
    }

    #[test]
    fn test_key_order_does_not_change_signature() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":{"b":2,"a":1}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{ "y": {"a":1, "b":2}, "x": 1 }"#).unwrap();
        assert_eq!(sign(&a, SECRET), sign(&b, SECRET));
    }

    #[test]
    fn test_known_vector() {
        // Same construction as the GitHub webhook docs, applied to a bare string payload
        let payload = Value::String("Hello, World!".to_string());
        let mut mac = HmacSha256::new_from_slice(b"It's a Secret to Everybody").unwrap();
        mac.update(br#""Hello, World!""#);
        let expected = hex::encode(mac.finalize().into_bytes());
        assert_eq!(sign(&payload, b"It's a Secret to Everybody"), expected);
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let payload = json!({"paymentId": "abc", "status": "confirmed"});
        let signature = sign(&payload, SECRET);
        let tampered = json!({"paymentId": "abc", "status": "failed"});
        assert!(!verify(&tampered, &signature, SECRET));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let payload = json!({"paymentId": "abc"});
        let signature = sign(&payload, b"other-secret");
        assert!(!verify(&payload, &signature, SECRET));
    }

    #[test]
    fn test_verify_rejects_malformed_signatures() {
        let payload = json!({"paymentId": "abc"});
        let signature = sign(&payload, SECRET);

        assert!(!verify(&payload, "", SECRET));
        assert!(!verify(&payload, "not-hex", SECRET));
        assert!(!verify(&payload, &signature[..62], SECRET));
        assert!(!verify(&payload, &format!("{signature}00"), SECRET));
    }

    #[test]
    fn test_verify_accepts_uppercase_hex() {
        let payload = json!([1, 2, 3]);
        let signature = sign(&payload, SECRET).to_uppercase();
        assert!(verify(&payload, &signature, SECRET));
    }
}
