use base64::engine::general_purpose::STANDARD as Base64Engine;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
    #[error("timestamp outside tolerance")]
    Stale,
}

/// Verify a payment-processor signature header of the form
/// `t=<unix>,v1=<hex>` where the hex digest is HMAC-SHA256 over
/// `"{t}.{body}"`. Multiple `v1` entries are accepted (key rotation); any
/// match passes. The timestamp must be within `tolerance_secs` of `now`.
pub fn verify_payment_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Stale);
    }

    for candidate in candidates {
        let Ok(raw) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can use any key length");
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(body);
        if mac.verify_slice(&raw).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Verify an identity-provider (svix-style) signature: base64 HMAC-SHA256
/// over `"{msg_id}.{timestamp}.{body}"`, keyed by the base64 secret after its
/// `whsec_` prefix. The header carries space-separated `v1,<base64>` entries.
pub fn verify_identity_signature(
    secret: &str,
    msg_id: &str,
    timestamp: &str,
    signature_header: &str,
    body: &[u8],
) -> Result<(), SignatureError> {
    let raw_secret = secret.strip_prefix("whsec_").unwrap_or(secret);
    let key = Base64Engine
        .decode(raw_secret)
        .map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC can use any key length");
    mac.update(format!("{msg_id}.{timestamp}.").as_bytes());
    mac.update(body);
    let expected = Base64Engine.encode(mac.finalize().into_bytes());

    let mut saw_candidate = false;
    for entry in signature_header.split_whitespace() {
        let Some((version, value)) = entry.split_once(',') else {
            continue;
        };
        if version != "v1" {
            continue;
        }
        saw_candidate = true;
        if value == expected {
            return Ok(());
        }
    }
    if saw_candidate {
        Err(SignatureError::Mismatch)
    } else {
        Err(SignatureError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_payment(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(body);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_payment_signature_passes() {
        let header = sign_payment("whsec_test", 1_700_000_000, b"{\"ok\":true}");
        assert_eq!(
            verify_payment_signature("whsec_test", &header, b"{\"ok\":true}", 1_700_000_100, 300),
            Ok(())
        );
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = sign_payment("whsec_test", 1_700_000_000, b"{\"ok\":true}");
        assert_eq!(
            verify_payment_signature("whsec_test", &header, b"{\"ok\":false}", 1_700_000_100, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = sign_payment("whsec_test", 1_700_000_000, b"{}");
        assert_eq!(
            verify_payment_signature("whsec_test", &header, b"{}", 1_700_001_000, 300),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn header_without_digest_is_malformed() {
        assert_eq!(
            verify_payment_signature("whsec_test", "t=1700000000", b"{}", 1_700_000_000, 300),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn identity_signature_round_trips() {
        let key = Base64Engine.encode(b"identity-secret-key");
        let secret = format!("whsec_{key}");
        let body = br#"{"type":"user.created"}"#;

        let raw = Base64Engine.decode(&key).unwrap();
        let mut mac = HmacSha256::new_from_slice(&raw).unwrap();
        mac.update(b"msg_1.1700000000.");
        mac.update(body);
        let header = format!("v1,{}", Base64Engine.encode(mac.finalize().into_bytes()));

        assert_eq!(
            verify_identity_signature(&secret, "msg_1", "1700000000", &header, body),
            Ok(())
        );
        assert_eq!(
            verify_identity_signature(&secret, "msg_2", "1700000000", &header, body),
            Err(SignatureError::Mismatch)
        );
    }
}
