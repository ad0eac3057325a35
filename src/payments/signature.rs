use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a provider webhook signature header of the form `t=<unix>,v1=<hex>`,
/// where `v1` is HMAC-SHA256 over `"{t}.{payload}"`. Runs before any payload
/// parsing; the timestamp must be within `tolerance_secs` of `now`.
pub fn verify(header: &str, payload: &[u8], secret: &str, tolerance_secs: i64, now: i64) -> bool {
    let mut ts = "";
    let mut v1 = "";
    for part in header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return false;
    }

    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    if (now - ts_i).unsigned_abs() > tolerance_secs.unsigned_abs() {
        return false;
    }

    let Ok(sig) = hex::decode(v1) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&sig).is_ok()
}

/// Produce a `t=,v1=` header for a payload. Used by tests and local tooling.
pub fn sign(payload: &[u8], secret: &str, ts: i64) -> String {
    let ts = ts.to_string();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let v1 = hex::encode(mac.finalize().into_bytes());
    format!("t={ts},v1={v1}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const PAYLOAD: &[u8] = b"{\"type\":\"checkout.session.completed\"}";

    #[test]
    fn valid_signature_passes() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, now);
        assert!(verify(&header, PAYLOAD, SECRET, 300, now));
    }

    #[test]
    fn wrong_secret_fails() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, "wrong_secret", now);
        assert!(!verify(&header, PAYLOAD, SECRET, 300, now));
    }

    #[test]
    fn modified_payload_fails() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, now);
        let tampered = b"{\"type\":\"checkout.session.completed\",\"total\":0}";
        assert!(!verify(&header, tampered, SECRET, 300, now));
    }

    #[test]
    fn stale_timestamp_fails() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, now - 600);
        assert!(!verify(&header, PAYLOAD, SECRET, 300, now));
    }

    #[test]
    fn malformed_header_fails() {
        assert!(!verify("", PAYLOAD, SECRET, 300, 0));
        assert!(!verify("t=abc,v1=zz", PAYLOAD, SECRET, 300, 0));
        assert!(!verify("v1=deadbeef", PAYLOAD, SECRET, 300, 0));
        assert!(!verify("t=123", PAYLOAD, SECRET, 300, 123));
    }
}
