//! ACS3-HMAC-SHA256 request signing for the Aliyun RPC-style OpenAPI.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::{ProviderError, Result};

pub const SIGNATURE_ALGORITHM: &str = "ACS3-HMAC-SHA256";

const SIGNED_HEADERS: &str =
    "host;x-acs-action;x-acs-content-sha256;x-acs-date;x-acs-signature-nonce;x-acs-version";

/// Access key pair. The secret never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"[redacted]")
            .finish()
    }
}

/// Everything that goes into one signed request.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub host: String,
    pub query: String,
    pub headers: Vec<(&'static str, String)>,
}

/// RFC 3986 encoding: unreserved characters pass, everything else is `%XX`.
pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Sorted, encoded `k=v&k=v` query string.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Sign a body-less POST to `host` for `action` at `version`.
pub fn sign_request(
    credentials: &Credentials,
    host: &str,
    action: &str,
    version: &str,
    params: &BTreeMap<String, String>,
    now: DateTime<Utc>,
    nonce: &str,
) -> Result<SignedRequest> {
    let date = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let payload_hash = sha256_hex(b"");
    let query = canonical_query(params);

    // Already in lowercase sorted order.
    let headers: Vec<(&'static str, String)> = vec![
        ("host", host.to_string()),
        ("x-acs-action", action.to_string()),
        ("x-acs-content-sha256", payload_hash.clone()),
        ("x-acs-date", date),
        ("x-acs-signature-nonce", nonce.to_string()),
        ("x-acs-version", version.to_string()),
    ];

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{}\n", v.trim()))
        .collect();

    let canonical_request =
        format!("POST\n/\n{query}\n{canonical_headers}\n{SIGNED_HEADERS}\n{payload_hash}");
    let string_to_sign = format!(
        "{SIGNATURE_ALGORITHM}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(credentials.access_key_secret.as_bytes())
        .map_err(|e| ProviderError::Signing(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let authorization = format!(
        "{SIGNATURE_ALGORITHM} Credential={},SignedHeaders={SIGNED_HEADERS},Signature={signature}",
        credentials.access_key_id
    );

    let mut headers = headers;
    headers.push(("authorization", authorization));

    Ok(SignedRequest {
        host: host.to_string(),
        query,
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params() -> BTreeMap<String, String> {
        let mut p = BTreeMap::new();
        p.insert("RegionId".to_string(), "cn-hongkong".to_string());
        p.insert("InstanceIds".to_string(), "[\"i-1\"]".to_string());
        p
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 17, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_percent_encode_reserved() {
        assert_eq!(percent_encode("abc-_.~"), "abc-_.~");
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("[\"i-1\"]"), "%5B%22i-1%22%5D");
        assert_eq!(percent_encode("*"), "%2A");
        assert_eq!(percent_encode("系"), "%E7%B3%BB");
    }

    #[test]
    fn test_canonical_query_is_sorted() {
        assert_eq!(
            canonical_query(&params()),
            "InstanceIds=%5B%22i-1%22%5D&RegionId=cn-hongkong"
        );
    }

    #[test]
    fn test_signature_is_deterministic() {
        let creds = Credentials::new("AKID", "secret");
        let a = sign_request(&creds, "ecs.aliyuncs.com", "DescribeRegions", "2014-05-26", &params(), now(), "n-1")
            .expect("sign");
        let b = sign_request(&creds, "ecs.aliyuncs.com", "DescribeRegions", "2014-05-26", &params(), now(), "n-1")
            .expect("sign");
        assert_eq!(a.headers, b.headers);

        let c = sign_request(&creds, "ecs.aliyuncs.com", "DescribeRegions", "2014-05-26", &params(), now(), "n-2")
            .expect("sign");
        assert_ne!(a.headers.last(), c.headers.last());
    }

    #[test]
    fn test_authorization_header_shape() {
        let creds = Credentials::new("AKID", "secret");
        let req = sign_request(&creds, "ecs.aliyuncs.com", "DescribeRegions", "2014-05-26", &params(), now(), "n")
            .expect("sign");
        let (name, auth) = req.headers.last().expect("authorization header");
        assert_eq!(*name, "authorization");
        assert!(auth.starts_with("ACS3-HMAC-SHA256 Credential=AKID,SignedHeaders=host;x-acs-action;"));
        let sig = auth.rsplit("Signature=").next().expect("signature");
        assert_eq!(sig.len(), 64);
        assert!(req.headers.iter().any(|(k, v)| *k == "x-acs-date" && v == "2026-05-17T08:30:00Z"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("AKID", "super-secret");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("AKID"));
        assert!(!dbg.contains("super-secret"));
    }
}
