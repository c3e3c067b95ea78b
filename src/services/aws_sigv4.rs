//! Minimal AWS Signature Version 4 signer for the two calls we make
//! (S3 `GetObject` and Bedrock `InvokeModel`).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::env;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(access_key_id: String, secret_access_key: String, session_token: Option<String>) -> Self {
        Self {
            access_key_id,
            secret_access_key,
            session_token,
        }
    }

    /// Read the standard `AWS_*` variables. Returns `None` when either key is unset.
    pub fn from_env() -> Option<Self> {
        let access_key_id = env::var("AWS_ACCESS_KEY_ID").ok().filter(|v| !v.is_empty())?;
        let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok().filter(|v| !v.is_empty())?;
        let session_token = env::var("AWS_SESSION_TOKEN").ok().filter(|v| !v.is_empty());
        Some(Self::new(access_key_id, secret_access_key, session_token))
    }
}

/// The parts of an HTTP request that go into the signature
#[derive(Debug)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    /// Already in canonical (URI-encoded) form
    pub canonical_uri: &'a str,
    pub canonical_query: &'a str,
    /// Additional headers to sign, e.g. `content-type`
    pub headers: &'a [(&'a str, &'a str)],
    pub payload: &'a [u8],
}

/// URI-encode every segment of a path, keeping the `/` separators.
pub fn uri_encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

pub struct Signer<'a> {
    credentials: &'a AwsCredentials,
    region: &'a str,
    service: &'a str,
}

impl<'a> Signer<'a> {
    pub fn new(credentials: &'a AwsCredentials, region: &'a str, service: &'a str) -> Self {
        Self {
            credentials,
            region,
            service,
        }
    }

    fn canonical_headers(&self, request: &SigningRequest<'_>, amz_date: &str, payload_hash: &str) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), request.host.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date.to_string()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        for (name, value) in request.headers {
            headers.push((name.to_lowercase(), value.trim().to_string()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));
        headers
    }

    pub fn canonical_request(&self, request: &SigningRequest<'_>, amz_date: &str) -> (String, String) {
        let payload_hash = sha256_hex(request.payload);
        let headers = self.canonical_headers(request, amz_date, &payload_hash);

        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method,
            request.canonical_uri,
            request.canonical_query,
            canonical_headers,
            signed_headers,
            payload_hash
        );
        (canonical, signed_headers)
    }

    /// Compute the headers that must be added to the outgoing request.
    pub fn sign(&self, request: &SigningRequest<'_>, now: DateTime<Utc>) -> Vec<(String, String)> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/{}/aws4_request", date_stamp, self.region, self.service);

        let (canonical_request, signed_headers) = self.canonical_request(request, &amz_date);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let key = signing_key(&self.credentials.secret_access_key, &date_stamp, self.region, self.service);
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.credentials.access_key_id, scope, signed_headers, signature
        );

        let mut out = vec![
            ("x-amz-date".to_string(), amz_date),
            ("x-amz-content-sha256".to_string(), sha256_hex(request.payload)),
        ];
        if let Some(token) = &self.credentials.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        out.push(("authorization".to_string(), authorization));
        out
    }
}

/// `host[:port]` as it will appear in the `Host` header
pub fn host_header(url: &reqwest::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn creds() -> AwsCredentials {
        AwsCredentials::new(
            "AKIDEXAMPLE".to_string(),
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            None,
        )
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_uri_encode_path() {
        assert_eq!(uri_encode_path("/brew-photos/123 shot.jpg"), "/brew-photos/123%20shot.jpg");
        assert_eq!(
            uri_encode_path("/model/us.amazon.nova-lite-v1:0/invoke"),
            "/model/us.amazon.nova-lite-v1%3A0/invoke"
        );
        // Non-S3 services sign the already-encoded path again
        assert_eq!(
            uri_encode_path(&uri_encode_path("/model/a:b/invoke")),
            "/model/a%253Ab/invoke"
        );
    }

    #[test]
    fn test_sha256_of_empty_payload() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_canonical_request_layout() {
        let credentials = creds();
        let signer = Signer::new(&credentials, "us-west-2", "s3");
        let request = SigningRequest {
            method: "GET",
            host: "bucket.s3.us-west-2.amazonaws.com",
            canonical_uri: "/brew-photos/1.jpg",
            canonical_query: "",
            headers: &[],
            payload: b"",
        };

        let (canonical, signed) = signer.canonical_request(&request, "20240501T123000Z");
        let lines: Vec<&str> = canonical.lines().collect();

        assert_eq!(lines[0], "GET");
        assert_eq!(lines[1], "/brew-photos/1.jpg");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "host:bucket.s3.us-west-2.amazonaws.com");
        assert_eq!(lines[5], "x-amz-date:20240501T123000Z");
        assert_eq!(signed, "host;x-amz-content-sha256;x-amz-date");
        assert!(canonical.ends_with(&sha256_hex(b"")));
    }

    #[test]
    fn test_signed_headers_include_extra_headers_sorted() {
        let credentials = AwsCredentials::new("AKID".to_string(), "secret".to_string(), Some("token".to_string()));
        let signer = Signer::new(&credentials, "us-west-2", "bedrock");
        let request = SigningRequest {
            method: "POST",
            host: "bedrock-runtime.us-west-2.amazonaws.com",
            canonical_uri: "/model/m/invoke",
            canonical_query: "",
            headers: &[("Content-Type", "application/json"), ("accept", "application/json")],
            payload: b"{}",
        };

        let (_, signed) = signer.canonical_request(&request, "20240501T123000Z");
        assert_eq!(
            signed,
            "accept;content-type;host;x-amz-content-sha256;x-amz-date;x-amz-security-token"
        );
    }

    #[test]
    fn test_sign_is_deterministic_and_secret_dependent() {
        let credentials = creds();
        let request = SigningRequest {
            method: "GET",
            host: "bucket.s3.us-west-2.amazonaws.com",
            canonical_uri: "/a.png",
            canonical_query: "",
            headers: &[],
            payload: b"",
        };

        let first = Signer::new(&credentials, "us-west-2", "s3").sign(&request, fixed_time());
        let second = Signer::new(&credentials, "us-west-2", "s3").sign(&request, fixed_time());
        assert_eq!(first, second);

        let other = AwsCredentials::new("AKIDEXAMPLE".to_string(), "different".to_string(), None);
        let third = Signer::new(&other, "us-west-2", "s3").sign(&request, fixed_time());
        assert_ne!(first.last(), third.last());

        let (name, auth) = first.last().unwrap();
        assert_eq!(name, "authorization");
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240501/us-west-2/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));
        let signature = auth.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(first.iter().any(|(n, v)| n == "x-amz-date" && v == "20240501T123000Z"));
    }

    #[test]
    fn test_signing_key_depends_on_scope() {
        let a = signing_key("secret", "20240501", "us-west-2", "s3");
        let b = signing_key("secret", "20240501", "us-east-1", "s3");
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_host_header_keeps_explicit_port() {
        let url = reqwest::Url::parse("http://localhost:9000/bucket/key").unwrap();
        assert_eq!(host_header(&url), "localhost:9000");
        let url = reqwest::Url::parse("https://bucket.s3.us-west-2.amazonaws.com/key").unwrap();
        assert_eq!(host_header(&url), "bucket.s3.us-west-2.amazonaws.com");
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let rendered = format!("{:?}", creds());
        assert!(!rendered.contains("EXAMPLEKEY"));
    }
}
