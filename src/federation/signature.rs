//! HTTP signatures for ActivityPub
//!
//! RSA-SHA256 signatures over selected request headers, with SHA-256 body
//! digests, per the HTTP signatures draft as deployed across the
//! fediverse.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{pkcs1v15::Signature as Pkcs1v15Signature, RsaPublicKey};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::key_cache::PublicKeyCache;
use crate::config::FederationConfig;
use crate::error::{FederationError, Result};

/// Maximum tolerated skew for the inbound Date header
const DATE_SKEW_SECS: i64 = 300;

/// `Digest: SHA-256=base64(SHA-256(rawBody))`
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("SHA-256={}", BASE64.encode(hasher.finalize()))
}

/// Verify a Digest header against the raw body
///
/// The header may carry several comma-separated entries; the SHA-256 one
/// is recomputed and compared in constant time.
pub fn verify_digest(body: &[u8], header: &str) -> Result<()> {
    let provided = header
        .split(',')
        .filter_map(|entry| entry.trim().split_once('='))
        .find(|(algorithm, _)| algorithm.trim().eq_ignore_ascii_case("sha-256"))
        .map(|(_, value)| value)
        .ok_or_else(|| {
            FederationError::SignatureVerification(
                "Digest header has no SHA-256 entry".to_string(),
            )
        })?;

    let decoded = BASE64.decode(provided).map_err(|_| {
        FederationError::SignatureVerification("Digest value is not valid base64".to_string())
    })?;

    let mut hasher = Sha256::new();
    hasher.update(body);
    let computed = hasher.finalize();

    if bool::from(computed.as_slice().ct_eq(decoded.as_slice())) {
        Ok(())
    } else {
        Err(FederationError::SignatureVerification(
            "Digest mismatch".to_string(),
        ))
    }
}

/// Headers to add to a signed outbound request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    /// Signature header value
    pub signature: String,
    /// Date header value (RFC 7231, UTC)
    pub date: String,
    /// Digest header value, when a body is signed
    pub digest: Option<String>,
}

fn is_supported_algorithm(algorithm: &str) -> bool {
    algorithm.eq_ignore_ascii_case("rsa-sha256") || algorithm.eq_ignore_ascii_case("hs2019")
}

/// Sign an outbound request
///
/// Builds the canonical string over `(request-target) host date`, plus
/// `digest` when a body is present on a POST/PUT/PATCH. `date` uses the
/// caller-supplied value when given, else the current UTC time.
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key_pem: &str,
    key_id: &str,
    date: Option<&str>,
) -> Result<SignatureHeaders> {
    let parsed_url = url::Url::parse(url)
        .map_err(|e| FederationError::BadRequest(format!("invalid URL: {}", e)))?;
    let host = parsed_url
        .host_str()
        .ok_or_else(|| FederationError::BadRequest("URL is missing a host".to_string()))?;
    // Non-default ports appear in the Host header, so they must be signed
    let host = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path_and_query = match parsed_url.query() {
        Some(query) => format!("{}?{}", parsed_url.path(), query),
        None => parsed_url.path().to_string(),
    };

    let date = match date {
        Some(value) => value.to_string(),
        None => Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
    };

    let digest = match (body, method.to_ascii_uppercase().as_str()) {
        (Some(body), "POST" | "PUT" | "PATCH") => Some(generate_digest(body)),
        _ => None,
    };

    let request_target = format!("{} {}", method.to_lowercase(), path_and_query);
    let mut signing_parts = vec![
        format!("(request-target): {}", request_target),
        format!("host: {}", host),
        format!("date: {}", date),
    ];
    let mut header_names = vec!["(request-target)", "host", "date"];
    if let Some(digest_value) = &digest {
        signing_parts.push(format!("digest: {}", digest_value));
        header_names.push("digest");
    }
    let signing_string = signing_parts.join("\n");

    let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| FederationError::Federation(format!("invalid private key: {}", e)))?;
    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(private_key);
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());

    let header = format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key_id,
        header_names.join(" "),
        BASE64.encode(signature.to_bytes())
    );

    Ok(SignatureHeaders {
        signature: header,
        date,
        digest,
    })
}

/// Parsed Signature header
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    pub key_id: String,
    pub algorithm: String,
    pub headers: Vec<String>,
    pub signature: String,
}

/// Parse a Signature header value
///
/// Strict: all four of keyId, algorithm, headers, and signature must be
/// present. Unknown attributes are ignored.
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim().trim_matches('"');
            match key.trim() {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_ascii_lowercase()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect::<Vec<_>>(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {}
            }
        }
    }

    let missing =
        |field: &str| FederationError::SignatureVerification(format!("missing {}", field));
    Ok(ParsedSignature {
        key_id: key_id.ok_or_else(|| missing("keyId"))?,
        algorithm: algorithm.ok_or_else(|| missing("algorithm"))?,
        headers: headers.ok_or_else(|| missing("headers"))?,
        signature: signature.ok_or_else(|| missing("signature"))?,
    })
}

fn parse_key_owner_url(raw: &str) -> Result<url::Url> {
    let mut parsed = url::Url::parse(raw).map_err(|_| {
        FederationError::SignatureVerification("keyId is not a valid URL".to_string())
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(FederationError::SignatureVerification(
            "keyId must use http or https".to_string(),
        ));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(FederationError::SignatureVerification(
            "keyId must not include user info".to_string(),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(FederationError::SignatureVerification(
            "keyId must include a host".to_string(),
        ));
    }
    parsed.set_fragment(None);
    Ok(parsed)
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_multicast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_unspecified()
                || v6.is_multicast()
        }
    }
}

/// Guard key fetches against local and private targets
pub(super) fn validate_remote_key_url(url: &url::Url) -> Result<()> {
    let host = url
        .host_str()
        .ok_or_else(|| {
            FederationError::SignatureVerification("keyId must include a host".to_string())
        })?
        .trim_end_matches('.')
        .to_ascii_lowercase();

    if host == "localhost" || host.ends_with(".localhost") {
        return Err(FederationError::SignatureVerification(
            "keyId host is not allowed".to_string(),
        ));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            return Err(FederationError::SignatureVerification(
                "keyId host is not allowed".to_string(),
            ));
        }
    }
    Ok(())
}

/// True when the actor URL derived from keyId matches the activity actor
pub fn key_id_matches_actor(key_id: &str, actor_id: &str) -> Result<bool> {
    let key_owner = parse_key_owner_url(key_id)?;
    let actor = parse_key_owner_url(actor_id).map_err(|_| {
        FederationError::SignatureVerification("activity actor is not a valid URL".to_string())
    })?;
    Ok(key_owner == actor)
}

/// Fetch a remote actor document and extract the matching public key
///
/// The fetch URL is the keyId with its fragment stripped. Both the
/// single-publicKey form and an array of keys are accepted; the entry
/// whose `id` equals the keyId wins, falling back to the only entry.
///
/// Returns (owner actor id, public key PEM).
pub async fn fetch_public_key(
    key_id: &str,
    http_client: &reqwest::Client,
    timeout: std::time::Duration,
) -> Result<(String, String)> {
    let actor_url = parse_key_owner_url(key_id)?;
    validate_remote_key_url(&actor_url)?;

    let response = http_client
        .get(actor_url.as_str())
        .header("Accept", "application/activity+json")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FederationError::Federation(format!("failed to fetch actor: {}", e)))?;

    if !response.status().is_success() {
        return Err(FederationError::Federation(format!(
            "failed to fetch actor: HTTP {}",
            response.status()
        )));
    }

    let actor: serde_json::Value = response
        .json()
        .await
        .map_err(|e| FederationError::Federation(format!("failed to parse actor: {}", e)))?;

    let owner = actor
        .get("id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_else(|| actor_url.as_str())
        .to_string();

    let keys: Vec<&serde_json::Value> = match actor.get("publicKey") {
        Some(serde_json::Value::Array(keys)) => keys.iter().collect(),
        Some(key @ serde_json::Value::Object(_)) => vec![key],
        _ => Vec::new(),
    };

    let matching = keys
        .iter()
        .find(|key| key.get("id").and_then(serde_json::Value::as_str) == Some(key_id))
        .or_else(|| if keys.len() == 1 { keys.first() } else { None });

    let pem = matching
        .and_then(|key| key.get("publicKeyPem"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            FederationError::Federation("actor document has no matching publicKeyPem".to_string())
        })?;

    Ok((owner, pem.to_string()))
}

/// Verify an inbound request signature against a known public key
///
/// `path_and_query` is the request path including any query string. When
/// a body is present, the digest header must be signed and must verify.
pub fn verify_signature(
    method: &str,
    path_and_query: &str,
    headers: &http::HeaderMap,
    body: Option<&[u8]>,
    public_key_pem: &str,
) -> Result<()> {
    let signature_header = headers
        .get("signature")
        .ok_or(FederationError::Unauthorized)?
        .to_str()
        .map_err(|_| {
            FederationError::SignatureVerification("Signature header is not ASCII".to_string())
        })?;

    let parsed = parse_signature_header(signature_header)?;
    if !is_supported_algorithm(&parsed.algorithm) {
        return Err(FederationError::SignatureVerification(format!(
            "unsupported algorithm {}",
            parsed.algorithm
        )));
    }

    let signed_headers: HashSet<&str> = parsed.headers.iter().map(String::as_str).collect();
    for required in ["(request-target)", "host", "date"] {
        if !signed_headers.contains(required) {
            return Err(FederationError::SignatureVerification(format!(
                "signature must cover {}",
                required
            )));
        }
    }

    // Reject stale or future-dated requests
    if let Some(date_header) = headers.get("date") {
        let date_str = date_header.to_str().map_err(|_| {
            FederationError::SignatureVerification("Date header is not ASCII".to_string())
        })?;
        let date = DateTime::parse_from_rfc2822(date_str).map_err(|_| {
            FederationError::SignatureVerification("Date header is malformed".to_string())
        })?;
        if (Utc::now().timestamp() - date.timestamp()).abs() > DATE_SKEW_SECS {
            return Err(FederationError::SignatureVerification(
                "Date header too old or in the future".to_string(),
            ));
        }
    }

    if let Some(body) = body {
        if !signed_headers.contains("digest") {
            return Err(FederationError::SignatureVerification(
                "signature must cover digest for requests with a body".to_string(),
            ));
        }
        let digest_header = headers
            .get("digest")
            .ok_or_else(|| {
                FederationError::SignatureVerification("missing Digest header".to_string())
            })?
            .to_str()
            .map_err(|_| {
                FederationError::SignatureVerification("Digest header is not ASCII".to_string())
            })?;
        verify_digest(body, digest_header)?;
    }

    // Rebuild the canonical signing string from the inbound headers
    let mut signing_parts = Vec::with_capacity(parsed.headers.len());
    for name in &parsed.headers {
        let value = if name == "(request-target)" {
            format!("{} {}", method.to_lowercase(), path_and_query)
        } else {
            headers
                .get(name.as_str())
                .ok_or_else(|| {
                    FederationError::SignatureVerification(format!("missing {} header", name))
                })?
                .to_str()
                .map_err(|_| {
                    FederationError::SignatureVerification(format!("{} header is not ASCII", name))
                })?
                .to_string()
        };
        signing_parts.push(format!("{}: {}", name, value));
    }
    let signing_string = signing_parts.join("\n");

    let signature_bytes = BASE64.decode(&parsed.signature).map_err(|_| {
        FederationError::SignatureVerification("signature is not valid base64".to_string())
    })?;
    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| FederationError::SignatureVerification(format!("invalid public key: {}", e)))?;
    let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key);
    let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice()).map_err(|e| {
        FederationError::SignatureVerification(format!("malformed signature: {}", e))
    })?;

    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| {
            FederationError::SignatureVerification("signature verification failed".to_string())
        })
}

/// Inbound request authenticator
///
/// Combines the config gate, the public-key cache, and signature
/// verification; returns the verified actor URI (the key owner).
#[derive(Clone)]
pub struct SignatureVerifier {
    config: Arc<FederationConfig>,
    key_cache: Arc<PublicKeyCache>,
}

impl SignatureVerifier {
    pub fn new(config: Arc<FederationConfig>, key_cache: Arc<PublicKeyCache>) -> Self {
        Self { config, key_cache }
    }

    /// Verify an inbound request, returning the key owner's actor URI
    ///
    /// Returns None without verifying when the inbound gate is disabled.
    pub async fn verify_request(
        &self,
        method: &str,
        path_and_query: &str,
        headers: &http::HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<Option<String>> {
        if !self.config.federation.signature_verification_enabled {
            return Ok(None);
        }

        let signature_header = headers
            .get("signature")
            .ok_or(FederationError::Unauthorized)?
            .to_str()
            .map_err(|_| {
                FederationError::SignatureVerification("Signature header is not ASCII".to_string())
            })?;
        let parsed = parse_signature_header(signature_header)?;

        let cached = self.key_cache.get(&parsed.key_id).await?;
        verify_signature(
            method,
            path_and_query,
            headers,
            body,
            &cached.public_key_pem,
        )?;
        Ok(Some(cached.owner))
    }
}
