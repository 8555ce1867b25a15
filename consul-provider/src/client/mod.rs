//! Thin Consul HTTP API client.
//!
//! One module per API family adds typed calls on top of the request core here.
//! Reads retry transient failures; every call races the cancellation token.

pub mod acl;
pub mod agent;
pub mod catalog;
pub mod config_entry;
pub mod connect;
pub mod kv;
pub mod namespace;
pub mod operator;
pub mod partition;
pub mod peering;
pub mod query;

use crate::config::ProviderSettings;
use crate::metrics::record_api_request;
use crate::options::{ReadOptions, WriteOptions};
use provider_core::retry::{retry_transient, Backoff};
use provider_core::{ProviderError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Client, Identity, Method, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// What the server waits on a blocking query that names no wait time.
const DEFAULT_BLOCKING_WAIT: Duration = Duration::from_secs(300);

/// Blocking-query metadata returned with every read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryMeta {
    pub last_index: u64,
    pub last_contact: Duration,
    pub known_leader: bool,
}

impl QueryMeta {
    fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        Self {
            last_index: header("X-Consul-Index")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_contact: Duration::from_millis(
                header("X-Consul-LastContact")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            ),
            known_leader: header("X-Consul-KnownLeader") == Some("true"),
        }
    }
}

/// A secret sent to Consul in a request body. Serializes its value but
/// never prints it.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct WireSecret(Secret<String>);

impl WireSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Secret::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Serialize for WireSecret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl std::fmt::Debug for WireSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Request body variants: JSON documents, raw KV bytes, or nothing.
pub(crate) enum Body<'a> {
    Empty,
    Json(Value),
    Raw(&'a [u8]),
}

/// A raw response: status, headers and body bytes.
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub meta: QueryMeta,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct ConsulClient {
    http: Client,
    base_url: String,
    basic_auth: Option<(String, Option<Secret<String>>)>,
    request_timeout: Option<Duration>,
    read_retry: Backoff,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ConsulClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ConsulClient {
    /// Build the transport from provider settings (TLS material, headers, timeout).
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProviderError::invalid(format!("header {:?}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ProviderError::invalid(format!("header {:?}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(settings.insecure_https);

        for pem in ca_certificates(settings)? {
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| ProviderError::invalid(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some((cert, key)) = client_identity(settings)? {
            let identity = Identity::from_pkcs8_pem(&cert, key.expose_secret().as_bytes())
                .map_err(|e| ProviderError::invalid(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        let http = builder.build()?;
        Ok(Self {
            http,
            base_url: settings.base_url(),
            basic_auth: settings
                .basic_auth()
                .map(|(user, password)| (user, password.map(Secret::new))),
            request_timeout: Some(settings.request_timeout()?),
            read_retry: Backoff::reads(),
            cancel: CancellationToken::new(),
        })
    }

    /// A client for tests and embedding hosts that manage the transport themselves.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            basic_auth: None,
            request_timeout: None,
            read_retry: Backoff::reads(),
            cancel: CancellationToken::new(),
        }
    }

    /// A clone whose calls abort when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// Bound every call by `timeout`; blocking reads get their wait on top.
    pub fn with_request_timeout(self, timeout: Duration) -> Self {
        Self {
            request_timeout: Some(timeout),
            ..self
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        token: Option<&Secret<String>>,
        body: &Body<'_>,
        blocking: Option<Duration>,
    ) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(limit) = self.request_timeout {
            request = request.timeout(limit + blocking.unwrap_or_default());
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token.expose_secret());
        }
        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, password.as_ref().map(|p| p.expose_secret()));
        }
        request = match body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Raw(bytes) => request.body(bytes.to_vec()),
        };

        let started = Instant::now();
        let send = async {
            let response = request.send().await?;
            let status = response.status();
            let meta = QueryMeta::from_headers(response.headers());
            let body = response.bytes().await?.to_vec();
            Ok::<_, ProviderError>(RawResponse { status, meta, body })
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::cancelled()),
            result = send => result,
        };

        match &outcome {
            Ok(response) => {
                record_api_request(method.as_str(), path, response.status.as_str());
                debug!(
                    method = %method,
                    path = %path,
                    status = response.status.as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Consul API call"
                );
            }
            Err(e) => {
                record_api_request(method.as_str(), path, "error");
                debug!(method = %method, path = %path, error = %e, "Consul API call failed");
            }
        }

        let response = outcome?;
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(status_error(response.status, &response.body))
        }
    }

    /// GET with read options, retried on transient failures.
    pub(crate) async fn get_raw(
        &self,
        path: &str,
        opts: &ReadOptions,
        extra: &[(&str, &str)],
    ) -> Result<RawResponse> {
        let mut query = opts.query_pairs();
        query.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let blocking = blocking_wait(opts);
        let body = Body::Empty;
        retry_transient(&self.read_retry, path, || {
            self.execute(Method::GET, path, &query, opts.token.as_ref(), &body, blocking)
        })
        .await
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: &ReadOptions,
        extra: &[(&str, &str)],
    ) -> Result<(T, QueryMeta)> {
        let response = self.get_raw(path, opts, extra).await?;
        let value = decode(&response.body)?;
        Ok((value, response.meta))
    }

    /// GET where 404 means the object does not exist.
    pub(crate) async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: &ReadOptions,
        extra: &[(&str, &str)],
    ) -> Result<Option<(T, QueryMeta)>> {
        match self.get(path, opts, extra).await {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn write_raw(
        &self,
        method: Method,
        path: &str,
        opts: &WriteOptions,
        extra: &[(&str, &str)],
        body: Body<'_>,
    ) -> Result<RawResponse> {
        let mut query = opts.query_pairs();
        query.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self.execute(method, path, &query, opts.token.as_ref(), &body, None)
            .await
    }

    /// A write with a JSON body whose response is decoded as `T`.
    pub(crate) async fn write<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        opts: &WriteOptions,
        extra: &[(&str, &str)],
        body: &B,
    ) -> Result<T> {
        let body = Body::Json(serde_json::to_value(body)?);
        let response = self.write_raw(method, path, opts, extra, body).await?;
        decode(&response.body)
    }

    pub(crate) async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        opts: &WriteOptions,
        body: &B,
    ) -> Result<T> {
        self.write(Method::PUT, path, opts, &[], body).await
    }

    pub(crate) async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        opts: &WriteOptions,
        body: &B,
    ) -> Result<T> {
        self.write(Method::POST, path, opts, &[], body).await
    }

    pub(crate) async fn delete(
        &self,
        path: &str,
        opts: &WriteOptions,
        extra: &[(&str, &str)],
    ) -> Result<()> {
        self.write_raw(Method::DELETE, path, opts, extra, Body::Empty)
            .await
            .map(|_| ())
    }
}

/// How long a blocking read may hold the connection beyond the usual
/// timeout: the wait itself plus the up to 1/16 jitter the server adds.
fn blocking_wait(opts: &ReadOptions) -> Option<Duration> {
    if opts.wait_index == 0 && opts.wait_time.is_none() {
        return None;
    }
    let wait = opts.wait_time.unwrap_or(DEFAULT_BLOCKING_WAIT);
    Some(wait + wait / 16)
}

/// Decode a JSON body; an empty body reads as JSON `null`.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(body)?)
}

/// Map a non-success status to an error kind.
pub(crate) fn status_error(status: StatusCode, body: &[u8]) -> ProviderError {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let message = format!("Unexpected response code: {} ({})", status.as_u16(), text);
    match status.as_u16() {
        404 => ProviderError::not_found(message),
        403 if text.contains("ACL not found") => ProviderError::not_found(message),
        401 | 403 => ProviderError::forbidden(message),
        409 => ProviderError::conflict(message),
        400 | 413 | 422 => ProviderError::invalid(message),
        429 | 500..=599 => ProviderError::unavailable(message),
        _ => ProviderError::internal(message),
    }
}

/// Path segment escaping for object names embedded in URLs.
pub(crate) fn escape(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Like [`escape`] but keeps `/` so KV paths stay hierarchical.
pub(crate) fn escape_path(path: &str) -> String {
    path.split('/').map(escape).collect::<Vec<_>>().join("/")
}

fn ca_certificates(settings: &ProviderSettings) -> Result<Vec<Vec<u8>>> {
    let mut pems = Vec::new();
    if let Some(pem) = &settings.ca_pem {
        pems.push(pem.as_bytes().to_vec());
    }
    if let Some(file) = &settings.ca_file {
        pems.push(std::fs::read(file)?);
    }
    if let Some(dir) = &settings.ca_path {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        entries.sort();
        for path in entries {
            pems.push(std::fs::read(path)?);
        }
    }
    Ok(pems)
}

fn client_identity(settings: &ProviderSettings) -> Result<Option<(Vec<u8>, Secret<String>)>> {
    if let (Some(cert), Some(key)) = (&settings.cert_pem, &settings.key_pem) {
        return Ok(Some((cert.as_bytes().to_vec(), key.clone())));
    }
    if let (Some(cert), Some(key)) = (&settings.cert_file, &settings.key_file) {
        let cert = std::fs::read(cert)?;
        let key = std::fs::read_to_string(key)?;
        return Ok(Some((cert, Secret::new(key))));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_core::ErrorKind;

    #[test]
    fn test_status_mapping() {
        let kind = |code: u16, body: &str| {
            status_error(StatusCode::from_u16(code).unwrap(), body.as_bytes()).kind()
        };
        assert_eq!(kind(404, ""), ErrorKind::NotFound);
        assert_eq!(kind(403, "ACL not found"), ErrorKind::NotFound);
        assert_eq!(kind(403, "Permission denied"), ErrorKind::Forbidden);
        assert_eq!(kind(409, ""), ErrorKind::Conflict);
        assert_eq!(kind(400, "bad"), ErrorKind::Invalid);
        assert_eq!(kind(503, ""), ErrorKind::Unavailable);
        assert_eq!(kind(418, ""), ErrorKind::Internal);
    }

    #[test]
    fn test_wire_secret_is_redacted() {
        let secret = WireSecret::new("s3cr3t");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"s3cr3t\"");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("web api"), "web%20api");
        assert_eq!(escape("team/web?x=1"), "team%2Fweb%3Fx%3D1");
        assert_eq!(escape_path("app/config x/y"), "app/config%20x/y");
    }

    #[test]
    fn test_query_meta_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Consul-Index", HeaderValue::from_static("17"));
        headers.insert("X-Consul-LastContact", HeaderValue::from_static("250"));
        headers.insert("X-Consul-KnownLeader", HeaderValue::from_static("true"));
        let meta = QueryMeta::from_headers(&headers);
        assert_eq!(meta.last_index, 17);
        assert_eq!(meta.last_contact, Duration::from_millis(250));
        assert!(meta.known_leader);
    }
}
