//! Client half of the peer wire protocol.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};

use crate::error::{Error, Result};
use crate::http::wire::{self, PeerRequest, PeerResponse, OCTET_STREAM};
use crate::peers::PeerClient;

/// Default per-call deadline for individual peer RPCs.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(3);

/// Escape a group name or key for use as a URL path segment.
pub fn escape_segment(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

/// Decode a URL path segment back into a group name or key.
pub fn unescape_segment(segment: &str) -> Result<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|err| Error::InvalidArgument(format!("malformed path segment: {err}")))
}

/// Build the shared HTTP client, optionally trusting a custom CA bundle for
/// TLS peer verification.
pub fn build_http_client(ca_file: Option<&Path>, timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeout);
    if let Some(path) = ca_file {
        let pem = std::fs::read(path)?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|err| Error::Internal(format!("parsing CA bundle: {err}")))?;
        builder = builder
            .add_root_certificate(cert)
            .min_tls_version(reqwest::tls::Version::TLS_1_2);
    }
    builder
        .build()
        .map_err(|err| Error::Internal(format!("building HTTP client: {err}")))
}

/// An addressable client to one remote node, keyed by its base URL
/// (peer address plus base path, e.g. `http://10.0.0.2:8008/_geecache/`).
pub struct HttpPeer {
    base_url: String,
    client: Client,
}

impl HttpPeer {
    pub fn new(base_url: String, client: Client) -> Self {
        Self { base_url, client }
    }

    fn key_url(&self, req: &PeerRequest) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            escape_segment(&req.group),
            escape_segment(&req.key)
        )
    }

    fn transport_err(&self, reason: impl std::fmt::Display) -> Error {
        Error::Transport {
            peer: self.base_url.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl PeerClient for HttpPeer {
    fn addr(&self) -> &str {
        &self.base_url
    }

    async fn lookup(&self, group: &str, key: &str) -> Result<Vec<u8>> {
        let req = PeerRequest::new(group, key);
        let url = self.key_url(&req);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| self.transport_err(err))?;
        if resp.status() != StatusCode::OK {
            return Err(self.transport_err(format!("server returned {}", resp.status())));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|err| self.transport_err(format!("reading response body: {err}")))?;
        let msg: PeerResponse = wire::decode_response(&body)
            .map_err(|err| self.transport_err(format!("decoding response body: {err}")))?;
        Ok(msg.value)
    }

    async fn push(&self, group: &str, key: &str, value: &[u8]) -> Result<()> {
        let req = PeerRequest::new(group, key);
        let url = self.key_url(&req);
        let body = wire::encode_response(&PeerResponse::new(value))?;

        let resp = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, OCTET_STREAM)
            .body(body)
            .send()
            .await
            .map_err(|err| self.transport_err(err))?;
        if resp.status() != StatusCode::OK {
            return Err(self.transport_err(format!("server returned {}", resp.status())));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
