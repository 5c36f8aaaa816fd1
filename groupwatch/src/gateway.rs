//! Shared plumbing for the outbound gateway clients.
//!
//! Both the messaging gateway and the payment gateway are JSON REST APIs authenticated with
//! a static key in a custom header. [`GatewayClient`] wraps a `reqwest::Client` with the base
//! URL, the key, and the error mapping: any transport failure, non-2xx status or undecodable
//! body becomes a [`GatewayError`], which the API layer reports as 502.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;
use tracing::{debug, error};
use url::Url;

use crate::errors::Error;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{service} request failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned {status}: {body}")]
    Status { service: &'static str, status: u16, body: String },

    #[error("{service} response could not be decoded: {message}")]
    Decode { service: &'static str, message: String },

    #[error("{service} client misconfigured: {message}")]
    Config { service: &'static str, message: String },
}

impl GatewayError {
    pub fn service(&self) -> &'static str {
        match self {
            GatewayError::Request { service, .. }
            | GatewayError::Status { service, .. }
            | GatewayError::Decode { service, .. }
            | GatewayError::Config { service, .. } => service,
        }
    }
}

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        Error::Gateway {
            service: err.service().to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Build an HTTP client with the given request timeout.
///
/// reqwest is compiled without a bundled TLS provider, so the process-wide rustls provider is
/// installed here if nobody has done it yet.
pub fn build_http_client(timeout: Duration) -> std::result::Result<Client, reqwest::Error> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    Client::builder().timeout(timeout).build()
}

/// Makes sure a url has a trailing slash.
///
/// `Url::join` replaces the last path segment unless the base ends in '/': joining
/// '/api/v3' and 'customers' gives '/api/customers', but '/api/v3/' gives '/api/v3/customers'.
pub fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", new_url.path());
        new_url.set_path(&path);
        new_url
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Compare a webhook token presented by a gateway with the configured one.
///
/// Both sides are MACed under the expected token and the tags compared with `verify_slice`,
/// so the comparison takes the same time wherever the first differing byte is.
pub fn tokens_match(expected: &str, presented: &str) -> bool {
    let tag = |input: &str| {
        let mut mac = HmacSha256::new_from_slice(expected.as_bytes()).ok()?;
        mac.update(input.as_bytes());
        Some(mac)
    };
    let (Some(presented_mac), Some(expected_mac)) = (tag(presented), tag(expected)) else {
        return false;
    };
    expected_mac.verify_slice(&presented_mac.finalize().into_bytes()).is_ok()
}

/// JSON client for one gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    service: &'static str,
    http: Client,
    base_url: Url,
    auth_header: &'static str,
    api_key: String,
}

impl GatewayClient {
    pub fn new(service: &'static str, base_url: &Url, auth_header: &'static str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = build_http_client(timeout).map_err(|e| GatewayError::Config {
            service,
            message: e.to_string(),
        })?;

        Ok(Self {
            service,
            http,
            base_url: ensure_slash(base_url),
            auth_header,
            api_key: api_key.to_string(),
        })
    }

    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| GatewayError::Config {
            service: self.service,
            message: format!("invalid path {path}: {e}"),
        })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).header(self.auth_header, &self.api_key)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        self.send(self.request(Method::GET, url)).await
    }

    /// GET with query parameters appended to the path
    pub async fn get_with_query<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut url = self.url(path)?;
        url.query_pairs_mut().extend_pairs(query);
        self.send(self.request(Method::GET, url)).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path)?;
        self.send(self.request(Method::POST, url).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        self.send(self.request(Method::DELETE, url)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let service = self.service;
        let response = request.send().await.map_err(|source| GatewayError::Request { service, source })?;

        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await.map_err(|source| GatewayError::Request { service, source })?;

        if !status.is_success() {
            error!(%url, %status, "{service} gateway returned an error");
            return Err(GatewayError::Status {
                service,
                status: status.as_u16(),
                body,
            });
        }

        debug!(%url, "{service} gateway response: {body}");
        // Some endpoints answer 200/204 with an empty body
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| {
            error!(%url, "Failed to parse {service} gateway response: {e}");
            GatewayError::Decode {
                service,
                message: e.to_string(),
            }
        })
    }
}
