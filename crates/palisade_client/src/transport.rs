// Copyright (c) Microsoft Corporation.

use std::fmt::Debug;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Method, Request, StatusCode, Uri, header};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::errors::ClientError;

/// A raw HTTP response, before status classification and body decoding.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    /// The response status. Non-success statuses are classified by the
    /// client, not the transport.
    pub status: StatusCode,
    /// The `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// The response body as text.
    pub body: String,
}

/// The seam between the orchestration pipeline and the network.
///
/// The client owns timeouts, retries, caching, and breaker bookkeeping; a
/// transport only turns an address into a response. Composition roots inject
/// the implementation — [`HyperTransport`] for plain HTTP, a TLS-capable
/// client in production, a scripted fake in tests.
pub trait Transport: Debug + Send + Sync {
    /// Issues a GET request for `url` with the given `Accept` header.
    fn fetch<'a>(&'a self, url: &'a str, accept: &'a str) -> BoxFuture<'a, Result<TransportResponse, ClientError>>;
}

/// [`Transport`] implementation over a hyper HTTP/1 client.
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HyperTransport {
    /// Creates a transport driving connections on the tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn fetch<'a>(&'a self, url: &'a str, accept: &'a str) -> BoxFuture<'a, Result<TransportResponse, ClientError>> {
        Box::pin(async move {
            let uri: Uri = url.parse().map_err(|err| ClientError::Transport {
                message: format!("invalid url {url}: {err}"),
            })?;

            let request = Request::builder()
                .method(Method::GET)
                .uri(uri)
                .header(header::ACCEPT, accept)
                .body(Empty::<Bytes>::new())
                .map_err(|err| ClientError::Transport {
                    message: err.to_string(),
                })?;

            let response = self.client.request(request).await.map_err(|err| ClientError::Transport {
                message: err.to_string(),
            })?;

            let (parts, body) = response.into_parts();
            let bytes = body
                .collect()
                .await
                .map_err(|err| ClientError::Transport {
                    message: err.to_string(),
                })?
                .to_bytes();

            let content_type = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);

            Ok(TransportResponse {
                status: parts.status,
                content_type,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            })
        })
    }
}
