use std::future::Future;
use std::pin::Pin;

use reqwest::Url;
use reqwest::header::HeaderMap;

use bridge_api::{ClientError, DeliveryReceipt, Envelope, SinkClient};

use crate::config::HttpSinkConfig;
use crate::error::SinkError;
use crate::headers::binary_headers;

const MAX_ERROR_BODY: usize = 512;

/// CloudEvents HTTP sink, binary content mode: attributes in `ce-*`
/// headers, data as the request body.
///
/// Holds one `reqwest::Client` (one connection pool) for all deliveries.
pub struct HttpSink {
    http: reqwest::Client,
    uri: Url,
    static_headers: HeaderMap,
}

impl HttpSink {
    pub fn new(config: &HttpSinkConfig) -> Result<Self, SinkError> {
        let uri = config.url()?;
        let static_headers = config.header_map()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(SinkError::Build)?;
        Ok(Self { http, uri, static_headers })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// POST one envelope. 2xx is acceptance; anything else is `Rejected`.
    pub async fn send(&self, envelope: &Envelope) -> Result<DeliveryReceipt, SinkError> {
        let mut headers = self.static_headers.clone();
        headers.extend(binary_headers(envelope)?);
        let body = envelope.data.to_body().map_err(|e| SinkError::Encode(e.to_string()))?;

        let resp = self
            .http
            .post(self.uri.clone())
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(DeliveryReceipt { status: status.as_u16() });
        }

        let mut body = resp.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        Err(SinkError::Rejected { status: status.as_u16(), body })
    }
}

impl SinkClient for HttpSink {
    fn deliver<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryReceipt, ClientError>> + Send + 'a>> {
        Box::pin(async move { self.send(envelope).await.map_err(ClientError::from) })
    }
}

impl std::fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSink").field("uri", &self.uri.as_str()).finish_non_exhaustive()
    }
}
