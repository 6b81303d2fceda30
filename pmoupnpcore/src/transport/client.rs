//! Client HTTP sortant (actions, GENA, descriptions).

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::{
    message::{HeaderType, StreamRequestMessage, StreamResponseMessage},
    transport::StreamClientError,
};

/// Envoi d'une requête HTTP et lecture complète de sa réponse.
///
/// Le délai d'attente est à la charge de l'implémentation. L'abandon du
/// futur ferme la connexion sous-jacente.
#[async_trait]
pub trait StreamClient: Send + Sync {
    async fn send(&self, request: StreamRequestMessage) -> Result<StreamResponseMessage, StreamClientError>;
}

/// Implémentation `reqwest` du client HTTP.
#[derive(Debug, Clone)]
pub struct ReqwestStreamClient {
    client: reqwest::Client,
}

impl ReqwestStreamClient {
    pub fn new(timeout: Duration) -> Result<Self, StreamClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StreamClientError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StreamClient for ReqwestStreamClient {
    async fn send(&self, request: StreamRequestMessage) -> Result<StreamResponseMessage, StreamClientError> {
        let url = request.uri.clone();
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| StreamClientError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, &url);
        for (name, value) in request.headers.iter() {
            // reqwest calcule lui-même HOST et CONTENT-LENGTH
            if name.eq_ignore_ascii_case(HeaderType::Host.name())
                || name.eq_ignore_ascii_case(HeaderType::ContentLength.name())
            {
                continue;
            }
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        trace!(method = %request.method, url = %url, "📤 HTTP request");
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StreamClientError::Timeout { url: url.clone() }
            } else if e.is_builder() {
                StreamClientError::InvalidRequest(e.to_string())
            } else {
                StreamClientError::Connection {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let mut message = StreamResponseMessage::new(response.status().as_u16());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                message.headers.add(name.as_str().to_ascii_uppercase(), value);
            }
        }
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                StreamClientError::Timeout { url: url.clone() }
            } else {
                StreamClientError::Connection {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;
        if !body.is_empty() {
            message.body = Some(body);
        }

        debug!(url = %url, status = message.status, "📥 HTTP response");
        Ok(message)
    }
}
