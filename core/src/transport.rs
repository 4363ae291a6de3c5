//! HTTP transport to the broker.
//!
//! One method pair: [`BrokerTransport::command`] for ordinary commands and
//! [`BrokerTransport::command_with_body`] for the two POST-body operations
//! (init with a service definition, settings push). Requests go out as GET
//! while the assembled URL stays under the configured limit, as a
//! form-encoded POST otherwise. A 417 is decoded into the error envelope;
//! any other non-200 status is a transport-level fatal error.

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use pansearch_protocol::ErrorEnvelope;

use crate::config::BrokerConfig;
use crate::error::{EngineError, Result};

/// A successful (HTTP 200) broker response.
#[derive(Debug, Clone)]
pub struct BrokerResponse {
    pub body: String,
    pub content_type: String,
}

#[derive(Clone)]
pub struct BrokerTransport {
    http: reqwest::Client,
    config: BrokerConfig,
}

impl BrokerTransport {
    pub fn new(http: reqwest::Client, config: BrokerConfig) -> Self {
        BrokerTransport { http, config }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Send a command given its encoded query string, appending the broker
    /// session id when one is bound.
    pub async fn command(&self, query: &str, session: Option<&str>) -> Result<BrokerResponse> {
        let full_query = match session {
            Some(id) => format!("{query}&session={}", urlencoding::encode(id)),
            None => query.to_string(),
        };
        let mut url = self.config.base_url.clone();
        url.set_query(Some(&full_query));

        let response = if url.as_str().len() < self.config.get_url_limit {
            debug!(%url, "GET broker command");
            self.http.get(url).send().await?
        } else {
            debug!(url = %self.config.base_url, "POST broker command (URL over limit)");
            self.http
                .post(self.config.base_url.clone())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(full_query)
                .send()
                .await?
        };
        Self::decode(response).await
    }

    /// Send a command as POST with an explicit body (service XML on init,
    /// settings XML on a settings push). The command parameters stay on the
    /// URL.
    pub async fn command_with_body(
        &self,
        query: &str,
        session: Option<&str>,
        content_type: &str,
        body: String,
    ) -> Result<BrokerResponse> {
        let full_query = match session {
            Some(id) => format!("{query}&session={}", urlencoding::encode(id)),
            None => query.to_string(),
        };
        let mut url = self.config.base_url.clone();
        url.set_query(Some(&full_query));
        debug!(%url, content_type, "POST broker command with body");
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<BrokerResponse> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;
        match status {
            200 => Ok(BrokerResponse { body, content_type }),
            417 => {
                let envelope =
                    ErrorEnvelope::parse(&body).map_err(EngineError::MalformedResponse)?;
                debug!(code = envelope.code, msg = %envelope.short_message, "broker error envelope");
                Err(EngineError::Broker(envelope))
            }
            other => Err(EngineError::UnexpectedStatus {
                status: other,
                body,
            }),
        }
    }
}
