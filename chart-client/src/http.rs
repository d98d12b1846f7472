use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::gateway::{FetchGateway, GatewayRequest, GatewayResponse, Method};
use crate::{CancellationToken, ClientError};

/// [`FetchGateway`] over `reqwest`.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl HttpGateway {
    /// `base_url` is the server root, e.g. `http://localhost:8080/openmrs`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };

        let mut builder = builder
            .query(&request.query)
            .header("Accept", "application/json");
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                path: request.path.clone(),
                body: text,
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|err| ClientError::Decode {
                path: request.path.clone(),
                message: err.to_string(),
            })?
        };

        Ok(GatewayResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl FetchGateway for HttpGateway {
    async fn fetch(
        &self,
        request: GatewayRequest,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, ClientError> {
        cancel.check()?;
        tracing::debug!(method = ?request.method, path = %request.path, "dispatching request");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(path = %request.path, "request aborted");
                Err(ClientError::Cancelled)
            }
            result = self.send(&request) => result,
        }
    }
}
