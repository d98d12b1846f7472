use async_trait::async_trait;
use serde_json::Value;

use crate::{CancellationToken, ClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// One backend call. `path` is relative to the gateway's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl GatewayRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: u16,
    /// `Value::Null` when the response had no body.
    pub body: Value,
}

/// Performs backend calls with cooperative cancellation.
///
/// Implementations must return [`ClientError::Cancelled`] when `cancel` fires
/// before the response is available.
#[async_trait]
pub trait FetchGateway: Send + Sync {
    async fn fetch(
        &self,
        request: GatewayRequest,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, ClientError>;
}
