//! Expert connectors - the handshake performed when the pool opens a session

use async_trait::async_trait;
use conclave_core::Expert;
use std::time::Duration;

use crate::{GatewayError, Result};

/// Opens a session to an expert endpoint
#[async_trait]
pub trait ExpertConnector: Send + Sync {
    /// Perform the handshake. Errors are categorized by the dispatcher.
    async fn open(&self, expert: &Expert) -> Result<()>;

    fn name(&self) -> &str;
}

/// In-process experts served under `local://`; no I/O
#[derive(Debug, Default, Clone)]
pub struct LoopbackConnector;

#[async_trait]
impl ExpertConnector for LoopbackConnector {
    async fn open(&self, expert: &Expert) -> Result<()> {
        tracing::debug!("Loopback session for {}", expert.id);
        Ok(())
    }

    fn name(&self) -> &str {
        "loopback"
    }
}

/// Probes `GET {endpoint}/health` before handing out a session
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl ExpertConnector for HttpConnector {
    async fn open(&self, expert: &Expert) -> Result<()> {
        let url = format!("{}/health", expert.endpoint.trim_end_matches('/'));
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::ExpertTimeout {
                    expert: expert.id.to_string(),
                    timeout: self.timeout,
                }
            } else if e.is_connect() {
                GatewayError::Unavailable {
                    expert: expert.id.to_string(),
                    reason: e.to_string(),
                }
            } else {
                GatewayError::Expert(format!("{}: {}", expert.id, e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match status.as_u16() {
            429 | 503 => Err(GatewayError::Unavailable {
                expert: expert.id.to_string(),
                reason: format!("health probe returned {}", status),
            }),
            _ => Err(GatewayError::Expert(format!(
                "{}: health probe returned {}",
                expert.id, status
            ))),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Routes `local://` endpoints to loopback and everything else over HTTP
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    loopback: LoopbackConnector,
    http: HttpConnector,
}

impl EndpointConnector {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            loopback: LoopbackConnector,
            http: HttpConnector::new(timeout)?,
        })
    }
}

#[async_trait]
impl ExpertConnector for EndpointConnector {
    async fn open(&self, expert: &Expert) -> Result<()> {
        if expert.is_local() {
            self.loopback.open(expert).await
        } else {
            self.http.open(expert).await
        }
    }

    fn name(&self) -> &str {
        "endpoint"
    }
}
