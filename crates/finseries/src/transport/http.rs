use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::{Transport, TransportError, TransportRequest};
use crate::models::RawResponse;
use crate::source::ProtocolFamily;

const USER_AGENT: &str = concat!("finseries/", env!("CARGO_PKG_VERSION"));

/// HTTP transport backed by reqwest.
///
/// Keeps one connection pool per source so a slow source cannot starve
/// the others of connections.
#[derive(Default)]
pub struct HttpTransport {
    clients: Mutex<HashMap<String, Client>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&self, source_id: &str) -> Client {
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("HTTP client pool mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        };

        clients
            .entry(source_id.to_string())
            .or_insert_with(|| {
                debug!("Creating HTTP client for source {}", source_id);
                Client::builder()
                    .user_agent(USER_AGENT)
                    .build()
                    .unwrap_or_else(|_| Client::new())
            })
            .clone()
    }
}

fn map_send_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(format!("Request failed: {}", error))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &TransportRequest,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let client = self.client_for(&request.source_id);

        let mut builder = match request.method {
            ProtocolFamily::HttpGet => client.get(&request.url).query(&request.params),
            ProtocolFamily::HttpPostForm => client.post(&request.url).form(&request.params),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(
            "{} request: {} with {} params",
            request.source_id,
            request.url,
            request.params.len()
        );

        let response = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let payload = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Other(format!("Failed to read response: {}", e))
            }
        })?;

        Ok(RawResponse::new(status, content_type, payload.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_reused_per_source() {
        let transport = HttpTransport::new();
        transport.client_for("CBR");
        transport.client_for("CBR");
        transport.client_for("MOEX");
        let clients = transport.clients.lock().unwrap();
        assert_eq!(clients.len(), 2);
    }
}
