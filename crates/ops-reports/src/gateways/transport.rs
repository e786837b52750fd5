use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::runtime::Runtime;

use super::GatewayError;

const USER_AGENT: &str = concat!("ops-reports/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_LIMIT: usize = 512;

/// Thin wrapper around the async reqwest client allowing synchronous report
/// workflows to make one network call at a time without exposing async
/// details. One transport is shared by every gateway of a run.
pub struct HttpTransport {
    client: Client,
    runtime: Runtime,
}

impl HttpTransport {
    pub fn new(client: Client, runtime: Runtime) -> Self {
        Self { client, runtime }
    }

    pub fn with_runtime() -> Result<Self, GatewayError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| GatewayError::Runtime(err.to_string()))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(GatewayError::transport)?;
        Ok(Self::new(client, runtime))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Sends the request and returns the body of a 2xx response.
    pub fn send(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        self.runtime.block_on(async {
            let response = request.send().await.map_err(GatewayError::transport)?;
            let status = response.status();
            let body = response.text().await.map_err(GatewayError::transport)?;
            if status.is_success() {
                Ok(body)
            } else {
                Err(GatewayError::Status {
                    status: status.as_u16(),
                    body: truncate(&body),
                })
            }
        })
    }

    pub fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let body = self.send(request)?;
        decode_json(&body)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|err| GatewayError::Decode(err.to_string()))
}

fn truncate(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
