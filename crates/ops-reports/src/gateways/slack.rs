use serde_json::json;
use std::sync::Arc;

use super::transport::HttpTransport;
use super::GatewayError;
use crate::pipeline::publish::ChatSink;

/// Incoming-webhook sink. The whole message travels in the `text` field.
#[derive(Debug)]
pub struct SlackWebhook {
    transport: Arc<HttpTransport>,
    webhook_url: String,
}

impl SlackWebhook {
    pub fn new(transport: Arc<HttpTransport>, webhook_url: impl Into<String>) -> Self {
        Self {
            transport,
            webhook_url: webhook_url.into(),
        }
    }
}

impl ChatSink for SlackWebhook {
    fn post_message(&self, text: &str) -> Result<(), GatewayError> {
        let builder = self
            .transport
            .client()
            .post(&self.webhook_url)
            .json(&json!({ "text": text }));
        self.transport.send(builder).map(|_| ())
    }
}
