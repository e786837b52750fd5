use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use super::transport::HttpTransport;
use super::GatewayError;
use crate::config::WikiConnection;
use crate::pipeline::publish::{PageHandle, PageRequest, WikiGateway};

/// Wiki REST client creating storage-format pages and uploading attachments.
#[derive(Debug)]
pub struct ConfluenceClient {
    transport: Arc<HttpTransport>,
    base_url: String,
    username: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedContent {
    id: String,
}

impl ConfluenceClient {
    pub fn new(transport: Arc<HttpTransport>, connection: &WikiConnection) -> Self {
        Self {
            transport,
            base_url: connection.base_url.trim_end_matches('/').to_string(),
            username: connection.username.clone(),
            api_token: connection.api_token.clone(),
        }
    }

    pub fn page_url(&self, page_id: &str) -> String {
        format!("{}/pages/viewpage.action?pageId={page_id}", self.base_url)
    }
}

/// JSON body for the content-creation endpoint.
pub(crate) fn page_payload(request: &PageRequest<'_>) -> Value {
    let mut payload = json!({
        "type": "page",
        "title": request.title,
        "space": { "key": request.space_key },
        "body": {
            "storage": {
                "value": request.body,
                "representation": "storage",
            }
        }
    });
    if let Some(parent) = request.parent_id.filter(|id| !id.trim().is_empty()) {
        payload["ancestors"] = json!([{ "id": parent }]);
    }
    payload
}

impl WikiGateway for ConfluenceClient {
    fn create_page(&self, request: &PageRequest<'_>) -> Result<PageHandle, GatewayError> {
        let builder = self
            .transport
            .client()
            .post(format!("{}/rest/api/content", self.base_url))
            .basic_auth(&self.username, Some(&self.api_token))
            .json(&page_payload(request));

        let created: CreatedContent = self.transport.send_json(builder)?;
        let url = Some(self.page_url(&created.id));
        Ok(PageHandle {
            id: created.id,
            url,
        })
    }

    fn attach_file(
        &self,
        page: &PageHandle,
        path: &Path,
        content_type: &str,
    ) -> Result<(), GatewayError> {
        let bytes = std::fs::read(path).map_err(|err| {
            GatewayError::Message(format!("unable to read '{}': {err}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type)
            .map_err(GatewayError::transport)?;

        let builder = self
            .transport
            .client()
            .post(format!(
                "{}/rest/api/content/{}/child/attachment",
                self.base_url, page.id
            ))
            .basic_auth(&self.username, Some(&self.api_token))
            .header("X-Atlassian-Token", "no-check")
            .multipart(Form::new().part("file", part));

        self.transport.send(builder).map(|_| ())
    }
}
