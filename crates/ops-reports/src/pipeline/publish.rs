use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::export::ExportFile;
use super::outcome::StageOutcome;
use crate::gateways::GatewayError;

/// Identifier of a page created during this run; only used to attach files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHandle {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub space_key: &'a str,
    pub parent_id: Option<&'a str>,
    pub title: &'a str,
    pub body: &'a str,
}

/// Page-creation and attachment endpoints of the wiki service.
pub trait WikiGateway: Debug {
    fn create_page(&self, request: &PageRequest<'_>) -> Result<PageHandle, GatewayError>;
    fn attach_file(
        &self,
        page: &PageHandle,
        path: &Path,
        content_type: &str,
    ) -> Result<(), GatewayError>;
}

/// Chat webhook accepting a single text payload.
pub trait ChatSink: Debug {
    fn post_message(&self, text: &str) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<PathBuf>,
}

pub trait MailSink: Debug {
    fn send(&self, message: &MailMessage) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagePublication {
    pub page: StageOutcome<PageHandle>,
    /// Name of the attached file; `Empty` when there was nothing to attach or
    /// no page to attach it to.
    pub attachment: StageOutcome<String>,
    /// Export left on disk because it never reached the page.
    pub kept_export: Option<PathBuf>,
}

/// Creates the page, then attaches the export if there is one. A failed page
/// creation skips the attachment; a failed attachment leaves the page and
/// keeps the local file.
pub fn publish_page(
    gateway: &dyn WikiGateway,
    request: &PageRequest<'_>,
    export: Option<ExportFile>,
) -> PagePublication {
    let page = match gateway.create_page(request) {
        Ok(page) => {
            info!(title = request.title, page_id = %page.id, url = ?page.url, "page created");
            page
        }
        Err(err) => {
            let kept_export = export.map(|file| file.path().to_path_buf());
            match &kept_export {
                Some(path) => error!(
                    title = request.title,
                    path = %path.display(),
                    error = %err,
                    "page creation failed; skipping attachment, local export kept"
                ),
                None => error!(title = request.title, error = %err, "page creation failed"),
            }
            return PagePublication {
                page: StageOutcome::failed(err),
                attachment: StageOutcome::Empty,
                kept_export,
            };
        }
    };

    let (attachment, kept_export) = match export {
        None => (StageOutcome::Empty, None),
        Some(file) => match gateway.attach_file(&page, file.path(), mime::TEXT_CSV.essence_str()) {
            Ok(()) => {
                let name = file.file_name();
                info!(page_id = %page.id, file = %name, "export attached");
                file.remove();
                (StageOutcome::Data(name), None)
            }
            Err(err) => {
                warn!(
                    page_id = %page.id,
                    path = %file.path().display(),
                    error = %err,
                    "attachment failed; local export kept"
                );
                (StageOutcome::failed(err), Some(file.path().to_path_buf()))
            }
        },
    };

    PagePublication {
        page: StageOutcome::Data(page),
        attachment,
        kept_export,
    }
}

pub fn deliver_chat(sink: &dyn ChatSink, text: &str) -> StageOutcome<()> {
    match sink.post_message(text) {
        Ok(()) => {
            info!(chars = text.chars().count(), "chat message delivered");
            StageOutcome::Data(())
        }
        Err(err) => {
            warn!(error = %err, "chat delivery failed");
            StageOutcome::failed(err)
        }
    }
}

/// Sends the mail with the export attached and removes the export once the
/// mail is accepted.
pub fn deliver_mail(
    sink: &dyn MailSink,
    subject: String,
    html_body: String,
    export: Option<ExportFile>,
) -> StageOutcome<()> {
    let message = MailMessage {
        subject,
        html_body,
        attachments: export
            .as_ref()
            .map(|file| vec![file.path().to_path_buf()])
            .unwrap_or_default(),
    };

    match sink.send(&message) {
        Ok(()) => {
            info!(subject = %message.subject, attachments = message.attachments.len(), "mail delivered");
            if let Some(file) = export {
                file.remove();
            }
            StageOutcome::Data(())
        }
        Err(err) => {
            warn!(subject = %message.subject, error = %err, "mail delivery failed");
            StageOutcome::failed(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingWiki {
        fail_create: bool,
        fail_attach: bool,
        calls: Mutex<Vec<String>>,
    }

    impl WikiGateway for RecordingWiki {
        fn create_page(&self, request: &PageRequest<'_>) -> Result<PageHandle, GatewayError> {
            self.calls
                .lock()
                .expect("calls mutex")
                .push(format!("create:{}", request.title));
            if self.fail_create {
                return Err(GatewayError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(PageHandle {
                id: "42".to_string(),
                url: None,
            })
        }

        fn attach_file(
            &self,
            page: &PageHandle,
            path: &Path,
            content_type: &str,
        ) -> Result<(), GatewayError> {
            assert_eq!(content_type, "text/csv");
            assert!(path.exists(), "file must exist while attaching");
            self.calls
                .lock()
                .expect("calls mutex")
                .push(format!("attach:{}", page.id));
            if self.fail_attach {
                return Err(GatewayError::Transport("connection reset".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Serialize)]
    struct Row {
        value: u32,
    }

    fn export(dir: &Path) -> ExportFile {
        ExportFile::write(dir, "rows.csv", &[Row { value: 1 }], false)
            .expect("write")
            .expect("file")
    }

    fn request() -> PageRequest<'static> {
        PageRequest {
            space_key: "QA",
            parent_id: Some("100"),
            title: "[App Review] 2024-05",
            body: "<p>body</p>",
        }
    }

    #[test]
    fn failed_page_creation_skips_attachment() {
        let dir = tempfile::tempdir().expect("dir");
        let wiki = RecordingWiki {
            fail_create: true,
            ..RecordingWiki::default()
        };
        let result = publish_page(&wiki, &request(), Some(export(dir.path())));
        assert!(result.page.is_failed());
        assert_eq!(result.attachment, StageOutcome::Empty);
        assert_eq!(wiki.calls.lock().unwrap().len(), 1);
        assert!(dir.path().join("rows.csv").exists());
        assert_eq!(result.kept_export, Some(dir.path().join("rows.csv")));
    }

    #[test]
    fn failed_attachment_keeps_page_and_file() {
        let dir = tempfile::tempdir().expect("dir");
        let wiki = RecordingWiki {
            fail_attach: true,
            ..RecordingWiki::default()
        };
        let result = publish_page(&wiki, &request(), Some(export(dir.path())));
        assert!(result.page.is_data());
        assert!(result.attachment.is_failed());
        assert!(dir.path().join("rows.csv").exists());
        assert_eq!(result.kept_export, Some(dir.path().join("rows.csv")));
    }

    #[test]
    fn successful_attachment_removes_file() {
        let dir = tempfile::tempdir().expect("dir");
        let wiki = RecordingWiki::default();
        let result = publish_page(&wiki, &request(), Some(export(dir.path())));
        assert_eq!(result.attachment, StageOutcome::Data("rows.csv".to_string()));
        assert_eq!(
            *wiki.calls.lock().unwrap(),
            vec!["create:[App Review] 2024-05".to_string(), "attach:42".to_string()]
        );
        assert!(!dir.path().join("rows.csv").exists());
        assert!(result.kept_export.is_none());
    }

    #[test]
    fn no_export_means_no_attach_call() {
        let wiki = RecordingWiki::default();
        let result = publish_page(&wiki, &request(), None);
        assert_eq!(result.attachment, StageOutcome::Empty);
        assert_eq!(wiki.calls.lock().unwrap().len(), 1);
    }
}
