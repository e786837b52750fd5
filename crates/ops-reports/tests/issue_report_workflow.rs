use chrono::{NaiveDate, NaiveDateTime};
use ops_reports::config::DigestConfig;
use ops_reports::gateways::jira::{
    Assignee, Comment, CommentPage, IssueFields, IssueTracker, NamedField, SearchPage, TrackerIssue,
};
use ops_reports::gateways::GatewayError;
use ops_reports::pipeline::{ChatSink, MailMessage, MailSink, StageOutcome};
use ops_reports::workflows::issue_report::{run_digest, DigestSinks, EMPTY_DIGEST_BODY, QUERY_FAILED};
use std::sync::Mutex;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .expect("valid date")
        .and_hms_opt(9, 30, 0)
        .expect("valid time")
}

fn issue(key: &str, assignee: Option<&str>) -> TrackerIssue {
    TrackerIssue {
        key: key.to_string(),
        fields: IssueFields {
            summary: Some(format!("{key} summary")),
            status: Some(NamedField {
                name: "In Progress".to_string(),
            }),
            priority: Some(NamedField {
                name: "High".to_string(),
            }),
            assignee: assignee.map(|name| Assignee {
                display_name: Some(name.to_string()),
                account_id: Some(format!("acct-{name}")),
            }),
            updated: Some("2024-05-20T10:00:00.000+0900".to_string()),
            created: Some("2024-04-01T10:00:00.000+0900".to_string()),
            comment: Some(CommentPage {
                comments: vec![
                    Comment {
                        created: Some("2024-05-18T08:00:00.000+0900".to_string()),
                        updated: None,
                    },
                    Comment {
                        created: Some("2024-05-02T08:00:00.000+0900".to_string()),
                        updated: None,
                    },
                ],
            }),
        },
    }
}

/// Serves two issues for the 1-2 week bucket and one for the 4+ week bucket.
#[derive(Debug, Default)]
struct BucketTracker {
    empty: bool,
    unauthorized: bool,
    queries: Mutex<Vec<String>>,
    comments: Mutex<Vec<(String, String)>>,
}

impl IssueTracker for BucketTracker {
    fn search(
        &self,
        query: &str,
        _page_token: Option<&str>,
        _max_results: usize,
        _fields: &[&str],
    ) -> Result<SearchPage, GatewayError> {
        self.queries.lock().expect("queries mutex").push(query.to_string());
        if self.unauthorized {
            return Err(GatewayError::Status {
                status: 401,
                body: "unauthorized".to_string(),
            });
        }
        let issues = if self.empty {
            Vec::new()
        } else if query.contains("updated <= -1w AND") {
            vec![issue("QA-1", Some("Mina")), issue("QA-2", None)]
        } else if query.contains("updated <= -4w ORDER") {
            vec![issue("QA-9", Some("Jun"))]
        } else {
            Vec::new()
        };
        Ok(SearchPage {
            issues,
            next_page_token: None,
            is_last: Some(true),
        })
    }

    fn clean_query(&self, query: &str) -> Result<String, GatewayError> {
        Ok(query.to_string())
    }

    fn add_comment(&self, issue_key: &str, account_id: &str, _text: &str) -> Result<(), GatewayError> {
        self.comments
            .lock()
            .expect("comments mutex")
            .push((issue_key.to_string(), account_id.to_string()));
        Ok(())
    }

    fn browse_url(&self, issue_key: &str) -> String {
        format!("https://tracker.example.com/browse/{issue_key}")
    }
}

#[derive(Debug, Default)]
struct DownChat {
    attempts: Mutex<Vec<String>>,
}

impl ChatSink for DownChat {
    fn post_message(&self, text: &str) -> Result<(), GatewayError> {
        self.attempts.lock().expect("attempts mutex").push(text.to_string());
        Err(GatewayError::Status {
            status: 404,
            body: "no_service".to_string(),
        })
    }
}

/// Records each message together with the attachment contents at send time.
#[derive(Debug, Default)]
struct RecordingMail {
    sent: Mutex<Vec<(MailMessage, Vec<String>)>>,
}

impl MailSink for RecordingMail {
    fn send(&self, message: &MailMessage) -> Result<(), GatewayError> {
        let contents = message
            .attachments
            .iter()
            .map(|path| std::fs::read_to_string(path).expect("attachment readable while sending"))
            .collect();
        self.sent
            .lock()
            .expect("sent mutex")
            .push((message.clone(), contents));
        Ok(())
    }
}

fn digest(notify_assignees: bool) -> DigestConfig {
    DigestConfig {
        base_query: "project IN (QA) AND statusCategory != Done".to_string(),
        order_by: "ORDER BY updated ASC".to_string(),
        max_results: 1000,
        notify_assignees,
        reminder_text: "please update this issue".to_string(),
    }
}

#[test]
fn mail_is_delivered_when_chat_is_down() {
    let export_dir = tempfile::tempdir().expect("temp dir");
    let tracker = BucketTracker::default();
    let chat = DownChat::default();
    let mail = RecordingMail::default();
    let sinks = DigestSinks {
        tracker: &tracker,
        chat: &chat,
        mail: &mail,
    };

    let outcome = run_digest(sinks, &digest(false), now(), export_dir.path());

    assert_eq!(outcome.total_count, 3);
    assert_eq!(outcome.buckets.len(), 4);
    assert!(outcome.buckets.iter().all(|bucket| bucket.chat.is_failed()));
    assert_eq!(outcome.buckets[0].total_count, 2);
    assert_eq!(outcome.buckets[1].collection, "empty");
    assert_eq!(outcome.mail, StageOutcome::Data(()));
    assert!(outcome.delivered_anywhere());
    assert_eq!(outcome.comments_posted, 0);
    assert_eq!(chat.attempts.lock().unwrap().len(), 4);

    let sent = mail.sent.lock().unwrap();
    let (message, attachments) = &sent[0];
    assert_eq!(message.subject, "Stale issue digest (3 total) - 2024-06-03");
    assert!(message.html_body.contains("QA-9"));
    assert!(!message.attachments[0].exists(), "digest CSV removed after sending");
    assert!(message.attachments[0].ends_with("issue_digest_20240603_093000.csv"));

    let lines: Vec<&str> = attachments[0].lines().collect();
    assert_eq!(
        lines[0],
        "key,url,summary,priority,status,assignee,updated,latest_comment_date,assignee_id"
    );
    assert!(lines[1].starts_with("--- Not updated for 1 to 2 weeks (2) ---"));
    assert!(lines[2].starts_with(
        "QA-1,https://tracker.example.com/browse/QA-1,QA-1 summary,High,In Progress,Mina,2024-05-20,2024-05-18,acct-Mina"
    ));
    assert!(lines[3].contains(",Unassigned,"));
    assert!(lines[4].starts_with("--- Not updated for 2 to 3 weeks (0) ---"));
    assert_eq!(lines.len(), 8);
}

#[test]
fn reminders_skip_unassigned_issues() {
    let export_dir = tempfile::tempdir().expect("temp dir");
    let tracker = BucketTracker::default();
    let sinks = DigestSinks {
        tracker: &tracker,
        chat: &DownChat::default(),
        mail: &RecordingMail::default(),
    };

    let outcome = run_digest(sinks, &digest(true), now(), export_dir.path());

    assert_eq!(outcome.comments_posted, 2);
    assert_eq!(
        *tracker.comments.lock().unwrap(),
        vec![
            ("QA-1".to_string(), "acct-Mina".to_string()),
            ("QA-9".to_string(), "acct-Jun".to_string())
        ]
    );
}

#[test]
fn empty_digest_sends_plain_notice_without_attachment() {
    let export_dir = tempfile::tempdir().expect("temp dir");
    let tracker = BucketTracker {
        empty: true,
        ..BucketTracker::default()
    };
    let mail = RecordingMail::default();
    let sinks = DigestSinks {
        tracker: &tracker,
        chat: &DownChat::default(),
        mail: &mail,
    };

    let outcome = run_digest(sinks, &digest(false), now(), export_dir.path());

    assert_eq!(outcome.total_count, 0);
    assert!(outcome.mail.is_data());
    assert_eq!(tracker.queries.lock().unwrap().len(), 4);

    let sent = mail.sent.lock().unwrap();
    let (message, _) = &sent[0];
    assert_eq!(message.subject, "Stale issue digest (0 total) - 2024-06-03");
    assert!(message.attachments.is_empty());
    assert!(message.html_body.starts_with("No stale issues"));
    assert_eq!(
        std::fs::read_dir(export_dir.path()).expect("readable dir").count(),
        0
    );
}

#[derive(Debug, Default)]
struct RecordingChat {
    posted: Mutex<Vec<String>>,
}

impl ChatSink for RecordingChat {
    fn post_message(&self, text: &str) -> Result<(), GatewayError> {
        self.posted.lock().expect("posted mutex").push(text.to_string());
        Ok(())
    }
}

#[test]
fn rejected_searches_are_reported_as_failures() {
    let export_dir = tempfile::tempdir().expect("temp dir");
    let tracker = BucketTracker {
        unauthorized: true,
        ..BucketTracker::default()
    };
    let chat = RecordingChat::default();
    let mail = RecordingMail::default();
    let sinks = DigestSinks {
        tracker: &tracker,
        chat: &chat,
        mail: &mail,
    };

    let outcome = run_digest(sinks, &digest(false), now(), export_dir.path());

    assert_eq!(outcome.total_count, 0);
    assert!(outcome.buckets.iter().all(|bucket| bucket.collection == "failed"));

    let posted = chat.posted.lock().unwrap();
    assert_eq!(posted.len(), 4);
    assert!(posted.iter().all(|text| text.contains(QUERY_FAILED)));
    assert!(posted.iter().all(|text| !text.contains("Nothing to report")));

    let sent = mail.sent.lock().unwrap();
    let (message, _) = &sent[0];
    assert_eq!(
        message.subject,
        "Stale issue digest (0 total, 4 searches failed) - 2024-06-03"
    );
    assert_ne!(message.html_body, EMPTY_DIGEST_BODY);
    assert_eq!(message.html_body.matches(QUERY_FAILED).count(), 4);
    assert!(message.attachments.is_empty());
}
