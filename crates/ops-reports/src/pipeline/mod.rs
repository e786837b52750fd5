//! Shared report stages: window resolution, collection, aggregation,
//! tabular export, markup helpers and publishing.

pub mod aggregate;
pub mod collector;
pub mod export;
pub mod markup;
pub mod outcome;
pub mod publish;
pub mod window;

pub use aggregate::{latest_date, merge_within_window, ReportBundle};
pub use collector::{
    collect_paginated, collect_since, residual_share, CollectLimits, Collection, Page,
    PagedSource, RawRecord, StopReason,
};
pub use export::{ExportError, ExportFile};
pub use outcome::StageOutcome;
pub use publish::{
    deliver_chat, deliver_mail, publish_page, ChatSink, MailMessage, MailSink, PageHandle,
    PagePublication, PageRequest, WikiGateway,
};
pub use window::{stale_issue_buckets, AgeBucket, ReportWindow};
