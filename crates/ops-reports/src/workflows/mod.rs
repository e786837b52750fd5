pub mod issue_report;
pub mod issue_search;
pub mod localization;
pub mod wiki_report;
