//! Scheduled reporting automation: monthly wiki reports, a stale issue
//! digest, an issue search/export tool and a localization seeding helper.

pub mod config;
pub mod error;
pub mod gateways;
pub mod pipeline;
pub mod telemetry;
pub mod workflows;
