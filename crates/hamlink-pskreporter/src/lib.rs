//! hamlink-pskreporter: PSKReporter reception report poller.
//!
//! Polls the public retrieve API on a timer, parses `<receptionReport/>`
//! records and emits them as [`AdapterEvent::Reports`](hamlink_core::AdapterEvent::Reports).
//! The HTTP side sits behind the [`ReportSource`] trait.

pub mod builder;
pub mod client;
pub mod parser;
pub mod source;

pub use builder::PskReporterBuilder;
pub use client::{PollOptions, PskReporterAdapter};
pub use parser::parse_reports;
pub use source::{FetchResponse, HttpReportSource, QueryOptions, ReportSource};
